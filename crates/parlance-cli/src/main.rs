//! Command-line front end: compiles an expression with the built-in
//! plug-ins, optionally prints the normalized/optimized strings and the
//! program listing, and evaluates it.
//!
//! Named expressions can be supplied inline (`--named filter='size > 1024'`)
//! or from a TOML file with an `[expressions]` table; both are available to
//! the compiled expression as nested expressions.

use std::{collections::BTreeMap, path::PathBuf, process::ExitCode};

use clap::Parser;
use parlance::{CompileFlags, Compiler, Scope};
use serde::Deserialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parlance", version, about = "Compile and evaluate an expression")]
struct Cli {
    /// The expression to compile.
    expression: String,

    /// Defines a named expression usable as e.g. `*NAME` (repeatable).
    #[arg(long, value_name = "NAME=EXPR")]
    named: Vec<String>,

    /// Loads named expressions from a TOML file with an [expressions] table.
    #[arg(long, value_name = "FILE")]
    exprs: Option<PathBuf>,

    /// Prints the normalized expression string.
    #[arg(long)]
    normalized: bool,

    /// Prints the optimized expression string.
    #[arg(long)]
    optimized: bool,

    /// Prints the program listing.
    #[arg(long)]
    listing: bool,

    /// Prints the result type along with the result.
    #[arg(long)]
    show_type: bool,

    /// Disables constant folding and dead-branch elimination.
    #[arg(long)]
    no_optimization: bool,

    /// Compiles only; skips evaluation.
    #[arg(long)]
    check: bool,
}

/// Shape of the `--exprs` file.
#[derive(Debug, Deserialize)]
struct ExpressionFile {
    #[serde(default)]
    expressions: BTreeMap<String, String>,
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut compiler = Compiler::new();
    if cli.no_optimization {
        compiler.config_mut().compile_flags |= CompileFlags::NO_OPTIMIZATION;
    }
    compiler.setup_defaults();

    if let Some(path) = &cli.exprs {
        let text = std::fs::read_to_string(path).map_err(|err| format!("cannot read {}: {err}", path.display()))?;
        let file: ExpressionFile = toml::from_str(&text).map_err(|err| format!("{}: {err}", path.display()))?;
        for (name, expression) in &file.expressions {
            compiler.add_named(name, expression).map_err(|err| err.to_string())?;
            debug!(name, "added named expression from file");
        }
    }
    for definition in &cli.named {
        let Some((name, expression)) = definition.split_once('=') else {
            return Err(format!("--named takes NAME=EXPR, got {definition:?}"));
        };
        compiler.add_named(name.trim(), expression).map_err(|err| err.to_string())?;
    }

    let expression = compiler.compile(&cli.expression).map_err(|err| err.to_string())?;

    if cli.normalized {
        println!("normalized: {}", expression.normalized_string());
    }
    if cli.optimized {
        println!("optimized:  {}", expression.optimized_string());
    }
    if cli.listing {
        print!("{}", expression.program().listing());
    }
    if cli.check {
        return Ok(());
    }

    let mut scope = Scope::new();
    let result = expression.evaluate(&mut scope).map_err(|err| err.to_string())?;
    if cli.show_type {
        println!("{result} : {}", result.type_name());
    } else {
        println!("{result}");
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
