//! The compiled expression object.
//!
//! An [`Expression`] bundles the program with everything its lifetime has to
//! keep alive: the compile-time store plug-ins stashed resources in, the
//! configuration needed to render strings, and the strings themselves.
//! Expressions are shared as `Arc<Expression>`; a program's subroutine
//! opcodes hold such handles, so a nested target outlives its removal from
//! the named-expression registry.

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use crate::{
    config::CompilerConfig,
    error::ExprResult,
    program::Program,
    scope::{CtStore, Scope},
    value::{TypeTag, Value},
    vm,
};

/// Wall-clock times of the compilation phases, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct CompileTimes {
    /// Lexing and parsing.
    pub parse: Duration,
    /// Plug-in dispatch, optimization and program assembly.
    pub assemble: Duration,
}

/// A compiled, evaluable expression.
#[derive(Debug)]
pub struct Expression {
    name: String,
    original: String,
    normalized: String,
    optimized: OnceLock<String>,
    program: Program,
    store: Arc<CtStore>,
    cfg: Arc<CompilerConfig>,
    times: CompileTimes,
}

impl Expression {
    /// Name carried by expressions that were not added to the registry.
    pub const ANONYMOUS: &'static str = "ANONYMOUS";

    pub(crate) fn new(
        name: &str,
        original: &str,
        normalized: String,
        program: Program,
        store: Arc<CtStore>,
        cfg: Arc<CompilerConfig>,
        times: CompileTimes,
    ) -> Self {
        Self {
            name: name.to_owned(),
            original: original.to_owned(),
            normalized,
            optimized: OnceLock::new(),
            program,
            store,
            cfg,
            times,
        }
    }

    /// The registry name, or [`Expression::ANONYMOUS`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The expression string as given to the compiler.
    #[must_use]
    pub fn original_string(&self) -> &str {
        &self.original
    }

    /// The normalized expression string, produced during compilation under
    /// the configured normalization flags. Token-preserving: only spacing,
    /// brackets and operator/identifier spellings differ from the original.
    #[must_use]
    pub fn normalized_string(&self) -> &str {
        &self.normalized
    }

    /// The optimized expression string: the optimized program, decompiled
    /// and normalized through the same writer. Produced
    /// lazily and cached.
    #[must_use]
    pub fn optimized_string(&self) -> &str {
        self.optimized.get_or_init(|| {
            let ast = vm::decompile(&self.program, &self.cfg);
            crate::normalizer::normalize(&ast, &self.cfg)
        })
    }

    /// The type of the value every successful evaluation produces.
    #[must_use]
    pub fn result_type(&self) -> TypeTag {
        self.program.result_type()
    }

    /// The compiled program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Compilation phase timings.
    #[must_use]
    pub fn compile_times(&self) -> CompileTimes {
        self.times
    }

    pub(crate) fn store(&self) -> &Arc<CtStore> {
        &self.store
    }

    pub(crate) fn cfg(&self) -> &CompilerConfig {
        &self.cfg
    }

    /// Evaluates the expression against the scope.
    ///
    /// The scope's per-evaluation state is reset first; a scope may be
    /// reused across evaluations and expressions, but only by one evaluation
    /// at a time. For concurrent evaluation give each thread its own scope.
    pub fn evaluate(&self, scope: &mut Scope) -> ExprResult<Value> {
        scope.begin(self.store.clone());
        vm::execute(&self.program, scope, &self.cfg, &self.name).map_err(|err| {
            let position = err.position().unwrap_or(0);
            err.with_expression_info(&self.original, position)
        })?;

        let result = scope.stack.pop().expect("program left no result on the stack");
        debug_assert!(
            scope.stack.is_empty(),
            "program left {} extra values on the stack",
            scope.stack.len()
        );
        Ok(result)
    }
}
