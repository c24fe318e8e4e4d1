//! Program shape: constant folding, dead-branch elimination, jumps and
//! partial-constant elimination, observed through the opcode counters and
//! the program listing.

use parlance::{CompileFlags, Compiler, Scope};
use pretty_assertions::assert_eq;

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    compiler
}

fn no_opt_compiler() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.config_mut().compile_flags |= CompileFlags::NO_OPTIMIZATION;
    compiler.setup_defaults();
    compiler
}

#[test]
fn constant_expressions_fold_to_one_opcode() {
    let compiled = compiler().compile("2 * 3 + 4").unwrap();
    assert!(compiled.program().is_single_constant());
    assert_eq!(compiled.program().single_constant().unwrap().as_int(), Some(10));
    assert_eq!(compiled.optimized_string(), "10");
}

#[test]
fn string_concatenation_folds() {
    let compiled = compiler().compile("\"Hello \" + \"beautiful \" + \"world!\"").unwrap();
    assert!(compiled.program().is_single_constant());
    assert_eq!(
        compiled.program().single_constant().unwrap().as_str(),
        Some("Hello beautiful world!")
    );
}

#[test]
fn no_optimization_keeps_every_invocation() {
    let compiled = no_opt_compiler().compile("2 * 3 + 4").unwrap();
    assert_eq!(compiled.program().op_count(), 5);
    assert_eq!(compiled.program().constant_count(), 3);
    assert_eq!(compiled.program().callback_count(), 2);
    assert_eq!(compiled.optimized_string(), "2 * 3 + 4");
}

#[test]
fn constant_condition_eliminates_the_dead_branch() {
    // Q is constant false: only F's opcodes survive, no jumps
    let compiled = compiler().compile("1 > 2 ? ToUpper(\"t\") : ToLower(\"F\")").unwrap();
    assert_eq!(compiled.program().jump_count(), 0);
    assert!(compiled.program().is_single_constant());
    assert_eq!(compiled.program().single_constant().unwrap().as_str(), Some("f"));
}

#[test]
fn runtime_condition_compiles_one_jump_pair() {
    let compiled = compiler().compile("random() < 0.5 ? \"low\" : \"high\"").unwrap();
    assert_eq!(compiled.program().jump_count(), 2);

    // the listing names the five command kinds and the jump targets:
    // JumpIfFalse lands on F's first opcode, Jump right after F
    let listing = compiled.program().listing();
    assert!(listing.contains("JumpIfFalse"), "{listing}");
    let ops = compiled.program().op_count();
    assert!(listing.contains(&format!("-> {}", ops - 1)), "{listing}");
    assert!(listing.contains(&format!("-> {ops}")), "{listing}");
}

#[test]
fn partial_constant_elimination_drops_the_constant_side() {
    let compiled = compiler().compile("true && random() < 0.5").unwrap();
    // `true &&` disappears entirely
    assert_eq!(compiled.program().constant_count(), 1); // the 0.5
    assert_eq!(compiled.program().callback_count(), 2); // random, <
    assert_eq!(compiled.optimized_string(), "random() < 0.5");

    let compiled = compiler().compile("false && random() < 0.5").unwrap();
    assert!(compiled.program().is_single_constant());
    assert_eq!(compiled.program().single_constant().unwrap().as_bool(), Some(false));

    let compiled = compiler().compile("0 + Length(ToUpper(\"\" + random()))").unwrap();
    assert_eq!(compiled.optimized_string(), "Length(ToUpper(\"\" + random()))");
}

#[test]
fn optimized_string_recompiles_to_the_same_or_smaller_program() {
    let compiler = compiler();
    for expression in [
        "2 * 3 + 4",
        "true && random() < 0.5",
        "random() < 0.5 ? 1 + 1 : 4",
        "\"a\" + \"b\" + ToUpper(\"c\")",
        "1 Sm 2 ? Days(3) : Hours(4)",
    ] {
        let original = compiler.compile(expression).unwrap();
        let recompiled = compiler.compile(original.optimized_string()).unwrap();
        assert!(
            recompiled.program().callback_count() <= original.program().callback_count(),
            "{expression}"
        );
        // optimization is idempotent: recompiling the optimized string keeps
        // the opcode count and the optimized string itself stable
        assert_eq!(recompiled.program().op_count(), original.program().op_count(), "{expression}");
        assert_eq!(recompiled.optimized_string(), original.optimized_string(), "{expression}");
    }
}

#[test]
fn unselected_branch_does_not_run() {
    // division by zero in the unselected branch must not be reached
    let compiled = compiler().compile("random() >= 0.0 ? 1 : 1 / 0").unwrap();
    let result = compiled.evaluate(&mut Scope::new()).unwrap();
    assert_eq!(result.as_int(), Some(1));
}

#[test]
fn division_by_zero_raises_at_evaluation() {
    let compiled = no_opt_compiler().compile("1 / 0").unwrap();
    let err = compiled.evaluate(&mut Scope::new()).unwrap_err();
    assert_eq!(err.kind(), parlance::ErrorKind::ExceptionInCallback);
}

#[test]
fn evaluation_leaves_exactly_one_value() {
    let compiler = compiler();
    let mut scope = Scope::new();
    for expression in ["1 + 2 * 3", "random() < 0.5 ? \"a\" : \"b\"", "Days(1) + Hours(2) > Hours(25)"] {
        let compiled = compiler.compile(expression).unwrap();
        let value = compiled.evaluate(&mut scope).unwrap();
        assert_eq!(value.tag(), compiled.result_type(), "{expression}");
    }
}
