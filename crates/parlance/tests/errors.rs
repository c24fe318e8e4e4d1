//! Error kinds, positions and context entries across parse, compile and
//! evaluation.

use parlance::{Compiler, ErrorEntry, ErrorKind, Expectation, Scope};

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    compiler
}

fn compile_err(expression: &str) -> parlance::ExprError {
    compiler().compile(expression).unwrap_err()
}

#[test]
fn parse_error_kinds() {
    assert_eq!(compile_err("").kind(), ErrorKind::EmptyExpressionString);
    assert_eq!(compile_err("§").kind(), ErrorKind::SyntaxError);
    assert_eq!(compile_err("1 ~ 2").kind(), ErrorKind::UnknownBinaryOperatorSymbol);
    assert_eq!(compile_err(": 1").kind(), ErrorKind::UnknownUnaryOperatorSymbol);

    let err = compile_err("(1");
    assert_eq!(err.kind(), ErrorKind::SyntaxErrorExpectation);
    assert_eq!(err.expectation(), Some(Expectation::ClosingBrace));

    assert_eq!(compile_err("max(1, 2").expectation(), Some(Expectation::ClosingFunctionBrace));
    assert_eq!(compile_err("\"abc\"[1").expectation(), Some(Expectation::ClosingSubscript));
    assert_eq!(compile_err("\"abc").expectation(), Some(Expectation::ClosingQuote));
    assert_eq!(compile_err("1 < 2 ? 3").expectation(), Some(Expectation::ConditionalColon));
    assert_eq!(compile_err("1 +").expectation(), Some(Expectation::RhsOperand));
    assert_eq!(compile_err("1 1").expectation(), Some(Expectation::Operator));
}

#[test]
fn compile_error_kinds() {
    assert_eq!(compile_err("nosuchident").kind(), ErrorKind::UnknownIdentifier);
    assert_eq!(compile_err("NoSuchFunction(1)").kind(), ErrorKind::UnknownFunction);
    assert_eq!(compile_err("!\"text\"").kind(), ErrorKind::UnaryOperatorNotDefined);
    assert_eq!(compile_err("\"a\" << 2").kind(), ErrorKind::BinaryOperatorNotDefined);
}

#[test]
fn name_hints() {
    // known function name without parentheses
    assert_eq!(compile_err("ToUpper").kind(), ErrorKind::MissingFunctionParentheses);
    // known identifier called with parentheses
    assert_eq!(compile_err("PI(1)").kind(), ErrorKind::IdentifierWithFunctionParentheses);
    // known function, wrong argument types
    let err = compile_err("ToUpper(1)");
    assert_eq!(err.kind(), ErrorKind::FunctionHint);
    assert!(err.message().contains("ToUpper"), "{}", err.message());
}

#[test]
fn incompatible_conditional_branches() {
    // no auto-cast bridges String and Boolean
    let err = compile_err("random() < 0.5 ? \"a\" : true");
    assert_eq!(err.kind(), ErrorKind::IncompatibleTypesInConditional);
}

#[test]
fn errors_carry_position_and_expression_info() {
    let err = compile_err("1 + nosuch");
    assert_eq!(err.kind(), ErrorKind::UnknownIdentifier);
    assert_eq!(err.position(), Some(4));

    let info = err
        .entries()
        .iter()
        .find_map(|entry| match entry {
            ErrorEntry::ExpressionInfo { expression, position } => Some((expression.clone(), *position)),
            _ => None,
        })
        .expect("expression info entry attached");
    assert_eq!(info, ("1 + nosuch".to_owned(), 4));

    let rendered = err.to_string();
    assert!(rendered.contains("{1 + nosuch}"), "{rendered}");
    assert!(rendered.contains("^->"), "{rendered}");
}

#[test]
fn callback_errors_wrap_with_expression_context() {
    let mut no_opt = Compiler::new();
    no_opt.config_mut().compile_flags |= parlance::CompileFlags::NO_OPTIMIZATION;
    no_opt.setup_defaults();

    let compiled = no_opt.compile("10 / (2 - 2)").unwrap();
    let err = compiled.evaluate(&mut Scope::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExceptionInCallback);
    assert!(
        err.entries()
            .iter()
            .any(|entry| matches!(entry, ErrorEntry::Cause { kind, .. } if *kind == ErrorKind::ArithmeticError)),
        "cause chain preserved"
    );
    assert!(
        err.entries()
            .iter()
            .any(|entry| matches!(entry, ErrorEntry::ExpressionInfo { .. })),
        "expression info attached"
    );
}

#[test]
fn callback_errors_fall_through_when_requested() {
    let mut compiler = Compiler::new();
    compiler.config_mut().compile_flags |=
        parlance::CompileFlags::NO_OPTIMIZATION | parlance::CompileFlags::CALLBACK_EXCEPTION_FALL_THROUGH;
    compiler.setup_defaults();

    let compiled = compiler.compile("1 / 0").unwrap();
    let err = compiled.evaluate(&mut Scope::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArithmeticError);
}

#[test]
fn reconfiguration_after_first_compile_panics() {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    let _keep = compiler.compile("1").unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = compiler.config_mut();
    }));
    assert!(result.is_err());
}
