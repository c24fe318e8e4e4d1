//! Named and nested expressions: the compile-time operator form, the
//! evaluation-time function form, repositories and circular detection.

use parlance::{Compiler, ErrorKind, ExpressionRepository, Scope};
use pretty_assertions::assert_eq;

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    compiler
}

#[test]
fn compile_time_nested_expressions() {
    let compiler = compiler();
    assert!(!compiler.add_named("foo", "1 + 2").unwrap());

    let compiled = compiler.compile("*foo + 3").unwrap();
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(6));

    // the quoted form is equivalent
    let quoted = compiler.compile("*\"foo\" + 3").unwrap();
    assert_eq!(quoted.evaluate(&mut Scope::new()).unwrap().as_int(), Some(6));

    // and so is the one-argument function form
    let function_form = compiler.compile("Expression(foo) + 3").unwrap();
    assert_eq!(function_form.evaluate(&mut Scope::new()).unwrap().as_int(), Some(6));
}

#[test]
fn resolved_target_survives_removal() {
    let compiler = compiler();
    compiler.add_named("foo", "1 + 2").unwrap();
    let compiled = compiler.compile("*foo + 3").unwrap();

    assert!(compiler.remove_named("foo"));
    assert!(!compiler.remove_named("foo"));

    // the program holds a shared handle on the compiled target
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(6));
}

#[test]
fn named_expressions_ignore_case_by_default() {
    let compiler = compiler();
    compiler.add_named("Filter", "1 + 1").unwrap();
    let compiled = compiler.compile("*FILTER").unwrap();
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(2));

    // adding under a different case replaces
    assert!(compiler.add_named("FILTER", "2 + 2").unwrap());
}

#[test]
fn unknown_compile_time_target_fails() {
    let err = compiler().compile("*missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestedExpressionNotFoundCT);
}

#[test]
fn evaluation_time_resolution_with_replacement() {
    let compiler = compiler();
    compiler.add_named("limit", "10 * 2").unwrap();

    let compiled = compiler.compile("Expression(limit, 5) + 1").unwrap();
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(21));

    // resolution happens per evaluation: removing the name falls back to
    // the replacement value
    compiler.remove_named("limit");
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(6));

    // and re-adding picks the new definition up
    compiler.add_named("limit", "100").unwrap();
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(101));
}

#[test]
fn evaluation_time_resolution_with_throw() {
    let compiler = compiler();
    compiler.add_named("limit", "10").unwrap();
    let compiled = compiler.compile("Expression(limit, 5, throw)").unwrap();
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(10));

    compiler.remove_named("limit");
    let err = compiled.evaluate(&mut Scope::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestedExpressionNotFoundET);
}

#[test]
fn replacement_type_declares_the_result_type() {
    let compiler = compiler();
    let compiled = compiler.compile("Expression(\"absent\", 1.5)").unwrap();
    assert_eq!(compiled.result_type(), parlance::types::FLOAT);

    // a target of the wrong result type is a runtime error
    compiler.add_named("absent", "\"a string\"").unwrap();
    let err = compiled.evaluate(&mut Scope::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestedExpressionResultTypeError);
}

#[test]
fn nested_function_argument_validation() {
    let compiler = compiler();
    let err = compiler.compile("Expression(1 + 2, 5)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestedExpressionCallArgumentMismatch);

    let err = compiler.compile("Expression(\"n\", 5, \"not-the-keyword\")").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestedExpressionCallArgumentMismatch);

    let err = compiler.compile("Expression()").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestedExpressionCallArgumentMismatch);
}

#[test]
fn non_constant_operator_operand_fails() {
    let compiler = compiler();
    let err = compiler.compile("*(\"fo\" + \"o\")").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NamedExpressionNotConstant);
}

#[test]
fn circular_references_are_detected_at_evaluation() {
    let compiler = compiler();
    compiler.add_named("a", "Expression(\"b\", 0)").unwrap();
    compiler.add_named("b", "Expression(\"a\", 0)").unwrap();

    let compiled = compiler.compile("*a").unwrap();
    let err = compiled.evaluate(&mut Scope::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WhenEvaluatingNestedExpression);
    let rendered = err.to_string();
    assert!(rendered.contains("Circular"), "{rendered}");
}

#[test]
fn nested_expressions_decompile_into_optimized_strings() {
    let compiler = compiler();
    compiler.add_named("foo", "1 + 2").unwrap();
    let compiled = compiler.compile("*foo + 3").unwrap();
    assert_eq!(compiled.normalized_string(), "*foo + 3");
    assert_eq!(compiled.optimized_string(), "*foo + 3");

    let late = compiler.compile("Expression(foo, 5, throw)").unwrap();
    assert_eq!(late.optimized_string(), "Expression(foo, 5, throw)");
}

struct MapRepository;

impl ExpressionRepository for MapRepository {
    fn get(&self, name: &str) -> Option<String> {
        (name == "fromrepo").then(|| "6 * 7".to_owned())
    }
}

#[test]
fn repository_backed_named_expressions() {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    compiler.set_repository(Box::new(MapRepository));

    let compiled = compiler.compile("*fromrepo + 1").unwrap();
    assert_eq!(compiled.evaluate(&mut Scope::new()).unwrap().as_int(), Some(43));

    // the repository string is compiled once and cached in the registry
    let again = compiler.get_named("fromrepo").unwrap();
    assert_eq!(again.original_string(), "6 * 7");
}
