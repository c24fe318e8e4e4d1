//! End-to-end evaluation through the default plug-in set.

use parlance::{Compiler, Scope, Value};
use pretty_assertions::assert_eq;

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    compiler
}

fn eval(expression: &str) -> Value {
    let compiler = compiler();
    let compiled = compiler.compile(expression).expect("compilation failed");
    compiled.evaluate(&mut Scope::new()).expect("evaluation failed")
}

#[test]
fn integer_arithmetic() {
    assert_eq!(eval("2 * 3 + 4").as_int(), Some(10));
    assert_eq!(eval("2 + 3 * 4").as_int(), Some(14));
    assert_eq!(eval("10 - 2 - 3").as_int(), Some(5));
    assert_eq!(eval("7 / 2").as_int(), Some(3));
    assert_eq!(eval("7 % 4").as_int(), Some(3));
    assert_eq!(eval("1 << 10").as_int(), Some(1024));
    assert_eq!(eval("-5").as_int(), Some(-5));
    assert_eq!(eval("~0").as_int(), Some(-1));
}

#[test]
fn float_arithmetic_and_promotion() {
    assert_eq!(eval("2.5 * 4.0").as_float(), Some(10.0));
    assert_eq!(eval("1 + 2.5").as_float(), Some(3.5));
    assert_eq!(eval("2.5 + 1").as_float(), Some(3.5));
    assert_eq!(eval("7.0 / 2").as_float(), Some(3.5));
}

#[test]
fn boolean_logic() {
    assert_eq!(eval("true && false").as_bool(), Some(false));
    assert_eq!(eval("true || false").as_bool(), Some(true));
    assert_eq!(eval("!true").as_bool(), Some(false));
    assert_eq!(eval("yes && on && !no").as_bool(), Some(true));
}

#[test]
fn comparison_chain_follows_c_precedence() {
    // parses as true && (false == (true < false))
    assert_eq!(eval("true < false").as_bool(), Some(false));
    assert_eq!(eval("true && false == true < false").as_bool(), Some(true));
}

#[test]
fn equal_aliases_equality() {
    assert_eq!(eval("1 = 1").as_bool(), Some(true));
    assert_eq!(eval("1 = 2").as_bool(), Some(false));
}

#[test]
fn conditionals_and_elvis() {
    assert_eq!(eval("1 < 2 ? 10 : 20").as_int(), Some(10));
    assert_eq!(eval("1 > 2 ? 10 : 20").as_int(), Some(20));
    assert_eq!(eval("0 ?: 5").as_int(), Some(5));
    assert_eq!(eval("3 ?: 5").as_int(), Some(3));
    assert_eq!(eval("\"\" ?: \"fallback\"").as_str(), Some("fallback"));
}

#[test]
fn conditional_branches_auto_cast() {
    // the condition must stay non-constant, otherwise only one branch
    // survives and no unification happens
    let result = eval("random() >= 0.0 ? 1 : 2.5");
    assert_eq!(result.tag(), parlance::types::FLOAT);
    assert_eq!(result.as_float(), Some(1.0));
}

#[test]
fn string_operations() {
    assert_eq!(
        eval("\"Hello \" + \"beautiful \" + \"world!\"").as_str(),
        Some("Hello beautiful world!")
    );
    assert_eq!(eval("\"a\" + 1").as_str(), Some("a1"));
    assert_eq!(eval("2.5 + \"b\"").as_str(), Some("2.5b"));
    assert_eq!(eval("ToUpper(\"abc\")").as_str(), Some("ABC"));
    assert_eq!(eval("Substring(\"hello\", 1, 3)").as_str(), Some("ell"));
    assert_eq!(eval("IndexOf(\"hello\", \"ll\")").as_int(), Some(2));
    assert_eq!(eval("Replace(\"a-b-c\", \"-\", \"+\")").as_str(), Some("a+b+c"));
    assert_eq!(eval("\"abc\"[1]").as_str(), Some("b"));
    assert_eq!(eval("Trim(\"  x \") + Repeat(\"ab\", 2)").as_str(), Some("xabab"));
    assert_eq!(eval("Length(\"hello\")").as_int(), Some(5));
    assert_eq!(eval("\"abc\" < \"abd\"").as_bool(), Some(true));
}

#[test]
fn wildcard_matching() {
    assert_eq!(eval("\"MyPhoto.jpg\" * \"*.jpg\"").as_bool(), Some(true));
    assert_eq!(eval("\"MyPhoto.png\" * \"*.jpg\"").as_bool(), Some(false));
    assert_eq!(eval("WildcardMatch(\"IMG_1234.cr2\", \"IMG_????.*\")").as_bool(), Some(true));
}

#[test]
fn math_functions() {
    assert_eq!(eval("abs(-3)").as_int(), Some(3));
    assert_eq!(eval("sqrt(16.0)").as_float(), Some(4.0));
    assert_eq!(eval("max(3, 7)").as_int(), Some(7));
    assert_eq!(eval("floor(2.9) + ceil(0.1)").as_float(), Some(3.0));
    let pi = eval("PI").as_float().unwrap();
    assert!((pi - std::f64::consts::PI).abs() < 1e-12);
}

#[test]
fn abbreviated_and_case_insensitive_names() {
    assert_eq!(eval("tolow(\"AB\")").as_str(), Some("ab"));
    assert_eq!(eval("TRUE").as_bool(), Some(true));
    assert_eq!(eval("startswith(\"abc\", \"ab\")").as_bool(), Some(true));
}

#[test]
fn date_and_time() {
    assert_eq!(eval("Days(3) > Hours(71)").as_bool(), Some(true));
    assert_eq!(eval("InHours(Minutes(90))").as_float(), Some(1.5));
    assert_eq!(eval("GetYear(UtcDateTime(2024, 2, 29))").as_int(), Some(2024));
    assert_eq!(eval("GetMonth(UtcDateTime(2024, 2, 29)) == February").as_bool(), Some(true));
    assert_eq!(
        eval("UtcDateTime(2024, 3, 1) - UtcDateTime(2024, 2, 29) == Days(1)").as_bool(),
        Some(true)
    );
    assert_eq!(eval("Now + Minutes(1) > Now").as_bool(), Some(true));
    assert_eq!(eval("Seconds(90) == Minutes(1) + Seconds(30)").as_bool(), Some(true));
    assert_eq!(eval("Days(2) * 2 == Days(4)").as_bool(), Some(true));
}

#[test]
fn random_stays_within_range() {
    let compiler = compiler();
    let compiled = compiler.compile("random() >= 0.0 && random() < 1.0").unwrap();
    let mut scope = Scope::new();
    for _ in 0..16 {
        assert_eq!(compiled.evaluate(&mut scope).unwrap().as_bool(), Some(true));
    }
}

#[test]
fn scopes_are_reusable_across_expressions() {
    let compiler = compiler();
    let first = compiler.compile("1 + Length(\"abc\")").unwrap();
    let second = compiler.compile("\"a\" + 2").unwrap();
    let mut scope = Scope::new();
    assert_eq!(first.evaluate(&mut scope).unwrap().as_int(), Some(4));
    assert_eq!(second.evaluate(&mut scope).unwrap().as_str(), Some("a2"));
    assert_eq!(first.evaluate(&mut scope).unwrap().as_int(), Some(4));
}

#[test]
fn result_type_matches_declared_type() {
    let compiler = compiler();
    for (expression, expected) in [
        ("1 + 1", parlance::types::INTEGER),
        ("1.5 + 1.5", parlance::types::FLOAT),
        ("\"a\" + \"b\"", parlance::types::STRING),
        ("1 < 2", parlance::types::BOOLEAN),
        ("Days(1)", parlance::types::DURATION),
        ("Now", parlance::types::DATETIME),
    ] {
        let compiled = compiler.compile(expression).unwrap();
        assert_eq!(compiled.result_type(), expected, "{expression}");
        let value = compiled.evaluate(&mut Scope::new()).unwrap();
        assert_eq!(value.tag(), expected, "{expression}");
    }
}
