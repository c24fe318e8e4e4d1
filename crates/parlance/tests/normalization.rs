//! Normalized expression strings under various flag sets.

use parlance::{Compiler, NormalizeFlags, Scope};
use pretty_assertions::assert_eq;

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    compiler
}

fn compiler_with_flags(flags: NormalizeFlags) -> Compiler {
    let mut compiler = Compiler::new();
    compiler.config_mut().normalize_flags = flags;
    compiler.setup_defaults();
    compiler
}

fn normalized(expression: &str) -> String {
    compiler().compile(expression).unwrap().normalized_string().to_owned()
}

fn normalized_with(flags: NormalizeFlags, expression: &str) -> String {
    compiler_with_flags(flags)
        .compile(expression)
        .unwrap()
        .normalized_string()
        .to_owned()
}

#[test]
fn default_spacing_and_brackets() {
    assert_eq!(normalized("2*3+4"), "2 * 3 + 4");
    assert_eq!(normalized("1+2*3"), "1 + (2 * 3)");
    assert_eq!(normalized("1<2?3:4"), "1 < 2 ? 3 : 4");
    assert_eq!(normalized("max( 1,2 )"), "max(1, 2)");
}

#[test]
fn precedence_clarifying_brackets() {
    assert_eq!(
        normalized("true && false == true < false"),
        "true && (false == (true < false))"
    );
}

#[test]
fn necessary_brackets_survive() {
    assert_eq!(normalized("(1 + 2) * 3"), "(1 + 2) * 3");
    assert_eq!(normalized("-(1 + 2)"), "-(1 + 2)");
    assert_eq!(normalized("10 - (4 - 3)"), "10 - (4 - 3)");
}

#[test]
fn stacked_unary_operators_get_a_space() {
    assert_eq!(normalized("--5"), "- -5");
    assert_eq!(normalized("- -5"), "- -5");
    // the deny-list keeps "--" out even with all spacing flags cleared
    assert_eq!(normalized_with(NormalizeFlags::empty(), "- -5"), "- -5");
}

#[test]
fn compact_output_without_flags() {
    assert_eq!(normalized_with(NormalizeFlags::empty(), "2 * 3 + 4"), "2*3+4");
    assert_eq!(normalized_with(NormalizeFlags::empty(), "max(1, 2)"), "max(1,2)");
    assert_eq!(normalized_with(NormalizeFlags::empty(), "1 < 2 ? 3 : 4"), "1<2?3:4");
}

#[test]
fn verbal_operators_keep_their_spelling_by_default() {
    assert_eq!(normalized("1 Sm 2 Or 3 Gt 4"), "1 Sm 2 Or (3 Gt 4)");
    assert_eq!(normalized("not true"), "not true");
}

#[test]
fn verbal_operator_replacement_modes() {
    let symbolic = NormalizeFlags::default() | NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC;
    assert_eq!(normalized_with(symbolic, "1 Sm 2 Or 3 Gt 4"), "1 < 2 || (3 > 4)");
    assert_eq!(normalized_with(symbolic, "not true"), "!true");

    let upper = NormalizeFlags::default() | NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_UPPER_CASE;
    assert_eq!(normalized_with(upper, "1 sm 2"), "1 SM 2");

    let defined = NormalizeFlags::default() | NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_DEFINED_CASE;
    assert_eq!(normalized_with(defined, "1 SMALLER 2"), "1 Smaller 2");
}

#[test]
fn alias_operators_replace_by_default() {
    assert_eq!(normalized("true & false"), "true && false");
    assert_eq!(normalized("true | false"), "true || false");
    assert_eq!(normalized("1 = 2"), "1 == 2");
    // integer operands are genuinely bitwise, no aliasing
    assert_eq!(normalized("5 & 3"), "5 & 3");

    let keep = NormalizeFlags::default() - NormalizeFlags::REPLACE_ALIAS_OPERATORS;
    assert_eq!(normalized_with(keep, "true & false"), "true & false");
}

#[test]
fn literal_formats() {
    assert_eq!(normalized("0xFF + 0o17 + 0b101"), "0xFF + 0o17 + 0b101");
    assert_eq!(normalized("1e3"), "1e3");
    assert_eq!(normalized("2.5"), "2.5");
    assert_eq!(normalized("\"a\\\"b\""), "\"a\\\"b\"");

    let decimal = NormalizeFlags::default() - NormalizeFlags::KEEP_ORIGINAL_FORMAT;
    assert_eq!(normalized_with(decimal, "0xFF"), "255");

    let hex = NormalizeFlags::default() | NormalizeFlags::FORCE_HEXADECIMAL;
    assert_eq!(normalized_with(hex, "255"), "0xFF");
}

#[test]
fn identifier_spelling() {
    // canonical replacement of abbreviated and re-cased names
    assert_eq!(normalized("tolow(\"A\")"), "ToLower(\"A\")");
    assert_eq!(normalized("TRUE"), "true");

    let upper = NormalizeFlags::default() | NormalizeFlags::IDENTIFIERS_TO_UPPER_CASE;
    assert_eq!(normalized_with(upper, "true"), "TRUE");

    let parsed = NormalizeFlags::default() - NormalizeFlags::REPLACE_FUNCTION_NAMES;
    assert_eq!(normalized_with(parsed, "tolow(\"A\")"), "tolow(\"A\")");
}

#[test]
fn subscript_normalization() {
    assert_eq!(normalized("\"abc\"[ 1 ]"), "\"abc\"[1]");
    let spaced = NormalizeFlags::default()
        | NormalizeFlags::SUBSCRIPT_SPACE_BEFORE_BRACKETS
        | NormalizeFlags::SUBSCRIPT_INNER_BRACKET_SPACE;
    assert_eq!(normalized_with(spaced, "\"abc\"[1]"), "\"abc\" [ 1 ]");
}

#[test]
fn normalized_strings_recompile_to_equivalent_programs() {
    let compiler = compiler();
    let mut scope = Scope::new();
    for expression in [
        "2*3+4",
        "true && false == true < false",
        "1 Sm 2 Or 3 Gt 4",
        "--5",
        "\"a\"+1",
        "1<2?ToUpper(\"x\"):\"y\"",
        "0xFF % 0b111",
        "Days(3) > Hours(71)",
    ] {
        let original = compiler.compile(expression).unwrap();
        let renormalized = compiler.compile(original.normalized_string()).unwrap();
        // normalization is idempotent
        assert_eq!(original.normalized_string(), renormalized.normalized_string(), "{expression}");
        // and behavior-preserving
        let a = original.evaluate(&mut scope).unwrap();
        let b = renormalized.evaluate(&mut scope).unwrap();
        assert_eq!(a, b, "{expression}");
    }
}
