//! Boolean, integer and float arithmetic.
//!
//! Contributes the `true`/`false`/`yes`/`no`/`on`/`off` identifiers, the
//! `Boolean`/`Integer`/`Float` conversions, the unary operator set and the
//! full binary operator table over the three scalar types. Bitwise `~`, `&`
//! and `|` on boolean operands are aliased to their boolean counterparts so
//! normalization can rewrite `a & b` to `a && b`. Boolean conjunction and
//! disjunction, and the integer identity and annihilator elements, request
//! partial-constant elimination.

use crate::{
    config::FunctionName,
    error::{ErrorKind, ExprError},
    plugin::BinaryConstFold,
    value::{Value, types},
};

use super::{Calculus, cb};

fn divide_by_zero() -> ExprError {
    ExprError::new(ErrorKind::ArithmeticError, "Integer division by zero.")
}

/// Builds the arithmetics plug-in.
#[must_use]
pub fn arithmetics() -> Calculus {
    let bool_t = types::BOOLEAN;
    let int_t = types::INTEGER;
    let float_t = types::FLOAT;
    let mut c = Calculus::new("Arithmetics");

    // boolean constants
    for name in ["true", "yes", "on"] {
        c.identifier(FunctionName::exact(name), bool_t, true, cb!(|_, _args| Ok(Value::from(true))));
    }
    for name in ["false", "no", "off"] {
        c.identifier(FunctionName::exact(name), bool_t, true, cb!(|_, _args| Ok(Value::from(false))));
    }

    // conversions
    for source in [bool_t, int_t, float_t] {
        c.function(
            FunctionName::new("Boolean", 4, true),
            vec![source],
            bool_t,
            true,
            cb!(|_, args| Ok(Value::from(args[0].is_truthy()))),
        );
        c.function(
            FunctionName::new("Integer", 3, true),
            vec![source],
            int_t,
            true,
            cb!(|_, args| Ok(Value::from(to_int(&args[0])))),
        );
        c.function(
            FunctionName::new("Float", 0, true),
            vec![source],
            float_t,
            true,
            cb!(|_, args| Ok(Value::from(to_float(&args[0])))),
        );
    }

    // unary operators
    c.unary("+", int_t, int_t, true, cb!(|_, args| Ok(args[0].clone())));
    c.unary("+", float_t, float_t, true, cb!(|_, args| Ok(args[0].clone())));
    c.unary("-", int_t, int_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int().wrapping_neg()))));
    c.unary("-", float_t, float_t, true, cb!(|_, args| Ok(Value::from(-args[0].unbox_float()))));
    c.unary("!", bool_t, bool_t, true, cb!(|_, args| Ok(Value::from(!args[0].unbox_bool()))));
    c.unary("~", int_t, int_t, true, cb!(|_, args| Ok(Value::from(!args[0].unbox_int()))));
    c.unary_alias("~", bool_t, "!");
    c.unary("!", int_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() == 0))));

    // multiplicative and additive operators, over every scalar permutation
    c.binary_with_fold(
        "*",
        int_t,
        int_t,
        int_t,
        true,
        cb!(|_, args| Ok(Value::from(args[0].unbox_int().wrapping_mul(args[1].unbox_int())))),
        |constant, _| match constant.unbox_int() {
            0 => Some(BinaryConstFold::Constant(Value::from(0i64))),
            1 => Some(BinaryConstFold::DiscardConstOperand),
            _ => None,
        },
    );
    c.binary(
        "/",
        int_t,
        int_t,
        int_t,
        true,
        cb!(|_, args| {
            args[0]
                .unbox_int()
                .checked_div(args[1].unbox_int())
                .map(Value::from)
                .ok_or_else(divide_by_zero)
        }),
    );
    c.binary(
        "%",
        int_t,
        int_t,
        int_t,
        true,
        cb!(|_, args| {
            args[0]
                .unbox_int()
                .checked_rem(args[1].unbox_int())
                .map(Value::from)
                .ok_or_else(divide_by_zero)
        }),
    );
    c.binary_with_fold(
        "+",
        int_t,
        int_t,
        int_t,
        true,
        cb!(|_, args| Ok(Value::from(args[0].unbox_int().wrapping_add(args[1].unbox_int())))),
        |constant, _| (constant.unbox_int() == 0).then_some(BinaryConstFold::DiscardConstOperand),
    );
    c.binary_with_fold(
        "-",
        int_t,
        int_t,
        int_t,
        true,
        cb!(|_, args| Ok(Value::from(args[0].unbox_int().wrapping_sub(args[1].unbox_int())))),
        |constant, constant_is_lhs| {
            (!constant_is_lhs && constant.unbox_int() == 0).then_some(BinaryConstFold::DiscardConstOperand)
        },
    );

    c.binary("*", float_t, float_t, float_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_float() * args[1].unbox_float()))));
    c.binary("/", float_t, float_t, float_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_float() / args[1].unbox_float()))));
    c.binary("%", float_t, float_t, float_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_float() % args[1].unbox_float()))));
    c.binary("+", float_t, float_t, float_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_float() + args[1].unbox_float()))));
    c.binary("-", float_t, float_t, float_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_float() - args[1].unbox_float()))));

    for op in ["*", "/", "%", "+", "-"] {
        c.binary(op, int_t, float_t, float_t, true, mixed_arith(op));
        c.binary(op, float_t, int_t, float_t, true, mixed_arith(op));
    }

    // shifts
    c.binary("<<", int_t, int_t, int_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_int().wrapping_shl(args[1].unbox_int() as u32)))
    }));
    c.binary(">>", int_t, int_t, int_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_int().wrapping_shr(args[1].unbox_int() as u32)))
    }));

    // comparisons
    install_comparisons(&mut c);

    // bitwise operators; boolean operands alias to the boolean operators
    c.binary("&", int_t, int_t, int_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() & args[1].unbox_int()))));
    c.binary("^", int_t, int_t, int_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() ^ args[1].unbox_int()))));
    c.binary("|", int_t, int_t, int_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() | args[1].unbox_int()))));
    c.binary_alias("&", bool_t, bool_t, "&&");
    c.binary_alias("|", bool_t, bool_t, "||");

    // boolean conjunction/disjunction; note that these do not short-circuit
    // (only the conditional operator does) but do fold a constant side
    c.binary_with_fold(
        "&&",
        bool_t,
        bool_t,
        bool_t,
        true,
        cb!(|_, args| Ok(Value::from(args[0].unbox_bool() && args[1].unbox_bool()))),
        |constant, _| {
            Some(if constant.unbox_bool() {
                BinaryConstFold::DiscardConstOperand
            } else {
                BinaryConstFold::Constant(Value::from(false))
            })
        },
    );
    c.binary_with_fold(
        "||",
        bool_t,
        bool_t,
        bool_t,
        true,
        cb!(|_, args| Ok(Value::from(args[0].unbox_bool() || args[1].unbox_bool()))),
        |constant, _| {
            Some(if constant.unbox_bool() {
                BinaryConstFold::Constant(Value::from(true))
            } else {
                BinaryConstFold::DiscardConstOperand
            })
        },
    );

    c
}

/// Mixed integer/float arithmetic promotes to float.
fn mixed_arith(op: &str) -> crate::plugin::Callback {
    match op {
        "*" => cb!(|_, args| Ok(Value::from(to_float(&args[0]) * to_float(&args[1])))),
        "/" => cb!(|_, args| Ok(Value::from(to_float(&args[0]) / to_float(&args[1])))),
        "%" => cb!(|_, args| Ok(Value::from(to_float(&args[0]) % to_float(&args[1])))),
        "+" => cb!(|_, args| Ok(Value::from(to_float(&args[0]) + to_float(&args[1])))),
        "-" => cb!(|_, args| Ok(Value::from(to_float(&args[0]) - to_float(&args[1])))),
        _ => unreachable!("unknown mixed arithmetic operator"),
    }
}

fn install_comparisons(c: &mut Calculus) {
    let bool_t = types::BOOLEAN;
    let int_t = types::INTEGER;
    let float_t = types::FLOAT;

    // boolean comparisons (false < true)
    c.binary("<", bool_t, bool_t, bool_t, true, cb!(|_, args| Ok(Value::from(!args[0].unbox_bool() & args[1].unbox_bool()))));
    c.binary("<=", bool_t, bool_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_bool() <= args[1].unbox_bool()))));
    c.binary(">", bool_t, bool_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_bool() & !args[1].unbox_bool()))));
    c.binary(">=", bool_t, bool_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_bool() >= args[1].unbox_bool()))));
    c.binary("==", bool_t, bool_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_bool() == args[1].unbox_bool()))));
    c.binary("!=", bool_t, bool_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_bool() != args[1].unbox_bool()))));

    c.binary("<", int_t, int_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() < args[1].unbox_int()))));
    c.binary("<=", int_t, int_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() <= args[1].unbox_int()))));
    c.binary(">", int_t, int_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() > args[1].unbox_int()))));
    c.binary(">=", int_t, int_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() >= args[1].unbox_int()))));
    c.binary("==", int_t, int_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() == args[1].unbox_int()))));
    c.binary("!=", int_t, int_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_int() != args[1].unbox_int()))));

    for (lhs, rhs) in [(float_t, float_t), (int_t, float_t), (float_t, int_t)] {
        c.binary("<", lhs, rhs, bool_t, true, cb!(|_, args| Ok(Value::from(to_float(&args[0]) < to_float(&args[1])))));
        c.binary("<=", lhs, rhs, bool_t, true, cb!(|_, args| Ok(Value::from(to_float(&args[0]) <= to_float(&args[1])))));
        c.binary(">", lhs, rhs, bool_t, true, cb!(|_, args| Ok(Value::from(to_float(&args[0]) > to_float(&args[1])))));
        c.binary(">=", lhs, rhs, bool_t, true, cb!(|_, args| Ok(Value::from(to_float(&args[0]) >= to_float(&args[1])))));
        c.binary("==", lhs, rhs, bool_t, true, cb!(|_, args| Ok(Value::from(to_float(&args[0]) == to_float(&args[1])))));
        c.binary("!=", lhs, rhs, bool_t, true, cb!(|_, args| Ok(Value::from(to_float(&args[0]) != to_float(&args[1])))));
    }
}

/// Scalar-to-integer conversion (float truncates toward zero).
fn to_int(value: &Value) -> i64 {
    if let Some(b) = value.as_bool() {
        i64::from(b)
    } else if let Some(i) = value.as_int() {
        i
    } else {
        value.unbox_float() as i64
    }
}

/// Scalar-to-float conversion.
fn to_float(value: &Value) -> f64 {
    if let Some(b) = value.as_bool() {
        f64::from(u8::from(b))
    } else if let Some(i) = value.as_int() {
        i as f64
    } else {
        value.unbox_float()
    }
}
