//! Mathematical constants and functions over `f64`.

use crate::{config::FunctionName, value::{Value, types}};

use super::{Calculus, cb};

/// Builds the math plug-in.
#[must_use]
pub fn math() -> Calculus {
    let int_t = types::INTEGER;
    let float_t = types::FLOAT;
    let mut c = Calculus::new("Math");

    c.identifier(FunctionName::exact("PI"), float_t, true, cb!(|_, _args| Ok(Value::from(std::f64::consts::PI))));
    c.identifier(FunctionName::exact("E"), float_t, true, cb!(|_, _args| Ok(Value::from(std::f64::consts::E))));

    c.function(FunctionName::exact("abs"), vec![int_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_int().wrapping_abs()))
    }));
    c.function(FunctionName::exact("abs"), vec![float_t], float_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_float().abs()))
    }));

    // f64 -> f64 function family
    for name in [
        "ceil", "floor", "trunc", "round", "sin", "asin", "cos", "acos", "tan", "atan", "sinh", "asinh", "cosh",
        "acosh", "tanh", "atanh", "exp", "exp2", "log", "log2", "log10", "sqrt", "cbrt",
    ] {
        c.function(
            FunctionName::exact(name),
            vec![float_t],
            float_t,
            true,
            dispatch_unary(name),
        );
    }

    c.function(FunctionName::exact("pow"), vec![float_t, float_t], float_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_float().powf(args[1].unbox_float())))
    }));
    c.function(FunctionName::new("remainder", 3, true), vec![float_t, float_t], float_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_float() % args[1].unbox_float()))
    }));

    c.function(FunctionName::exact("max"), vec![int_t, int_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_int().max(args[1].unbox_int())))
    }));
    c.function(FunctionName::exact("min"), vec![int_t, int_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_int().min(args[1].unbox_int())))
    }));
    c.function(FunctionName::exact("max"), vec![float_t, float_t], float_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_float().max(args[1].unbox_float())))
    }));
    c.function(FunctionName::exact("min"), vec![float_t, float_t], float_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_float().min(args[1].unbox_float())))
    }));

    // not compile-time invokable: every evaluation draws anew
    c.function(FunctionName::new("random", 4, true), Vec::new(), float_t, false, cb!(|_, _args| {
        Ok(Value::from(rand::random::<f64>()))
    }));

    c
}

/// Looks the function body up by name; keeps the table entries above free of
/// one closure per line while still compiling to plain `fn` pointers.
fn dispatch_unary(name: &'static str) -> crate::plugin::Callback {
    match name {
        "ceil" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().ceil()))),
        "floor" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().floor()))),
        "trunc" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().trunc()))),
        "round" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().round()))),
        "sin" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().sin()))),
        "asin" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().asin()))),
        "cos" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().cos()))),
        "acos" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().acos()))),
        "tan" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().tan()))),
        "atan" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().atan()))),
        "sinh" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().sinh()))),
        "asinh" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().asinh()))),
        "cosh" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().cosh()))),
        "acosh" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().acosh()))),
        "tanh" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().tanh()))),
        "atanh" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().atanh()))),
        "exp" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().exp()))),
        "exp2" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().exp2()))),
        "log" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().ln()))),
        "log2" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().log2()))),
        "log10" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().log10()))),
        "sqrt" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().sqrt()))),
        "cbrt" => cb!(|_, args| Ok(Value::from(args[0].unbox_float().cbrt()))),
        _ => unreachable!("unknown math function"),
    }
}
