//! The Elvis operator `A ?: B` for operand pairs of one type.
//!
//! Works on any type, including host-registered ones: when the left operand
//! is truthy it is the result, otherwise the right operand is. A constant
//! left operand decides at compile time.

use crate::{
    error::ExprResult,
    plugin::{BinaryConstFold, CiBinary, CompilerPlugin},
    scope::Scope,
};

use super::cb;

/// Compiler plug-in for the Elvis operator.
pub struct Elvis;

impl CompilerPlugin for Elvis {
    fn name(&self) -> &str {
        "Elvis"
    }

    fn try_compile_binary(&self, _scope: &mut Scope, ci: &mut CiBinary<'_>) -> ExprResult<bool> {
        if ci.op != "?:" || ci.lhs_type != ci.rhs_type {
            return Ok(false);
        }

        match (ci.const_lhs, ci.const_rhs) {
            (Some(lhs), Some(rhs)) => {
                let chosen = if lhs.is_truthy() { lhs } else { rhs };
                ci.out.set_constant(chosen.clone(), "?:");
            }
            (Some(lhs), None) => {
                // a truthy constant wins outright, a falsy one disappears
                ci.const_fold = Some(if lhs.is_truthy() {
                    BinaryConstFold::Constant(lhs.clone())
                } else {
                    BinaryConstFold::DiscardConstOperand
                });
            }
            _ => {
                let callback = cb!(|_, args| {
                    Ok(if args[0].is_truthy() {
                        args[0].clone()
                    } else {
                        args[1].clone()
                    })
                });
                ci.out.set_callback(callback, "?:", ci.lhs_type);
            }
        }
        Ok(true)
    }
}
