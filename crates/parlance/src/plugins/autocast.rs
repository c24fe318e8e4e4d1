//! Integer-to-float auto-casting.
//!
//! When no plug-in directly compiles an operator over an Integer/Float pair
//! (or the two branches of a conditional disagree that way), the integer
//! side is cast to Float and compilation retries once. The cast materializes
//! as `Float(…)` when an optimized expression string is generated.

use crate::{
    error::ExprResult,
    plugin::{CastProposal, CiAutoCast, CompilerPlugin},
    scope::Scope,
    value::{Value, types},
};

use super::cb;

/// Compiler plug-in proposing Integer → Float casts.
pub struct AutoCast;

impl CompilerPlugin for AutoCast {
    fn name(&self) -> &str {
        "AutoCast"
    }

    fn try_compile_auto_cast(&self, _scope: &mut Scope, ci: &mut CiAutoCast<'_>) -> ExprResult<bool> {
        let int_to_float = || CastProposal {
            callback: cb!(|_, args| {
                Ok(Value::from(args[0].as_int().map_or_else(|| args[0].unbox_float(), |i| i as f64)))
            }),
            callback_name: "Float".to_owned(),
            result_type: types::FLOAT,
            decompile_name: Some("Float".to_owned()),
        };

        if ci.lhs_type == types::INTEGER && ci.rhs_type == types::FLOAT {
            ci.cast_lhs = Some(int_to_float());
            return Ok(true);
        }
        if ci.lhs_type == types::FLOAT && ci.rhs_type == types::INTEGER {
            ci.cast_rhs = Some(int_to_float());
            return Ok(true);
        }
        Ok(false)
    }
}
