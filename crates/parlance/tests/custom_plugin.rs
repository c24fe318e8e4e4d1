//! Extending the engine from host code: a custom value type, a plug-in
//! contributing identifiers and operators for it, and host state carried
//! through the scope.

use std::{any::Any, sync::Arc};

use parlance::{
    BinaryConstFold, CiBinary, CiFunction, Compiler, CompilerPlugin, ExprResult, HostValue, Scope, TypeInfo,
    TypeTag, Value, priority, types,
};
use pretty_assertions::assert_eq;

/// The host's permission mask type.
static PERMISSION_INFO: TypeInfo = TypeInfo::new("Permission");

fn permission_tag() -> TypeTag {
    TypeTag::of(&PERMISSION_INFO)
}

#[derive(Debug, PartialEq)]
struct Permission(u32);

impl HostValue for Permission {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn permission_value(bits: u32) -> Value {
    Value::host(permission_tag(), Arc::new(Permission(bits)))
}

fn permission_bits(value: &Value) -> u32 {
    value.downcast_host::<Permission>().expect("permission value").0
}

/// Host state the `CurrentPermissions` identifier reads.
struct FileContext {
    permissions: u32,
}

struct PermissionPlugin;

impl CompilerPlugin for PermissionPlugin {
    fn name(&self) -> &str {
        "Permissions"
    }

    fn try_compile_function(&self, _scope: &mut Scope, ci: &mut CiFunction<'_>) -> ExprResult<bool> {
        if !ci.is_identifier {
            return Ok(false);
        }
        match ci.name {
            // reads the evaluation scope's host context
            "CurrentPermissions" => {
                ci.out.set_callback(
                    |scope, _args| {
                        let bits = scope.context::<FileContext>().map_or(0, |ctx| ctx.permissions);
                        Ok(Value::host(permission_tag(), Arc::new(Permission(bits))))
                    },
                    "CurrentPermissions",
                    permission_tag(),
                );
                Ok(true)
            }
            "OwnerRead" => {
                ci.out.set_constant(permission_value(0o400), "OwnerRead");
                Ok(true)
            }
            "OwnerWrite" => {
                ci.out.set_constant(permission_value(0o200), "OwnerWrite");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn try_compile_binary(&self, _scope: &mut Scope, ci: &mut CiBinary<'_>) -> ExprResult<bool> {
        if ci.lhs_type != permission_tag() || ci.rhs_type != permission_tag() {
            return Ok(false);
        }
        match ci.op {
            "&" => {
                if let (Some(lhs), Some(rhs)) = (ci.const_lhs, ci.const_rhs) {
                    ci.out.set_constant(
                        permission_value(permission_bits(lhs) & permission_bits(rhs)),
                        "&",
                    );
                } else {
                    ci.out.set_callback(
                        |_, args| Ok(permission_value(permission_bits(&args[0]) & permission_bits(&args[1]))),
                        "&",
                        permission_tag(),
                    );
                }
                Ok(true)
            }
            "|" if ci.const_lhs.is_some_and(|v| permission_bits(v) == 0) => {
                // a zero mask on the left is the identity
                ci.const_fold = Some(BinaryConstFold::DiscardConstOperand);
                Ok(true)
            }
            "==" => {
                ci.out.set_callback(
                    |_, args| Ok(Value::from(permission_bits(&args[0]) == permission_bits(&args[1]))),
                    "==",
                    types::BOOLEAN,
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn compiler() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.setup_defaults();
    compiler.insert_plugin(Box::new(PermissionPlugin), priority::CUSTOM);
    compiler
}

#[test]
fn host_type_round_trips_through_the_engine() {
    let compiled = compiler().compile("(CurrentPermissions & OwnerRead) == OwnerRead").unwrap();
    assert_eq!(compiled.result_type(), types::BOOLEAN);

    let mut readable = Scope::with_context(FileContext { permissions: 0o644 });
    assert_eq!(compiled.evaluate(&mut readable).unwrap().as_bool(), Some(true));

    let mut locked = Scope::with_context(FileContext { permissions: 0o000 });
    assert_eq!(compiled.evaluate(&mut locked).unwrap().as_bool(), Some(false));
}

#[test]
fn constant_host_values_fold() {
    let compiled = compiler().compile("OwnerRead & OwnerWrite").unwrap();
    assert!(compiled.program().is_single_constant());
    let value = compiled.evaluate(&mut Scope::new()).unwrap();
    assert_eq!(permission_bits(&value), 0);
}

#[test]
fn custom_partial_constant_elimination() {
    let compiled = compiler()
        .compile("(OwnerRead & OwnerWrite) | CurrentPermissions")
        .unwrap();
    // the folded zero mask on the left of `|` disappears
    assert_eq!(compiled.program().op_count(), 1);
    assert_eq!(compiled.program().callback_count(), 1);
}

#[test]
fn custom_plugins_outrank_builtins() {
    // `&` over permissions hits the custom plug-in, over integers the
    // built-in arithmetics
    let compiler = compiler();
    let custom = compiler.compile("OwnerRead & OwnerRead").unwrap();
    assert_eq!(custom.result_type(), permission_tag());
    let builtin = compiler.compile("6 & 3").unwrap();
    assert_eq!(builtin.result_type(), types::INTEGER);
}
