//! Table-driven compiler plug-in base.
//!
//! Most built-in plug-ins are pure tables: identifier and function entries
//! (with abbreviation descriptors), unary and binary operator entries keyed
//! by operand types, operator aliases and partial-constant-fold rules.
//! `Calculus` owns those tables and implements the whole plug-in protocol
//! over them, including compile-time invocation of constant-argument
//! callbacks.

use ahash::AHashMap;

use crate::{
    config::FunctionName,
    error::ExprResult,
    plugin::{BinaryConstFold, Callback, CiBinary, CiFunction, CiUnary, CompilerPlugin, FunctionHint},
    scope::Scope,
    value::{TypeTag, Value},
};

/// Partial-constant elimination rule of a binary operator entry: given the
/// constant operand (and which side it is), decide what survives.
pub type FoldRule = fn(constant: &Value, constant_is_lhs: bool) -> Option<BinaryConstFold>;

struct FunctionEntry {
    name: FunctionName,
    /// `None` marks an identifier (no parentheses); `Some` lists the
    /// expected argument types.
    signature: Option<Vec<TypeTag>>,
    result_type: TypeTag,
    /// Whether the callback may run at compile time over constant arguments.
    ct_invokable: bool,
    callback: Callback,
}

struct OpEntry {
    result_type: TypeTag,
    ct_invokable: bool,
    callback: Callback,
    fold: Option<FoldRule>,
}

/// A compiler plug-in defined by lookup tables.
pub struct Calculus {
    name: &'static str,
    functions: Vec<FunctionEntry>,
    unary_ops: AHashMap<(String, TypeTag), OpEntry>,
    binary_ops: AHashMap<(String, TypeTag, TypeTag), OpEntry>,
    unary_aliases: AHashMap<(String, TypeTag), String>,
    binary_aliases: AHashMap<(String, TypeTag, TypeTag), String>,
}

impl Calculus {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            functions: Vec::new(),
            unary_ops: AHashMap::new(),
            binary_ops: AHashMap::new(),
            unary_aliases: AHashMap::new(),
            binary_aliases: AHashMap::new(),
        }
    }

    /// Adds a parameterless identifier.
    pub fn identifier(&mut self, name: FunctionName, result_type: TypeTag, ct_invokable: bool, callback: Callback) {
        self.functions.push(FunctionEntry {
            name,
            signature: None,
            result_type,
            ct_invokable,
            callback,
        });
    }

    /// Adds a function with a fixed signature.
    pub fn function(
        &mut self,
        name: FunctionName,
        signature: Vec<TypeTag>,
        result_type: TypeTag,
        ct_invokable: bool,
        callback: Callback,
    ) {
        self.functions.push(FunctionEntry {
            name,
            signature: Some(signature),
            result_type,
            ct_invokable,
            callback,
        });
    }

    /// Adds a unary operator over one operand type.
    pub fn unary(&mut self, op: &str, operand: TypeTag, result_type: TypeTag, ct_invokable: bool, callback: Callback) {
        self.unary_ops.insert(
            (op.to_owned(), operand),
            OpEntry {
                result_type,
                ct_invokable,
                callback,
                fold: None,
            },
        );
    }

    /// Adds a binary operator over an operand type pair.
    pub fn binary(
        &mut self,
        op: &str,
        lhs: TypeTag,
        rhs: TypeTag,
        result_type: TypeTag,
        ct_invokable: bool,
        callback: Callback,
    ) {
        self.binary_ops.insert(
            (op.to_owned(), lhs, rhs),
            OpEntry {
                result_type,
                ct_invokable,
                callback,
                fold: None,
            },
        );
    }

    /// Adds a binary operator with a partial-constant elimination rule.
    pub fn binary_with_fold(
        &mut self,
        op: &str,
        lhs: TypeTag,
        rhs: TypeTag,
        result_type: TypeTag,
        ct_invokable: bool,
        callback: Callback,
        fold: FoldRule,
    ) {
        self.binary_ops.insert(
            (op.to_owned(), lhs, rhs),
            OpEntry {
                result_type,
                ct_invokable,
                callback,
                fold: Some(fold),
            },
        );
    }

    /// Declares `op` over `operand` an alias compiling as `target`.
    pub fn unary_alias(&mut self, op: &str, operand: TypeTag, target: &str) {
        self.unary_aliases.insert((op.to_owned(), operand), target.to_owned());
    }

    /// Declares `op` over the operand pair an alias compiling as `target`.
    pub fn binary_alias(&mut self, op: &str, lhs: TypeTag, rhs: TypeTag, target: &str) {
        self.binary_aliases
            .insert((op.to_owned(), lhs, rhs), target.to_owned());
    }

    fn signature_text(signature: &[TypeTag]) -> String {
        let names: Vec<&str> = signature.iter().map(|t| t.name()).collect();
        names.join(", ")
    }
}

impl CompilerPlugin for Calculus {
    fn name(&self) -> &str {
        self.name
    }

    fn try_compile_function(&self, scope: &mut Scope, ci: &mut CiFunction<'_>) -> ExprResult<bool> {
        for entry in &self.functions {
            if !entry.name.matches(ci.name) {
                continue;
            }
            match &entry.signature {
                None => {
                    if !ci.is_identifier {
                        ci.hints.push(FunctionHint::UnexpectedParentheses {
                            name: entry.name.name.clone(),
                        });
                        continue;
                    }
                    if entry.ct_invokable {
                        let constant = (entry.callback)(scope, &[])?;
                        ci.out.set_constant(constant, entry.name.name.clone());
                    } else {
                        ci.out
                            .set_callback(entry.callback, entry.name.name.clone(), entry.result_type);
                    }
                    return Ok(true);
                }
                Some(signature) => {
                    if ci.is_identifier {
                        ci.hints.push(FunctionHint::MissingParentheses {
                            name: entry.name.name.clone(),
                        });
                        continue;
                    }
                    if signature.as_slice() != ci.arg_types {
                        ci.hints.push(FunctionHint::ArgumentMismatch {
                            name: entry.name.name.clone(),
                            signature: Self::signature_text(signature),
                        });
                        continue;
                    }
                    let all_const = !ci.const_args.is_empty() && ci.const_args.iter().all(Option::is_some);
                    if entry.ct_invokable && all_const {
                        let args: Vec<Value> = ci.const_args.iter().flatten().cloned().collect();
                        // a failing fold (e.g. division by zero) defers to
                        // evaluation time instead of failing the compilation
                        match (entry.callback)(scope, &args) {
                            Ok(constant) => ci.out.set_constant(constant, entry.name.name.clone()),
                            Err(_) => ci
                                .out
                                .set_callback(entry.callback, entry.name.name.clone(), entry.result_type),
                        }
                    } else {
                        ci.out
                            .set_callback(entry.callback, entry.name.name.clone(), entry.result_type);
                    }
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn try_compile_unary(&self, scope: &mut Scope, ci: &mut CiUnary<'_>) -> ExprResult<bool> {
        let mut op = ci.op.to_owned();
        if let Some(target) = self.unary_aliases.get(&(op.clone(), ci.operand_type)) {
            op = target.clone();
            ci.rewritten_op = Some(target.clone());
        }

        let Some(entry) = self.unary_ops.get(&(op.clone(), ci.operand_type)) else {
            return Ok(false);
        };

        if entry.ct_invokable && let Some(operand) = ci.const_operand {
            match (entry.callback)(scope, &[operand.clone()]) {
                Ok(constant) => ci.out.set_constant(constant, op),
                Err(_) => ci.out.set_callback(entry.callback, op, entry.result_type),
            }
        } else {
            ci.out.set_callback(entry.callback, op, entry.result_type);
        }
        Ok(true)
    }

    fn try_compile_binary(&self, scope: &mut Scope, ci: &mut CiBinary<'_>) -> ExprResult<bool> {
        let mut op = ci.op.to_owned();
        if let Some(target) = self.binary_aliases.get(&(op.clone(), ci.lhs_type, ci.rhs_type)) {
            op = target.clone();
            ci.rewritten_op = Some(target.clone());
        }

        let Some(entry) = self.binary_ops.get(&(op.clone(), ci.lhs_type, ci.rhs_type)) else {
            return Ok(false);
        };

        match (ci.const_lhs, ci.const_rhs) {
            (Some(lhs), Some(rhs)) if entry.ct_invokable => {
                // a failing fold (e.g. division by zero) defers to runtime
                match (entry.callback)(scope, &[lhs.clone(), rhs.clone()]) {
                    Ok(constant) => ci.out.set_constant(constant, op),
                    Err(_) => ci.out.set_callback(entry.callback, op, entry.result_type),
                }
            }
            (Some(constant), None) | (None, Some(constant)) if entry.fold.is_some() => {
                let constant_is_lhs = ci.const_lhs.is_some();
                let rule = entry.fold.expect("fold rule checked above");
                match rule(constant, constant_is_lhs) {
                    Some(fold) => ci.const_fold = Some(fold),
                    None => ci.out.set_callback(entry.callback, op, entry.result_type),
                }
            }
            _ => ci.out.set_callback(entry.callback, op, entry.result_type),
        }
        Ok(true)
    }
}
