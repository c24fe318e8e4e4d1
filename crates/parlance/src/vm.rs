//! The virtual machine: executes a program against a scope, and decompiles
//! an optimized program back into an AST.
//!
//! Execution is a single dispatch loop over the five opcode kinds. Jumps are
//! forward relative deltas; argument windows are sliced off the scope's
//! value stack; a nested expression's program runs on the same scope with
//! the nested expression's compile-time store swapped in.

use smallvec::SmallVec;

use crate::{
    ast::{Ast, Conditional, Function, Identifier, Literal},
    config::{CompileFlags, CompilerConfig},
    error::{ErrorKind, ExprError, ExprResult},
    expression::Expression,
    fmt::NumberFormatHint,
    program::{InvokeForm, NestedTarget, OpKind, Program},
    scope::Scope,
    value::Value,
};

/// Executes `program`, leaving its result on top of the scope's stack.
///
/// `expression_name` feeds error context entries.
pub(crate) fn execute(
    program: &Program,
    scope: &mut Scope,
    cfg: &CompilerConfig,
    expression_name: &str,
) -> ExprResult<()> {
    let mut pc = 0;
    while pc < program.ops.len() {
        let op = &program.ops[pc];
        match &op.kind {
            OpKind::Constant(value) => {
                scope.stack.push(value.clone());
                pc += 1;
            }

            OpKind::Invoke {
                callback, name, arity, ..
            } => {
                let window_start = scope.stack.len() - arity;
                let args: SmallVec<[Value; 4]> = scope.stack.drain(window_start..).collect();
                let result = (callback)(scope, &args).map_err(|err| {
                    if cfg
                        .compile_flags
                        .contains(CompileFlags::CALLBACK_EXCEPTION_FALL_THROUGH)
                    {
                        if err.position().is_none() { err.at(op.position) } else { err }
                    } else {
                        err.wrap(
                            ErrorKind::ExceptionInCallback,
                            format!(
                                "Exception caught in callback function {name:?} while evaluating expression {expression_name:?}."
                            ),
                        )
                        .at(op.position)
                    }
                })?;
                scope.stack.push(result);
                pc += 1;
            }

            OpKind::JumpIfFalse { delta } => {
                let condition = scope.stack.pop().expect("jump condition missing from stack");
                pc += if condition.is_truthy() { 1 } else { *delta };
            }

            OpKind::Jump { delta } => {
                pc += delta;
            }

            OpKind::Nested(NestedTarget::Resolved(target)) => {
                run_nested(target, scope)?;
                pc += 1;
            }

            OpKind::Nested(NestedTarget::Late {
                result_type,
                throw_on_miss,
                registry,
            }) => {
                let replacement = scope.stack.pop().expect("replacement value missing from stack");
                let name_value = scope.stack.pop().expect("expression name missing from stack");
                let name = name_value.unbox_str();

                let resolved = match registry.upgrade() {
                    Some(core) => match crate::compiler::CompilerCore::get_named(&core, name) {
                        Ok(target) => Some(target),
                        Err(err) if err.kind() == ErrorKind::NamedExpressionNotFound => None,
                        Err(err) => return Err(err.with_nested_info(name)),
                    },
                    None => None,
                };

                match resolved {
                    Some(target) => {
                        if target.result_type() != *result_type {
                            return Err(ExprError::new(
                                ErrorKind::NestedExpressionResultTypeError,
                                format!(
                                    "Nested expression {name:?} returned wrong result type.\nType expected: {}\nType returned: {}",
                                    result_type.name(),
                                    target.result_type().name()
                                ),
                            )
                            .at(op.position));
                        }
                        run_nested(&target, scope)?;
                    }
                    None if *throw_on_miss => {
                        return Err(ExprError::new(
                            ErrorKind::NestedExpressionNotFoundET,
                            format!("Evaluation-time defined nested expression {name:?} not found."),
                        )
                        .at(op.position));
                    }
                    None => scope.stack.push(replacement),
                }
                pc += 1;
            }
        }
    }
    Ok(())
}

/// Runs a nested expression's program on the same scope, guarding against
/// circular invocation and swapping in the nested compile-time store.
fn run_nested(target: &Expression, scope: &mut Scope) -> ExprResult<()> {
    let name = target.name().to_owned();

    if scope.active_nested.contains(&name) {
        let mut err = ExprError::new(
            ErrorKind::CircularNestedExpressions,
            "Circular nested expressions detected. Circular evaluation stack follows.",
        );
        let mut chain: Vec<&str> = scope.active_nested.iter().map(String::as_str).collect();
        chain.push(&name);
        for pair in chain.windows(2) {
            err = err.with_circular_link(pair[0], pair[1]);
        }
        return Err(err);
    }

    scope.active_nested.push(name.clone());
    let outer_store = scope.swap_store(target.store().clone());
    let result = execute(target.program(), scope, target.cfg(), target.name()).map_err(|err| {
        err.wrap(
            ErrorKind::WhenEvaluatingNestedExpression,
            format!("Exception evaluating nested expression {name:?}."),
        )
    });
    scope.restore_store(outer_store);
    scope.active_nested.pop();
    result
}

/// A conditional under reconstruction during decompilation.
struct PendingConditional {
    q: Ast,
    t: Option<Ast>,
    /// Program counter where the false branch starts.
    f_start: usize,
    /// Program counter one past the false branch, once the `Jump` is seen.
    end: Option<usize>,
}

/// Rebuilds an AST from an optimized program.
///
/// The walk mirrors execution: constants and invocations maintain a node
/// stack, jump pairs reassemble conditionals, subroutine opcodes turn back
/// into nested-expression terms. Constants of host types render through
/// their type's literal writer when the result is normalized.
pub(crate) fn decompile(program: &Program, cfg: &CompilerConfig) -> Ast {
    let mut stack: Vec<Ast> = Vec::new();
    let mut pendings: Vec<PendingConditional> = Vec::new();

    for (pc, op) in program.ops.iter().enumerate() {
        // close conditionals whose false branch ends here
        while pendings.last().is_some_and(|p| p.end == Some(pc)) {
            let pending = pendings.pop().expect("pending conditional disappeared");
            let f = stack.pop().expect("false branch missing during decompilation");
            stack.push(Ast::Conditional(Conditional {
                q: Box::new(pending.q),
                t: Box::new(pending.t.expect("true branch missing during decompilation")),
                f: Box::new(f),
                question_position: 0,
                colon_position: 0,
            }));
        }

        match &op.kind {
            OpKind::Constant(value) => {
                stack.push(Ast::Literal(Literal {
                    value: value.clone(),
                    position: op.position,
                    hint: NumberFormatHint::None,
                }));
            }

            OpKind::Invoke {
                name,
                form,
                arity,
                decompile_name,
                ..
            } => {
                let window_start = stack.len() - arity;
                let args: Vec<Ast> = stack.drain(window_start..).collect();
                let node = match (decompile_name, form) {
                    (Some(cast_name), _) => Ast::Function(Function {
                        name: cast_name.clone(),
                        parsed_name: cast_name.clone(),
                        args,
                        position: op.position,
                    }),
                    (None, InvokeForm::Identifier) => Ast::Identifier(Identifier {
                        name: name.clone(),
                        parsed_name: name.clone(),
                        position: op.position,
                    }),
                    (None, InvokeForm::Unary) => {
                        let mut args = args;
                        Ast::unary(name.clone(), args.pop().expect("unary operand missing"), op.position)
                    }
                    (None, InvokeForm::Binary) => {
                        let mut args = args;
                        let rhs = args.pop().expect("binary rhs missing");
                        let lhs = args.pop().expect("binary lhs missing");
                        Ast::binary(name.clone(), lhs, rhs, op.position)
                    }
                    (None, InvokeForm::Function) => Ast::Function(Function {
                        name: name.clone(),
                        parsed_name: name.clone(),
                        args,
                        position: op.position,
                    }),
                };
                stack.push(node);
            }

            OpKind::JumpIfFalse { delta } => {
                let q = stack.pop().expect("condition missing during decompilation");
                pendings.push(PendingConditional {
                    q,
                    t: None,
                    f_start: pc + delta,
                    end: None,
                });
            }

            OpKind::Jump { delta } => {
                let pending = pendings
                    .iter_mut()
                    .rev()
                    .find(|p| p.f_start == pc + 1 && p.end.is_none())
                    .expect("jump without matching conditional");
                pending.t = Some(stack.pop().expect("true branch missing during decompilation"));
                pending.end = Some(pc + delta);
            }

            OpKind::Nested(NestedTarget::Resolved(target)) => {
                stack.push(nested_reference_ast(target.name(), cfg, op.position));
            }

            OpKind::Nested(NestedTarget::Late { throw_on_miss, .. }) => {
                let replacement = stack.pop().expect("replacement missing during decompilation");
                let mut name = stack.pop().expect("expression name missing during decompilation");
                // render a constant name unquoted where the identifier form
                // would parse back
                if let Ast::Literal(literal) = &name
                    && let Some(text) = literal.value.as_str()
                    && is_identifier_like(text, cfg)
                {
                    name = Ast::Identifier(Identifier {
                        name: text.to_owned(),
                        parsed_name: text.to_owned(),
                        position: literal.position,
                    });
                }
                let mut args = vec![name, replacement];
                if *throw_on_miss {
                    args.push(Ast::Identifier(Identifier {
                        name: cfg.nested_throw_keyword.clone(),
                        parsed_name: cfg.nested_throw_keyword.clone(),
                        position: op.position,
                    }));
                }
                stack.push(Ast::Function(Function {
                    name: cfg.nested_function.name.clone(),
                    parsed_name: cfg.nested_function.name.clone(),
                    args,
                    position: op.position,
                }));
            }
        }
    }

    // close conditionals ending at the program's end
    while let Some(pending) = pendings.pop() {
        let f = stack.pop().expect("false branch missing during decompilation");
        stack.push(Ast::Conditional(Conditional {
            q: Box::new(pending.q),
            t: Box::new(pending.t.expect("true branch missing during decompilation")),
            f: Box::new(f),
            question_position: 0,
            colon_position: 0,
        }));
    }

    debug_assert_eq!(stack.len(), 1, "decompilation must produce a single root");
    stack.pop().expect("decompilation produced no root")
}

/// Whether a nested expression name may be written without quotes.
fn is_identifier_like(name: &str, cfg: &CompilerConfig) -> bool {
    !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && cfg
            .compile_flags
            .contains(CompileFlags::ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS)
}

/// Builds the AST term referring to a nested expression: the operator form
/// with an unquoted identifier where allowed, the function form otherwise.
fn nested_reference_ast(name: &str, cfg: &CompilerConfig, position: usize) -> Ast {
    let name_ast = if is_identifier_like(name, cfg) {
        Ast::Identifier(Identifier {
            name: name.to_owned(),
            parsed_name: name.to_owned(),
            position,
        })
    } else {
        Ast::Literal(Literal {
            value: Value::string(name),
            position,
            hint: NumberFormatHint::None,
        })
    };

    if cfg.nested_operator.is_empty() {
        Ast::Function(Function {
            name: cfg.nested_function.name.clone(),
            parsed_name: cfg.nested_function.name.clone(),
            args: vec![name_ast],
            position,
        })
    } else {
        Ast::unary(cfg.nested_operator.clone(), name_ast, position)
    }
}
