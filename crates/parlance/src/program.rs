//! Compiled programs: a straight-line opcode vector plus debug metadata.
//!
//! Five opcode kinds exist. Jumps are always forward, relative, and land on
//! opcode boundaries. Every opcode records its result type, the source
//! position of the producing AST node, and the start of the opcode span that
//! computed it; the decompiler and the program listing walk spans instead
//! of re-executing callbacks.

use std::{
    fmt::Write,
    sync::{Arc, Weak},
};

use crate::{
    expression::Expression,
    plugin::Callback,
    value::{TypeTag, Value},
};

/// How an invocation was written, for decompilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvokeForm {
    /// A parameterless identifier, written without parentheses.
    Identifier,
    /// `Name(args…)`.
    Function,
    /// Unary operator application.
    Unary,
    /// Binary operator application (the subscript operator has symbol `[]`).
    Binary,
}

/// Target of a `Nested` opcode.
#[derive(Debug, Clone)]
pub(crate) enum NestedTarget {
    /// Resolved at compile time; the handle keeps the target alive even if
    /// it is removed from the named-expression registry.
    Resolved(Arc<Expression>),
    /// Resolved at each evaluation. Pops the replacement value and the
    /// expression name off the stack.
    Late {
        result_type: TypeTag,
        throw_on_miss: bool,
        /// The registry of the originating compiler, consulted at run time.
        registry: Weak<crate::compiler::CompilerCore>,
    },
}

/// One opcode kind.
#[derive(Debug, Clone)]
pub(crate) enum OpKind {
    /// Push the carried constant.
    Constant(Value),
    /// Pop `arity` arguments, invoke the callback, push its result.
    Invoke {
        callback: Callback,
        /// Canonical function name or operator symbol.
        name: String,
        form: InvokeForm,
        arity: usize,
        /// Function name materializing an auto-cast in optimized strings.
        decompile_name: Option<String>,
    },
    /// Pop the top value; when falsy, advance the program counter by `delta`.
    JumpIfFalse { delta: usize },
    /// Advance the program counter by `delta`.
    Jump { delta: usize },
    /// Run a nested expression's program on the same scope.
    Nested(NestedTarget),
}

impl OpKind {
    /// The command name used in program listings.
    fn command(&self) -> &'static str {
        match self {
            Self::Constant(_) => "Constant",
            Self::Invoke { .. } => "Function",
            Self::JumpIfFalse { .. } => "JumpIfFalse",
            Self::Jump { .. } => "Jump",
            Self::Nested(_) => "Subroutine",
        }
    }
}

/// One opcode with its metadata.
#[derive(Debug, Clone)]
pub(crate) struct OpCode {
    pub kind: OpKind,
    /// Type of the stack top after this opcode ran.
    pub result_type: TypeTag,
    /// Source position of the producing AST node.
    pub position: usize,
    /// Index of the first opcode belonging to this opcode's subtree; the
    /// subtree (arguments included) is `span_start..=own index`.
    pub span_start: usize,
}

/// A compiled program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub(crate) ops: Vec<OpCode>,
}

impl Program {
    /// The type of the value the program leaves on the stack.
    ///
    /// # Panics
    /// Panics on an empty program; the compiler never produces one.
    #[must_use]
    pub(crate) fn result_type(&self) -> TypeTag {
        self.ops.last().expect("compiled programs are never empty").result_type
    }

    /// Total number of opcodes.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Number of `Constant` opcodes.
    #[must_use]
    pub fn constant_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op.kind, OpKind::Constant(_)))
            .count()
    }

    /// Number of callback invocations.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op.kind, OpKind::Invoke { .. }))
            .count()
    }

    /// Number of jump opcodes (conditional and unconditional).
    #[must_use]
    pub fn jump_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op.kind, OpKind::Jump { .. } | OpKind::JumpIfFalse { .. }))
            .count()
    }

    /// Whether the whole program is one pushed constant.
    #[must_use]
    pub fn is_single_constant(&self) -> bool {
        self.ops.len() == 1 && matches!(self.ops[0].kind, OpKind::Constant(_))
    }

    /// The constant of a single-constant program.
    #[must_use]
    pub fn single_constant(&self) -> Option<&Value> {
        match self.ops.as_slice() {
            [
                OpCode {
                    kind: OpKind::Constant(value),
                    ..
                },
            ] => Some(value),
            _ => None,
        }
    }

    /// Renders a human-readable listing: program counter, result type,
    /// command, parameter and the opcode span that produced the arguments.
    #[must_use]
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:>3} | {:<10} | {:<11} | {:<24} | Span", "PC", "ResultType", "Command", "Param");
        for (pc, op) in self.ops.iter().enumerate() {
            let param = match &op.kind {
                OpKind::Constant(value) => format!("{value}"),
                OpKind::Invoke { name, arity, .. } => format!("{name}/{arity}"),
                OpKind::JumpIfFalse { delta } | OpKind::Jump { delta } => format!("-> {}", pc + delta),
                OpKind::Nested(NestedTarget::Resolved(expression)) => expression.name().to_owned(),
                OpKind::Nested(NestedTarget::Late { throw_on_miss, .. }) => {
                    format!("<late{}>", if *throw_on_miss { ", throw" } else { "" })
                }
            };
            let _ = writeln!(
                out,
                "{pc:>3} | {:<10} | {:<11} | {param:<24} | {}..={pc}",
                op.result_type.name(),
                op.kind.command(),
                op.span_start,
            );
        }
        out
    }
}
