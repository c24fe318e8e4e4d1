//! The compiler plug-in protocol.
//!
//! Plug-ins answer the compiler's type-directed questions: compile this
//! identifier/function, this unary or binary operator, or propose an
//! auto-cast for an operand pair. Hooks communicate through compilation-info
//! records with an in-place output area and return `Ok(true)` on success,
//! `Ok(false)` for "not mine"; errors are reserved for genuinely broken
//! compilations.

use crate::{
    error::ExprResult,
    scope::Scope,
    value::{TypeTag, Value},
};

/// A native function compiled into a program.
///
/// Receives the scope and the argument window (left-to-right source order);
/// returns the result value. Argument types were verified by the compiler
/// against what the providing plug-in declared.
pub type Callback = fn(&mut Scope, &[Value]) -> ExprResult<Value>;

/// Registration priorities of compiler plug-ins; higher values are asked
/// first. Custom plug-ins default to [`priority::CUSTOM`], above the
/// built-ins so they can override them.
pub mod priority {
    pub const AUTO_CAST: i32 = 100;
    pub const ELVIS: i32 = 200;
    pub const ARITHMETICS: i32 = 300;
    pub const MATH: i32 = 400;
    pub const DATE_AND_TIME: i32 = 500;
    pub const STRINGS: i32 = 600;
    pub const CUSTOM: i32 = 1000;
}

/// The output area of a compilation-info record. The first plug-in that
/// fills it wins.
#[derive(Debug, Default)]
pub struct CompilationOutput {
    /// The callback to invoke at evaluation time.
    pub callback: Option<Callback>,
    /// Display name of the callback for program listings; for functions
    /// also the canonical spelling used by normalization.
    pub callback_name: String,
    /// The type the callback leaves on the stack.
    pub result_type: Option<TypeTag>,
    /// A compile-time-computed result. When set, the compiler pops the
    /// argument opcodes and emits a single constant instead of a callback
    /// invocation.
    pub constant: Option<Value>,
}

impl CompilationOutput {
    /// Whether a plug-in has filled this output.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.result_type.is_some() && (self.callback.is_some() || self.constant.is_some())
    }

    /// Fills the output with an evaluation-time callback.
    pub fn set_callback(&mut self, callback: Callback, name: impl Into<String>, result_type: TypeTag) {
        self.callback = Some(callback);
        self.callback_name = name.into();
        self.result_type = Some(result_type);
    }

    /// Fills the output with a compile-time constant result.
    pub fn set_constant(&mut self, value: Value, name: impl Into<String>) {
        self.callback_name = name.into();
        self.result_type = Some(value.tag());
        self.constant = Some(value);
    }
}

/// A near-miss note a plug-in may leave when a name matches but the call
/// shape does not. The compiler turns the first hint into the corresponding
/// error when no plug-in compiles the node.
#[derive(Debug, Clone)]
pub enum FunctionHint {
    /// The name exists, but not for these argument types.
    ArgumentMismatch { name: String, signature: String },
    /// The name names a function; the empty parentheses are missing.
    MissingParentheses { name: String },
    /// The name names an identifier; parentheses are not allowed.
    UnexpectedParentheses { name: String },
}

/// Compilation info for an identifier or function call.
#[derive(Debug)]
pub struct CiFunction<'a> {
    /// The name as written (identifiers and function names may be
    /// abbreviated or differently cased than the canonical spelling).
    pub name: &'a str,
    /// True when parsed without parentheses.
    pub is_identifier: bool,
    /// Argument result types, left to right.
    pub arg_types: &'a [TypeTag],
    /// Argument values for arguments whose opcode span is a single constant.
    pub const_args: &'a [Option<Value>],
    pub out: CompilationOutput,
    pub hints: Vec<FunctionHint>,
}

/// Compilation info for a unary operator application.
#[derive(Debug)]
pub struct CiUnary<'a> {
    /// The operator symbol (verbal aliases already resolved).
    pub op: &'a str,
    pub operand_type: TypeTag,
    /// The operand value when its opcode span is a single constant.
    pub const_operand: Option<&'a Value>,
    pub out: CompilationOutput,
    /// A plug-in may rewrite the symbol (operator aliasing); the normalizer
    /// substitutes it under `REPLACE_ALIAS_OPERATORS`.
    pub rewritten_op: Option<String>,
}

/// Directive a plug-in may attach to a binary compilation when exactly one
/// operand is constant (or the pair folds entirely).
#[derive(Debug, Clone)]
pub enum BinaryConstFold {
    /// Drop the constant operand's opcodes; the result is the other operand.
    DiscardConstOperand,
    /// Drop both operand spans; the result is this constant.
    Constant(Value),
}

/// Compilation info for a binary operator application.
#[derive(Debug)]
pub struct CiBinary<'a> {
    /// The operator symbol (verbal aliases already resolved).
    pub op: &'a str,
    pub lhs_type: TypeTag,
    pub rhs_type: TypeTag,
    pub const_lhs: Option<&'a Value>,
    pub const_rhs: Option<&'a Value>,
    pub out: CompilationOutput,
    /// See [`CiUnary::rewritten_op`].
    pub rewritten_op: Option<String>,
    /// Partial-constant elimination request; honored only when the output is
    /// otherwise unfilled.
    pub const_fold: Option<BinaryConstFold>,
}

/// One side of an auto-cast proposal.
#[derive(Debug)]
pub struct CastProposal {
    pub callback: Callback,
    /// Display name for program listings.
    pub callback_name: String,
    /// The type the operand has after the cast.
    pub result_type: TypeTag,
    /// Function name to materialize the cast under when a decompiled program
    /// is normalized into the optimized expression string.
    pub decompile_name: Option<String>,
}

/// Compilation info for an auto-cast attempt: a binary operator without a
/// direct match, or the differing branches of a conditional (`op` is `":"`).
#[derive(Debug)]
pub struct CiAutoCast<'a> {
    pub op: &'a str,
    pub lhs_type: TypeTag,
    pub rhs_type: TypeTag,
    pub lhs_is_const: bool,
    pub rhs_is_const: bool,
    /// Cast to insert over the left operand, if any.
    pub cast_lhs: Option<CastProposal>,
    /// Cast to insert over the right operand, if any.
    pub cast_rhs: Option<CastProposal>,
}

impl CiAutoCast<'_> {
    /// Whether a plug-in proposed at least one cast.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.cast_lhs.is_some() || self.cast_rhs.is_some()
    }
}

/// A compiler plug-in. All hooks are optional; the default implementations
/// answer "not mine".
///
/// Plug-ins must be `Send + Sync`: compilation is single-threaded, but
/// evaluation-time resolution of nested expressions may compile from any
/// thread holding the shared compiler core.
pub trait CompilerPlugin: Send + Sync {
    /// Display name for diagnostics.
    fn name(&self) -> &str;

    /// Compiles an identifier or function call.
    fn try_compile_function(&self, scope: &mut Scope, ci: &mut CiFunction<'_>) -> ExprResult<bool> {
        let _ = (scope, ci);
        Ok(false)
    }

    /// Compiles a unary operator application.
    fn try_compile_unary(&self, scope: &mut Scope, ci: &mut CiUnary<'_>) -> ExprResult<bool> {
        let _ = (scope, ci);
        Ok(false)
    }

    /// Compiles a binary operator application.
    fn try_compile_binary(&self, scope: &mut Scope, ci: &mut CiBinary<'_>) -> ExprResult<bool> {
        let _ = (scope, ci);
        Ok(false)
    }

    /// Proposes casts making an operand pair compilable.
    fn try_compile_auto_cast(&self, scope: &mut Scope, ci: &mut CiAutoCast<'_>) -> ExprResult<bool> {
        let _ = (scope, ci);
        Ok(false)
    }
}
