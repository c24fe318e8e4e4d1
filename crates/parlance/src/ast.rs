//! The abstract syntax tree produced by the parser.
//!
//! Nodes own their children exclusively; a parsed expression is a single
//! rooted tree. The compiler walks the tree bottom-up and, for the benefit
//! of the normalizer, writes resolved operator symbols and canonical
//! identifier spellings back into the nodes while keeping the parsed
//! spellings alongside.

use crate::{fmt::NumberFormatHint, value::Value};

/// A literal constant.
#[derive(Debug, Clone)]
pub(crate) struct Literal {
    pub value: Value,
    pub position: usize,
    /// How the literal was written, for format-preserving normalization.
    pub hint: NumberFormatHint,
}

/// An identifier (a parameterless named term).
#[derive(Debug, Clone)]
pub(crate) struct Identifier {
    /// The resolved name; canonical spelling once compiled.
    pub name: String,
    /// The spelling found in the source.
    pub parsed_name: String,
    pub position: usize,
}

/// A function call.
#[derive(Debug, Clone)]
pub(crate) struct Function {
    /// The resolved name; canonical spelling once compiled.
    pub name: String,
    /// The spelling found in the source.
    pub parsed_name: String,
    pub args: Vec<Ast>,
    pub position: usize,
}

/// A unary operator application.
#[derive(Debug, Clone)]
pub(crate) struct Unary {
    /// The compiled operator symbol (verbal aliases and plug-in rewrites
    /// applied).
    pub op: String,
    /// The operator as parsed: a symbol or a verbal alias spelling.
    pub parsed_op: String,
    pub arg: Box<Ast>,
    pub position: usize,
}

/// A binary operator application. The subscript operator appears here with
/// symbol `[]`.
#[derive(Debug, Clone)]
pub(crate) struct Binary {
    /// The compiled operator symbol (verbal aliases and plug-in rewrites
    /// applied).
    pub op: String,
    /// The operator as parsed: a symbol or a verbal alias spelling.
    pub parsed_op: String,
    pub lhs: Box<Ast>,
    pub rhs: Box<Ast>,
    pub position: usize,
}

/// The conditional operator `q ? t : f`.
#[derive(Debug, Clone)]
pub(crate) struct Conditional {
    pub q: Box<Ast>,
    pub t: Box<Ast>,
    pub f: Box<Ast>,
    pub question_position: usize,
    pub colon_position: usize,
}

/// An AST node.
#[derive(Debug, Clone)]
pub(crate) enum Ast {
    Literal(Literal),
    Identifier(Identifier),
    Function(Function),
    Unary(Unary),
    Binary(Binary),
    Conditional(Conditional),
}

impl Ast {
    /// Creates a binary node whose parsed and compiled symbols still agree.
    pub(crate) fn binary(op: impl Into<String>, lhs: Ast, rhs: Ast, position: usize) -> Self {
        let op = op.into();
        Self::Binary(Binary {
            parsed_op: op.clone(),
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            position,
        })
    }

    /// Creates a unary node whose parsed and compiled symbols still agree.
    pub(crate) fn unary(op: impl Into<String>, arg: Ast, position: usize) -> Self {
        let op = op.into();
        Self::Unary(Unary {
            parsed_op: op.clone(),
            op,
            arg: Box::new(arg),
            position,
        })
    }

    /// The source position of the node.
    pub(crate) fn position(&self) -> usize {
        match self {
            Self::Literal(n) => n.position,
            Self::Identifier(n) => n.position,
            Self::Function(n) => n.position,
            Self::Unary(n) => n.position,
            Self::Binary(n) => n.position,
            Self::Conditional(n) => n.question_position,
        }
    }
}
