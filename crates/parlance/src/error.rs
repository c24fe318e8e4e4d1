//! The single error family of the expression engine.
//!
//! Every failure is an [`ExprError`]: a [`ErrorKind`], a rendered message and
//! a chain of [`ErrorEntry`] context records. The compiler and the VM append
//! an `ExpressionInfo` entry (expression text plus position) as an error
//! crosses their boundary; nested-expression evaluation appends the chain of
//! expression names it passed through.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::TypeTag;

/// Result alias used throughout the crate.
pub type ExprResult<T> = Result<T, ExprError>;

/// Discriminates every error the engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    // --- parse errors ---
    EmptyExpressionString,
    SyntaxError,
    SyntaxErrorExpectation,
    UnknownUnaryOperatorSymbol,
    UnknownBinaryOperatorSymbol,

    // --- compile errors ---
    UnknownIdentifier,
    UnknownFunction,
    FunctionHint,
    UnaryOperatorNotDefined,
    BinaryOperatorNotDefined,
    MissingFunctionParentheses,
    IdentifierWithFunctionParentheses,
    IncompatibleTypesInConditional,
    ExceptionInPlugin,

    // --- nested expressions ---
    NamedExpressionNotConstant,
    NamedExpressionNotFound,
    NestedExpressionNotFoundCT,
    NestedExpressionCallArgumentMismatch,
    NestedExpressionNotFoundET,
    NestedExpressionResultTypeError,
    CircularNestedExpressions,

    // --- evaluation errors ---
    ExceptionInCallback,
    WhenEvaluatingNestedExpression,
    ArithmeticError,
}

/// What the parser expected when a [`ErrorKind::SyntaxErrorExpectation`]
/// error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Expectation {
    ClosingBrace,
    ClosingFunctionBrace,
    ClosingSubscript,
    ClosingQuote,
    Operator,
    ConditionalColon,
    RhsOperand,
    UnexpectedEnd,
    MisplacedClosingBrace,
    MisplacedSubscript,
    MisplacedComma,
}

impl Expectation {
    /// The message suffix rendered after "Syntax error while parsing expression".
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::ClosingBrace => ": Closing brace ')' expected.",
            Self::ClosingFunctionBrace => ": Closing function parameter brace ')' expected.",
            Self::ClosingSubscript => ": Closing subscript brace ']' expected.",
            Self::ClosingQuote => ": String literal closing quote ('\"') expected.",
            Self::Operator => ": Operator expected.",
            Self::ConditionalColon => ": Colon ':' of conditional term expected.",
            Self::RhsOperand => ": Right-hand side binary operand expected.",
            Self::UnexpectedEnd => ": Unexpected end of expression.",
            Self::MisplacedClosingBrace => ": Misplaced closing brace ')'.",
            Self::MisplacedSubscript => ": Misplaced subscript brace.",
            Self::MisplacedComma => ": Misplaced comma ','.",
        }
    }
}

/// One context record attached to an [`ExprError`].
#[derive(Debug, Clone)]
pub enum ErrorEntry {
    /// The expression text and the position the error refers to.
    ExpressionInfo { expression: String, position: usize },
    /// An error crossed the evaluation of this nested expression.
    NestedExpression { name: String },
    /// The original error a wrapping kind (plug-in/callback) was built from.
    Cause { kind: ErrorKind, message: String },
    /// One link of a circular nested-expression chain.
    CircularLink { outer: String, inner: String },
}

/// An error raised while parsing, compiling or evaluating an expression.
#[derive(Debug, Clone)]
pub struct ExprError {
    kind: ErrorKind,
    message: String,
    position: Option<usize>,
    expectation: Option<Expectation>,
    entries: Vec<ErrorEntry>,
}

impl ExprError {
    /// Creates an error with a rendered message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            expectation: None,
            entries: Vec::new(),
        }
    }

    /// Sets the source position the error refers to.
    #[must_use]
    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// Creates a syntax error at a position.
    #[must_use]
    pub(crate) fn syntax(position: usize) -> Self {
        Self::new(ErrorKind::SyntaxError, "Syntax error parsing expression.").at(position)
    }

    /// Creates an expectation error at a position.
    #[must_use]
    pub(crate) fn expectation_error(expectation: Expectation, position: usize) -> Self {
        let mut err = Self::new(
            ErrorKind::SyntaxErrorExpectation,
            format!("Syntax error while parsing expression{}", expectation.message()),
        )
        .at(position);
        err.expectation = Some(expectation);
        err
    }

    /// Creates the standard "operator not defined" compile error for a unary
    /// operator and its operand type.
    #[must_use]
    pub(crate) fn unary_op_not_defined(op: &str, operand: TypeTag, position: usize) -> Self {
        Self::new(
            ErrorKind::UnaryOperatorNotDefined,
            format!("Operator '{op}' not defined for type '{operand}'."),
        )
        .at(position)
    }

    /// Creates the standard "operator not defined" compile error for a binary
    /// operator and its operand types.
    #[must_use]
    pub(crate) fn binary_op_not_defined(op: &str, lhs: TypeTag, rhs: TypeTag, position: usize) -> Self {
        Self::new(
            ErrorKind::BinaryOperatorNotDefined,
            format!("Operator '{op}' not defined for types '{lhs}' and '{rhs}'."),
        )
        .at(position)
    }

    /// The error's kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The rendered message (without context entries).
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source position, if the error refers to one.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// The parser expectation, for [`ErrorKind::SyntaxErrorExpectation`].
    #[must_use]
    pub fn expectation(&self) -> Option<Expectation> {
        self.expectation
    }

    /// The attached context entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    /// Appends an `ExpressionInfo` entry; called when the error crosses the
    /// compiler or VM boundary. The first call also fixes the position if the
    /// error did not carry one.
    #[must_use]
    pub(crate) fn with_expression_info(mut self, expression: &str, position: usize) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self.entries.push(ErrorEntry::ExpressionInfo {
            expression: expression.to_owned(),
            position: self.position.unwrap_or(position),
        });
        self
    }

    /// Appends a nested-expression context entry.
    #[must_use]
    pub(crate) fn with_nested_info(mut self, name: &str) -> Self {
        self.entries.push(ErrorEntry::NestedExpression { name: name.to_owned() });
        self
    }

    /// Appends one link of a circular-evaluation chain.
    #[must_use]
    pub(crate) fn with_circular_link(mut self, outer: &str, inner: &str) -> Self {
        self.entries.push(ErrorEntry::CircularLink {
            outer: outer.to_owned(),
            inner: inner.to_owned(),
        });
        self
    }

    /// Wraps this error into a new head error of the given kind, keeping the
    /// original message and entries in the chain.
    #[must_use]
    pub(crate) fn wrap(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut wrapped = Self::new(kind, message);
        wrapped.position = self.position;
        wrapped.entries = self.entries;
        wrapped.entries.insert(
            0,
            ErrorEntry::Cause {
                kind: self.kind,
                message: self.message,
            },
        );
        wrapped
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for entry in &self.entries {
            match entry {
                ErrorEntry::ExpressionInfo { expression, position } => {
                    write!(f, "\nExpression: {{{expression}}}\n            {: <1$}^->", "", position)?;
                }
                ErrorEntry::NestedExpression { name } => {
                    write!(f, "\nWhile evaluating nested expression {name:?}.")?;
                }
                ErrorEntry::Cause { kind, message } => {
                    write!(f, "\nCaused by {kind}: {message}")?;
                }
                ErrorEntry::CircularLink { outer, inner } => {
                    write!(f, "\nExpression {outer:?} contains nested expression {inner:?}.")?;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ExprError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_render_verbatim() {
        assert_eq!(ErrorKind::UnknownIdentifier.to_string(), "UnknownIdentifier");
        assert_eq!(
            ErrorKind::CircularNestedExpressions.to_string(),
            "CircularNestedExpressions"
        );
    }

    #[test]
    fn expression_info_renders_caret_under_position() {
        let err = ExprError::syntax(4).with_expression_info("1 + §", 4);
        let rendered = err.to_string();
        let caret_line = rendered.lines().last().unwrap();
        assert_eq!(caret_line, format!("{}^->", " ".repeat(12 + 4)));
        assert!(rendered.contains("{1 + §}"));
    }

    #[test]
    fn first_expression_info_fixes_position() {
        let err = ExprError::new(ErrorKind::UnknownIdentifier, "Unknown identifier 'x'.");
        assert_eq!(err.position(), None);
        let err = err.with_expression_info("x", 0);
        assert_eq!(err.position(), Some(0));
    }
}
