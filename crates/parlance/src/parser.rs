//! The parser: token stream to AST.
//!
//! Four mutually recursive productions implement operator-precedence
//! climbing: `conditional → binary → simple → subscript`. Two details are
//! worth calling out:
//!
//! - A parenthesized right-hand term folds eagerly into the current left
//!   operand, and parsing continues on the same level.
//! - A multi-character symbolic token may serve several operators: unary
//!   operators are split off shortest-prefix-first (so `!!x` parses as
//!   `!(!x)`), binary operators longest-prefix-first; the unconsumed suffix
//!   stays in the current token.

use crate::{
    ast::{Ast, Conditional, Function, Identifier, Literal},
    config::{CompileFlags, CompilerConfig},
    error::{ErrorKind, ExprError, ExprResult, Expectation},
    lexer::{Lexer, Token, TokenKind, TokenLiteral},
    value::Value,
};

/// Parses one expression string into its AST.
pub(crate) fn parse(src: &str, cfg: &CompilerConfig) -> ExprResult<Ast> {
    if src.is_empty() {
        return Err(ExprError::new(
            ErrorKind::EmptyExpressionString,
            "Trying to parse empty expression string.",
        ));
    }
    let mut parser = Parser::new(src, cfg)?;
    let ast = parser.parse_conditional()?;

    // remaining tokens mean an operator would have been expected
    if parser.token.kind != TokenKind::Eot {
        return Err(ExprError::expectation_error(Expectation::Operator, parser.token.position));
    }
    Ok(ast)
}

struct Parser<'s> {
    cfg: &'s CompilerConfig,
    lexer: Lexer<'s>,
    token: Token,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str, cfg: &'s CompilerConfig) -> ExprResult<Self> {
        let mut lexer = Lexer::new(src, cfg);
        let token = lexer.next_token()?;
        Ok(Self { cfg, lexer, token })
    }

    fn advance(&mut self) -> ExprResult<()> {
        self.token = self.lexer.next_token()?;
        Ok(())
    }

    fn is_symbol(&self, text: &str) -> bool {
        self.token.kind == TokenKind::SymbolicOp && self.token.text == text
    }

    fn parse_conditional(&mut self) -> ExprResult<Ast> {
        let q = self.parse_binary()?;

        let question_position = self.token.position;
        if self.is_symbol("?") {
            self.advance()?;
            let t = self.parse_conditional()?;

            if !self.is_symbol(":") {
                return Err(ExprError::expectation_error(
                    Expectation::ConditionalColon,
                    self.token.position,
                ));
            }
            let colon_position = self.token.position;
            self.advance()?;

            let f = self.parse_conditional()?;
            return Ok(Ast::Conditional(Conditional {
                q: Box::new(q),
                t: Box::new(t),
                f: Box::new(f),
                question_position,
                colon_position,
            }));
        }

        Ok(q)
    }

    fn parse_binary(&mut self) -> ExprResult<Ast> {
        let mut lhs = self.parse_simple()?;

        let mut position = self.token.position;
        let bin_op = loop {
            let Some(bin_op) = self.get_binary_op()? else {
                return Ok(lhs);
            };

            // parenthesized rhs folds eagerly into the current left operand
            if self.token.kind == TokenKind::ParenOpen {
                let rhs = self.parse_simple()?;
                lhs = Ast::binary(bin_op, lhs, rhs, position);
                position = self.token.position;
                continue;
            }
            break bin_op;
        };

        if self.token.kind == TokenKind::Eot {
            return Err(ExprError::expectation_error(Expectation::RhsOperand, self.token.position));
        }

        let rhs = self.parse_binary()?;

        let precedence = self.precedence_of(&bin_op);
        Ok(self.insert_left_spine(lhs, bin_op, position, rhs, precedence))
    }

    /// Inserts `lhs op …` at the deepest node of `rhs`'s left spine whose
    /// operator binds no tighter than `op`, making equal precedences
    /// left-associative and stronger right-hand operators bind tighter.
    fn insert_left_spine(&self, lhs: Ast, op: String, position: usize, rhs: Ast, precedence: i32) -> Ast {
        match rhs {
            Ast::Binary(node) if self.precedence_of(&node.parsed_op) <= precedence => {
                let crate::ast::Binary {
                    op: node_op,
                    parsed_op,
                    lhs: node_lhs,
                    rhs: node_rhs,
                    position: node_position,
                } = node;
                let new_left = self.insert_left_spine(lhs, op, position, *node_lhs, precedence);
                Ast::Binary(crate::ast::Binary {
                    op: node_op,
                    parsed_op,
                    lhs: Box::new(new_left),
                    rhs: node_rhs,
                    position: node_position,
                })
            }
            other => Ast::binary(op, lhs, other, position),
        }
    }

    fn precedence_of(&self, op: &str) -> i32 {
        self.cfg
            .binary_precedence(op)
            .expect("operator validated while reading the token")
    }

    fn parse_simple(&mut self) -> ExprResult<Ast> {
        // '(' expression ')'
        if self.token.kind == TokenKind::ParenOpen {
            self.advance()?;
            let inner = self.parse_conditional()?;
            if self.token.kind != TokenKind::ParenClose {
                return Err(ExprError::expectation_error(Expectation::ClosingBrace, self.token.position));
            }
            self.advance()?;
            return self.parse_subscript(inner);
        }

        // unary operator application
        let position = self.token.position;
        if let Some(un_op) = self.get_unary_op()? {
            let operand = self.parse_simple()?;
            let node = Ast::unary(un_op, operand, position);
            return self.parse_subscript(node);
        }

        // terminals
        match self.token.kind {
            TokenKind::LitInteger | TokenKind::LitFloat | TokenKind::LitString => {
                let hint = self.token.hint;
                let value = match self.token.literal.take() {
                    Some(TokenLiteral::Int(v)) => Value::from(v),
                    Some(TokenLiteral::Float(v)) => Value::from(v),
                    Some(TokenLiteral::Str(s)) => Value::string(s),
                    None => unreachable!("literal token without literal value"),
                };
                self.advance()?;
                let node = Ast::Literal(Literal { value, position, hint });
                self.parse_subscript(node)
            }

            // binary alias names are valid identifier/function names here
            TokenKind::Identifier | TokenKind::AlphaBinaryOp => {
                let name = std::mem::take(&mut self.token.text);
                self.advance()?;

                if self.token.kind == TokenKind::ParenOpen {
                    return self.parse_function_call(name, position);
                }

                let node = Ast::Identifier(Identifier {
                    parsed_name: name.clone(),
                    name,
                    position,
                });
                self.parse_subscript(node)
            }

            TokenKind::Eot => Err(ExprError::expectation_error(Expectation::UnexpectedEnd, self.token.position)),
            TokenKind::ParenClose => Err(ExprError::expectation_error(
                Expectation::MisplacedClosingBrace,
                self.token.position,
            )),
            TokenKind::SubscriptOpen | TokenKind::SubscriptClose => Err(ExprError::expectation_error(
                Expectation::MisplacedSubscript,
                self.token.position,
            )),
            TokenKind::Comma => Err(ExprError::expectation_error(
                Expectation::MisplacedComma,
                self.token.position,
            )),
            _ => Err(ExprError::syntax(self.token.position)),
        }
    }

    fn parse_function_call(&mut self, name: String, position: usize) -> ExprResult<Ast> {
        let mut args = Vec::new();
        loop {
            self.advance()?; // past '(' or ','
            if self.token.kind == TokenKind::ParenClose {
                self.advance()?;
                return Ok(Ast::Function(Function {
                    parsed_name: name.clone(),
                    name,
                    args,
                    position,
                }));
            }

            args.push(self.parse_conditional()?);

            if self.token.kind == TokenKind::Comma {
                continue;
            }
            if self.token.kind != TokenKind::ParenClose {
                return Err(ExprError::expectation_error(
                    Expectation::ClosingFunctionBrace,
                    self.token.position,
                ));
            }
            self.advance()?;
            let node = Ast::Function(Function {
                parsed_name: name.clone(),
                name,
                args,
                position,
            });
            return self.parse_subscript(node);
        }
    }

    fn parse_subscript(&mut self, lhs: Ast) -> ExprResult<Ast> {
        if !self
            .cfg
            .compile_flags
            .contains(CompileFlags::ALLOW_SUBSCRIPT_OPERATOR)
            || self.token.kind != TokenKind::SubscriptOpen
        {
            return Ok(lhs);
        }
        let position = self.token.position;
        self.advance()?;

        let inner = self.parse_conditional()?;

        if self.token.kind != TokenKind::SubscriptClose {
            return Err(ExprError::expectation_error(
                Expectation::ClosingSubscript,
                self.token.position,
            ));
        }
        self.advance()?;
        Ok(Ast::binary("[]", lhs, inner, position))
    }

    /// Reads a unary operator off the current token, if one is there.
    ///
    /// Symbolic tokens are tried shortest-prefix-first so that stacked unary
    /// operators lexed into one token split one by one; a consumed prefix
    /// leaves the remainder in the current token.
    fn get_unary_op(&mut self) -> ExprResult<Option<String>> {
        match self.token.kind {
            TokenKind::SymbolicOp => {
                for partial in 1..=self.token.text.len() {
                    if !self.token.text.is_char_boundary(partial) {
                        continue;
                    }
                    let key = &self.token.text[..partial];
                    if self.cfg.unary_operators.iter().any(|o| o == key) {
                        let key = key.to_owned();
                        self.consume_symbol_prefix(partial)?;
                        return Ok(Some(key));
                    }
                }
                Err(ExprError::new(
                    ErrorKind::UnknownUnaryOperatorSymbol,
                    format!("Unknown unary operator '{}' found.", self.token.text),
                )
                .at(self.token.position))
            }
            TokenKind::AlphaUnaryOp => {
                let op = std::mem::take(&mut self.token.text);
                self.advance()?;
                Ok(Some(op))
            }
            _ => Ok(None),
        }
    }

    /// Reads a binary operator off the current token, if one is there.
    ///
    /// Symbolic tokens are tried longest-prefix-first: binary operators may
    /// be concatenated with unary operators of the right-hand operand, so we
    /// consume as much as possible but are content with less.
    fn get_binary_op(&mut self) -> ExprResult<Option<String>> {
        match self.token.kind {
            TokenKind::SymbolicOp => {
                // the conditional operator is not parsed here
                if self.token.text == "?" || self.token.text == ":" {
                    return Ok(None);
                }
                for partial in (1..=self.token.text.len()).rev() {
                    if !self.token.text.is_char_boundary(partial) {
                        continue;
                    }
                    let key = &self.token.text[..partial];
                    if self.cfg.binary_operators.contains_key(key) {
                        let key = key.to_owned();
                        self.consume_symbol_prefix(partial)?;
                        return Ok(Some(key));
                    }
                }
                Err(ExprError::new(
                    ErrorKind::UnknownBinaryOperatorSymbol,
                    format!("Unknown binary operator '{}' found.", self.token.text),
                )
                .at(self.token.position))
            }
            TokenKind::AlphaBinaryOp => {
                let op = std::mem::take(&mut self.token.text);
                self.advance()?;
                Ok(Some(op))
            }
            _ => Ok(None),
        }
    }

    /// Consumes `len` bytes of the current symbolic token: the whole token
    /// advances the lexer, a prefix leaves the suffix as the current token.
    fn consume_symbol_prefix(&mut self, len: usize) -> ExprResult<()> {
        if len == self.token.text.len() {
            self.advance()
        } else {
            self.token.text.drain(..len);
            self.token.position += len;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(src: &str) -> ExprResult<Ast> {
        let mut cfg = CompilerConfig::default();
        cfg.install_defaults();
        parse(src, &cfg)
    }

    /// Renders the tree as an s-expression for shape assertions.
    fn shape(ast: &Ast) -> String {
        match ast {
            Ast::Literal(n) => n.value.to_string(),
            Ast::Identifier(n) => n.name.clone(),
            Ast::Function(n) => {
                let args: Vec<String> = n.args.iter().map(shape).collect();
                format!("({} {})", n.name, args.join(" "))
            }
            Ast::Unary(n) => format!("({} {})", n.parsed_op, shape(&n.arg)),
            Ast::Binary(n) => format!("({} {} {})", n.parsed_op, shape(&n.lhs), shape(&n.rhs)),
            Ast::Conditional(n) => format!("(? {} {} {})", shape(&n.q), shape(&n.t), shape(&n.f)),
        }
    }

    fn parsed_shape(src: &str) -> String {
        shape(&parse_default(src).unwrap())
    }

    #[test]
    fn addition_is_left_associative() {
        assert_eq!(parsed_shape("a + b - c"), "(- (+ a b) c)");
    }

    #[test]
    fn multiplication_binds_tighter() {
        assert_eq!(parsed_shape("a + b * c"), "(+ a (* b c))");
        assert_eq!(parsed_shape("a * b + c"), "(+ (* a b) c)");
    }

    #[test]
    fn comparison_chain_follows_c_precedence() {
        assert_eq!(
            parsed_shape("true && false == true < false"),
            "(&& true (== false (< true false)))"
        );
    }

    #[test]
    fn conditional_is_right_associative() {
        assert_eq!(parsed_shape("a ? b : c ? d : e"), "(? a b (? c d e))");
    }

    #[test]
    fn stacked_unary_operators_split_shortest_first() {
        assert_eq!(parsed_shape("!!x"), "(! (! x))");
        assert_eq!(parsed_shape("- -x"), "(- (- x))");
        assert_eq!(parsed_shape("--x"), "(- (- x))");
    }

    #[test]
    fn binary_splits_longest_first() {
        // "+-" lexes as one symbolic token; "+" is consumed as the binary
        // operator, "-" remains and becomes unary
        assert_eq!(parsed_shape("a +-b"), "(+ a (- b))");
    }

    #[test]
    fn parenthesized_rhs_folds_eagerly() {
        assert_eq!(parsed_shape("a * (b + c)"), "(* a (+ b c))");
    }

    #[test]
    fn subscript_parses_as_binary_operator() {
        assert_eq!(parsed_shape("a[1 + 2]"), "([] a (+ 1 2))");
    }

    #[test]
    fn functions_parse_argument_lists() {
        assert_eq!(parsed_shape("Max(1, 2 + 3)"), "(Max 1 (+ 2 3))");
        assert_eq!(parsed_shape("Now()"), "(Now )");
    }

    #[test]
    fn verbal_aliases_parse_as_operators() {
        assert_eq!(parsed_shape("a and not b"), "(and a (not b))");
        assert_eq!(parsed_shape("a Sm b Or c Gt d"), "(Or (Sm a b) (Gt c d))");
    }

    #[test]
    fn elvis_parses_as_binary_operator() {
        assert_eq!(parsed_shape("a ?: b"), "(?: a b)");
        assert_eq!(parsed_shape("a ? : b"), "(?: a b)");
    }

    #[test]
    fn error_positions_and_expectations() {
        let err = parse_default("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyExpressionString);

        let err = parse_default("(1 + 2").unwrap_err();
        assert_eq!(err.expectation(), Some(Expectation::ClosingBrace));

        let err = parse_default("1 + ").unwrap_err();
        assert_eq!(err.expectation(), Some(Expectation::RhsOperand));

        let err = parse_default("a ? b").unwrap_err();
        assert_eq!(err.expectation(), Some(Expectation::ConditionalColon));

        let err = parse_default("1 2").unwrap_err();
        assert_eq!(err.expectation(), Some(Expectation::Operator));
        assert_eq!(err.position(), Some(2));

        let err = parse_default("f(1,,2)").unwrap_err();
        assert_eq!(err.expectation(), Some(Expectation::MisplacedComma));

        let err = parse_default("§").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn unknown_operators_are_reported() {
        let mut cfg = CompilerConfig::default();
        cfg.install_defaults();
        let err = parse(": 1", &cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownUnaryOperatorSymbol);
    }
}
