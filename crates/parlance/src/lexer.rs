//! The lexer: expression string to token stream.
//!
//! Character classification tables are precomputed per instance from the
//! configured operator symbols: a syntax-token set (always `( ) ,`, plus
//! `[ ]` iff a `[]` operator is registered) and an operator-char set (every
//! character appearing in a symbolic operator, plus `?` and `:`).
//!
//! Alphabetic operator aliases are resolved here, before identifier lexing;
//! an alias therefore shadows a same-named identifier in operator position.
//! The parser still accepts alias tokens as identifier or function names in
//! operand position.

use strum::Display;

use crate::{
    config::CompilerConfig,
    error::{ExprError, ExprResult, Expectation},
    fmt::{NumberFormatHint, ScannedNumber},
};

/// Kinds of tokens the parser consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub(crate) enum TokenKind {
    /// End of the token stream.
    Eot,
    ParenOpen,
    ParenClose,
    SubscriptOpen,
    SubscriptClose,
    Comma,
    /// One to three operator characters, split further by the parser.
    SymbolicOp,
    /// An alphabetic alias of a unary operator.
    AlphaUnaryOp,
    /// An alphabetic alias of a binary operator.
    AlphaBinaryOp,
    Identifier,
    LitInteger,
    LitFloat,
    LitString,
}

/// Literal payload of a literal token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenLiteral {
    Int(i64),
    Float(f64),
    Str(String),
}

/// One lexed token. The parser mutates `text`/`position` of symbolic
/// operator tokens when it consumes only a prefix of the scanned characters.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset into the expression string.
    pub position: usize,
    /// The token's text (unescaped body for string literals).
    pub text: String,
    /// Set for literal kinds only.
    pub literal: Option<TokenLiteral>,
    /// Numeric format hint for literal kinds.
    pub hint: NumberFormatHint,
}

impl Token {
    fn simple(kind: TokenKind, position: usize, text: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            text: text.into(),
            literal: None,
            hint: NumberFormatHint::None,
        }
    }
}

/// Tokenizer over one expression string.
pub(crate) struct Lexer<'s> {
    src: &'s str,
    cfg: &'s CompilerConfig,
    cursor: usize,
    syntax_chars: [bool; 128],
    operator_chars: [bool; 128],
    has_elvis: bool,
}

fn mark(table: &mut [bool; 128], c: char) {
    if c.is_ascii() {
        table[c as usize] = true;
    }
}

impl<'s> Lexer<'s> {
    pub(crate) fn new(src: &'s str, cfg: &'s CompilerConfig) -> Self {
        let mut syntax_chars = [false; 128];
        let mut operator_chars = [false; 128];
        for c in ['(', ')', ','] {
            mark(&mut syntax_chars, c);
        }
        if cfg.binary_operators.contains_key("[]") {
            mark(&mut syntax_chars, '[');
            mark(&mut syntax_chars, ']');
        }
        mark(&mut operator_chars, '?');
        mark(&mut operator_chars, ':');
        for op in &cfg.unary_operators {
            for c in op.chars() {
                mark(&mut operator_chars, c);
            }
        }
        for op in cfg.binary_operators.keys() {
            if op != "[]" {
                for c in op.chars() {
                    mark(&mut operator_chars, c);
                }
            }
        }
        Self {
            src,
            cfg,
            cursor: 0,
            syntax_chars,
            operator_chars,
            has_elvis: cfg.binary_operators.contains_key("?:"),
        }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.cursor..]
    }

    fn is_operator_char(&self, c: char) -> bool {
        c.is_ascii() && self.operator_chars[c as usize]
    }

    fn is_syntax_char(&self, c: char) -> bool {
        c.is_ascii() && self.syntax_chars[c as usize]
    }

    /// Lexes the next token.
    pub(crate) fn next_token(&mut self) -> ExprResult<Token> {
        self.skip_whitespace();
        let position = self.cursor;

        let Some(first) = self.rest().chars().next() else {
            return Ok(Token::simple(TokenKind::Eot, position, ""));
        };

        // syntax tokens
        if self.is_syntax_char(first) {
            let kind = match first {
                '(' => TokenKind::ParenOpen,
                ')' => TokenKind::ParenClose,
                '[' => TokenKind::SubscriptOpen,
                ']' => TokenKind::SubscriptClose,
                _ => TokenKind::Comma,
            };
            self.cursor += first.len_utf8();
            return Ok(Token::simple(kind, position, first.to_string()));
        }

        // symbolic operators: up to three consecutive operator characters
        if self.is_operator_char(first) {
            let mut len = 0;
            for c in self.rest().chars().take(3) {
                if self.is_operator_char(c) {
                    len += c.len_utf8();
                } else {
                    break;
                }
            }
            self.cursor += len;
            let mut text = self.src[position..position + len].to_owned();

            // Elvis written with whitespace: merge "?" and a following ":"
            if text == "?" && self.has_elvis {
                let backup = self.cursor;
                self.skip_whitespace();
                if self.rest().starts_with(':') {
                    self.cursor += 1;
                    text = "?:".to_owned();
                } else {
                    self.cursor = backup;
                }
            }
            return Ok(Token::simple(TokenKind::SymbolicOp, position, text));
        }

        // alphabetic operators
        if first.is_alphabetic() {
            let run = self.peek_run(|c| c.is_alphabetic() || c == '_');
            if self.cfg.lookup_alpha_alias(run, true).is_some() {
                self.cursor += run.len();
                return Ok(Token::simple(TokenKind::AlphaUnaryOp, position, run));
            }
            if self.cfg.lookup_alpha_alias(run, false).is_some() {
                self.cursor += run.len();
                return Ok(Token::simple(TokenKind::AlphaBinaryOp, position, run));
            }
        }

        // identifiers
        if first.is_alphabetic() || first == '_' {
            let run = self.peek_run(|c| c.is_alphanumeric() || c == '_');
            self.cursor += run.len();
            return Ok(Token::simple(TokenKind::Identifier, position, run));
        }

        // numeric literals
        if first.is_ascii_digit() {
            let Some(scanned) = self.cfg.number_format.scan_number(self.rest()) else {
                return Err(ExprError::syntax(position));
            };
            return Ok(match scanned {
                ScannedNumber::Int { value, len, hint } => {
                    self.cursor += len;
                    Token {
                        kind: TokenKind::LitInteger,
                        position,
                        text: self.src[position..position + len].to_owned(),
                        literal: Some(TokenLiteral::Int(value)),
                        hint,
                    }
                }
                ScannedNumber::Float { value, len, scientific } => {
                    self.cursor += len;
                    Token {
                        kind: TokenKind::LitFloat,
                        position,
                        text: self.src[position..position + len].to_owned(),
                        literal: Some(TokenLiteral::Float(value)),
                        hint: if scientific {
                            NumberFormatHint::Scientific
                        } else {
                            NumberFormatHint::None
                        },
                    }
                }
            });
        }

        // string literals
        if first == '"' {
            return self.lex_string(position);
        }

        Err(ExprError::syntax(position))
    }

    fn lex_string(&mut self, position: usize) -> ExprResult<Token> {
        let body_start = position + 1;
        let mut escaped = false;
        for (offset, c) in self.src[body_start..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    let body = crate::fmt::unescape_string(&self.src[body_start..body_start + offset]);
                    self.cursor = body_start + offset + 1;
                    return Ok(Token {
                        kind: TokenKind::LitString,
                        position,
                        text: body.clone(),
                        literal: Some(TokenLiteral::Str(body)),
                        hint: NumberFormatHint::None,
                    });
                }
                _ => {}
            }
        }
        Err(ExprError::expectation_error(Expectation::ClosingQuote, position))
    }

    fn peek_run(&self, pred: impl Fn(char) -> bool) -> &'s str {
        let rest = self.rest();
        let end = rest.char_indices().find(|&(_, c)| !pred(c)).map_or(rest.len(), |(i, _)| i);
        &rest[..end]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let skipped = rest
            .char_indices()
            .find(|&(_, c)| !c.is_whitespace())
            .map_or(rest.len(), |(i, _)| i);
        self.cursor += skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Token> {
        let mut cfg = CompilerConfig::default();
        cfg.install_defaults();
        let mut lexer = Lexer::new(src, &cfg);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            let done = token.kind == TokenKind::Eot;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex_all(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_literals_and_operators() {
        assert_eq!(
            kinds("1 + 2.5"),
            vec![
                TokenKind::LitInteger,
                TokenKind::SymbolicOp,
                TokenKind::LitFloat,
                TokenKind::Eot
            ]
        );
    }

    #[test]
    fn groups_up_to_three_operator_chars() {
        let tokens = lex_all("a <<= b");
        assert_eq!(tokens[1].kind, TokenKind::SymbolicOp);
        assert_eq!(tokens[1].text, "<<=");
    }

    #[test]
    fn merges_elvis_written_with_whitespace() {
        let tokens = lex_all("a ? : b");
        assert_eq!(tokens[1].kind, TokenKind::SymbolicOp);
        assert_eq!(tokens[1].text, "?:");
        assert_eq!(tokens[2].kind, TokenKind::Identifier);

        // a lone "?" not followed by ":" stays a "?"
        let tokens = lex_all("a ? b : c");
        assert_eq!(tokens[1].text, "?");
        assert_eq!(tokens[3].text, ":");
    }

    #[test]
    fn resolves_alphabetic_aliases_before_identifiers() {
        let tokens = lex_all("a and b");
        assert_eq!(tokens[1].kind, TokenKind::AlphaBinaryOp);
        assert_eq!(tokens[1].text, "and");

        let tokens = lex_all("not a");
        assert_eq!(tokens[0].kind, TokenKind::AlphaUnaryOp);
    }

    #[test]
    fn subscript_chars_require_registered_operator() {
        let mut cfg = CompilerConfig::default();
        cfg.install_defaults();
        cfg.binary_operators.remove("[]");
        let mut lexer = Lexer::new("a[1]", &cfg);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);
        // '[' is neither syntax nor operator char now
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn string_literals_unescape() {
        let tokens = lex_all(r#""he \"said\"\n""#);
        assert_eq!(tokens[0].kind, TokenKind::LitString);
        assert_eq!(tokens[0].text, "he \"said\"\n");
    }

    #[test]
    fn unterminated_string_reports_expectation() {
        let mut cfg = CompilerConfig::default();
        cfg.install_defaults();
        let mut lexer = Lexer::new("\"abc", &cfg);
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.expectation(), Some(Expectation::ClosingQuote));
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = lex_all("  12 + x");
        assert_eq!(tokens[0].position, 2);
        assert_eq!(tokens[1].position, 5);
        assert_eq!(tokens[2].position, 7);
    }
}
