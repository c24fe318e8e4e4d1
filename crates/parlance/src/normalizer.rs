//! Normalization: serializing an AST back into an expression string under
//! the configured [`NormalizeFlags`].
//!
//! The same walk serves both strings an expression exposes: the normalized
//! string (from the parsed AST, token-preserving) and the optimized string
//! (from the decompiled program). Spacing, redundant brackets, operator and
//! identifier spellings and literal formats are flag-controlled; a small
//! deny-list forces a space where flag-elided spacing would create a
//! forbidden character sequence such as `--`.

use crate::{
    ast::{Ast, Binary, Conditional, Function, Literal, Unary},
    config::{CompilerConfig, NormalizeFlags},
    fmt::{IntBase, NumberFormatHint, escape_string},
    value::types,
};

/// Renders `ast` under the configuration's normalization flags.
pub(crate) fn normalize(ast: &Ast, cfg: &CompilerConfig) -> String {
    let mut normalizer = Normalizer {
        cfg,
        flags: cfg.normalize_flags,
        out: String::new(),
    };
    normalizer.write_node(ast, Ctx::Top);
    normalizer.out
}

/// Where a node appears, deciding bracket necessity.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Top,
    UnaryOperand,
    BinaryLeft(i32),
    BinaryRight(i32),
    SubscriptLhs,
    SubscriptIndex,
    CondQ,
    CondBranch,
    FuncArg,
}

struct Normalizer<'c> {
    cfg: &'c CompilerConfig,
    flags: NormalizeFlags,
    out: String,
}

impl Normalizer<'_> {
    fn has(&self, flag: NormalizeFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Appends a token, forcing a space when the boundary would otherwise
    /// form a disallowed sequence.
    fn emit(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        for disallowed in &self.cfg.normalization_disallowed {
            for split in 1..disallowed.len() {
                if self.out.ends_with(&disallowed[..split]) && text.starts_with(&disallowed[split..]) {
                    self.out.push(' ');
                    break;
                }
            }
        }
        self.out.push_str(text);
    }

    fn space(&mut self) {
        self.out.push(' ');
    }

    fn space_if(&mut self, flag: NormalizeFlags) {
        if self.has(flag) {
            self.space();
        }
    }

    fn write_node(&mut self, ast: &Ast, ctx: Ctx) {
        if self.needs_brackets(ast, ctx) {
            self.space_if(NormalizeFlags::OUTER_BRACKET_SPACE);
            self.emit("(");
            self.space_if(NormalizeFlags::INNER_BRACKET_SPACE);
            self.write_node(ast, Ctx::Top);
            self.space_if(NormalizeFlags::INNER_BRACKET_SPACE);
            self.emit(")");
            self.space_if(NormalizeFlags::OUTER_BRACKET_SPACE);
            return;
        }

        match ast {
            Ast::Literal(node) => self.write_literal(node),
            Ast::Identifier(node) => {
                let text = self.identifier_text(&node.name, &node.parsed_name);
                self.emit(&text);
            }
            Ast::Function(node) => self.write_function(node),
            Ast::Unary(node) => self.write_unary(node),
            Ast::Binary(node) if node.op == "[]" => self.write_subscript(node),
            Ast::Binary(node) => self.write_binary(node),
            Ast::Conditional(node) => self.write_conditional(node),
        }
    }

    /// Whether the node must (or, per redundancy flags, should) be wrapped
    /// in brackets at this position.
    fn needs_brackets(&self, ast: &Ast, ctx: Ctx) -> bool {
        match ast {
            Ast::Literal(_) | Ast::Identifier(_) | Ast::Function(_) => false,
            Ast::Binary(node) if node.op == "[]" => false,
            Ast::Binary(node) => {
                let precedence = self
                    .cfg
                    .binary_precedence(&node.parsed_op)
                    .unwrap_or_else(|| self.cfg.binary_precedence(&node.op).unwrap_or(0));
                match ctx {
                    Ctx::UnaryOperand | Ctx::SubscriptLhs => true,
                    Ctx::BinaryLeft(parent) => precedence < parent,
                    Ctx::BinaryRight(parent) => {
                        precedence <= parent
                            || self.has(NormalizeFlags::REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP)
                    }
                    _ => false,
                }
            }
            Ast::Unary(_) => match ctx {
                Ctx::SubscriptLhs => true,
                Ctx::UnaryOperand => self.has(NormalizeFlags::REDUNDANT_BRACKETS_BETWEEN_TWO_UNARY_OPS),
                _ => false,
            },
            Ast::Conditional(_) => match ctx {
                Ctx::UnaryOperand | Ctx::SubscriptLhs | Ctx::BinaryLeft(_) | Ctx::BinaryRight(_) | Ctx::CondQ => true,
                Ctx::CondBranch => self.has(NormalizeFlags::REDUNDANT_BRACKETS_AROUND_NESTED_CONDITIONALS),
                _ => false,
            },
        }
    }

    fn write_unary(&mut self, node: &Unary) {
        let op = self.operator_text(&node.parsed_op, &node.op, true);
        self.emit(&op);

        let verbal = is_verbal(&op);
        let operand_is_unary =
            matches!(&*node.arg, Ast::Unary(_)) && !self.needs_brackets(&node.arg, Ctx::UnaryOperand);
        if verbal
            || self.has(NormalizeFlags::UNARY_OP_SPACE)
            || (operand_is_unary && self.has(NormalizeFlags::UNARY_OP_SPACE_IF_UNARY_FOLLOWS))
            || (matches!(&*node.arg, Ast::Conditional(_) | Ast::Binary(_))
                && self.has(NormalizeFlags::UNARY_OP_INNER_BRACKET_SPACE))
        {
            self.space();
        }
        self.write_node(&node.arg, Ctx::UnaryOperand);
    }

    fn write_binary(&mut self, node: &Binary) {
        let precedence = self
            .cfg
            .binary_precedence(&node.parsed_op)
            .unwrap_or_else(|| self.cfg.binary_precedence(&node.op).unwrap_or(0));
        let op = self.operator_text(&node.parsed_op, &node.op, false);

        self.write_node(&node.lhs, Ctx::BinaryLeft(precedence));
        let spaced = self.has(NormalizeFlags::BINARY_OP_SPACES) || is_verbal(&op);
        if spaced {
            self.space();
        }
        self.emit(&op);
        if spaced {
            self.space();
        }
        self.write_node(&node.rhs, Ctx::BinaryRight(precedence));
    }

    fn write_subscript(&mut self, node: &Binary) {
        self.write_node(&node.lhs, Ctx::SubscriptLhs);
        self.space_if(NormalizeFlags::SUBSCRIPT_SPACE_BEFORE_BRACKETS);
        self.emit("[");
        self.space_if(NormalizeFlags::SUBSCRIPT_INNER_BRACKET_SPACE);
        self.write_node(&node.rhs, Ctx::SubscriptIndex);
        self.space_if(NormalizeFlags::SUBSCRIPT_INNER_BRACKET_SPACE);
        self.emit("]");
    }

    fn write_conditional(&mut self, node: &Conditional) {
        self.write_node(&node.q, Ctx::CondQ);
        self.space_if(NormalizeFlags::CONDITIONAL_OP_SPACE_BEFORE_QM);
        self.emit("?");
        self.space_if(NormalizeFlags::CONDITIONAL_OP_SPACE_AFTER_QM);
        self.write_node(&node.t, Ctx::CondBranch);
        self.space_if(NormalizeFlags::CONDITIONAL_OP_SPACE_BEFORE_COLON);
        self.emit(":");
        self.space_if(NormalizeFlags::CONDITIONAL_OP_SPACE_AFTER_COLON);
        self.write_node(&node.f, Ctx::CondBranch);
    }

    fn write_function(&mut self, node: &Function) {
        let name = self.identifier_text(&node.name, &node.parsed_name);
        self.emit(&name);
        self.space_if(NormalizeFlags::FUNCTION_SPACE_BEFORE_OPENING_BRACKET);
        self.emit("(");
        if !node.args.is_empty() {
            self.space_if(NormalizeFlags::FUNCTION_INNER_BRACKET_SPACE);
            for (i, arg) in node.args.iter().enumerate() {
                if i > 0 {
                    self.emit(",");
                    self.space_if(NormalizeFlags::FUNCTION_SPACE_AFTER_COMMA);
                }
                self.write_node(arg, Ctx::FuncArg);
            }
            self.space_if(NormalizeFlags::FUNCTION_INNER_BRACKET_SPACE);
        }
        self.emit(")");
    }

    fn write_literal(&mut self, node: &Literal) {
        let value = &node.value;
        let tag = value.tag();
        let mut text = String::new();

        if tag == types::BOOLEAN {
            text.push_str(if value.unbox_bool() { "true" } else { "false" });
        } else if tag == types::INTEGER {
            let base = if self.has(NormalizeFlags::FORCE_HEXADECIMAL) {
                IntBase::Hexadecimal
            } else if self.has(NormalizeFlags::FORCE_OCTAL) {
                IntBase::Octal
            } else if self.has(NormalizeFlags::FORCE_BINARY) {
                IntBase::Binary
            } else if self.has(NormalizeFlags::KEEP_ORIGINAL_FORMAT) {
                match node.hint {
                    NumberFormatHint::Hexadecimal => IntBase::Hexadecimal,
                    NumberFormatHint::Octal => IntBase::Octal,
                    NumberFormatHint::Binary => IntBase::Binary,
                    _ => IntBase::Decimal,
                }
            } else {
                IntBase::Decimal
            };
            self.cfg.number_format.write_int(value.unbox_int(), base, &mut text);
        } else if tag == types::FLOAT {
            let scientific = self.has(NormalizeFlags::FORCE_SCIENTIFIC)
                || (self.has(NormalizeFlags::KEEP_SCIENTIFIC_FORMAT) && node.hint == NumberFormatHint::Scientific);
            self.cfg.number_format.write_float(value.unbox_float(), scientific, &mut text);
        } else if tag == types::STRING {
            text.push('"');
            escape_string(value.unbox_str(), &mut text);
            text.push('"');
        } else if let Some(written) = tag.literal_writer().and_then(|writer| writer(value)) {
            text = written;
        } else {
            text = value.to_string();
        }

        self.emit(&text);
    }

    /// Picks the spelling of an operator: verbal aliases follow the five
    /// verbal-operator modes, symbolic aliases follow `REPLACE_ALIAS_OPERATORS`.
    fn operator_text(&self, parsed: &str, compiled: &str, unary: bool) -> String {
        if is_verbal(parsed) {
            if self.has(NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC) {
                return compiled.to_owned();
            }
            let defined = self
                .cfg
                .lookup_alpha_alias(parsed, unary)
                .map_or_else(|| parsed.to_owned(), |alias| alias.defined.clone());
            if self.has(NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_LOWER_CASE) {
                return defined.to_lowercase();
            }
            if self.has(NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_UPPER_CASE) {
                return defined.to_uppercase();
            }
            if self.has(NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_DEFINED_CASE) {
                return defined;
            }
            return parsed.to_owned();
        }
        if self.has(NormalizeFlags::REPLACE_ALIAS_OPERATORS) {
            compiled.to_owned()
        } else {
            parsed.to_owned()
        }
    }

    /// Picks the spelling of an identifier or function name, honoring
    /// canonical replacement and the casing flags.
    fn identifier_text(&self, canonical: &str, parsed: &str) -> String {
        let base = if self.has(NormalizeFlags::REPLACE_FUNCTION_NAMES) {
            canonical
        } else {
            parsed
        };
        if self.has(NormalizeFlags::IDENTIFIERS_TO_UPPER_CASE) {
            base.to_uppercase()
        } else if self.has(NormalizeFlags::IDENTIFIERS_TO_LOWER_CASE) {
            base.to_lowercase()
        } else {
            base.to_owned()
        }
    }
}

/// Whether an operator spelling is a verbal alias rather than a symbol.
fn is_verbal(op: &str) -> bool {
    op.chars().next().is_some_and(char::is_alphabetic)
}
