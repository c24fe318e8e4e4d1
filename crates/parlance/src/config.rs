//! Compiler configuration: option bitfields, operator tables, verbal operator
//! aliases and function-name descriptors.
//!
//! All configuration is fixed before the first compilation; the compiler
//! freezes its configuration when the first expression is compiled.

use ahash::AHashMap;
use bitflags::bitflags;

use crate::fmt::NumberFormat;

bitflags! {
    /// Compilation behavior switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompileFlags: u32 {
        /// Alphabetic operator aliases match ignoring letter case.
        const ALPHABETIC_OPERATORS_IGNORE_CASE      = 1 << 0;
        /// Enables the subscript operator `lhs[rhs]` (requires a `[]` entry in
        /// the binary operator table).
        const ALLOW_SUBSCRIPT_OPERATOR              = 1 << 1;
        /// Enables the nested-expression unary operator and single-argument
        /// function form, resolved at compile time.
        const ALLOW_COMPILE_TIME_NESTED_EXPRESSIONS = 1 << 2;
        /// Allows writing nested expression names without quotes, as in
        /// `*filter` instead of `*"filter"`.
        const ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS = 1 << 3;
        /// `setup_defaults` installs the default unary operator set.
        const DEFAULT_UNARY_OPERATORS               = 1 << 4;
        /// `setup_defaults` installs the default binary operator table.
        const DEFAULT_BINARY_OPERATORS              = 1 << 5;
        /// `setup_defaults` installs the default verbal operator aliases.
        const DEFAULT_ALPHABETIC_OPERATOR_ALIASES   = 1 << 6;
        /// Treats `=` as an alias of `==` (the alias is recorded for the
        /// `REPLACE_ALIAS_OPERATORS` normalization flag).
        const ALIAS_EQUALS_OPERATOR                 = 1 << 7;
        /// Named expression lookup compares names case-sensitively.
        const CASE_SENSITIVE_NAMED_EXPRESSIONS      = 1 << 8;
        /// Plug-in errors surface unwrapped instead of as `ExceptionInPlugin`.
        const PLUGIN_EXCEPTION_FALL_THROUGH         = 1 << 9;
        /// Callback errors surface unwrapped instead of as `ExceptionInCallback`.
        const CALLBACK_EXCEPTION_FALL_THROUGH       = 1 << 10;
        /// Disables constant folding, partial-constant elimination and
        /// dead-branch elimination.
        const NO_OPTIMIZATION                       = 1 << 11;
    }
}

impl Default for CompileFlags {
    fn default() -> Self {
        Self::ALPHABETIC_OPERATORS_IGNORE_CASE
            | Self::ALLOW_SUBSCRIPT_OPERATOR
            | Self::ALLOW_COMPILE_TIME_NESTED_EXPRESSIONS
            | Self::ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS
            | Self::DEFAULT_UNARY_OPERATORS
            | Self::DEFAULT_BINARY_OPERATORS
            | Self::DEFAULT_ALPHABETIC_OPERATOR_ALIASES
            | Self::ALIAS_EQUALS_OPERATOR
    }
}

bitflags! {
    /// Switches tweaking the normalized expression string.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NormalizeFlags: u32 {
        // whitespace
        const INNER_BRACKET_SPACE                    = 1 << 0;
        const OUTER_BRACKET_SPACE                    = 1 << 1;
        const FUNCTION_SPACE_BEFORE_OPENING_BRACKET  = 1 << 2;
        const FUNCTION_INNER_BRACKET_SPACE           = 1 << 3;
        const FUNCTION_SPACE_AFTER_COMMA             = 1 << 4;
        const SUBSCRIPT_SPACE_BEFORE_BRACKETS        = 1 << 5;
        const SUBSCRIPT_INNER_BRACKET_SPACE          = 1 << 6;
        const UNARY_OP_SPACE                         = 1 << 7;
        /// Space after a unary operator only when another unary operator
        /// follows, so `- -x` does not collapse into `--x`.
        const UNARY_OP_SPACE_IF_UNARY_FOLLOWS        = 1 << 8;
        const UNARY_OP_INNER_BRACKET_SPACE           = 1 << 9;
        const BINARY_OP_SPACES                       = 1 << 10;
        const CONDITIONAL_OP_SPACE_BEFORE_QM         = 1 << 11;
        const CONDITIONAL_OP_SPACE_AFTER_QM          = 1 << 12;
        const CONDITIONAL_OP_SPACE_BEFORE_COLON      = 1 << 13;
        const CONDITIONAL_OP_SPACE_AFTER_COLON       = 1 << 14;
        // redundant brackets
        const REDUNDANT_BRACKETS_BETWEEN_TWO_UNARY_OPS = 1 << 15;
        /// Brackets around a right-hand operand that is a binary expression of
        /// stronger precedence, clarifying `a && (b == c)`.
        const REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP = 1 << 16;
        const REDUNDANT_BRACKETS_AROUND_NESTED_CONDITIONALS = 1 << 17;
        // operator replacement
        const REPLACE_ALIAS_OPERATORS                = 1 << 18;
        const REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC   = 1 << 19;
        const REPLACE_VERBAL_OPERATORS_TO_LOWER_CASE = 1 << 20;
        const REPLACE_VERBAL_OPERATORS_TO_UPPER_CASE = 1 << 21;
        const REPLACE_VERBAL_OPERATORS_TO_DEFINED_CASE = 1 << 22;
        // literal formats
        const KEEP_ORIGINAL_FORMAT                   = 1 << 23;
        const FORCE_HEXADECIMAL                      = 1 << 24;
        const FORCE_OCTAL                            = 1 << 25;
        const FORCE_BINARY                           = 1 << 26;
        const FORCE_SCIENTIFIC                       = 1 << 27;
        const KEEP_SCIENTIFIC_FORMAT                 = 1 << 28;
        // identifiers
        const IDENTIFIERS_TO_UPPER_CASE              = 1 << 29;
        const IDENTIFIERS_TO_LOWER_CASE              = 1 << 30;
        /// Replaces abbreviated or case-mismatched function and identifier
        /// names with the canonical spelling the matching plug-in reports.
        const REPLACE_FUNCTION_NAMES                 = 1 << 31;
    }
}

impl Default for NormalizeFlags {
    fn default() -> Self {
        Self::FUNCTION_SPACE_AFTER_COMMA
            | Self::UNARY_OP_SPACE_IF_UNARY_FOLLOWS
            | Self::BINARY_OP_SPACES
            | Self::CONDITIONAL_OP_SPACE_BEFORE_QM
            | Self::CONDITIONAL_OP_SPACE_AFTER_QM
            | Self::CONDITIONAL_OP_SPACE_BEFORE_COLON
            | Self::CONDITIONAL_OP_SPACE_AFTER_COLON
            | Self::REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP
            | Self::REPLACE_ALIAS_OPERATORS
            | Self::KEEP_ORIGINAL_FORMAT
            | Self::KEEP_SCIENTIFIC_FORMAT
            | Self::REPLACE_FUNCTION_NAMES
    }
}

/// Descriptor of a function or identifier name that may be abbreviated.
///
/// `min_abbrev == 0` requires the full name; otherwise any prefix of at least
/// `min_abbrev` characters matches. Case sensitivity is per descriptor.
#[derive(Debug, Clone)]
pub struct FunctionName {
    pub name: String,
    pub min_abbrev: usize,
    pub ignore_case: bool,
}

impl FunctionName {
    #[must_use]
    pub fn new(name: impl Into<String>, min_abbrev: usize, ignore_case: bool) -> Self {
        Self {
            name: name.into(),
            min_abbrev,
            ignore_case,
        }
    }

    /// Exact-spelling descriptor.
    #[must_use]
    pub fn exact(name: impl Into<String>) -> Self {
        Self::new(name, 0, true)
    }

    /// Whether `given` matches this name, honoring abbreviation and case rules.
    #[must_use]
    pub fn matches(&self, given: &str) -> bool {
        let min = if self.min_abbrev == 0 { self.name.len() } else { self.min_abbrev };
        if given.len() < min || given.len() > self.name.len() {
            return false;
        }
        let prefix = &self.name[..given.len()];
        if self.ignore_case {
            prefix.eq_ignore_ascii_case(given)
        } else {
            prefix == given
        }
    }
}

/// One verbal operator alias: a defined spelling and the symbol it maps to.
#[derive(Debug, Clone)]
pub(crate) struct VerbalAlias {
    /// The spelling the alias was defined with (used by the
    /// `REPLACE_VERBAL_OPERATORS_TO_DEFINED_CASE` normalization).
    pub defined: String,
    /// The symbolic operator the alias stands for.
    pub symbol: String,
}

/// The full, pre-compilation configuration of a [`crate::Compiler`].
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Unary operator symbols, in definition order.
    pub unary_operators: Vec<String>,
    /// Binary operator symbols mapped to their precedence.
    pub binary_operators: AHashMap<String, i32>,
    /// Alphabetic unary operator aliases, keyed by lowercased spelling.
    pub(crate) alpha_unary_aliases: AHashMap<String, VerbalAlias>,
    /// Alphabetic binary operator aliases, keyed by lowercased spelling.
    pub(crate) alpha_binary_aliases: AHashMap<String, VerbalAlias>,
    pub compile_flags: CompileFlags,
    pub normalize_flags: NormalizeFlags,
    /// The unary operator addressing nested expressions. Must name a defined
    /// unary operator. Empty disables the operator form.
    pub nested_operator: String,
    /// Name descriptor of the nested-expression function.
    pub nested_function: FunctionName,
    /// Keyword accepted as third argument of the nested-expression function.
    pub nested_throw_keyword: String,
    /// Numeric literal syntax.
    pub number_format: NumberFormat,
    /// Strings that must never appear in normalized output; a space is forced
    /// where eliding one would create them (`--` by default).
    pub normalization_disallowed: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            unary_operators: Vec::new(),
            binary_operators: AHashMap::new(),
            alpha_unary_aliases: AHashMap::new(),
            alpha_binary_aliases: AHashMap::new(),
            compile_flags: CompileFlags::default(),
            normalize_flags: NormalizeFlags::default(),
            nested_operator: "*".to_owned(),
            nested_function: FunctionName::new("Expression", 4, true),
            nested_throw_keyword: "throw".to_owned(),
            number_format: NumberFormat::default(),
            normalization_disallowed: vec!["--".to_owned()],
        }
    }
}

/// The default unary operator set.
pub(crate) const DEFAULT_UNARY_OPERATORS: &[&str] = &["+", "-", "!", "~", "*"];

/// The default binary operator table with C-style precedences. The `[]` entry
/// only switches the subscript syntax on; subscript terms are parsed by their
/// own production.
pub(crate) const DEFAULT_BINARY_OPERATORS: &[(&str, i32)] = &[
    ("[]", 0),
    ("*", 900),
    ("/", 900),
    ("%", 900),
    ("+", 800),
    ("-", 800),
    ("<<", 700),
    (">>", 700),
    ("<", 600),
    ("<=", 600),
    (">", 600),
    (">=", 600),
    ("==", 500),
    ("!=", 500),
    ("&", 470),
    ("^", 460),
    ("|", 450),
    ("&&", 440),
    ("||", 430),
    ("=", 300),
    ("?:", 200),
];

/// The default verbal aliases of unary operators.
pub(crate) const DEFAULT_ALPHA_UNARY_ALIASES: &[(&str, &str)] = &[("Not", "!")];

/// The default verbal aliases of binary operators.
pub(crate) const DEFAULT_ALPHA_BINARY_ALIASES: &[(&str, &str)] = &[
    ("And", "&&"),
    ("Or", "||"),
    ("Sm", "<"),
    ("Smaller", "<"),
    ("Smeq", "<="),
    ("Smaller_Or_Equal", "<="),
    ("Gt", ">"),
    ("Greater", ">"),
    ("Gteq", ">="),
    ("Greater_Or_Equal", ">="),
    ("Eq", "=="),
    ("Equals", "=="),
    ("Neq", "!="),
    ("Not_equals", "!="),
];

impl CompilerConfig {
    /// Adds a unary operator symbol.
    ///
    /// # Panics
    /// Panics in debug builds when the symbol is already defined.
    pub fn add_unary_operator(&mut self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        debug_assert!(
            !self.unary_operators.contains(&symbol),
            "unary operator '{symbol}' already defined"
        );
        self.unary_operators.push(symbol);
    }

    /// Adds a binary operator symbol with its precedence.
    ///
    /// # Panics
    /// Panics in debug builds when the symbol is already defined.
    pub fn add_binary_operator(&mut self, symbol: impl Into<String>, precedence: i32) {
        let symbol = symbol.into();
        let previous = self.binary_operators.insert(symbol.clone(), precedence);
        debug_assert!(previous.is_none(), "binary operator '{symbol}' already defined");
    }

    /// Adds an alphabetic alias for a unary operator.
    pub fn add_alpha_unary_alias(&mut self, alias: impl Into<String>, symbol: impl Into<String>) {
        let defined = alias.into();
        self.alpha_unary_aliases.insert(
            defined.to_ascii_lowercase(),
            VerbalAlias {
                defined,
                symbol: symbol.into(),
            },
        );
    }

    /// Adds an alphabetic alias for a binary operator.
    pub fn add_alpha_binary_alias(&mut self, alias: impl Into<String>, symbol: impl Into<String>) {
        let defined = alias.into();
        self.alpha_binary_aliases.insert(
            defined.to_ascii_lowercase(),
            VerbalAlias {
                defined,
                symbol: symbol.into(),
            },
        );
    }

    /// Installs the default operators and aliases selected by the compile
    /// flags. Invoked by [`crate::Compiler::setup_defaults`].
    pub(crate) fn install_defaults(&mut self) {
        if self.compile_flags.contains(CompileFlags::DEFAULT_UNARY_OPERATORS) {
            for op in DEFAULT_UNARY_OPERATORS {
                if !self.unary_operators.iter().any(|o| o == op) {
                    self.unary_operators.push((*op).to_owned());
                }
            }
        }
        if self.compile_flags.contains(CompileFlags::DEFAULT_BINARY_OPERATORS) {
            for (op, precedence) in DEFAULT_BINARY_OPERATORS {
                self.binary_operators.entry((*op).to_owned()).or_insert(*precedence);
            }
        }
        if self.compile_flags.contains(CompileFlags::DEFAULT_ALPHABETIC_OPERATOR_ALIASES) {
            for (alias, symbol) in DEFAULT_ALPHA_UNARY_ALIASES {
                self.add_alpha_unary_alias(*alias, *symbol);
            }
            for (alias, symbol) in DEFAULT_ALPHA_BINARY_ALIASES {
                self.add_alpha_binary_alias(*alias, *symbol);
            }
        }
    }

    /// Looks up an alphabetic operator alias, honoring the case flag.
    pub(crate) fn lookup_alpha_alias(&self, name: &str, unary: bool) -> Option<&VerbalAlias> {
        let map = if unary {
            &self.alpha_unary_aliases
        } else {
            &self.alpha_binary_aliases
        };
        let alias = map.get(&name.to_ascii_lowercase())?;
        if self
            .compile_flags
            .contains(CompileFlags::ALPHABETIC_OPERATORS_IGNORE_CASE)
            || alias.defined == name
        {
            Some(alias)
        } else {
            None
        }
    }

    /// Whether the symbol is a defined unary operator (aliases included).
    pub(crate) fn is_unary_operator(&self, symbol: &str) -> bool {
        self.unary_operators.iter().any(|o| o == symbol) || self.lookup_alpha_alias(symbol, true).is_some()
    }

    /// The precedence of a binary operator symbol, resolving verbal aliases.
    pub(crate) fn binary_precedence(&self, symbol: &str) -> Option<i32> {
        if let Some(precedence) = self.binary_operators.get(symbol) {
            return Some(*precedence);
        }
        let alias = self.lookup_alpha_alias(symbol, false)?;
        self.binary_operators.get(&alias.symbol).copied()
    }

    /// Resolves a parsed binary operator spelling to the symbol plug-ins see.
    pub(crate) fn resolve_binary_symbol<'a>(&'a self, parsed: &'a str) -> &'a str {
        match self.lookup_alpha_alias(parsed, false) {
            Some(alias) => &alias.symbol,
            None => parsed,
        }
    }

    /// Resolves a parsed unary operator spelling to the symbol plug-ins see.
    pub(crate) fn resolve_unary_symbol<'a>(&'a self, parsed: &'a str) -> &'a str {
        match self.lookup_alpha_alias(parsed, true) {
            Some(alias) => &alias.symbol,
            None => parsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> CompilerConfig {
        let mut cfg = CompilerConfig::default();
        cfg.install_defaults();
        cfg
    }

    #[test]
    fn default_precedences_follow_c() {
        let cfg = default_config();
        assert!(cfg.binary_precedence("*").unwrap() > cfg.binary_precedence("+").unwrap());
        assert!(cfg.binary_precedence("+").unwrap() > cfg.binary_precedence("<").unwrap());
        assert!(cfg.binary_precedence("<").unwrap() > cfg.binary_precedence("==").unwrap());
        assert!(cfg.binary_precedence("==").unwrap() > cfg.binary_precedence("&&").unwrap());
        assert!(cfg.binary_precedence("&&").unwrap() > cfg.binary_precedence("||").unwrap());
    }

    #[test]
    fn verbal_aliases_resolve_case_insensitively_by_default() {
        let cfg = default_config();
        assert_eq!(cfg.binary_precedence("AND"), cfg.binary_precedence("&&"));
        assert_eq!(cfg.resolve_binary_symbol("or"), "||");
        assert_eq!(cfg.resolve_unary_symbol("not"), "!");
    }

    #[test]
    fn verbal_aliases_respect_case_sensitivity() {
        let mut cfg = default_config();
        cfg.compile_flags.remove(CompileFlags::ALPHABETIC_OPERATORS_IGNORE_CASE);
        assert_eq!(cfg.resolve_binary_symbol("And"), "&&");
        assert_eq!(cfg.resolve_binary_symbol("AND"), "AND");
    }

    #[test]
    fn function_names_match_abbreviations() {
        let name = FunctionName::new("GetDayOfWeek", 7, true);
        assert!(name.matches("GetDayOfWeek"));
        assert!(name.matches("getdayofw"));
        assert!(!name.matches("GetDay"));
        assert!(!name.matches("GetDayOfWeekX"));

        let exact = FunctionName::exact("PI");
        assert!(exact.matches("pi"));
        assert!(!exact.matches("p"));
    }
}
