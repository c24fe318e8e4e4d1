//! Number parsing/writing and string escaping.
//!
//! This is the formatter surface the lexer and the normalizer consume: a
//! [`NumberFormat`] describing how numeric literals look (decimal point,
//! optional thousands separator, hex/oct/bin prefixes, exponent separator)
//! plus the escape rules for string literals.

use std::fmt::Write;

/// How a numeric literal was written in the source, recorded on literal AST
/// nodes so normalization can reproduce the original format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberFormatHint {
    #[default]
    None,
    Hexadecimal,
    Octal,
    Binary,
    Scientific,
}

/// A scanned numeric literal: value, consumed byte length and format hint.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ScannedNumber {
    Int {
        value: i64,
        len: usize,
        hint: NumberFormatHint,
    },
    Float {
        value: f64,
        len: usize,
        scientific: bool,
    },
}

/// Numeric literal syntax configuration.
#[derive(Debug, Clone)]
pub struct NumberFormat {
    /// The decimal point character. Defaults to `'.'`.
    pub decimal_point: char,
    /// Optional thousands separator accepted (and ignored) between digits.
    pub thousands_separator: Option<char>,
    /// Prefix of hexadecimal integer literals. Defaults to `"0x"`.
    pub hex_prefix: &'static str,
    /// Prefix of octal integer literals. Defaults to `"0o"`.
    pub oct_prefix: &'static str,
    /// Prefix of binary integer literals. Defaults to `"0b"`.
    pub bin_prefix: &'static str,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_point: '.',
            thousands_separator: None,
            hex_prefix: "0x",
            oct_prefix: "0o",
            bin_prefix: "0b",
        }
    }
}

impl NumberFormat {
    /// Scans a numeric literal at the start of `s`.
    ///
    /// `s` must begin with an ASCII digit. Returns `None` when the digits do
    /// not form a representable number.
    pub(crate) fn scan_number(&self, s: &str) -> Option<ScannedNumber> {
        debug_assert!(s.starts_with(|c: char| c.is_ascii_digit()));

        for (prefix, radix, hint) in [
            (self.hex_prefix, 16, NumberFormatHint::Hexadecimal),
            (self.oct_prefix, 8, NumberFormatHint::Octal),
            (self.bin_prefix, 2, NumberFormatHint::Binary),
        ] {
            if !prefix.is_empty() && s.len() > prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
                return self.scan_radix(s, prefix.len(), radix, hint);
            }
        }

        // decimal digit run, group separators allowed between digits
        let digits_end = self.decimal_digits_end(s, 0);

        // a decimal point or an exponent makes it a float
        let rest = &s[digits_end..];
        let mut chars = rest.chars();
        let next = chars.next();
        let is_float = match next {
            Some(c) if c == self.decimal_point => true,
            Some('e' | 'E') => matches!(chars.next(), Some(c2) if c2.is_ascii_digit() || c2 == '+' || c2 == '-'),
            _ => false,
        };
        if is_float {
            return self.scan_float(s, digits_end);
        }

        let cleaned = self.strip_separators(&s[..digits_end]);
        let value = cleaned.parse::<i64>().ok()?;
        Some(ScannedNumber::Int {
            value,
            len: digits_end,
            hint: NumberFormatHint::None,
        })
    }

    fn scan_radix(&self, s: &str, start: usize, radix: u32, hint: NumberFormatHint) -> Option<ScannedNumber> {
        let mut end = start;
        for c in s[start..].chars() {
            if c.is_digit(radix) || Some(c) == self.thousands_separator {
                end += c.len_utf8();
            } else {
                break;
            }
        }
        if end == start {
            return None;
        }
        let cleaned = self.strip_separators(&s[start..end]);
        // parse through u64 so that e.g. 0xFFFFFFFFFFFFFFFF wraps to -1
        let value = u64::from_str_radix(&cleaned, radix).ok()?.cast_signed();
        Some(ScannedNumber::Int { value, len: end, hint })
    }

    fn scan_float(&self, s: &str, int_end: usize) -> Option<ScannedNumber> {
        let mut end = int_end;
        let bytes = s.as_bytes();
        let mut scientific = false;

        if s[end..].starts_with(self.decimal_point) {
            end += self.decimal_point.len_utf8();
            end = self.decimal_digits_end(s, end);
        }
        if end < s.len() && matches!(bytes[end], b'e' | b'E') {
            let mut exp_end = end + 1;
            if exp_end < s.len() && matches!(bytes[exp_end], b'+' | b'-') {
                exp_end += 1;
            }
            let digits_end = self.decimal_digits_end(s, exp_end);
            if digits_end > exp_end {
                scientific = true;
                end = digits_end;
            }
        }

        let mut cleaned = self.strip_separators(&s[..end]);
        if self.decimal_point != '.' {
            cleaned = cleaned.replace(self.decimal_point, ".");
        }
        let value = cleaned.parse::<f64>().ok()?;
        Some(ScannedNumber::Float {
            value,
            len: end,
            scientific,
        })
    }

    fn decimal_digits_end(&self, s: &str, start: usize) -> usize {
        let mut end = start;
        for c in s[start..].chars() {
            if c.is_ascii_digit() || Some(c) == self.thousands_separator {
                end += c.len_utf8();
            } else {
                break;
            }
        }
        end
    }

    fn strip_separators(&self, s: &str) -> String {
        match self.thousands_separator {
            Some(sep) => s.chars().filter(|&c| c != sep).collect(),
            None => s.to_owned(),
        }
    }

    /// Writes an integer in the given base, with the configured prefix.
    pub(crate) fn write_int(&self, value: i64, base: IntBase, out: &mut String) {
        match base {
            IntBase::Decimal => {
                let _ = write!(out, "{value}");
            }
            IntBase::Hexadecimal => {
                let _ = write!(out, "{}{:X}", self.hex_prefix, value.cast_unsigned());
            }
            IntBase::Octal => {
                let _ = write!(out, "{}{:o}", self.oct_prefix, value.cast_unsigned());
            }
            IntBase::Binary => {
                let _ = write!(out, "{}{:b}", self.bin_prefix, value.cast_unsigned());
            }
        }
    }

    /// Writes a float, scientific or shortest-round-trip plain notation.
    pub(crate) fn write_float(&self, value: f64, scientific: bool, out: &mut String) {
        if scientific {
            let _ = write!(out, "{value:e}");
        } else {
            let mut buffer = ryu::Buffer::new();
            let written = buffer.format(value);
            if self.decimal_point == '.' {
                out.push_str(written);
            } else {
                out.push_str(&written.replace('.', &self.decimal_point.to_string()));
            }
        }
    }
}

/// Output base for [`NumberFormat::write_int`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntBase {
    Decimal,
    Hexadecimal,
    Octal,
    Binary,
}

/// Resolves one backslash escape inside a string literal.
fn unescape_char(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        other => other, // \" \\ and unknown escapes keep the escaped char
    }
}

/// Decodes the escape sequences of a quoted string literal's body.
pub(crate) fn unescape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(esc) => out.push(unescape_char(esc)),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Encodes a string for emission as a quoted literal (without the quotes).
pub(crate) fn escape_string(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(s: &str) -> ScannedNumber {
        NumberFormat::default().scan_number(s).unwrap()
    }

    #[test]
    fn scans_plain_integers() {
        assert_eq!(
            scan("42"),
            ScannedNumber::Int {
                value: 42,
                len: 2,
                hint: NumberFormatHint::None
            }
        );
    }

    #[test]
    fn scans_prefixed_integers() {
        assert_eq!(
            scan("0xFF"),
            ScannedNumber::Int {
                value: 255,
                len: 4,
                hint: NumberFormatHint::Hexadecimal
            }
        );
        assert_eq!(
            scan("0o17"),
            ScannedNumber::Int {
                value: 15,
                len: 4,
                hint: NumberFormatHint::Octal
            }
        );
        assert_eq!(
            scan("0b101"),
            ScannedNumber::Int {
                value: 5,
                len: 5,
                hint: NumberFormatHint::Binary
            }
        );
    }

    #[test]
    fn scans_floats_and_scientific() {
        assert_eq!(
            scan("2.5"),
            ScannedNumber::Float {
                value: 2.5,
                len: 3,
                scientific: false
            }
        );
        assert_eq!(
            scan("1e3"),
            ScannedNumber::Float {
                value: 1000.0,
                len: 3,
                scientific: true
            }
        );
        assert_eq!(
            scan("2.5e-2"),
            ScannedNumber::Float {
                value: 0.025,
                len: 6,
                scientific: true
            }
        );
    }

    #[test]
    fn stops_at_non_numeric_input() {
        assert_eq!(
            scan("12+3"),
            ScannedNumber::Int {
                value: 12,
                len: 2,
                hint: NumberFormatHint::None
            }
        );
        // an 'e' without exponent digits is not a float marker
        assert_eq!(
            scan("12e"),
            ScannedNumber::Int {
                value: 12,
                len: 2,
                hint: NumberFormatHint::None
            }
        );
    }

    #[test]
    fn honors_thousands_separator() {
        let nf = NumberFormat {
            thousands_separator: Some('\''),
            ..NumberFormat::default()
        };
        assert_eq!(
            nf.scan_number("1'000'000").unwrap(),
            ScannedNumber::Int {
                value: 1_000_000,
                len: 9,
                hint: NumberFormatHint::None
            }
        );
    }

    #[test]
    fn writes_ints_in_all_bases() {
        let nf = NumberFormat::default();
        let mut out = String::new();
        nf.write_int(255, IntBase::Hexadecimal, &mut out);
        out.push(' ');
        nf.write_int(8, IntBase::Octal, &mut out);
        out.push(' ');
        nf.write_int(5, IntBase::Binary, &mut out);
        assert_eq!(out, "0xFF 0o10 0b101");
    }

    #[test]
    fn float_writing_round_trips() {
        let nf = NumberFormat::default();
        let mut out = String::new();
        nf.write_float(2.5, false, &mut out);
        assert_eq!(out, "2.5");
        out.clear();
        nf.write_float(1000.0, true, &mut out);
        assert_eq!(out, "1e3");
    }

    #[test]
    fn string_escaping_round_trips() {
        let mut out = String::new();
        escape_string("a\"b\\c\nd", &mut out);
        assert_eq!(out, "a\\\"b\\\\c\\nd");
        assert_eq!(unescape_string(&out), "a\"b\\c\nd");
    }
}
