//! String identifiers, functions and operators.
//!
//! Besides the usual function set, this plug-in contributes concatenation
//! `+` (with scalar-to-string promotion on either side), the full comparison
//! set, the subscript operator and the wildcard-match binary operator `*`.
//!
//! Wildcard matchers compiled from constant patterns are stashed in the
//! expression's compile-time store, keyed by the pattern, and reused by
//! every evaluation; a matcher for a runtime pattern is built on the fly.

use std::{any::Any, sync::Arc};

use regex::Regex;

use crate::{
    config::FunctionName,
    error::{ErrorKind, ExprError, ExprResult},
    scope::{NamedResource, Scope},
    value::{Value, types},
};

use super::{Calculus, cb};

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of wildcard matchers compiled since process start (test aid).
#[cfg(test)]
static WILDCARD_COMPILATIONS: AtomicUsize = AtomicUsize::new(0);

#[cfg(test)]
pub(crate) fn wildcard_compilations() -> usize {
    WILDCARD_COMPILATIONS.load(Ordering::Relaxed)
}

/// A wildcard pattern (`*` and `?`) compiled into an anchored regex.
#[derive(Debug)]
struct WildcardMatcher {
    regex: Regex,
}

impl WildcardMatcher {
    fn new(pattern: &str) -> ExprResult<Self> {
        #[cfg(test)]
        {
            WILDCARD_COMPILATIONS.fetch_add(1, Ordering::Relaxed);
        }
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');
        let regex = Regex::new(&source).map_err(|err| {
            ExprError::new(
                ErrorKind::ArithmeticError,
                format!("Malformed wildcard pattern {pattern:?}: {err}."),
            )
        })?;
        Ok(Self { regex })
    }

    fn matches(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }
}

impl NamedResource for WildcardMatcher {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Matches `subject` against `pattern`, caching compile-time matchers in the
/// expression's store.
fn wildcard_match(scope: &mut Scope, subject: &str, pattern: &str) -> ExprResult<bool> {
    let key = format!("_wildcard {pattern}");
    if let Some(store) = scope.store()
        && let Some(resource) = store.resource(&key)
        && let Some(matcher) = resource.as_any().downcast_ref::<WildcardMatcher>()
    {
        return Ok(matcher.matches(subject));
    }

    let matcher = Arc::new(WildcardMatcher::new(pattern)?);
    let matched = matcher.matches(subject);
    if scope.is_compile_time()
        && let Some(store) = scope.store()
    {
        store.insert_resource(key, matcher);
    }
    Ok(matched)
}

/// Builds the strings plug-in.
#[must_use]
pub fn strings() -> Calculus {
    let bool_t = types::BOOLEAN;
    let int_t = types::INTEGER;
    let float_t = types::FLOAT;
    let string_t = types::STRING;
    let mut c = Calculus::new("Strings");

    c.identifier(FunctionName::new("Newline", 4, true), string_t, true, cb!(|_, _args| Ok(Value::string("\n"))));
    c.identifier(FunctionName::new("Tabulator", 3, true), string_t, true, cb!(|_, _args| Ok(Value::string("\t"))));

    // concatenation, with scalar promotion on either side
    c.binary("+", string_t, string_t, string_t, true, cb!(|_, args| {
        Ok(Value::string(format!("{}{}", args[0].unbox_str(), args[1].unbox_str())))
    }));
    for scalar in [bool_t, int_t, float_t] {
        c.binary("+", string_t, scalar, string_t, true, cb!(|_, args| {
            Ok(Value::string(format!("{}{}", args[0].unbox_str(), args[1])))
        }));
        c.binary("+", scalar, string_t, string_t, true, cb!(|_, args| {
            Ok(Value::string(format!("{}{}", args[0], args[1].unbox_str())))
        }));
    }

    // comparisons
    c.binary("==", string_t, string_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_str() == args[1].unbox_str()))));
    c.binary("!=", string_t, string_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_str() != args[1].unbox_str()))));
    c.binary("<", string_t, string_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_str() < args[1].unbox_str()))));
    c.binary("<=", string_t, string_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_str() <= args[1].unbox_str()))));
    c.binary(">", string_t, string_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_str() > args[1].unbox_str()))));
    c.binary(">=", string_t, string_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_str() >= args[1].unbox_str()))));

    // wildcard match operator and function
    c.binary("*", string_t, string_t, bool_t, true, cb!(|scope, args| {
        wildcard_match(scope, args[0].unbox_str(), args[1].unbox_str()).map(Value::from)
    }));
    c.function(
        FunctionName::new("WildcardMatch", 8, true),
        vec![string_t, string_t],
        bool_t,
        true,
        cb!(|scope, args| wildcard_match(scope, args[0].unbox_str(), args[1].unbox_str()).map(Value::from)),
    );

    // subscript: the single character at the index, empty when out of range
    c.binary("[]", string_t, int_t, string_t, true, cb!(|_, args| {
        let index = args[0].unbox_str().chars().nth(usize::try_from(args[1].unbox_int()).unwrap_or(usize::MAX));
        Ok(Value::string(index.map(String::from).unwrap_or_default()))
    }));

    c.function(FunctionName::new("Length", 3, true), vec![string_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_str().chars().count() as i64))
    }));
    c.function(FunctionName::new("String", 3, true), vec![string_t], string_t, true, cb!(|_, args| Ok(args[0].clone())));
    for scalar in [bool_t, int_t, float_t] {
        c.function(FunctionName::new("String", 3, true), vec![scalar], string_t, true, cb!(|_, args| {
            Ok(Value::string(args[0].to_string()))
        }));
    }

    c.function(FunctionName::new("ToUpper", 3, true), vec![string_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(args[0].unbox_str().to_uppercase()))
    }));
    c.function(FunctionName::new("ToLower", 3, true), vec![string_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(args[0].unbox_str().to_lowercase()))
    }));
    c.function(FunctionName::new("Compare", 4, true), vec![string_t, string_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(match args[0].unbox_str().cmp(args[1].unbox_str()) {
            std::cmp::Ordering::Less => -1i64,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }))
    }));
    c.function(FunctionName::new("StartsWith", 7, true), vec![string_t, string_t], bool_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_str().starts_with(args[1].unbox_str())))
    }));
    c.function(FunctionName::new("EndsWith", 5, true), vec![string_t, string_t], bool_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_str().ends_with(args[1].unbox_str())))
    }));
    c.function(FunctionName::new("Substring", 4, true), vec![string_t, int_t], string_t, true, cb!(|_, args| {
        let start = usize::try_from(args[1].unbox_int()).unwrap_or(usize::MAX);
        Ok(Value::string(args[0].unbox_str().chars().skip(start).collect::<String>()))
    }));
    c.function(FunctionName::new("Substring", 4, true), vec![string_t, int_t, int_t], string_t, true, cb!(|_, args| {
        let start = usize::try_from(args[1].unbox_int()).unwrap_or(usize::MAX);
        let len = usize::try_from(args[2].unbox_int()).unwrap_or(0);
        Ok(Value::string(args[0].unbox_str().chars().skip(start).take(len).collect::<String>()))
    }));
    c.function(FunctionName::new("IndexOf", 5, true), vec![string_t, string_t], int_t, true, cb!(|_, args| {
        let haystack = args[0].unbox_str();
        Ok(Value::from(haystack.find(args[1].unbox_str()).map_or(-1, |byte_pos| {
            haystack[..byte_pos].chars().count() as i64
        })))
    }));
    c.function(FunctionName::new("Count", 5, true), vec![string_t, string_t], int_t, true, cb!(|_, args| {
        let needle = args[1].unbox_str();
        let count = if needle.is_empty() {
            0
        } else {
            args[0].unbox_str().matches(needle).count() as i64
        };
        Ok(Value::from(count))
    }));
    c.function(FunctionName::new("Trim", 4, true), vec![string_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(args[0].unbox_str().trim()))
    }));
    c.function(FunctionName::new("TrimStart", 5, true), vec![string_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(args[0].unbox_str().trim_start()))
    }));
    c.function(FunctionName::new("TrimEnd", 5, true), vec![string_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(args[0].unbox_str().trim_end()))
    }));
    c.function(FunctionName::new("Replace", 4, true), vec![string_t, string_t, string_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(args[0].unbox_str().replace(args[1].unbox_str(), args[2].unbox_str())))
    }));
    c.function(FunctionName::new("Repeat", 6, true), vec![string_t, int_t], string_t, true, cb!(|_, args| {
        let count = usize::try_from(args[1].unbox_int()).unwrap_or(0);
        Ok(Value::string(args[0].unbox_str().repeat(count)))
    }));

    // parsing and radix formatting
    c.function(FunctionName::new("Integer", 3, true), vec![string_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_str().trim().parse::<i64>().unwrap_or(0)))
    }));
    c.function(FunctionName::new("Float", 5, true), vec![string_t], float_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_str().trim().parse::<f64>().unwrap_or(0.0)))
    }));
    c.function(FunctionName::new("Hexadecimal", 3, true), vec![int_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(format!("{:X}", args[0].unbox_int())))
    }));
    c.function(FunctionName::new("Octal", 3, true), vec![int_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(format!("{:o}", args[0].unbox_int())))
    }));
    c.function(FunctionName::new("Binary", 3, true), vec![int_t], string_t, true, cb!(|_, args| {
        Ok(Value::string(format!("{:b}", args[0].unbox_int())))
    }));

    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::CtStore;

    #[test]
    fn wildcard_translation() {
        let matcher = WildcardMatcher::new("*.jpg").unwrap();
        assert!(matcher.matches("MyPhoto.jpg"));
        assert!(!matcher.matches("MyPhoto.jpeg"));
        assert!(!matcher.matches("jpg"));

        let matcher = WildcardMatcher::new("IMG_????.*").unwrap();
        assert!(matcher.matches("IMG_1234.cr2"));
        assert!(!matcher.matches("IMG_123.cr2"));
    }

    #[test]
    fn compile_time_scope_caches_matchers() {
        let store = Arc::new(CtStore::default());
        let mut ct_scope = Scope::compile_time(store.clone());

        let before = wildcard_compilations();
        assert!(wildcard_match(&mut ct_scope, "MyPhoto.jpg", "*.jpg").unwrap());
        assert_eq!(wildcard_compilations(), before + 1);
        assert_eq!(store.resource_count(), 1);

        // further matches against the same pattern reuse the stored matcher,
        // also from evaluation scopes attached to the same store
        let mut eval_scope = Scope::new();
        eval_scope.begin(store.clone());
        assert!(wildcard_match(&mut eval_scope, "Other.jpg", "*.jpg").unwrap());
        assert_eq!(wildcard_compilations(), before + 1);
    }
}
