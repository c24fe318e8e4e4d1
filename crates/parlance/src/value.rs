//! Runtime value box and the open type system.
//!
//! Every value carries a [`TypeTag`]: a pointer to a `'static` [`TypeInfo`]
//! compared by identity. The compiler never inspects payloads, it only
//! compares tags; the VM never inspects tags, it only moves payloads. Host
//! code introduces new types by declaring a `static TypeInfo` and building
//! values that carry its tag via [`Value::host`].

use std::{any::Any, fmt, ptr, sync::Arc};

use chrono::{DateTime, Datelike, TimeDelta, Timelike, Utc};

/// Static description of a value type.
///
/// One instance per type, with a `'static` lifetime; the *address* of the
/// instance is the type's identity.
#[derive(Debug)]
pub struct TypeInfo {
    /// Human-readable type name, used in error messages and program listings.
    pub name: &'static str,
    /// Renders a constant of this type as a compilable source term, used when
    /// decompiling an optimized program (e.g. a Duration constant becomes
    /// `Days(3)` rather than an opaque number). `None` for types whose
    /// constants never appear in programs or render as plain literals.
    pub literal_writer: Option<fn(&Value) -> Option<String>>,
}

impl TypeInfo {
    /// Creates a type description with no literal writer.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            literal_writer: None,
        }
    }
}

/// Identity of a value type; copyable, compared by pointer.
#[derive(Clone, Copy)]
pub struct TypeTag(&'static TypeInfo);

impl TypeTag {
    /// Creates a tag from a static type description.
    #[must_use]
    pub const fn of(info: &'static TypeInfo) -> Self {
        Self(info)
    }

    /// The type's display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.0.name
    }

    /// The type's literal writer, if one is registered.
    #[must_use]
    pub(crate) fn literal_writer(self) -> Option<fn(&Value) -> Option<String>> {
        self.0.literal_writer
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.0, other.0)
    }
}

impl Eq for TypeTag {}

impl std::hash::Hash for TypeTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::from_ref(self.0).hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

/// The six built-in type tags.
pub mod types {
    use super::{TypeInfo, TypeTag, write_datetime_literal, write_duration_literal};

    static BOOLEAN_INFO: TypeInfo = TypeInfo::new("Boolean");
    static INTEGER_INFO: TypeInfo = TypeInfo::new("Integer");
    static FLOAT_INFO: TypeInfo = TypeInfo::new("Float");
    static STRING_INFO: TypeInfo = TypeInfo::new("String");
    static DATETIME_INFO: TypeInfo = TypeInfo {
        name: "DateTime",
        literal_writer: Some(write_datetime_literal),
    };
    static DURATION_INFO: TypeInfo = TypeInfo {
        name: "Duration",
        literal_writer: Some(write_duration_literal),
    };

    pub static BOOLEAN: TypeTag = TypeTag::of(&BOOLEAN_INFO);
    pub static INTEGER: TypeTag = TypeTag::of(&INTEGER_INFO);
    pub static FLOAT: TypeTag = TypeTag::of(&FLOAT_INFO);
    pub static STRING: TypeTag = TypeTag::of(&STRING_INFO);
    pub static DATETIME: TypeTag = TypeTag::of(&DATETIME_INFO);
    pub static DURATION: TypeTag = TypeTag::of(&DURATION_INFO);
}

/// Payload storage: small scalars inline, larger data behind `Arc`.
#[derive(Debug, Clone)]
enum Repr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    DateTime(DateTime<Utc>),
    Duration(TimeDelta),
    Host(Arc<dyn HostValue>),
}

/// Trait for host-defined payloads carried by [`Value::host`] values.
///
/// Implementations must be `Send + Sync` because a compiled program may be
/// evaluated concurrently from multiple threads.
pub trait HostValue: Any + fmt::Debug + Send + Sync {
    /// Upcast for downcasting via [`Value::downcast_host`].
    fn as_any(&self) -> &dyn Any;
}

/// A type-erased runtime value: a [`TypeTag`] plus its payload.
#[derive(Debug, Clone)]
pub struct Value {
    tag: TypeTag,
    repr: Repr,
}

impl Value {
    /// The value's type identity.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// The value's type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.tag.name()
    }

    /// Creates a string value.
    #[must_use]
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self {
            tag: types::STRING,
            repr: Repr::Str(s.into()),
        }
    }

    /// Creates a value of a host-registered type.
    #[must_use]
    pub fn host(tag: TypeTag, payload: Arc<dyn HostValue>) -> Self {
        Self {
            tag,
            repr: Repr::Host(payload),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.repr {
            Repr::Bool(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self.repr {
            Repr::Int(i) => Some(i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self.repr {
            Repr::Float(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.repr {
            Repr::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self.repr {
            Repr::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self.repr {
            Repr::Duration(d) => Some(d),
            _ => None,
        }
    }

    /// Downcasts a host payload to a concrete type.
    #[must_use]
    pub fn downcast_host<T: HostValue>(&self) -> Option<&T> {
        match &self.repr {
            Repr::Host(h) => h.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Unboxes a Boolean.
    ///
    /// Callbacks run against arguments whose types the compiler has already
    /// verified; a mismatch here is an internal contract violation.
    ///
    /// # Panics
    /// Panics if the value is not a Boolean.
    #[must_use]
    pub fn unbox_bool(&self) -> bool {
        self.as_bool().expect("argument verified as Boolean by the compiler")
    }

    /// Unboxes an Integer. See [`Value::unbox_bool`] for the contract.
    ///
    /// # Panics
    /// Panics if the value is not an Integer.
    #[must_use]
    pub fn unbox_int(&self) -> i64 {
        self.as_int().expect("argument verified as Integer by the compiler")
    }

    /// Unboxes a Float. See [`Value::unbox_bool`] for the contract.
    ///
    /// # Panics
    /// Panics if the value is not a Float.
    #[must_use]
    pub fn unbox_float(&self) -> f64 {
        self.as_float().expect("argument verified as Float by the compiler")
    }

    /// Unboxes a String. See [`Value::unbox_bool`] for the contract.
    ///
    /// # Panics
    /// Panics if the value is not a String.
    #[must_use]
    pub fn unbox_str(&self) -> &str {
        self.as_str().expect("argument verified as String by the compiler")
    }

    /// Unboxes a DateTime. See [`Value::unbox_bool`] for the contract.
    ///
    /// # Panics
    /// Panics if the value is not a DateTime.
    #[must_use]
    pub fn unbox_datetime(&self) -> DateTime<Utc> {
        self.as_datetime().expect("argument verified as DateTime by the compiler")
    }

    /// Unboxes a Duration. See [`Value::unbox_bool`] for the contract.
    ///
    /// # Panics
    /// Panics if the value is not a Duration.
    #[must_use]
    pub fn unbox_duration(&self) -> TimeDelta {
        self.as_duration().expect("argument verified as Duration by the compiler")
    }

    /// The well-known truthiness used by `JumpIfFalse` and the Elvis operator.
    ///
    /// Booleans are themselves; numbers are true when non-zero; strings when
    /// non-empty; durations when non-zero; datetimes and host values always.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match &self.repr {
            Repr::Bool(b) => *b,
            Repr::Int(i) => *i != 0,
            Repr::Float(f) => *f != 0.0,
            Repr::Str(s) => !s.is_empty(),
            Repr::Duration(d) => !d.is_zero(),
            Repr::DateTime(_) | Repr::Host(_) => true,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self {
            tag: types::BOOLEAN,
            repr: Repr::Bool(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self {
            tag: types::INTEGER,
            repr: Repr::Int(v),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self {
            tag: types::FLOAT,
            repr: Repr::Float(v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::string(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self {
            tag: types::DATETIME,
            repr: Repr::DateTime(v),
        }
    }
}

impl From<TimeDelta> for Value {
    fn from(v: TimeDelta) -> Self {
        Self {
            tag: types::DURATION,
            repr: Repr::Duration(v),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.tag != other.tag {
            return false;
        }
        match (&self.repr, &other.repr) {
            (Repr::Bool(a), Repr::Bool(b)) => a == b,
            (Repr::Int(a), Repr::Int(b)) => a == b,
            (Repr::Float(a), Repr::Float(b)) => a == b,
            (Repr::Str(a), Repr::Str(b)) => a == b,
            (Repr::DateTime(a), Repr::DateTime(b)) => a == b,
            (Repr::Duration(a), Repr::Duration(b)) => a == b,
            (Repr::Host(a), Repr::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Repr::Int(i) => write!(f, "{i}"),
            Repr::Float(v) => f.write_str(ryu::Buffer::new().format(*v)),
            Repr::Str(s) => f.write_str(s),
            Repr::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Repr::Duration(d) => f.write_str(&display_duration(*d)),
            Repr::Host(h) => write!(f, "{h:?}"),
        }
    }
}

/// Writes a duration using the largest unit that divides it cleanly enough
/// to read well: `250ns`, `1.5ms`, `90s`, `2.5h`, `3d`.
fn display_duration(d: TimeDelta) -> String {
    let nanos = d.num_nanoseconds().unwrap_or(i64::MAX) as f64;
    let (scaled, unit) = scale_duration(nanos);
    if (scaled - scaled.trunc()).abs() < 1e-9 {
        format!("{}{unit}", scaled as i64)
    } else {
        format!("{scaled}{unit}")
    }
}

fn scale_duration(nanos: f64) -> (f64, &'static str) {
    const US: f64 = 1_000.0;
    const MS: f64 = 1_000_000.0;
    const SECOND: f64 = 1_000_000_000.0;
    const MINUTE: f64 = 60.0 * SECOND;
    const HOUR: f64 = 60.0 * MINUTE;
    const DAY: f64 = 24.0 * HOUR;
    let abs = nanos.abs();
    if abs >= DAY {
        (nanos / DAY, "d")
    } else if abs >= HOUR {
        (nanos / HOUR, "h")
    } else if abs >= MINUTE {
        (nanos / MINUTE, "min")
    } else if abs >= SECOND {
        (nanos / SECOND, "s")
    } else if abs >= MS {
        (nanos / MS, "ms")
    } else if abs >= US {
        (nanos / US, "us")
    } else {
        (nanos, "ns")
    }
}

/// Literal writer for Duration constants in decompiled programs.
///
/// Picks the largest duration-constructor function that represents the value
/// exactly, so `Days(3)` round-trips instead of `Nanoseconds(259200000000000)`.
fn write_duration_literal(value: &Value) -> Option<String> {
    let d = value.as_duration()?;
    let nanos = d.num_nanoseconds()?;
    const UNITS: &[(i64, &str)] = &[
        (86_400_000_000_000, "Days"),
        (3_600_000_000_000, "Hours"),
        (60_000_000_000, "Minutes"),
        (1_000_000_000, "Seconds"),
        (1_000_000, "Milliseconds"),
        (1_000, "Microseconds"),
        (1, "Nanoseconds"),
    ];
    for &(scale, name) in UNITS {
        if nanos % scale == 0 {
            return Some(format!("{name}({})", nanos / scale));
        }
    }
    None
}

/// Literal writer for DateTime constants in decompiled programs.
fn write_datetime_literal(value: &Value) -> Option<String> {
    let dt = value.as_datetime()?;
    Some(format!(
        "UtcDateTime({}, {}, {}, {}, {}, {})",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_identity_distinguishes_builtins() {
        assert_eq!(types::INTEGER, types::INTEGER);
        assert_ne!(types::INTEGER, types::FLOAT);
        assert_ne!(types::BOOLEAN, types::STRING);
    }

    #[test]
    fn host_types_get_fresh_identity() {
        static A: TypeInfo = TypeInfo::new("A");
        static B: TypeInfo = TypeInfo::new("A");
        assert_eq!(TypeTag::of(&A), TypeTag::of(&A));
        // same name, different instance: different type
        assert_ne!(TypeTag::of(&A), TypeTag::of(&B));
    }

    #[test]
    fn values_carry_their_tag() {
        assert_eq!(Value::from(1i64).tag(), types::INTEGER);
        assert_eq!(Value::from(1.0).tag(), types::FLOAT);
        assert_eq!(Value::from(true).tag(), types::BOOLEAN);
        assert_eq!(Value::string("x").tag(), types::STRING);
    }

    #[test]
    fn truthiness() {
        assert!(Value::from(true).is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(Value::from(2i64).is_truthy());
        assert!(!Value::from(0i64).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("x").is_truthy());
    }

    #[test]
    fn duration_literal_picks_largest_exact_unit() {
        let three_days = Value::from(TimeDelta::days(3));
        assert_eq!(write_duration_literal(&three_days).unwrap(), "Days(3)");
        let ninety_minutes = Value::from(TimeDelta::minutes(90));
        assert_eq!(write_duration_literal(&ninety_minutes).unwrap(), "Minutes(90)");
    }
}
