//! Built-in compiler plug-ins.
//!
//! All built-ins except [`Elvis`] and [`AutoCast`] are [`Calculus`] tables:
//! - `arithmetics`: boolean/integer/float identifiers, conversions and the
//!   full operator set, with operator aliasing and partial-constant folds.
//! - `math`: constants and the `f64` function family.
//! - `strings`: concatenation, comparison, wildcard matching, subscript
//!   and the string function set.
//! - `date_and_time`: datetime/duration construction, extraction and
//!   arithmetic on top of chrono.

mod arithmetics;
mod autocast;
mod calculus;
mod dateandtime;
mod elvis;
mod math;
mod strings;

pub use arithmetics::arithmetics;
pub use autocast::AutoCast;
pub use calculus::{Calculus, FoldRule};
pub use dateandtime::date_and_time;
pub use elvis::Elvis;
pub use math::math;
pub use strings::strings;

/// Wraps a callback body into a named `fn` item coercible to
/// [`crate::plugin::Callback`], keeping plug-in tables readable.
macro_rules! cb {
    (|$scope:tt, $args:tt| $body:expr) => {{
        fn callback(
            $scope: &mut $crate::scope::Scope,
            $args: &[$crate::value::Value],
        ) -> $crate::error::ExprResult<$crate::value::Value> {
            $body
        }
        callback as $crate::plugin::Callback
    }};
}

pub(crate) use cb;
