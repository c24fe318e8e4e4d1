//! Date, time and duration support on top of chrono.
//!
//! Contributes `Now`/`Today` (not compile-time invokable), the
//! `UtcDateTime` constructor, month and weekday constants, duration
//! constructors and extractors, calendar field getters, `Age`/`IsOlderThan`
//! and the datetime/duration operator set. Duration constants reappear in
//! optimized expression strings through the Duration literal writer.

use chrono::{DateTime, TimeDelta, TimeZone, Timelike, Utc};

use crate::{
    config::FunctionName,
    error::{ErrorKind, ExprError, ExprResult},
    value::{Value, types},
};

use super::{Calculus, cb};

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

fn out_of_range(what: &str) -> ExprError {
    ExprError::new(ErrorKind::ArithmeticError, format!("{what} out of range."))
}

fn duration_from_nanos(nanos: f64) -> ExprResult<Value> {
    if !nanos.is_finite() || nanos.abs() >= i64::MAX as f64 {
        return Err(out_of_range("Duration"));
    }
    Ok(Value::from(TimeDelta::nanoseconds(nanos as i64)))
}

fn duration_nanos(value: &Value) -> f64 {
    value
        .unbox_duration()
        .num_nanoseconds()
        .map_or(f64::INFINITY, |n| n as f64)
}

/// Scale of one duration-constructor unit, in nanoseconds.
fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "Nanoseconds" => 1.0,
        "Microseconds" => 1_000.0,
        "Milliseconds" => 1_000_000.0,
        "Seconds" => NANOS_PER_SECOND,
        "Minutes" => 60.0 * NANOS_PER_SECOND,
        "Hours" => 3_600.0 * NANOS_PER_SECOND,
        "Days" => 86_400.0 * NANOS_PER_SECOND,
        "Weeks" => 7.0 * 86_400.0 * NANOS_PER_SECOND,
        "Months" => 30.0 * 86_400.0 * NANOS_PER_SECOND,
        "Years" => 365.0 * 86_400.0 * NANOS_PER_SECOND,
        _ => unreachable!("unknown duration unit"),
    }
}

fn constructor_int(unit: &'static str) -> crate::plugin::Callback {
    match unit {
        "Nanoseconds" => cb!(|_, args| Ok(Value::from(TimeDelta::nanoseconds(args[0].unbox_int())))),
        "Microseconds" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Microseconds"))),
        "Milliseconds" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Milliseconds"))),
        "Seconds" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Seconds"))),
        "Minutes" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Minutes"))),
        "Hours" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Hours"))),
        "Days" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Days"))),
        "Weeks" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Weeks"))),
        "Months" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Months"))),
        "Years" => cb!(|_, args| duration_from_nanos(args[0].unbox_int() as f64 * unit_nanos("Years"))),
        _ => unreachable!("unknown duration unit"),
    }
}

fn constructor_float(unit: &'static str) -> crate::plugin::Callback {
    match unit {
        "Milliseconds" => cb!(|_, args| duration_from_nanos(args[0].unbox_float() * unit_nanos("Milliseconds"))),
        "Seconds" => cb!(|_, args| duration_from_nanos(args[0].unbox_float() * unit_nanos("Seconds"))),
        "Minutes" => cb!(|_, args| duration_from_nanos(args[0].unbox_float() * unit_nanos("Minutes"))),
        "Hours" => cb!(|_, args| duration_from_nanos(args[0].unbox_float() * unit_nanos("Hours"))),
        "Days" => cb!(|_, args| duration_from_nanos(args[0].unbox_float() * unit_nanos("Days"))),
        "Weeks" => cb!(|_, args| duration_from_nanos(args[0].unbox_float() * unit_nanos("Weeks"))),
        _ => unreachable!("unknown duration unit"),
    }
}

fn extractor(unit: &'static str) -> crate::plugin::Callback {
    match unit {
        "InNanoseconds" => cb!(|_, args| Ok(Value::from(duration_nanos(&args[0])))),
        "InMicroseconds" => cb!(|_, args| Ok(Value::from(duration_nanos(&args[0]) / unit_nanos("Microseconds")))),
        "InMilliseconds" => cb!(|_, args| Ok(Value::from(duration_nanos(&args[0]) / unit_nanos("Milliseconds")))),
        "InSeconds" => cb!(|_, args| Ok(Value::from(duration_nanos(&args[0]) / unit_nanos("Seconds")))),
        "InMinutes" => cb!(|_, args| Ok(Value::from(duration_nanos(&args[0]) / unit_nanos("Minutes")))),
        "InHours" => cb!(|_, args| Ok(Value::from(duration_nanos(&args[0]) / unit_nanos("Hours")))),
        "InDays" => cb!(|_, args| Ok(Value::from(duration_nanos(&args[0]) / unit_nanos("Days")))),
        "InHertz" => cb!(|_, args| Ok(Value::from(NANOS_PER_SECOND / duration_nanos(&args[0])))),
        _ => unreachable!("unknown duration extractor"),
    }
}

fn build_datetime(args: &[Value]) -> ExprResult<Value> {
    let part = |i: usize, default: i64| args.get(i).map_or(default, Value::unbox_int);
    let year = i32::try_from(part(0, 0)).map_err(|_| out_of_range("Year"))?;
    let convert = |v: i64| u32::try_from(v).map_err(|_| out_of_range("DateTime field"));
    Utc.with_ymd_and_hms(
        year,
        convert(part(1, 1))?,
        convert(part(2, 1))?,
        convert(part(3, 0))?,
        convert(part(4, 0))?,
        convert(part(5, 0))?,
    )
    .single()
    .map(Value::from)
    .ok_or_else(|| out_of_range("DateTime"))
}

/// Builds the date-and-time plug-in.
#[must_use]
pub fn date_and_time() -> Calculus {
    let bool_t = types::BOOLEAN;
    let int_t = types::INTEGER;
    let float_t = types::FLOAT;
    let datetime_t = types::DATETIME;
    let duration_t = types::DURATION;
    let mut c = Calculus::new("DateAndTime");

    // clock identifiers; never folded, every evaluation reads the clock
    c.identifier(FunctionName::new("Now", 3, true), datetime_t, false, cb!(|_, _args| Ok(Value::from(Utc::now()))));
    c.identifier(FunctionName::new("Today", 5, true), datetime_t, false, cb!(|_, _args| {
        Ok(Value::from(
            Utc::now().with_time(chrono::NaiveTime::MIN).single().unwrap_or_else(Utc::now),
        ))
    }));

    // month and weekday constants
    for (index, month) in [
        "January", "February", "March", "April", "May", "June", "July", "August", "September", "October",
        "November", "December",
    ]
    .iter()
    .enumerate()
    {
        c.identifier(FunctionName::new(*month, 3, true), int_t, true, month_constant(index as i64 + 1));
    }
    for (index, day) in ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"]
        .iter()
        .enumerate()
    {
        c.identifier(FunctionName::new(*day, 3, true), int_t, true, month_constant(index as i64));
    }

    // datetime construction: UtcDateTime(year[, month, day, hour, min, sec])
    for arity in 1..=6 {
        c.function(
            FunctionName::new("UtcDateTime", 5, true),
            vec![int_t; arity],
            datetime_t,
            true,
            cb!(|_, args| build_datetime(args)),
        );
    }

    // duration constructors and extractors
    for unit in [
        "Nanoseconds", "Microseconds", "Milliseconds", "Seconds", "Minutes", "Hours", "Days", "Weeks", "Months",
        "Years",
    ] {
        c.function(FunctionName::new(unit, 4, true), vec![int_t], duration_t, true, constructor_int(unit));
    }
    for unit in ["Milliseconds", "Seconds", "Minutes", "Hours", "Days", "Weeks"] {
        c.function(FunctionName::new(unit, 4, true), vec![float_t], duration_t, true, constructor_float(unit));
    }
    for unit in [
        "InNanoseconds", "InMicroseconds", "InMilliseconds", "InSeconds", "InMinutes", "InHours", "InDays", "InHertz",
    ] {
        c.function(FunctionName::new(unit, 3, true), vec![duration_t], float_t, true, extractor(unit));
    }

    // calendar field getters
    c.function(FunctionName::new("GetYear", 4, true), vec![datetime_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(i64::from(chrono::Datelike::year(&args[0].unbox_datetime()))))
    }));
    c.function(FunctionName::new("GetMonth", 4, true), vec![datetime_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(i64::from(chrono::Datelike::month(&args[0].unbox_datetime()))))
    }));
    c.function(FunctionName::new("GetDay", 4, true), vec![datetime_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(i64::from(chrono::Datelike::day(&args[0].unbox_datetime()))))
    }));
    c.function(FunctionName::new("GetDayOfWeek", 7, true), vec![datetime_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(i64::from(
            chrono::Datelike::weekday(&args[0].unbox_datetime()).num_days_from_sunday(),
        )))
    }));
    c.function(FunctionName::new("GetHour", 4, true), vec![datetime_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(i64::from(args[0].unbox_datetime().hour())))
    }));
    c.function(FunctionName::new("GetMinute", 4, true), vec![datetime_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(i64::from(args[0].unbox_datetime().minute())))
    }));
    c.function(FunctionName::new("GetMillisecond", 5, true), vec![datetime_t], int_t, true, cb!(|_, args| {
        Ok(Value::from(i64::from(args[0].unbox_datetime().timestamp_subsec_millis())))
    }));

    // age helpers; clock-dependent, never folded
    c.function(FunctionName::new("Age", 3, true), vec![datetime_t], duration_t, false, cb!(|_, args| {
        Ok(Value::from(Utc::now() - args[0].unbox_datetime()))
    }));
    c.function(
        FunctionName::new("IsOlderThan", 3, true),
        vec![datetime_t, duration_t],
        bool_t,
        false,
        cb!(|_, args| Ok(Value::from(Utc::now() - args[0].unbox_datetime() > args[1].unbox_duration()))),
    );

    // datetime/duration arithmetic
    c.binary("-", datetime_t, datetime_t, duration_t, true, cb!(|_, args| {
        Ok(Value::from(args[0].unbox_datetime() - args[1].unbox_datetime()))
    }));
    c.binary("+", datetime_t, duration_t, datetime_t, true, cb!(|_, args| {
        checked_add(args[0].unbox_datetime(), args[1].unbox_duration())
    }));
    c.binary("+", duration_t, datetime_t, datetime_t, true, cb!(|_, args| {
        checked_add(args[1].unbox_datetime(), args[0].unbox_duration())
    }));
    c.binary("-", datetime_t, duration_t, datetime_t, true, cb!(|_, args| {
        args[0]
            .unbox_datetime()
            .checked_sub_signed(args[1].unbox_duration())
            .map(Value::from)
            .ok_or_else(|| out_of_range("DateTime"))
    }));
    c.binary("+", duration_t, duration_t, duration_t, true, cb!(|_, args| {
        args[0]
            .unbox_duration()
            .checked_add(&args[1].unbox_duration())
            .map(Value::from)
            .ok_or_else(|| out_of_range("Duration"))
    }));
    c.binary("-", duration_t, duration_t, duration_t, true, cb!(|_, args| {
        args[0]
            .unbox_duration()
            .checked_sub(&args[1].unbox_duration())
            .map(Value::from)
            .ok_or_else(|| out_of_range("Duration"))
    }));
    c.binary("*", duration_t, int_t, duration_t, true, cb!(|_, args| {
        duration_from_nanos(duration_nanos(&args[0]) * args[1].unbox_int() as f64)
    }));
    c.binary("*", int_t, duration_t, duration_t, true, cb!(|_, args| {
        duration_from_nanos(duration_nanos(&args[1]) * args[0].unbox_int() as f64)
    }));
    c.binary("*", duration_t, float_t, duration_t, true, cb!(|_, args| {
        duration_from_nanos(duration_nanos(&args[0]) * args[1].unbox_float())
    }));
    c.binary("*", float_t, duration_t, duration_t, true, cb!(|_, args| {
        duration_from_nanos(duration_nanos(&args[1]) * args[0].unbox_float())
    }));
    c.binary("/", duration_t, int_t, duration_t, true, cb!(|_, args| {
        duration_from_nanos(duration_nanos(&args[0]) / args[1].unbox_int() as f64)
    }));
    c.binary("/", duration_t, float_t, duration_t, true, cb!(|_, args| {
        duration_from_nanos(duration_nanos(&args[0]) / args[1].unbox_float())
    }));

    // comparisons
    install_comparisons(&mut c);

    c
}

fn checked_add(datetime: DateTime<Utc>, duration: TimeDelta) -> ExprResult<Value> {
    datetime
        .checked_add_signed(duration)
        .map(Value::from)
        .ok_or_else(|| out_of_range("DateTime"))
}

fn month_constant(value: i64) -> crate::plugin::Callback {
    // one fn per constant value, selected by index
    match value {
        0 => cb!(|_, _args| Ok(Value::from(0i64))),
        1 => cb!(|_, _args| Ok(Value::from(1i64))),
        2 => cb!(|_, _args| Ok(Value::from(2i64))),
        3 => cb!(|_, _args| Ok(Value::from(3i64))),
        4 => cb!(|_, _args| Ok(Value::from(4i64))),
        5 => cb!(|_, _args| Ok(Value::from(5i64))),
        6 => cb!(|_, _args| Ok(Value::from(6i64))),
        7 => cb!(|_, _args| Ok(Value::from(7i64))),
        8 => cb!(|_, _args| Ok(Value::from(8i64))),
        9 => cb!(|_, _args| Ok(Value::from(9i64))),
        10 => cb!(|_, _args| Ok(Value::from(10i64))),
        11 => cb!(|_, _args| Ok(Value::from(11i64))),
        12 => cb!(|_, _args| Ok(Value::from(12i64))),
        _ => unreachable!("constant out of range"),
    }
}

fn install_comparisons(c: &mut Calculus) {
    let bool_t = types::BOOLEAN;
    let datetime_t = types::DATETIME;
    let duration_t = types::DURATION;

    c.binary("<", datetime_t, datetime_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_datetime() < args[1].unbox_datetime()))));
    c.binary("<=", datetime_t, datetime_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_datetime() <= args[1].unbox_datetime()))));
    c.binary(">", datetime_t, datetime_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_datetime() > args[1].unbox_datetime()))));
    c.binary(">=", datetime_t, datetime_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_datetime() >= args[1].unbox_datetime()))));
    c.binary("==", datetime_t, datetime_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_datetime() == args[1].unbox_datetime()))));
    c.binary("!=", datetime_t, datetime_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_datetime() != args[1].unbox_datetime()))));

    c.binary("<", duration_t, duration_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_duration() < args[1].unbox_duration()))));
    c.binary("<=", duration_t, duration_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_duration() <= args[1].unbox_duration()))));
    c.binary(">", duration_t, duration_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_duration() > args[1].unbox_duration()))));
    c.binary(">=", duration_t, duration_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_duration() >= args[1].unbox_duration()))));
    c.binary("==", duration_t, duration_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_duration() == args[1].unbox_duration()))));
    c.binary("!=", duration_t, duration_t, bool_t, true, cb!(|_, args| Ok(Value::from(args[0].unbox_duration() != args[1].unbox_duration()))));
}
