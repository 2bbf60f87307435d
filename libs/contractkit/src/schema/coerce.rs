//! Coercion rules applied by `parse` before validation. Strings are never coerced.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::value::Value;

pub(crate) fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::BigInt(i) => Some(*i as f64),
        Value::Date(d) => Some(d.timestamp_millis() as f64),
        Value::Array(_) | Value::Object(_) => None,
    }
}

pub(crate) fn to_bigint(value: &Value) -> Option<i128> {
    match value {
        Value::BigInt(i) => Some(*i),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i128),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

pub(crate) fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

pub(crate) fn to_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(d) => Some(*d),
        Value::String(s) => parse_date_str(s),
        Value::Number(n) if n.is_finite() => from_millis(*n as i64),
        Value::BigInt(i) => i64::try_from(*i).ok().and_then(from_millis),
        Value::Bool(b) => from_millis(i64::from(*b)),
        _ => None,
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// RFC 3339, then naive date-times (assumed UTC), then plain dates.
pub(crate) fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_like_inputs() {
        let date = Utc.timestamp_millis_opt(42).single().unwrap();
        assert_eq!(to_number(&Value::from("42")), Some(42.0));
        assert_eq!(to_number(&Value::Number(42.0)), Some(42.0));
        assert_eq!(to_number(&Value::Bool(true)), Some(1.0));
        assert_eq!(to_number(&Value::Null), Some(0.0));
        assert_eq!(to_number(&Value::BigInt(42)), Some(42.0));
        assert_eq!(to_number(&Value::Date(date)), Some(42.0));
        assert_eq!(to_number(&Value::from("abc")), None);
        assert_eq!(to_number(&Value::from("  ")), None);
        assert_eq!(to_number(&Value::from("inf")), None);
    }

    #[test]
    fn booleans_accept_case_insensitive_words_only() {
        assert_eq!(to_boolean(&Value::from("TRUE")), Some(true));
        assert_eq!(to_boolean(&Value::from("False")), Some(false));
        assert_eq!(to_boolean(&Value::from("1")), None);
        assert_eq!(to_boolean(&Value::Number(1.0)), None);
    }

    #[test]
    fn bigint_rejects_fractions() {
        assert_eq!(to_bigint(&Value::Number(7.0)), Some(7));
        assert_eq!(to_bigint(&Value::Number(7.5)), None);
        assert_eq!(to_bigint(&Value::from("170141183460469231731687303715884105727")), Some(i128::MAX));
    }

    #[test]
    fn dates_from_strings_numbers_and_booleans() {
        let d = to_date(&Value::from("2024-05-01T10:00:00Z")).unwrap();
        assert_eq!(d.timestamp(), 1_714_557_600);
        assert_eq!(
            to_date(&Value::from("2024-05-01")).map(|d| d.timestamp()),
            Some(1_714_521_600)
        );
        assert_eq!(to_date(&Value::Number(42.0)).map(|d| d.timestamp_millis()), Some(42));
        assert_eq!(to_date(&Value::Bool(true)).map(|d| d.timestamp_millis()), Some(1));
        assert_eq!(to_date(&Value::from("not a date")), None);
    }
}
