//! Dynamic value model shared by both schema backends.
//!
//! It mirrors the JSON data model and adds two kinds JSON cannot carry on its
//! own: arbitrary-precision integers (`BigInt`) and timestamps (`Date`). Both
//! show up on the coercion side of `parse` and are flattened back into JSON by
//! [`Value::to_json`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Largest integer an `f64` represents exactly (2^53).
const MAX_SAFE_INTEGER: i128 = 9_007_199_254_740_992;

pub type Map = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    /// Build an object value from `(key, value)` pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Short type name used in issue messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::BigInt(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Object member lookup; `None` for non-objects and missing keys.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Lossy projection into plain JSON.
    ///
    /// Integral numbers inside the safe range are emitted as JSON integers,
    /// dates as RFC 3339 strings with millisecond precision, bigints as JSON
    /// integers when they fit in 64 bits and as decimal strings otherwise.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::BigInt(i) => {
                if let Ok(v) = i64::try_from(*i) {
                    Json::from(v)
                } else if let Ok(v) = u64::try_from(*i) {
                    Json::from(v)
                } else {
                    Json::String(i.to_string())
                }
            }
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && (n.abs() as i128) < MAX_SAFE_INTEGER {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i128::from(i).abs() > MAX_SAFE_INTEGER {
                        Value::BigInt(i128::from(i))
                    } else {
                        Value::Number(i as f64)
                    }
                } else if let Some(u) = n.as_u64() {
                    Value::BigInt(i128::from(u))
                } else {
                    Value::Number(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        Value::from(v.clone())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i128> for Value {
    fn from(n: i128) -> Self {
        Value::BigInt(n)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn json_integers_stay_numbers_inside_safe_range() {
        assert_eq!(Value::from(json!(42)), Value::Number(42.0));
        assert_eq!(Value::from(json!(-7)), Value::Number(-7.0));
        assert_eq!(Value::from(json!(1.5)), Value::Number(1.5));
    }

    #[test]
    fn json_integers_beyond_safe_range_become_bigints() {
        let big = u64::MAX;
        assert_eq!(Value::from(json!(big)), Value::BigInt(i128::from(big)));
        assert_eq!(
            Value::from(json!(9_007_199_254_740_993_i64)),
            Value::BigInt(9_007_199_254_740_993)
        );
    }

    #[test]
    fn to_json_flattens_dates_and_bigints() {
        let date = Utc.timestamp_millis_opt(42).single().unwrap();
        let v = Value::object([
            ("at", Value::Date(date)),
            ("small", Value::BigInt(5)),
            ("huge", Value::BigInt(i128::MAX)),
            ("n", Value::Number(3.0)),
        ]);
        assert_eq!(
            v.to_json(),
            json!({
                "at": "1970-01-01T00:00:00.042Z",
                "small": 5,
                "huge": i128::MAX.to_string(),
                "n": 3
            })
        );
    }

    #[test]
    fn serde_goes_through_json() {
        let v: Value = serde_json::from_str(r#"{"a":[1,true,null,"x"]}"#).unwrap();
        assert_eq!(
            v.get("a").and_then(Value::as_array).map(Vec::len),
            Some(4)
        );
        let back = serde_json::to_value(&v).unwrap();
        assert_eq!(back, json!({"a":[1,true,null,"x"]}));
    }
}
