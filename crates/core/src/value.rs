//! Dynamic configuration value
//!
//! Configuration values arrive from heterogeneous backends, so they are
//! modelled as a closed sum type. Equality is structural and every
//! coercion is a total function returning `None` when the value cannot
//! be represented in the requested type.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A configuration value of arbitrary shape
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Textual form of a scalar. Containers have no textual form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Array(_) | Value::Map(_) => None,
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Value::String(s) => s
                .trim()
                .parse::<u64>()
                .ok()
                .or_else(|| self.to_i64().and_then(|i| u64::try_from(i).ok())),
            Value::Float(f) if *f >= 0.0 && f.fract() == 0.0 && f.is_finite() => Some(*f as u64),
            _ => self.to_i64().and_then(|i| u64::try_from(i).ok()),
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Accepts `1/t/true` and `0/f/false` in any letter case.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::String(s) => {
                let s = s.trim();
                if s == "1" || s.eq_ignore_ascii_case("t") || s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s == "0"
                    || s.eq_ignore_ascii_case("f")
                    || s.eq_ignore_ascii_case("false")
                {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Durations are written in humantime syntax (`1h 30m`, `250ms`, `2d`).
    /// Bare numbers are seconds.
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok().map(Duration::from_secs),
            Value::Float(f) if *f >= 0.0 && f.is_finite() => Some(Duration::from_secs_f64(*f)),
            Value::String(s) => {
                let s = s.trim();
                humantime::parse_duration(s).ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| *f >= 0.0 && f.is_finite())
                        .map(Duration::from_secs_f64)
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(_) | Value::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{json}")
            }
            other => match other.to_text() {
                Some(text) => write!(f, "{text}"),
                None => Err(fmt::Error),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = Value::Map(BTreeMap::from([(
            "hosts".to_string(),
            Value::Array(vec!["a".into(), "b".into()]),
        )]));
        let b = Value::Map(BTreeMap::from([(
            "hosts".to_string(),
            Value::Array(vec!["a".into(), "b".into()]),
        )]));
        assert_eq!(a, b);
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::from("8080").to_i64(), Some(8080));
        assert_eq!(Value::from(" 42 ").to_u64(), Some(42));
        assert_eq!(Value::from(-1).to_u64(), None);
        assert_eq!(Value::Float(3.0).to_i64(), Some(3));
        assert_eq!(Value::Float(3.5).to_i64(), None);
        assert_eq!(Value::from("2.5").to_f64(), Some(2.5));
        assert_eq!(Value::Array(vec![]).to_i64(), None);
    }

    #[test]
    fn test_bool_coercion() {
        for s in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(Value::from(s).to_bool(), Some(true), "{s}");
        }
        for s in ["0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(Value::from(s).to_bool(), Some(false), "{s}");
        }
        assert_eq!(Value::from("yes").to_bool(), None);
        assert_eq!(Value::Int(2).to_bool(), Some(true));
    }

    #[test]
    fn test_duration_coercion() {
        assert_eq!(
            Value::from("1h 30m").to_duration(),
            Some(Duration::from_secs(5400))
        );
        assert_eq!(
            Value::from("250ms").to_duration(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(Value::from(30).to_duration(), Some(Duration::from_secs(30)));
        assert_eq!(Value::from("15").to_duration(), Some(Duration::from_secs(15)));
        assert_eq!(Value::from("soon").to_duration(), None);
    }

    #[test]
    fn test_text_form() {
        assert_eq!(Value::from(5).to_text().as_deref(), Some("5"));
        assert_eq!(Value::from(true).to_text().as_deref(), Some("true"));
        assert_eq!(Value::Null.to_text().as_deref(), Some(""));
        assert_eq!(Value::Array(vec![]).to_text(), None);
        assert_eq!(
            Value::Array(vec![1.into(), "x".into()]).to_string(),
            r#"[1,"x"]"#
        );
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"port": 8080, "ratio": 0.5, "tags": ["a"], "on": true});
        let value = Value::from(json.clone());
        assert_eq!(
            value.as_map().and_then(|m| m.get("port")),
            Some(&Value::Int(8080))
        );
        let back: serde_json::Value = value.into();
        assert_eq!(back, json);
    }
}
