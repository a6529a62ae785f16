//! Typed accessors
//!
//! `get_*` return the supplied default when the key is missing or its
//! value cannot be coerced. `require_*` report either case as an error.

use std::time::Duration;

use strata_core::{StrataError, StrataResult, Value};

use crate::Manager;

fn mismatch(key: &str, expected: &str, found: &Value) -> StrataError {
    StrataError::Decode {
        errors: vec![format!(
            "{key}: cannot convert {} `{found}` to {expected}",
            found.type_name()
        )],
    }
}

impl Manager {
    fn require_with<T>(
        &self,
        key: &str,
        expected: &str,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> StrataResult<T> {
        let value = self.expand(key)?;
        convert(&value).ok_or_else(|| mismatch(key, expected, &value))
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(|v| v.to_text())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.to_i64()).unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.to_u64()).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.to_f64()).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.to_bool()).unwrap_or(default)
    }

    pub fn get_duration(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.to_duration())
            .unwrap_or(default)
    }

    pub fn require_string(&self, key: &str) -> StrataResult<String> {
        self.require_with(key, "string", Value::to_text)
    }

    pub fn require_i64(&self, key: &str) -> StrataResult<i64> {
        self.require_with(key, "i64", Value::to_i64)
    }

    pub fn require_u64(&self, key: &str) -> StrataResult<u64> {
        self.require_with(key, "u64", Value::to_u64)
    }

    pub fn require_f64(&self, key: &str) -> StrataResult<f64> {
        self.require_with(key, "f64", Value::to_f64)
    }

    pub fn require_bool(&self, key: &str) -> StrataResult<bool> {
        self.require_with(key, "bool", Value::to_bool)
    }

    pub fn require_duration(&self, key: &str) -> StrataResult<Duration> {
        self.require_with(key, "duration", Value::to_duration)
    }
}
