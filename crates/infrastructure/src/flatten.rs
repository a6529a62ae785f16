//! Nested document to flat properties

use strata_core::parser::{prefixed, Properties};
use strata_core::Value;

/// Flatten `value` below `prefix`.
///
/// Maps contribute dot separated keys and arrays contribute `key[i]`
/// entries; the array key itself holds the element count. Empty maps
/// contribute nothing.
pub fn flatten(value: Value, prefix: &str) -> Properties {
    let mut out = Properties::new();
    flatten_into(value, prefix, &mut out);
    out
}

pub fn flatten_into(value: Value, key: &str, out: &mut Properties) {
    match value {
        Value::Map(map) => {
            for (k, v) in map {
                flatten_into(v, &prefixed(key, &k), out);
            }
        }
        Value::Array(items) => {
            let len = items.len();
            for (i, item) in items.into_iter().enumerate() {
                flatten_into(item, &format!("{key}[{i}]"), out);
            }
            out.insert(key.to_string(), Value::Int(len as i64));
        }
        scalar => {
            out.insert(key.to_string(), scalar);
        }
    }
}
