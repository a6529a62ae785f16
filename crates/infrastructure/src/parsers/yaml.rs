use serde::Deserialize;
use strata_core::{Parser, Properties, StrataError, StrataResult, Value};

use crate::flatten::flatten_into;

/// YAML parser. Multi-document streams are merged in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

impl Parser for YamlParser {
    fn parse(&self, data: &[u8], prefix: &str) -> StrataResult<Properties> {
        let mut out = Properties::new();
        for document in serde_yaml::Deserializer::from_slice(data) {
            let doc = serde_yaml::Value::deserialize(document)
                .map_err(|e| StrataError::parse_error(format!("invalid yaml: {e}")))?;
            match convert(doc)? {
                Value::Null => {}
                map @ Value::Map(_) => flatten_into(map, prefix, &mut out),
                other => {
                    return Err(StrataError::parse_error(format!(
                        "yaml document must be a map, found {}",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(out)
    }
}

fn convert(value: serde_yaml::Value) -> StrataResult<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(convert).collect::<StrataResult<_>>()?)
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in mapping {
                map.insert(map_key(k)?, convert(v)?);
            }
            Value::Map(map)
        }
        serde_yaml::Value::Tagged(tagged) => convert(tagged.value)?,
    })
}

/// Scalar keys are accepted in their textual form
fn map_key(key: serde_yaml::Value) -> StrataResult<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(StrataError::parse_error(format!(
            "map key {other:?} is not a scalar"
        ))),
    }
}
