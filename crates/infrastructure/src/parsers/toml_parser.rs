use strata_core::{Parser, Properties, StrataError, StrataResult, Value};

use crate::flatten::flatten;

#[derive(Debug, Clone, Copy, Default)]
pub struct TomlParser;

impl Parser for TomlParser {
    fn parse(&self, data: &[u8], prefix: &str) -> StrataResult<Properties> {
        let text = std::str::from_utf8(data)
            .map_err(|e| StrataError::parse_error(format!("toml is not utf-8: {e}")))?;
        let table: toml::Table = toml::from_str(text)
            .map_err(|e| StrataError::parse_error(format!("invalid toml: {e}")))?;
        Ok(flatten(convert(toml::Value::Table(table)), prefix))
    }
}

fn convert(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Int(i),
        toml::Value::Float(f) => Value::Float(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(convert).collect()),
        toml::Value::Table(table) => {
            Value::Map(table.into_iter().map(|(k, v)| (k, convert(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let doc = b"title = \"demo\"\n[db]\nport = 5432\nstarted = 1979-05-27T07:32:00Z\n";
        let props = TomlParser.parse(doc, "").unwrap();
        assert_eq!(props.get("title"), Some(&Value::from("demo")));
        assert_eq!(props.get("db.port"), Some(&Value::Int(5432)));
        assert_eq!(
            props.get("db.started"),
            Some(&Value::from("1979-05-27T07:32:00Z"))
        );
    }
}
