use strata_core::{Parser, Properties, StrataError, StrataResult, Value};

use crate::flatten::flatten;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, data: &[u8], prefix: &str) -> StrataResult<Properties> {
        if super::is_blank(data) {
            return Ok(Properties::new());
        }
        let doc: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| StrataError::parse_error(format!("invalid json: {e}")))?;
        match Value::from(doc) {
            map @ Value::Map(_) => Ok(flatten(map, prefix)),
            other => Err(StrataError::parse_error(format!(
                "json document must be an object, found {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let props = JsonParser
            .parse(br#"{"db": {"port": 5432, "hosts": ["a", "b"]}}"#, "")
            .unwrap();
        assert_eq!(props.get("db.port"), Some(&Value::Int(5432)));
        assert_eq!(props.get("db.hosts"), Some(&Value::Int(2)));
        assert_eq!(props.get("db.hosts[1]"), Some(&Value::from("b")));
    }

    #[test]
    fn test_json_must_be_object() {
        assert!(JsonParser.parse(b"[1, 2]", "").is_err());
        assert!(JsonParser.parse(b"{oops", "").is_err());
        assert!(JsonParser.parse(b"  \n", "").unwrap().is_empty());
    }
}
