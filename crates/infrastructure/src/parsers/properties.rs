use strata_core::parser::prefixed;
use strata_core::{Parser, Properties, StrataResult, Value};

/// `key = value` lines. `#` starts a comment, both on its own line and
/// after a value. Values stay strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertiesParser;

impl Parser for PropertiesParser {
    fn parse(&self, data: &[u8], prefix: &str) -> StrataResult<Properties> {
        let text = String::from_utf8_lossy(data);
        let mut out = Properties::new();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() || key.starts_with('#') {
                continue;
            }
            let value = match value.find('#') {
                Some(i) if i > 0 => &value[..i],
                _ => value,
            };
            out.insert(prefixed(prefix, key), Value::from(value.trim()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let doc = b"# header\ndb.host = localhost # primary\ndb.port=5432\nnot a pair\n";
        let props = PropertiesParser.parse(doc, "app").unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("app.db.host"), Some(&Value::from("localhost")));
        assert_eq!(props.get("app.db.port"), Some(&Value::from("5432")));
    }
}
