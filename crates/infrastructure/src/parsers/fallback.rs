use tracing::debug;

use strata_core::{Parser, Properties, StrataResult};

use super::{JsonParser, PropertiesParser, TomlParser, YamlParser};

/// Tries YAML, JSON and TOML in turn, then reads the input as properties
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParser {
    yaml: YamlParser,
    json: JsonParser,
    toml: TomlParser,
    properties: PropertiesParser,
}

impl Parser for DefaultParser {
    fn parse(&self, data: &[u8], prefix: &str) -> StrataResult<Properties> {
        let yaml_err = match self.yaml.parse(data, prefix) {
            Ok(props) => return Ok(props),
            Err(e) => e,
        };
        if let Ok(props) = self.json.parse(data, prefix) {
            return Ok(props);
        }
        if let Ok(props) = self.toml.parse(data, prefix) {
            return Ok(props);
        }
        debug!(error = %yaml_err, "structured formats rejected input, reading as properties");
        self.properties.parse(data, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Value;

    #[test]
    fn test_fallback_chain() {
        let parser = DefaultParser::default();

        let yaml = parser.parse(b"a:\n  b: 1\n", "").unwrap();
        assert_eq!(yaml.get("a.b"), Some(&Value::Int(1)));

        let toml = parser.parse(b"x = 1\ny = \"two\"\n", "").unwrap();
        assert_eq!(toml.get("x"), Some(&Value::Int(1)));
        assert_eq!(toml.get("y"), Some(&Value::from("two")));

        let props = parser.parse(b"x.y = 1 = 2\nz = a # c\n", "").unwrap();
        assert_eq!(props.get("z"), Some(&Value::from("a")));
    }
}
