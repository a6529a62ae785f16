//! Format parsers
//!
//! Every parser produces flat properties through [`flatten`](crate::flatten).
//! Documents must be maps at the top level; empty input yields no
//! properties.

mod fallback;
mod json;
mod properties;
mod toml_parser;
mod yaml;

use std::path::Path;
use std::sync::Arc;

use strata_core::Parser;

pub use fallback::DefaultParser;
pub use json::JsonParser;
pub use properties::PropertiesParser;
pub use toml_parser::TomlParser;
pub use yaml::YamlParser;

/// Pick a parser from a file extension, falling back to [`DefaultParser`]
pub fn parser_for_path(path: &str) -> Arc<dyn Parser> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("yaml") | Some("yml") => Arc::new(YamlParser),
        Some("json") => Arc::new(JsonParser),
        Some("toml") => Arc::new(TomlParser),
        Some("properties") | Some("props") => Arc::new(PropertiesParser),
        _ => Arc::new(DefaultParser::default()),
    }
}

fn is_blank(data: &[u8]) -> bool {
    data.iter().all(|b| b.is_ascii_whitespace())
}
