//! Parser contract: raw bytes in, flat key/value map out

use std::collections::BTreeMap;

use crate::value::Value;
use crate::StrataResult;

/// Flat key to value map produced by a parser
pub type Properties = BTreeMap<String, Value>;

/// Turns raw backend content into flat properties.
///
/// Implementations are stateless; `prefix`, when non-empty, is prepended
/// to every produced key with a `.` separator.
pub trait Parser: Send + Sync {
    fn parse(&self, data: &[u8], prefix: &str) -> StrataResult<Properties>;
}

/// Join a prefix and a key the way every parser does
pub fn prefixed(prefix: &str, key: &str) -> String {
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) if key.starts_with('[') => format!("{prefix}{key}"),
        (false, false) => format!("{prefix}.{key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed() {
        assert_eq!(prefixed("", "a.b"), "a.b");
        assert_eq!(prefixed("app", "a.b"), "app.a.b");
        assert_eq!(prefixed("app", "[0]"), "app[0]");
        assert_eq!(prefixed("app", ""), "app");
    }
}
