use std::collections::BTreeMap;

use async_trait::async_trait;

use strata_core::{ChangeCallback, Client, ClientConfig, StrataError, StrataResult};

/// Command line flags as a JSON object.
///
/// Accepts `--key value`, `--key=value` and bare `--flag` (true). Values
/// that parse as JSON keep their type; everything else is a string.
/// Arguments not starting with `--` are skipped.
#[derive(Debug, Clone, Default)]
pub struct FlagClient {
    args: Vec<String>,
    watch_disabled: bool,
}

impl FlagClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            args: config.args.clone(),
            watch_disabled: config.watch_disabled,
        }
    }

    pub fn parse_args(args: &[String]) -> BTreeMap<String, serde_json::Value> {
        let mut out = BTreeMap::new();
        let mut iter = args.iter().peekable();
        while let Some(arg) = iter.next() {
            let Some(flag) = arg.strip_prefix("--") else {
                continue;
            };
            if flag.is_empty() {
                continue;
            }
            if let Some((key, value)) = flag.split_once('=') {
                out.insert(key.to_string(), typed(value));
                continue;
            }
            match iter.peek() {
                Some(next) if !next.starts_with("--") => {
                    out.insert(flag.to_string(), typed(next));
                    iter.next();
                }
                _ => {
                    out.insert(flag.to_string(), serde_json::Value::Bool(true));
                }
            }
        }
        out
    }
}

fn typed(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[async_trait]
impl Client for FlagClient {
    fn name(&self) -> &str {
        super::FLAG
    }

    async fn pull(&self, _path: &str) -> StrataResult<Vec<u8>> {
        Ok(serde_json::to_vec(&Self::parse_args(&self.args))?)
    }

    fn watch(&self, _path: &str, _on_change: ChangeCallback) -> StrataResult<()> {
        if self.watch_disabled {
            return Err(StrataError::WatchDisabled);
        }
        Ok(())
    }
}
