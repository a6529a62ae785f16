use std::collections::BTreeMap;

use async_trait::async_trait;

use strata_core::{ChangeCallback, Client, ClientConfig, StrataError, StrataResult};

/// Process environment as a JSON object.
///
/// Every variable is published under its own name and under a lower
/// case dotted alias (`DB_HOST` is also `db.host`). With a prefix, only
/// matching variables are read and the prefix is stripped first. The
/// environment cannot report changes, so watching is a no-op.
#[derive(Debug, Clone, Default)]
pub struct EnvClient {
    prefix: String,
    watch_disabled: bool,
}

impl EnvClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            watch_disabled: config.watch_disabled,
        }
    }

    /// Snapshot of `vars` after prefix filtering and aliasing
    pub fn collect<I>(&self, vars: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut out = BTreeMap::new();
        for (name, value) in vars {
            let name = if self.prefix.is_empty() {
                name
            } else {
                match name.strip_prefix(&self.prefix) {
                    Some(rest) => rest.trim_start_matches('_').to_string(),
                    None => continue,
                }
            };
            if name.is_empty() {
                continue;
            }
            let alias = name.replace('_', ".").to_lowercase();
            if !alias.starts_with('.') && alias != name {
                out.insert(alias, value.clone());
            }
            out.insert(name, value);
        }
        out
    }
}

#[async_trait]
impl Client for EnvClient {
    fn name(&self) -> &str {
        super::ENV
    }

    async fn pull(&self, _path: &str) -> StrataResult<Vec<u8>> {
        let snapshot = self.collect(std::env::vars());
        Ok(serde_json::to_vec(&snapshot)?)
    }

    fn watch(&self, _path: &str, _on_change: ChangeCallback) -> StrataResult<()> {
        if self.watch_disabled {
            return Err(StrataError::WatchDisabled);
        }
        Ok(())
    }
}
