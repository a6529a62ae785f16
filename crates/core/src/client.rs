//! Backend client contract
//!
//! A client fetches raw bytes for a path, optionally writes them back,
//! and reports fresh content through a callback when it observes a
//! change. The engine never looks inside the bytes; that is the job of a
//! [`Parser`](crate::parser::Parser).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{StrataError, StrataResult};

/// Callback invoked with the new raw content of a watched path
pub type ChangeCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Raw access to one configuration backend
#[async_trait]
pub trait Client: Send + Sync {
    /// Backend name, used in logs and errors
    fn name(&self) -> &str;

    /// Fetch the current content of `path`. Must be safe to call while
    /// the same path is being watched.
    async fn pull(&self, path: &str) -> StrataResult<Vec<u8>>;

    /// Write raw content. Read-only backends keep the default.
    async fn push(&self, path: &str, _data: &[u8]) -> StrataResult<()> {
        let _ = path;
        Err(StrataError::not_implemented(self.name(), "push"))
    }

    /// Register `on_change` for `path`. Watching an already watched path
    /// is a no-op. Returns [`StrataError::WatchDisabled`] when watching
    /// is switched off for this client.
    fn watch(&self, path: &str, on_change: ChangeCallback) -> StrataResult<()>;

    /// Release backend resources
    fn close(&self) -> StrataResult<()> {
        Ok(())
    }
}

/// Settings handed to a client constructor
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub watch_disabled: bool,
    /// Quiet period before a burst of backend notifications is re-read
    pub debounce: Duration,
    /// Key prefix filter, meaning is backend specific
    pub prefix: String,
    /// Raw command line arguments for argument based backends
    pub args: Vec<String>,
    /// Free-form backend options (endpoints, namespaces, credentials)
    pub extra: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            watch_disabled: false,
            debounce: Duration::from_millis(50),
            prefix: String::new(),
            args: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

type Constructor = Arc<dyn Fn(&ClientConfig) -> StrataResult<Arc<dyn Client>> + Send + Sync>;

/// Maps backend names to client constructors
#[derive(Clone, Default)]
pub struct ClientRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&ClientConfig) -> StrataResult<Arc<dyn Client>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a client by backend name. Unknown names fail immediately.
    pub fn create(&self, name: &str, config: &ClientConfig) -> StrataResult<Arc<dyn Client>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| StrataError::UnknownClient(name.to_string()))?;
        constructor(config)
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticClient;

    #[async_trait]
    impl Client for StaticClient {
        fn name(&self) -> &str {
            "static"
        }

        async fn pull(&self, _path: &str) -> StrataResult<Vec<u8>> {
            Ok(b"a: 1".to_vec())
        }

        fn watch(&self, _path: &str, _on_change: ChangeCallback) -> StrataResult<()> {
            Err(StrataError::WatchDisabled)
        }
    }

    #[tokio::test]
    async fn test_registry_create_and_unknown() {
        let mut registry = ClientRegistry::new();
        registry.register("static", |_| Ok(Arc::new(StaticClient) as Arc<dyn Client>));

        let client = registry
            .create("static", &ClientConfig::default())
            .expect("registered client");
        assert_eq!(client.pull("any").await.unwrap(), b"a: 1".to_vec());
        assert!(matches!(
            client.push("any", b"").await,
            Err(StrataError::NotImplemented { .. })
        ));

        let err = registry
            .create("etcd", &ClientConfig::default())
            .err()
            .expect("unknown client must fail");
        assert!(matches!(err, StrataError::UnknownClient(name) if name == "etcd"));
    }
}
