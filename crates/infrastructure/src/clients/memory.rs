use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use strata_core::{ChangeCallback, Client, ClientConfig, StrataError, StrataResult};

/// In-process document store.
///
/// `push` replaces a document and notifies its watcher on the calling
/// thread. Useful for embedding programmatic sources and for tests.
#[derive(Default)]
pub struct MemoryClient {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    watchers: RwLock<HashMap<String, ChangeCallback>>,
    watch_disabled: bool,
}

impl MemoryClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            watch_disabled: config.watch_disabled,
            ..Self::default()
        }
    }

    pub fn with_document(self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.documents.write().insert(path.into(), data.into());
        self
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.watchers.read().contains_key(path)
    }
}

#[async_trait]
impl Client for MemoryClient {
    fn name(&self) -> &str {
        super::MEMORY
    }

    async fn pull(&self, path: &str) -> StrataResult<Vec<u8>> {
        self.documents
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StrataError::pull_error(super::MEMORY, path, "no such document"))
    }

    async fn push(&self, path: &str, data: &[u8]) -> StrataResult<()> {
        self.documents.write().insert(path.to_string(), data.to_vec());
        let watcher = self.watchers.read().get(path).cloned();
        if let Some(on_change) = watcher {
            on_change(data.to_vec());
        }
        Ok(())
    }

    fn watch(&self, path: &str, on_change: ChangeCallback) -> StrataResult<()> {
        if self.watch_disabled {
            return Err(StrataError::WatchDisabled);
        }
        self.watchers
            .write()
            .entry(path.to_string())
            .or_insert(on_change);
        Ok(())
    }

    fn close(&self) -> StrataResult<()> {
        self.watchers.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_push_notifies_watcher_once() {
        let client = MemoryClient::default().with_document("app", "a: 1");
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        client
            .watch("app", Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        let ignored = Arc::clone(&calls);
        client
            .watch("app", Arc::new(move |_| {
                ignored.fetch_add(100, Ordering::SeqCst);
            }))
            .unwrap();

        client.push("app", b"a: 2").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.pull("app").await.unwrap(), b"a: 2".to_vec());
    }

    #[tokio::test]
    async fn test_missing_document_and_disabled_watch() {
        let client = MemoryClient::new(&ClientConfig {
            watch_disabled: true,
            ..ClientConfig::default()
        });
        assert!(client.pull("nope").await.is_err());
        assert!(matches!(
            client.watch("nope", Arc::new(|_| {})),
            Err(StrataError::WatchDisabled)
        ));
    }
}
