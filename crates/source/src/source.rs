use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use strata_core::{
    Action, Client, DeliveryQueue, Event, Parser, Properties, StrataError, StrataResult, Value,
};
use strata_infrastructure::DefaultParser;

use crate::options::{PathOptions, SourceOptions};
use crate::path_store::PathStore;

/// Merged value together with the path that supplies it
struct Owned {
    path: String,
    priority: i32,
    value: Value,
}

#[derive(Default)]
struct SourceState {
    /// Sorted by priority, highest first
    stores: Vec<PathStore>,
    merged: HashMap<String, Owned>,
}

impl SourceState {
    fn store(&self, path: &str) -> Option<&PathStore> {
        self.stores.iter().find(|s| s.path() == path)
    }

    /// Resolve a path level event against the merged view. Returns the
    /// event to forward, if the merged value visibly changed.
    fn resolve(&mut self, path: &str, priority: i32, mut event: Event) -> Option<Event> {
        if event.action == Action::Deleted {
            return self.resolve_deleted(path, event);
        }
        let value = event.value_to.clone()?;
        let Some(owner) = self.merged.get_mut(&event.key) else {
            self.merged.insert(
                event.key.clone(),
                Owned {
                    path: path.to_string(),
                    priority,
                    value,
                },
            );
            event.action = Action::Created;
            event.value_from = None;
            return Some(event);
        };
        if priority < owner.priority {
            return None;
        }
        owner.path = path.to_string();
        owner.priority = priority;
        if owner.value == value {
            return None;
        }
        event.action = Action::Updated;
        event.value_from = Some(std::mem::replace(&mut owner.value, value));
        Some(event)
    }

    fn resolve_deleted(&mut self, path: &str, mut event: Event) -> Option<Event> {
        let owner = self.merged.get(&event.key)?;
        if owner.path != path {
            return None;
        }
        let fallback = self
            .stores
            .iter()
            .filter(|s| s.path() != path)
            .find_map(|s| {
                s.values()
                    .get(&event.key)
                    .map(|v| (s.path().to_string(), s.priority(), v.clone()))
            });

        match fallback {
            Some((next_path, next_priority, next_value)) => {
                let owner = self.merged.get_mut(&event.key)?;
                owner.path = next_path;
                owner.priority = next_priority;
                if owner.value == next_value {
                    return None;
                }
                event.action = Action::Updated;
                event.value_from = Some(std::mem::replace(&mut owner.value, next_value.clone()));
                event.value_to = Some(next_value);
                Some(event)
            }
            None => {
                let owner = self.merged.remove(&event.key)?;
                event.action = Action::Deleted;
                event.value_from = Some(owner.value);
                event.value_to = None;
                Some(event)
            }
        }
    }
}

struct SourceInner {
    name: String,
    priority: i32,
    prefix: String,
    with_deleted: bool,
    pull_timeout: Duration,
    client: Arc<dyn Client>,
    default_parser: Arc<dyn Parser>,
    state: RwLock<SourceState>,
    listener: RwLock<Option<DeliveryQueue<Vec<Event>>>>,
}

/// One configuration backend with its contributing paths.
///
/// Cloning is cheap and yields a handle to the same source.
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

/// Non-owning handle used by watch callbacks
#[derive(Clone)]
pub struct WeakSource {
    inner: Weak<SourceInner>,
}

impl WeakSource {
    pub fn upgrade(&self) -> Option<Source> {
        self.inner.upgrade().map(|inner| Source { inner })
    }
}

impl Source {
    /// Create a source over `client`. An empty name is replaced with a
    /// random `source-<n>` name.
    pub fn new(name: impl Into<String>, client: Arc<dyn Client>, options: SourceOptions) -> Self {
        let mut name = name.into();
        if name.is_empty() {
            name = format!("source-{}", rand::random::<u32>());
        }
        let default_parser = options
            .parser
            .unwrap_or_else(|| Arc::new(DefaultParser::default()));
        Self {
            inner: Arc::new(SourceInner {
                name,
                priority: options.priority,
                prefix: options.prefix,
                with_deleted: options.with_deleted,
                pull_timeout: options.pull_timeout,
                client,
                default_parser,
                state: RwLock::new(SourceState::default()),
                listener: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    pub fn client(&self) -> Arc<dyn Client> {
        Arc::clone(&self.inner.client)
    }

    pub fn downgrade(&self) -> WeakSource {
        WeakSource {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same source
    pub fn ptr_eq(&self, other: &Source) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.inner.state.read().store(path).is_some()
    }

    /// Registered paths, highest priority first
    pub fn paths(&self) -> Vec<String> {
        self.inner
            .state
            .read()
            .stores
            .iter()
            .map(|s| s.path().to_string())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .state
            .read()
            .merged
            .get(key)
            .map(|o| o.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.read().merged.contains_key(key)
    }

    pub fn all(&self) -> Properties {
        self.inner
            .state
            .read()
            .merged
            .iter()
            .map(|(k, o)| (k.clone(), o.value.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.state.read().merged.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Overwrite `key` in every path that defines it and in the merged
    /// view. Keys unknown to the source are left alone.
    pub fn set(&self, key: &str, value: Value) {
        let mut state = self.inner.state.write();
        for store in state.stores.iter_mut() {
            if let Some(slot) = store.values_mut().get_mut(key) {
                *slot = value.clone();
            }
        }
        if let Some(owner) = state.merged.get_mut(key) {
            owner.value = value;
        }
    }

    /// Route future change batches to `callback`. Batches are delivered
    /// in order on a separate consumer; a panicking callback is logged.
    pub fn on_events<F>(&self, callback: F)
    where
        F: Fn(Vec<Event>) + Send + Sync + 'static,
    {
        let queue = DeliveryQueue::spawn(format!("strata-source-{}", self.inner.name), callback);
        *self.inner.listener.write() = Some(queue);
    }

    /// Pull, parse and merge a new path, then start watching it.
    ///
    /// Adding a path twice is a no-op. A required path that cannot be
    /// pulled or parsed fails the call and leaves the source untouched;
    /// an optional one is added with no values.
    pub async fn add_path(&self, path: &str, options: PathOptions) -> StrataResult<()> {
        if self.has_path(path) {
            return Ok(());
        }
        let parser = options
            .parser
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.inner.default_parser));

        let props = match self.fetch(path, parser.as_ref()).await {
            Ok(props) => props,
            Err(e) if options.required => return Err(e),
            Err(e) => {
                warn!(source = %self.inner.name, path, error = %e, "optional path unavailable, continuing without it");
                Properties::new()
            }
        };

        {
            let mut state = self.inner.state.write();
            if state.store(path).is_some() {
                return Ok(());
            }
            state
                .stores
                .push(PathStore::new(path, options.priority, options.parser.clone()));
            state.stores.sort_by(|a, b| b.priority().cmp(&a.priority()));
            let events = self.populate(&mut state, path, props);
            self.emit(events);
        }
        info!(source = %self.inner.name, path, priority = options.priority, "path added");

        // Watch only once the initial batch is queued so later changes
        // cannot overtake it.
        if !options.watch_disabled {
            self.watch_path(path);
        }
        Ok(())
    }

    /// Apply fresh raw content of `path`, as reported by the client.
    pub fn handle_path_updated(&self, path: &str, data: &[u8]) -> StrataResult<()> {
        let parser = {
            let state = self.inner.state.read();
            let store = state.store(path).ok_or_else(|| {
                StrataError::Internal(format!("path {path} is not registered"))
            })?;
            store
                .parser()
                .cloned()
                .unwrap_or_else(|| Arc::clone(&self.inner.default_parser))
        };
        let props = parser.parse(data, &self.inner.prefix)?;
        let mut state = self.inner.state.write();
        let events = self.populate(&mut state, path, props);
        self.emit(events);
        Ok(())
    }

    pub fn close(&self) -> StrataResult<()> {
        self.inner.listener.write().take();
        self.inner.client.close()
    }

    async fn fetch(&self, path: &str, parser: &dyn Parser) -> StrataResult<Properties> {
        let name = &self.inner.name;
        let data = tokio::time::timeout(self.inner.pull_timeout, self.inner.client.pull(path))
            .await
            .map_err(|_| {
                StrataError::Timeout(format!(
                    "pull of {path} from {name} exceeded {:?}",
                    self.inner.pull_timeout
                ))
            })?
            .map_err(|e| StrataError::pull_error(name, path, e.to_string()))?;
        parser
            .parse(&data, &self.inner.prefix)
            .map_err(|e| StrataError::pull_error(name, path, e.to_string()))
    }

    fn watch_path(&self, path: &str) {
        let weak = self.downgrade();
        let watched = path.to_string();
        let result = self.inner.client.watch(
            path,
            Arc::new(move |data: Vec<u8>| {
                let Some(source) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = source.handle_path_updated(&watched, &data) {
                    error!(source = %source.name(), path = %watched, error = %e, "failed to apply path update");
                }
            }),
        );
        match result {
            Ok(()) => {}
            Err(StrataError::WatchDisabled) => {
                debug!(source = %self.inner.name, path, "watch disabled for path")
            }
            Err(e) => warn!(source = %self.inner.name, path, error = %e, "cannot watch path"),
        }
    }

    fn populate(&self, state: &mut SourceState, path: &str, props: Properties) -> Vec<Event> {
        let Some(index) = state.stores.iter().position(|s| s.path() == path) else {
            return Vec::new();
        };
        let priority = state.stores[index].priority();
        let raw = state.stores[index].update(props, self.inner.with_deleted);

        raw.into_iter()
            .filter_map(|event| state.resolve(path, priority, event))
            .map(|event| event.with_origin(self.inner.name.as_str(), path))
            .collect()
    }

    /// Queue `events` for the listener. Callers hold the state write lock
    /// so batches are queued in the order they were resolved.
    fn emit(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        debug!(source = %self.inner.name, events = events.len(), "source changed");
        if let Some(queue) = self.inner.listener.read().as_ref() {
            queue.push(events);
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .field("paths", &self.paths())
            .finish()
    }
}
