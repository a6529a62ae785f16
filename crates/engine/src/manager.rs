use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use strata_core::decode;
use strata_core::{Action, Event, Expander, Properties, StrataError, StrataResult, Value};
use strata_dispatcher::{EventDispatcher, EventHandler, WatchId};
use strata_source::{PathOptions, Source};

#[derive(Default)]
struct ManagerState {
    /// Sorted by priority, highest first; equal priorities keep insertion order
    sources: Vec<Source>,
    /// Source currently supplying each key
    owners: HashMap<String, Source>,
    overrides: HashMap<String, Value>,
    defaults: HashMap<String, Value>,
}

impl ManagerState {
    /// Raw lookup: overrides, then the owning source, then defaults
    fn unsafe_get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        if let Some(value) = self.owners.get(key).and_then(|s| s.get(key)) {
            return Some(value);
        }
        self.defaults.get(key).cloned()
    }

    fn resolve_upsert(&mut self, source: &Source, mut event: Event) -> Option<Event> {
        let Some(owner) = self.owners.get(&event.key).cloned() else {
            self.owners.insert(event.key.clone(), source.clone());
            return Some(event);
        };
        if owner.ptr_eq(source) {
            return Some(event);
        }
        if owner.priority() > source.priority() {
            debug!(key = %event.key, source = %source.name(), owner = %owner.name(), "change shadowed by higher priority source");
            return None;
        }
        // A takeover is always an update of the visible key; the old
        // owner may already have dropped it, leaving no previous value.
        self.owners.insert(event.key.clone(), source.clone());
        let previous = owner.get(&event.key);
        if previous.is_some() && previous == event.value_to {
            return None;
        }
        event.action = Action::Updated;
        event.value_from = previous;
        Some(event)
    }

    fn resolve_deleted(&mut self, source: &Source, mut event: Event) -> Option<Event> {
        let owner = self.owners.get(&event.key)?;
        if !owner.ptr_eq(source) {
            debug!(key = %event.key, source = %source.name(), "deletion from a source not owning the key ignored");
            return None;
        }
        let fallback = self
            .sources
            .iter()
            .filter(|s| !s.ptr_eq(source))
            .find_map(|s| s.get(&event.key).map(|value| (s.clone(), value)));

        match fallback {
            Some((next, value)) => {
                debug!(key = %event.key, from = %source.name(), to = %next.name(), "ownership falls back");
                self.owners.insert(event.key.clone(), next);
                if event.value_from.as_ref() == Some(&value) {
                    return None;
                }
                event.action = Action::Updated;
                event.value_to = Some(value);
            }
            None => {
                self.owners.remove(&event.key);
            }
        }
        Some(event)
    }
}

struct ManagerInner {
    state: RwLock<ManagerState>,
    expander: Expander,
    expand_disabled: bool,
    dispatcher: EventDispatcher,
}

/// Merged view over every added [`Source`].
///
/// Reads consult the override layer first, then the source owning the
/// key, then the default layer. Ownership follows source priority; a
/// tie goes to the source that changed last. Cloning yields another
/// handle to the same manager.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(Expander::default(), false)
    }
}

impl Manager {
    pub fn new(expander: Expander, expand_disabled: bool) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: RwLock::new(ManagerState::default()),
                expander,
                expand_disabled,
                dispatcher: EventDispatcher::new(),
            }),
        }
    }

    pub fn builder() -> crate::ManagerBuilder {
        crate::ManagerBuilder::new()
    }

    /// Add a source. Returns false, and changes nothing, when a source
    /// with the same name or the same source is already present.
    ///
    /// Keys the source already holds are claimed only where no owner
    /// exists or the new source has a strictly higher priority; no
    /// events are emitted for them.
    pub fn add_source(&self, source: Source) -> bool {
        let mut state = self.inner.state.write();
        if state
            .sources
            .iter()
            .any(|s| s.ptr_eq(&source) || s.name() == source.name())
        {
            debug!(source = %source.name(), "source already added");
            return false;
        }

        for key in source.keys() {
            let claim = match state.owners.get(&key) {
                Some(owner) => source.priority() > owner.priority(),
                None => true,
            };
            if claim {
                state.owners.insert(key, source.clone());
            }
        }

        let manager = Arc::downgrade(&self.inner);
        let emitter = source.downgrade();
        source.on_events(move |events| {
            let (Some(inner), Some(source)) = (Weak::upgrade(&manager), emitter.upgrade()) else {
                return;
            };
            Manager { inner }.handle_source_events(&source, events);
        });

        state.sources.push(source.clone());
        state.sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
        info!(source = %source.name(), priority = source.priority(), "source added");
        true
    }

    pub fn source(&self, name: &str) -> StrataResult<Source> {
        self.inner
            .state
            .read()
            .sources
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| StrataError::SourceNotFound(name.to_string()))
    }

    /// Added sources, highest priority first
    pub fn sources(&self) -> Vec<Source> {
        self.inner.state.read().sources.clone()
    }

    /// Add a path to the named source. The pull runs without holding the
    /// manager lock; resulting changes arrive as source events.
    pub async fn add_path(
        &self,
        source_name: &str,
        path: &str,
        options: PathOptions,
    ) -> StrataResult<()> {
        let source = self.source(source_name)?;
        source.add_path(path, options).await
    }

    /// Expanded value of `key`, or the raw value when expansion is off.
    /// Expansion failures are logged and reported as absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.expand(key) {
            Ok(value) => Some(value),
            Err(StrataError::KeyNotFound { key: missing }) if missing == key => None,
            Err(e) => {
                warn!(key, error = %e, "cannot expand key");
                None
            }
        }
    }

    /// Like [`get`](Self::get) but reports why a value is unavailable
    pub fn expand(&self, key: &str) -> StrataResult<Value> {
        let state = self.inner.state.read();
        if self.inner.expand_disabled {
            return state
                .unsafe_get(key)
                .ok_or_else(|| StrataError::key_not_found(key));
        }
        self.inner.expander.expand(key, |k| state.unsafe_get(k))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.read().unsafe_get(key).is_some()
    }

    /// Flat view of every key: defaults, then the value of each key's
    /// owning source, then overrides. Values are not expanded.
    pub fn all(&self) -> Properties {
        let state = self.inner.state.read();
        let mut values: Properties = state
            .defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        values.extend(
            state
                .owners
                .iter()
                .filter_map(|(key, owner)| owner.get(key).map(|value| (key.clone(), value))),
        );
        values.extend(state.overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }

    /// Every known key, sorted
    pub fn keys(&self) -> Vec<String> {
        let state = self.inner.state.read();
        let keys: BTreeSet<&String> = state
            .defaults
            .keys()
            .chain(state.owners.keys())
            .chain(state.overrides.keys())
            .collect();
        keys.into_iter().cloned().collect()
    }

    /// Override `key` above every source
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .state
            .write()
            .overrides
            .insert(key.into(), value.into());
    }

    /// Fallback for `key` when no source defines it
    pub fn set_default(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .state
            .write()
            .defaults
            .insert(key.into(), value.into());
    }

    /// Drop `key` from the override and default layers. Source data is
    /// left alone.
    pub fn delete(&self, key: &str) {
        let mut state = self.inner.state.write();
        state.overrides.remove(key);
        state.defaults.remove(key);
    }

    /// Subscribe `handler` to changes of keys matching `pattern` (a
    /// regular expression searched anywhere in the key).
    pub fn watch(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> StrataResult<WatchId> {
        self.inner.dispatcher.watch(pattern, handler)
    }

    pub fn unwatch(&self, id: WatchId) -> bool {
        self.inner.dispatcher.unwatch(id)
    }

    /// Decode the keys below `prefix` into `T`. Values are expanded
    /// first unless expansion is disabled.
    pub fn unmarshal<T: DeserializeOwned>(&self, prefix: &str) -> StrataResult<T> {
        let mut props = Properties::new();
        for key in self.keys() {
            if !is_below(&key, prefix) {
                continue;
            }
            let value = self.expand(&key)?;
            props.insert(key, value);
        }
        decode::from_properties(&props, prefix)
    }

    /// Close every source's client. All sources are closed even when one
    /// fails; the first error is returned.
    pub fn close(&self) -> StrataResult<()> {
        let sources = self.sources();
        let mut first = None;
        for source in sources {
            if let Err(e) = source.close() {
                warn!(source = %source.name(), error = %e, "failed to close source");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn handle_source_events(&self, source: &Source, events: Vec<Event>) {
        let mut state = self.inner.state.write();
        let mut forwarded = Vec::with_capacity(events.len());
        for event in events {
            let resolved = match event.action {
                Action::Deleted => state.resolve_deleted(source, event),
                Action::Created | Action::Updated => state.resolve_upsert(source, event),
            };
            let Some(event) = resolved else {
                continue;
            };
            if state.overrides.contains_key(&event.key) {
                debug!(key = %event.key, "change hidden by override");
                continue;
            }
            forwarded.push(event);
        }
        // Dispatch only queues, so batches leave in the order they were
        // resolved even when several sources report at once.
        if !forwarded.is_empty() {
            self.inner.dispatcher.dispatch(&forwarded);
        }
    }
}

fn is_below(key: &str, prefix: &str) -> bool {
    if prefix.is_empty() || key == prefix {
        return true;
    }
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        let names: Vec<&str> = state.sources.iter().map(Source::name).collect();
        f.debug_struct("Manager")
            .field("sources", &names)
            .field("overrides", &state.overrides.len())
            .field("defaults", &state.defaults.len())
            .field("expand_disabled", &self.inner.expand_disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Client, ClientConfig};
    use strata_infrastructure::MemoryClient;
    use strata_source::SourceOptions;

    fn empty_source(name: &str, priority: i32) -> Source {
        let client: Arc<dyn Client> = Arc::new(MemoryClient::new(&ClientConfig::default()));
        Source::new(name, client, SourceOptions::default().with_priority(priority))
    }

    #[test]
    fn test_takeover_from_owner_without_value_is_update() {
        let stale = empty_source("stale", 5);
        let fresh = empty_source("fresh", 5);
        let mut state = ManagerState::default();
        state.owners.insert("k".to_string(), stale);

        let event = state
            .resolve_upsert(&fresh, Event::created("k", Value::Int(1)))
            .unwrap();
        assert_eq!(event.action, Action::Updated);
        assert_eq!(event.value_from, None);
        assert_eq!(event.value_to, Some(Value::Int(1)));
        assert!(state.owners["k"].ptr_eq(&fresh));
    }

    #[test]
    fn test_lower_priority_upsert_keeps_owner() {
        let high = empty_source("high", 9);
        let low = empty_source("low", 1);
        let mut state = ManagerState::default();
        state.owners.insert("k".to_string(), high.clone());

        assert!(state
            .resolve_upsert(&low, Event::created("k", Value::Int(1)))
            .is_none());
        assert!(state.owners["k"].ptr_eq(&high));
    }

    #[test]
    fn test_is_below() {
        assert!(is_below("db.host", ""));
        assert!(is_below("db.host", "db"));
        assert!(is_below("db", "db"));
        assert!(is_below("db[0]", "db"));
        assert!(!is_below("dbx.host", "db"));
        assert!(!is_below("cache.ttl", "db"));
    }

    #[test]
    fn test_layers_without_sources() {
        let manager = Manager::default();
        assert_eq!(manager.get("port"), None);

        manager.set_default("port", 80);
        assert_eq!(manager.get("port"), Some(Value::Int(80)));

        manager.set("port", 8080);
        assert_eq!(manager.get("port"), Some(Value::Int(8080)));
        assert_eq!(manager.all().get("port"), Some(&Value::Int(8080)));

        manager.delete("port");
        assert_eq!(manager.get("port"), None);
        assert!(manager.keys().is_empty());
    }

    #[test]
    fn test_expansion_over_layers() {
        let manager = Manager::default();
        manager.set_default("host", "localhost");
        manager.set("url", "http://${host}:${port}");
        manager.set_default("port", 80);
        assert_eq!(
            manager.get("url"),
            Some(Value::from("http://localhost:80"))
        );

        manager.set("loop", "${loop}");
        assert_eq!(manager.get("loop"), None);
        assert!(matches!(
            manager.expand("loop"),
            Err(StrataError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_expansion_disabled() {
        let manager = Manager::new(Expander::default(), true);
        manager.set("a", "${b}");
        assert_eq!(manager.get("a"), Some(Value::from("${b}")));
    }

    #[test]
    fn test_unknown_source() {
        let manager = Manager::default();
        assert!(matches!(
            manager.source("files"),
            Err(StrataError::SourceNotFound(name)) if name == "files"
        ));
    }
}
