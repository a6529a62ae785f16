use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use tracing::debug;

use strata_core::{DeliveryQueue, Event, StrataError, StrataResult};

/// Opaque subscription id
pub type WatchId = u64;

/// Receives the events matched by its subscriptions, one batch per
/// dispatch.
pub trait EventHandler: Send + Sync {
    fn on_events(&self, events: &[Event]);
}

impl<F> EventHandler for F
where
    F: Fn(&[Event]) + Send + Sync,
{
    fn on_events(&self, events: &[Event]) {
        self(events)
    }
}

struct Subscription {
    id: WatchId,
    pattern: String,
    regex: Regex,
    handler: usize,
}

struct HandlerSlot {
    queue: DeliveryQueue<Vec<Event>>,
    subscriptions: usize,
}

#[derive(Default)]
struct Table {
    subscriptions: Vec<Subscription>,
    handlers: HashMap<usize, HandlerSlot>,
}

impl Table {
    fn find(&self, pattern: &str, handler: usize) -> Option<WatchId> {
        self.subscriptions
            .iter()
            .find(|s| s.handler == handler && s.pattern == pattern)
            .map(|s| s.id)
    }

    fn fresh_id(&self) -> WatchId {
        loop {
            let id = rand::random::<u64>();
            if id != 0 && !self.subscriptions.iter().any(|s| s.id == id) {
                return id;
            }
        }
    }
}

/// Handlers are identified by the address of their shared allocation
fn handler_identity(handler: &Arc<dyn EventHandler>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

/// Pattern subscriptions and asynchronous fan-out
#[derive(Default)]
pub struct EventDispatcher {
    table: RwLock<Table>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to keys matching `pattern`.
    ///
    /// Registering the same pattern with the same handler again returns
    /// the existing id.
    pub fn watch(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> StrataResult<WatchId> {
        let identity = handler_identity(&handler);
        if let Some(id) = self.table.read().find(pattern, identity) {
            return Ok(id);
        }

        let regex = Regex::new(pattern).map_err(|e| StrataError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut table = self.table.write();
        if let Some(id) = table.find(pattern, identity) {
            return Ok(id);
        }
        let id = table.fresh_id();
        let slot = table.handlers.entry(identity).or_insert_with(|| {
            let handler = Arc::clone(&handler);
            HandlerSlot {
                queue: DeliveryQueue::spawn(format!("strata-watch-{id:016x}"), move |events: Vec<Event>| {
                    handler.on_events(&events)
                }),
                subscriptions: 0,
            }
        });
        slot.subscriptions += 1;
        table.subscriptions.push(Subscription {
            id,
            pattern: pattern.to_string(),
            regex,
            handler: identity,
        });
        debug!(watch_id = id, pattern, "subscription added");
        Ok(id)
    }

    /// Remove a subscription. Unknown ids are ignored; returns whether a
    /// subscription was removed.
    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut table = self.table.write();
        let Some(pos) = table.subscriptions.iter().position(|s| s.id == id) else {
            return false;
        };
        let removed = table.subscriptions.remove(pos);
        if let Some(slot) = table.handlers.get_mut(&removed.handler) {
            slot.subscriptions -= 1;
            if slot.subscriptions == 0 {
                table.handlers.remove(&removed.handler);
            }
        }
        debug!(watch_id = id, pattern = %removed.pattern, "subscription removed");
        true
    }

    /// Deliver `events` to every matching subscriber.
    ///
    /// A key matches when the pattern is found anywhere in it. Each
    /// handler receives at most one batch per call, containing every
    /// event matched by any of its patterns exactly once, in input order.
    pub fn dispatch(&self, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        let table = self.table.read();
        let mut order: Vec<usize> = Vec::new();
        let mut batches: HashMap<usize, Vec<usize>> = HashMap::new();

        for (index, event) in events.iter().enumerate() {
            for sub in &table.subscriptions {
                if !sub.regex.is_match(&event.key) {
                    continue;
                }
                let batch = batches.entry(sub.handler).or_insert_with(|| {
                    order.push(sub.handler);
                    Vec::new()
                });
                if batch.last() != Some(&index) {
                    batch.push(index);
                }
            }
        }

        for handler in order {
            let (Some(slot), Some(indices)) = (table.handlers.get(&handler), batches.remove(&handler)) else {
                continue;
            };
            let batch: Vec<Event> = indices.into_iter().map(|i| events[i].clone()).collect();
            debug!(queue = slot.queue.name(), events = batch.len(), "dispatching batch");
            slot.queue.push(batch);
        }
    }

    /// Active subscriptions as `(id, pattern)` pairs
    pub fn subscriptions(&self) -> Vec<(WatchId, String)> {
        self.table
            .read()
            .subscriptions
            .iter()
            .map(|s| (s.id, s.pattern.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}
