use std::sync::Arc;

use strata_core::{Event, Parser, Properties};

/// Last known snapshot of one path
pub struct PathStore {
    path: String,
    priority: i32,
    parser: Option<Arc<dyn Parser>>,
    values: Properties,
}

impl PathStore {
    pub fn new(path: impl Into<String>, priority: i32, parser: Option<Arc<dyn Parser>>) -> Self {
        Self {
            path: path.into(),
            priority,
            parser,
            values: Properties::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn parser(&self) -> Option<&Arc<dyn Parser>> {
        self.parser.as_ref()
    }

    pub fn values(&self) -> &Properties {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut Properties {
        &mut self.values
    }

    /// Replace the snapshot with `next` and report what changed, ordered
    /// by key.
    ///
    /// Keys missing from `next` are deleted when `with_deleted` is set;
    /// otherwise the previous value is carried into the new snapshot
    /// without an event.
    pub fn update(&mut self, mut next: Properties, with_deleted: bool) -> Vec<Event> {
        let previous = std::mem::take(&mut self.values);
        let mut events: Vec<Event> = next
            .iter()
            .filter(|(key, _)| !previous.contains_key(*key))
            .map(|(key, value)| Event::created(key.clone(), value.clone()))
            .collect();

        for (key, old) in previous {
            match next.get(&key) {
                Some(new) if *new != old => {
                    let new = new.clone();
                    events.push(Event::updated(key, old, new));
                }
                Some(_) => {}
                None if with_deleted => events.push(Event::deleted(key, old)),
                None => {
                    next.insert(key, old);
                }
            }
        }

        events.sort_by(|a, b| a.key.cmp(&b.key));
        self.values = next;
        events
    }
}
