//! Configuration change events

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Kind of change observed for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Created => write!(f, "created"),
            Action::Updated => write!(f, "updated"),
            Action::Deleted => write!(f, "deleted"),
        }
    }
}

/// A change to one key, as seen by the layer that forwards it.
///
/// Events are rewritten while they travel through path and source
/// resolution: a deletion may turn into an update when a lower layer
/// still defines the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub action: Action,
    /// Name of the source that produced the change
    pub source: String,
    /// Path inside the source that produced the change
    pub path: String,
    pub key: String,
    pub value_from: Option<Value>,
    pub value_to: Option<Value>,
}

impl Event {
    pub fn created(key: impl Into<String>, value: Value) -> Self {
        Self {
            action: Action::Created,
            source: String::new(),
            path: String::new(),
            key: key.into(),
            value_from: None,
            value_to: Some(value),
        }
    }

    pub fn updated(key: impl Into<String>, from: Value, to: Value) -> Self {
        Self {
            action: Action::Updated,
            source: String::new(),
            path: String::new(),
            key: key.into(),
            value_from: Some(from),
            value_to: Some(to),
        }
    }

    pub fn deleted(key: impl Into<String>, from: Value) -> Self {
        Self {
            action: Action::Deleted,
            source: String::new(),
            path: String::new(),
            key: key.into(),
            value_from: Some(from),
            value_to: None,
        }
    }

    pub fn with_origin(mut self, source: impl Into<String>, path: impl Into<String>) -> Self {
        self.source = source.into();
        self.path = path.into();
        self
    }

    pub fn is_deletion(&self) -> bool {
        self.action == Action::Deleted
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{json}")
    }
}
