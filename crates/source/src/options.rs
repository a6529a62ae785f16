use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use strata_core::Parser;

/// Options of a [`Source`](crate::Source)
#[derive(Clone)]
pub struct SourceOptions {
    pub priority: i32,
    /// Prepended to every key parsed from this source
    pub prefix: String,
    /// Whether keys missing from a new snapshot are deleted. Backends that
    /// cannot express deletion (the environment) keep the old value.
    pub with_deleted: bool,
    pub pull_timeout: Duration,
    /// Parser for paths that do not set their own
    pub parser: Option<Arc<dyn Parser>>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            prefix: String::new(),
            with_deleted: false,
            pull_timeout: Duration::from_secs(5),
            parser: None,
        }
    }
}

impl SourceOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }
}

impl fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceOptions")
            .field("priority", &self.priority)
            .field("prefix", &self.prefix)
            .field("with_deleted", &self.with_deleted)
            .field("pull_timeout", &self.pull_timeout)
            .field("custom_parser", &self.parser.is_some())
            .finish()
    }
}

/// Options of one path inside a source
#[derive(Clone, Default)]
pub struct PathOptions {
    pub priority: i32,
    /// Required paths fail [`Source::add_path`](crate::Source::add_path)
    /// when they cannot be pulled or parsed
    pub required: bool,
    pub parser: Option<Arc<dyn Parser>>,
    pub watch_disabled: bool,
}

impl PathOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn watch_disabled(mut self) -> Self {
        self.watch_disabled = true;
        self
    }
}

impl fmt::Debug for PathOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathOptions")
            .field("priority", &self.priority)
            .field("required", &self.required)
            .field("custom_parser", &self.parser.is_some())
            .field("watch_disabled", &self.watch_disabled)
            .finish()
    }
}
