//! Reference expansion
//!
//! String values may refer to other keys with `${key}` placeholders.
//! Expansion is recursive, memoized within one call and guarded against
//! reference cycles. Additional delimiter pairs with their own resolvers
//! can be registered, e.g. `$C{...}` for values computed by the caller.
//!
//! Each call to [`Expander::expand`] runs in a fresh session, so one
//! expander can be shared by any number of concurrent callers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::value::Value;
use crate::{StrataError, StrataResult};

/// Resolver for the text found between a custom delimiter pair
pub type Resolver = Arc<dyn Fn(&str) -> StrataResult<Value> + Send + Sync>;

const DEFAULT_OPEN: &str = "${";
const DEFAULT_CLOSE: &str = "}";

#[derive(Clone)]
struct Delimiter {
    open: String,
    close: String,
    /// `None` resolves the enclosed text as another key
    resolver: Option<Resolver>,
}

impl Delimiter {
    fn same_pair(&self, open: &str, close: &str) -> bool {
        self.open == open && self.close == close
    }
}

/// Builder registering extra delimiter pairs
#[derive(Default)]
pub struct ExpanderBuilder {
    delimiters: Vec<Delimiter>,
}

impl ExpanderBuilder {
    /// Register a delimiter pair. Empty delimiters and pairs that are
    /// already registered are ignored.
    pub fn with_expansion<F>(mut self, open: &str, close: &str, resolver: F) -> Self
    where
        F: Fn(&str) -> StrataResult<Value> + Send + Sync + 'static,
    {
        if open.is_empty() || close.is_empty() {
            return self;
        }
        if self.delimiters.iter().any(|d| d.same_pair(open, close)) {
            return self;
        }
        self.delimiters.push(Delimiter {
            open: open.to_string(),
            close: close.to_string(),
            resolver: Some(Arc::new(resolver)),
        });
        self
    }

    pub fn build(mut self) -> Expander {
        if !self
            .delimiters
            .iter()
            .any(|d| d.same_pair(DEFAULT_OPEN, DEFAULT_CLOSE))
        {
            self.delimiters.push(Delimiter {
                open: DEFAULT_OPEN.to_string(),
                close: DEFAULT_CLOSE.to_string(),
                resolver: None,
            });
        }
        Expander {
            delimiters: self.delimiters,
        }
    }
}

/// Cycle-safe placeholder expander
#[derive(Clone)]
pub struct Expander {
    delimiters: Vec<Delimiter>,
}

impl Default for Expander {
    fn default() -> Self {
        ExpanderBuilder::default().build()
    }
}

impl fmt::Debug for Expander {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .delimiters
            .iter()
            .map(|d| format!("{}{}", d.open, d.close))
            .collect();
        f.debug_struct("Expander").field("delimiters", &pairs).finish()
    }
}

impl Expander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ExpanderBuilder {
        ExpanderBuilder::default()
    }

    /// Resolve `key` through `lookup`, substituting placeholders
    /// recursively. Non-string values are returned unchanged.
    pub fn expand<F>(&self, key: &str, lookup: F) -> StrataResult<Value>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let mut session = Session {
            delimiters: &self.delimiters,
            lookup,
            cache: HashMap::new(),
            pending: HashSet::new(),
        };
        session.resolve(key)
    }
}

enum Spliced {
    Unchanged,
    /// The placeholder covered the entire input
    Whole(Value),
    Text(String),
}

struct Session<'a, F> {
    delimiters: &'a [Delimiter],
    lookup: F,
    cache: HashMap<String, Value>,
    pending: HashSet<String>,
}

impl<'a, F> Session<'a, F>
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve(&mut self, key: &str) -> StrataResult<Value> {
        if self.pending.contains(key) {
            return Err(StrataError::circular(key));
        }
        if let Some(done) = self.cache.get(key) {
            return Ok(done.clone());
        }
        let raw = (self.lookup)(key).ok_or_else(|| StrataError::key_not_found(key))?;
        let Value::String(mut text) = raw else {
            return Ok(raw);
        };

        self.pending.insert(key.to_string());
        let delimiters: &'a [Delimiter] = self.delimiters;
        for delimiter in delimiters {
            match self.splice(&text, delimiter)? {
                Spliced::Unchanged => {}
                Spliced::Text(spliced) => text = spliced,
                Spliced::Whole(Value::String(whole)) => text = whole,
                Spliced::Whole(typed) => {
                    self.pending.remove(key);
                    self.cache.insert(key.to_string(), typed.clone());
                    return Ok(typed);
                }
            }
        }
        self.pending.remove(key);

        let result = Value::String(text);
        self.cache.insert(key.to_string(), result.clone());
        Ok(result)
    }

    fn splice(&mut self, input: &str, delimiter: &Delimiter) -> StrataResult<Spliced> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        let mut changed = false;

        loop {
            let Some(start) = rest.find(&delimiter.open) else {
                break;
            };
            let inner_start = start + delimiter.open.len();
            let Some(len) = rest[inner_start..].find(&delimiter.close) else {
                break;
            };
            let inner_end = inner_start + len;
            let inner = &rest[inner_start..inner_end];
            let tail = &rest[inner_end + delimiter.close.len()..];

            let value = match &delimiter.resolver {
                Some(resolver) => resolver(inner)?,
                None => self.resolve(inner.trim())?,
            };

            if !changed && start == 0 && tail.is_empty() {
                return Ok(Spliced::Whole(value));
            }
            changed = true;

            let text = value.to_text().ok_or_else(|| StrataError::NotText {
                key: inner.trim().to_string(),
                found: value.type_name().to_string(),
            })?;
            out.push_str(&rest[..start]);
            out.push_str(&text);
            rest = tail;
        }

        if !changed {
            return Ok(Spliced::Unchanged);
        }
        out.push_str(rest);
        Ok(Spliced::Text(out))
    }
}
