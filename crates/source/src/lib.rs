//! Per-backend merging
//!
//! A [`Source`] is one backend (a set of files, the environment, a remote
//! service). Each contributing document is a [`PathStore`]; the source
//! diffs successive snapshots of every path into change events and keeps
//! one merged view in which the highest priority path owns each key.

pub mod options;
pub mod path_store;
pub mod source;

pub use options::{PathOptions, SourceOptions};
pub use path_store::PathStore;
pub use source::{Source, WeakSource};
