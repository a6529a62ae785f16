//! The strata engine
//!
//! [`Manager`] arbitrates between sources by priority, layers explicit
//! overrides and defaults on top, expands `${key}` references on read and
//! fans change events out to pattern subscribers. [`ManagerBuilder`]
//! assembles a manager from the built-in backends or from
//! [`EngineSettings`](strata_core::EngineSettings).

pub mod builder;
pub mod manager;
pub mod typed;

pub use builder::{ManagerBuilder, RemoteSource};
pub use manager::Manager;

pub use strata_dispatcher::{EventHandler, WatchId};
pub use strata_source::{PathOptions, Source, SourceOptions};
