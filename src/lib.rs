//! strata: layered configuration aggregation
//!
//! Re-exports the engine crates behind one name and hosts the command
//! line application.

pub mod app;
pub mod shutdown;

pub use strata_core::{Action, Event, EngineSettings, StrataError, StrataResult, Value};
pub use strata_engine::{
    EventHandler, Manager, ManagerBuilder, PathOptions, RemoteSource, Source, SourceOptions,
    WatchId,
};
