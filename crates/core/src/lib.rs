//! Core building blocks of the strata configuration engine.
//!
//! This crate holds the pieces every other crate agrees on: the dynamic
//! [`Value`] model, change [`Event`]s, the error taxonomy, the backend
//! [`Client`] and [`Parser`] contracts, the reference [`Expander`], the
//! serde-based decoder and the ordered delivery queue used for async
//! fan-out.

pub mod client;
pub mod decode;
pub mod delivery;
pub mod errors;
pub mod event;
pub mod expander;
pub mod logging;
pub mod parser;
pub mod settings;
pub mod value;

pub use client::{ChangeCallback, Client, ClientConfig, ClientRegistry};
pub use delivery::DeliveryQueue;
pub use errors::*;
pub use event::{Action, Event};
pub use expander::{Expander, ExpanderBuilder};
pub use parser::{Parser, Properties};
pub use settings::EngineSettings;
pub use value::Value;

/// Unified result type
pub type StrataResult<T> = std::result::Result<T, StrataError>;
