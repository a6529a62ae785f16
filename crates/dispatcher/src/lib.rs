//! Pattern based change notification
//!
//! Subscribers register a regular expression over keys together with a
//! handler. Every dispatched batch is split per handler and delivered
//! asynchronously, one ordered queue per handler.

pub mod event_dispatcher;

pub use event_dispatcher::{EventDispatcher, EventHandler, WatchId};
