//! # Shared event model and log-line classifier
//!
//! Everything the monitor and any presentation layer agree on: the typed
//! [`LogEvent`] model and the pure classifier that turns raw Valheim
//! dedicated-server log lines into those events.
//!
//! Nothing in here performs I/O or holds state. The classifier is a pure
//! function over a single line, which keeps it trivially testable and lets
//! the monitor crate stay focused on reconciliation.

pub mod classifier;
pub mod events;

pub use classifier::classify;
pub use events::{LogEvent, LogEventKind};
