//! Foxtale run event bus.
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`RunEvent`] — the per-run progress event envelope pushed to
//!   streaming clients.
//!
//! The poll endpoint reads the session store directly, so dropped or
//! lagged events here cost latency, never correctness.

pub mod bus;

pub use bus::{EventBus, RunEvent, RunEventKind};
