//! Externalized per-run session store.
//!
//! Every image job writes its outcome here, and both the push (SSE) and
//! pull (polling) delivery paths read from here. The store is specified
//! as an externally addressable keyed record — not an in-process map —
//! so correctness does not depend on which thread, task, or process runs
//! the orchestrator. [`PgSessionStore`] is the deployment implementation;
//! [`InMemorySessionStore`] backs tests and single-process development.

pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;
pub use record::{SceneOutcome, SceneRecord, SessionRecord};
pub use store::{SessionStore, StoreError};
