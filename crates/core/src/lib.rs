//! Pure domain logic for the story pipeline: no I/O, no async.
//!
//! Everything here is consumed by the orchestration and API crates.
//! Keeping this crate dependency-free of the runtime stack means the
//! batching math, prompt sanitizer, and state machine are trivially
//! unit-testable.

pub mod error;
pub mod prompt;
pub mod quiz;
pub mod run;
pub mod types;
