//! Domain-level error type shared across the workspace.

/// Errors produced by domain logic and surfaced by the API layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A named entity could not be found.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity kind, e.g. `"Run"`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input failed validation with a human-readable message.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An invariant was violated internally.
    #[error("Internal error: {0}")]
    Internal(String),
}
