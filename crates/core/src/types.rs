//! Shared primitive type aliases.

/// Opaque identifier for one end-to-end story run.
pub type RunId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// 1-based scene position within a story.
pub type SceneNumber = u8;
