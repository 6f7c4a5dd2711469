//! Error types for the activity log.

/// Errors that can occur during activity log operations.
///
/// Absence is not an error: a missing entity, an import-suppressed log call
/// and a `remove_log` without a match all return `Ok`.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    /// A database operation failed.
    #[error("activity storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The activity row was written but the thread root's chain pointer
    /// could not be updated.
    #[error("activity {activity_id} was recorded but its thread chain update failed: {source}")]
    ChainUpdate {
        /// Id of the activity that was persisted.
        activity_id: i64,
        /// The underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("activity serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The input cannot form a valid activity.
    #[error("invalid activity record: {0}")]
    InvalidRecord(String),
}

impl ActivityError {
    /// Whether this error originated in the storage layer.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::ChainUpdate { .. })
    }
}
