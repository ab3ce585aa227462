// File: fieldops-sync/src/error.rs
// Purpose: Error types and retry classification for sync operations

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the sync engine.
///
/// Validation, not-found, conflict and stale-resolution outcomes are business
/// results: services surface them per item in response bodies wherever a
/// response has a slot for them, and callers branch on content. Only the
/// transient variants are ever retried.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed request or delta payload
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown entity type, or missing row for update/delete
    #[error("not found: {0}")]
    NotFound(String),

    /// Conditional write lost the etag check
    #[error("etag conflict on {entity_type}/{entity_id}")]
    Conflict {
        entity_type: String,
        entity_id: String,
    },

    /// Manual resolution presented an etag that is no longer current
    #[error("stale resolution: server etag is no longer {presented}")]
    StaleResolution { presented: String },

    /// Connection-level failure worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// All retry attempts consumed
    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Backing store failure
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl SyncError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a conflict error for an entity
    pub fn conflict(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::Conflict {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Whether the retry orchestrator may re-attempt after this error.
    ///
    /// Business outcomes (validation, conflict, rejection) are successful
    /// round trips carrying information and are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Storage(err) => matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut),
            _ => false,
        }
    }

    /// Stable reason code used in rejection reports and error envelopes.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::StaleResolution { .. } => "stale_resolution",
            Self::Transient(_) => "transient",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Storage(_) => "storage",
        }
    }
}
