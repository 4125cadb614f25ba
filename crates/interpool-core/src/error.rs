//! Core error types for interpool-core.
//!
//! This module defines the error hierarchy using thiserror. The engine's
//! public `assign` entry point never propagates errors to callers as such:
//! unrecoverable conditions are folded into an escalated outcome with a
//! machine-readable reason (see `engine`).

use std::path::PathBuf;
use thiserror::Error;

use crate::policy::AssignMode;

/// Top-level error type for interpool-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Policy-related errors
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Store-specific errors. Transient variants are retried with bounded
/// backoff inside a single `assign` call.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// The store is temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store is locked by another writer
    #[error("Store is locked")]
    Locked,

    /// A store round-trip exceeded its deadline
    #[error("Store call timed out")]
    Timeout,

    /// Referenced row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl StoreError {
    /// Whether a retry inside the same run may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Locked | StoreError::Timeout
        )
    }
}

/// Policy-specific errors.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Attempt to change a weight or parameter locked by the current mode
    #[error("Parameter '{field}' is locked in {mode:?} mode")]
    LockedParameter { field: &'static str, mode: AssignMode },

    /// A value fell outside its valid range
    #[error("Value for '{field}' out of range: {message}")]
    OutOfRange { field: &'static str, message: String },

    /// `dr_policy.consecutive_penalty` disagrees with the policy-level value
    #[error(
        "Inconsistent consecutive-DR penalty: policy-level {policy_level} vs dr_policy {dr_policy}"
    )]
    InconsistentPenalty { policy_level: f64, dr_policy: f64 },

    /// A policy bundle's format version is not importable
    #[error("Incompatible policy version {found} (supported: {supported})")]
    IncompatibleVersion { found: String, supported: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: time_end ({end}) must be greater than time_start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else if e.code == rusqlite::ErrorCode::DatabaseBusy {
                    StoreError::Unavailable(e.to_string())
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
