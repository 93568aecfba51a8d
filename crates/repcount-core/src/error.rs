//! Core error types for repcount-core.
//!
//! Session commands never fail for sequencing mistakes (they return an
//! `Ignored` outcome instead). The types here cover the failures that do
//! reach a caller: persistence, configuration and alarm scheduling.
//! Alert delivery problems are logged and degraded, never propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for repcount-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Workout store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Alarm scheduling errors
    #[error("Alarm error: {0}")]
    Alarm(#[from] AlarmError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised by a [`WorkoutStore`](crate::store::WorkoutStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Requested row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Store rejected the write (used by in-memory stores)
    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// No usable data directory
    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while arming an alarm.
#[derive(Error, Debug)]
pub enum AlarmError {
    /// The platform refused exact alarms
    #[error("Exact alarm permission denied")]
    PermissionDenied,

    /// No scheduler backend is available
    #[error("Alarm scheduler unavailable: {0}")]
    Unavailable(String),
}

/// Failures of a single alert channel during delivery.
///
/// These never leave the delivery service; they select a degraded mode.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Sound asset missing or audio device unusable
    #[error("Sound unavailable: {0}")]
    SoundUnavailable(String),

    /// Keep-awake primitive could not be acquired
    #[error("Wake lock denied: {0}")]
    WakeLockDenied(String),

    /// Notification surface failed
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Haptics failed
    #[error("Vibration failed: {0}")]
    Vibration(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Value outside its allowed range
    #[error("Value {value} for '{field}' outside {min}..={max}")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_into_core_error() {
        let err: CoreError = StoreError::NotFound {
            entity: "exercise",
            id: 7,
        }
        .into();
        assert_eq!(err.to_string(), "Store error: exercise 7 not found");
    }

    #[test]
    fn validation_error_converts_into_core_error() {
        let err: CoreError = ValidationError::OutOfRange {
            field: "rest".into(),
            value: 120,
            min: 1,
            max: 99,
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation error: Value 120 for 'rest' outside 1..=99"
        );
    }

    #[test]
    fn query_failure_maps_from_rusqlite() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::QueryFailed(_)));
    }
}
