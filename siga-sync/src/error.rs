//! Error types for the sync core

use siga_registry::{RegistryError, ValidationError};
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// On-device key-value store failure
#[derive(Error, Debug)]
pub enum LocalStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A writer panicked while holding the store lock
    #[error("Local store lock poisoned")]
    Poisoned,

    /// Store refused the write (quota, read-only media)
    #[error("Local store rejected write for key {0}")]
    Rejected(String),
}

/// Remote document store failure
#[derive(Error, Debug)]
pub enum RemoteError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Subscription channel closed
    #[error("Subscription closed")]
    Closed,

    /// Store unreachable (offline, disabled)
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Credentials or endpoint unusable
    #[error("Invalid remote configuration: {0}")]
    InvalidConfig(String),
}

/// Session provider failure
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Session provider not configured: {0}")]
    NotConfigured(String),

    #[error("No async runtime: {0}")]
    Runtime(String),
}

/// Settings file failure
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}

/// Sync engine error types
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local write failed; in-memory state was left unchanged
    #[error("Local persistence failed: {0}")]
    LocalPersistence(#[from] LocalStoreError),

    /// Remote write or subscription failed
    #[error("Remote connection failed: {0}")]
    RemoteConnection(#[source] RemoteError),

    /// Remote read failed
    #[error("Remote read failed: {0}")]
    RemoteRead(#[source] RemoteError),

    /// Command rejected before it reached the collection
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Force pull would replace local residents with an empty remote read
    #[error("Refusing to replace {local} local residents with an empty remote collection")]
    RefusedEmptyPull { local: usize },

    /// Operation needs remote sync turned on
    #[error("Remote sync is disabled")]
    SyncDisabled,

    /// Operation needs an authenticated session
    #[error("Remote sync requires an authenticated session")]
    NotAuthenticated,

    /// No tokio runtime to schedule background work on
    #[error("No async runtime: {0}")]
    Runtime(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RegistryError> for SyncError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(e) => SyncError::Validation(e),
            RegistryError::Serialization(e) => SyncError::Serialization(e),
        }
    }
}
