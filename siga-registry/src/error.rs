//! Error types for the registry domain

use thiserror::Error;

use crate::model::{ResidentId, StatusKind};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// A mutation was rejected before it reached the collection.
///
/// Validation always runs against the current collection and nothing is
/// applied when it fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// NIK must be exactly 16 digits
    #[error("NIK must be exactly 16 digits, got {0:?}")]
    InvalidNik(String),

    /// Household number must be exactly 16 digits
    #[error("household number (KK) must be exactly 16 digits, got {0:?}")]
    InvalidNoKk(String),

    /// A second active head of family for the same household
    #[error("household {0} already has an active head of family")]
    DuplicateHead(String),

    /// A new family must name exactly one head
    #[error("household {no_kk} needs exactly one head of family, found {found}")]
    HeadCount { no_kk: String, found: usize },

    /// Operation needs an active head of family
    #[error("household {0} has no active head of family")]
    MissingHead(String),

    /// NIK already registered to an active resident
    #[error("NIK {0} is already registered to an active resident")]
    DuplicateNik(String),

    /// No resident with this id
    #[error("resident not found: {0}")]
    UnknownResident(ResidentId),

    /// No active member in this household
    #[error("no active household with number {0}")]
    UnknownHousehold(String),

    /// Resident is not in the status the operation needs
    #[error("resident {id} is {actual:?}, expected {expected:?}")]
    WrongStatus {
        id: ResidentId,
        expected: StatusKind,
        actual: StatusKind,
    },

    /// Pregnancy can only be recorded for women
    #[error("pregnancy can only be recorded for a female resident: {0}")]
    NotFemale(ResidentId),

    /// A required text field was blank
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Nothing in the archive matches the target
    #[error("no {status:?} record matches {target}")]
    NothingToApply { target: String, status: StatusKind },

    /// Archive operations never target active records
    #[error("archive operations need a non-active status")]
    ActiveArchive,
}

/// Registry error types
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Rejected mutation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// JSON encode/decode of a collection or config failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
