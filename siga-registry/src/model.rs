//! Resident record and its lifecycle status

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque resident identifier.
///
/// Assigned once at creation and never reused, so it is safe to key remote
/// records and tombstones by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResidentId(String);

impl ResidentId {
    /// Generate a fresh id with the given prefix (e.g. "man", "birth", "imp")
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResidentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResidentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// Pregnancy risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PregnancyRisk {
    High,
    Medium,
    Low,
}

/// Pregnancy sub-record, independent of [`ResidentStatus`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pregnancy {
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<PregnancyRisk>,
}

/// Lifecycle state of a resident.
///
/// Each non-active variant carries its own event metadata, so a record can
/// never hold a death date while relocated or keep a relocation destination
/// after being restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResidentStatus {
    Active,
    Deceased {
        #[serde(rename = "deathDate")]
        death_date: NaiveDate,
    },
    Relocated {
        #[serde(rename = "moveDate")]
        move_date: NaiveDate,
        #[serde(rename = "moveDestination")]
        destination: String,
    },
    Deleted {
        #[serde(rename = "deleteDate")]
        delete_date: NaiveDate,
        #[serde(rename = "deleteReason")]
        reason: String,
    },
}

impl Default for ResidentStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl ResidentStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            ResidentStatus::Active => StatusKind::Active,
            ResidentStatus::Deceased { .. } => StatusKind::Deceased,
            ResidentStatus::Relocated { .. } => StatusKind::Relocated,
            ResidentStatus::Deleted { .. } => StatusKind::Deleted,
        }
    }

    /// Date of the archival event, if any
    pub fn event_date(&self) -> Option<NaiveDate> {
        match self {
            ResidentStatus::Active => None,
            ResidentStatus::Deceased { death_date } => Some(*death_date),
            ResidentStatus::Relocated { move_date, .. } => Some(*move_date),
            ResidentStatus::Deleted { delete_date, .. } => Some(*delete_date),
        }
    }
}

/// Status without its metadata, for filtering and archive tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusKind {
    Active,
    Deceased,
    Relocated,
    Deleted,
}

impl StatusKind {
    /// Relocation and deletion archive whole households, death is per person
    pub fn is_household_scoped(self) -> bool {
        matches!(self, StatusKind::Relocated | StatusKind::Deleted)
    }
}

/// Hamlet / neighbourhood / community unit address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub dusun: String,
    #[serde(default)]
    pub rt: String,
    #[serde(default)]
    pub rw: String,
}

/// A person in the village registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    pub id: ResidentId,
    /// Household (KK) number
    #[serde(rename = "noKK")]
    pub no_kk: String,
    pub nik: String,
    pub full_name: String,
    #[serde(default)]
    pub relationship: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub birth_place: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mother_name: String,
    #[serde(flatten)]
    pub address: Address,
    #[serde(default)]
    pub is_head_of_family: bool,
    #[serde(flatten)]
    pub status: ResidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pregnancy: Option<Pregnancy>,
}

impl Resident {
    pub fn is_active(&self) -> bool {
        self.status == ResidentStatus::Active
    }

    pub fn is_pregnant(&self) -> bool {
        self.pregnancy.is_some()
    }

    /// Household numbers are compared trimmed, imports often carry padding
    pub fn in_household(&self, no_kk: &str) -> bool {
        self.no_kk.trim() == no_kk.trim()
    }
}
