//! Resident registry domain for the SIGA village civil registry
//!
//! This crate holds everything about residents and households that does not
//! touch storage or the network:
//!
//! - **Model**: [`Resident`], its lifecycle [`ResidentStatus`] and the
//!   orthogonal [`Pregnancy`] sub-record
//! - **Collection**: [`ResidentCollection`], the id-keyed working set the sync
//!   engine owns
//! - **Lifecycle**: pure collection transforms (death, relocation, deletion,
//!   restore, permanent delete, pregnancy)
//! - **Intake**: new families, births, added members and bulk imports, all
//!   validated before they reach the collection
//! - **Query**: household lookups, archive views and dashboard statistics
//!
//! # Example
//!
//! ```ignore
//! use siga_registry::{lifecycle, ResidentCollection};
//!
//! let residents: ResidentCollection = load();
//! let residents = lifecycle::report_relocation(residents, "3316010101010001", "Blora", date);
//! assert!(residents.household("3316010101010001").all(|r| !r.is_active()));
//! ```

pub mod collection;
pub mod command;
pub mod config;
pub mod error;
pub mod intake;
pub mod lifecycle;
pub mod model;
pub mod query;

// Re-export main types
pub use collection::{CollectionDiff, ResidentCollection};
pub use command::{ResidentCommand, ValidatedCommand};
pub use config::{AppConfig, Presentation, RemoteConnection, RemoteCredentials, Theme};
pub use error::{RegistryError, Result, ValidationError};
pub use intake::{AddMember, Birth, ImportRow, MemberDraft, NewFamily};
pub use lifecycle::Target;
pub use model::{
    Address, Gender, Pregnancy, PregnancyRisk, Resident, ResidentId, ResidentStatus, StatusKind,
};
pub use query::{AgeGroup, PopulationSummary};
