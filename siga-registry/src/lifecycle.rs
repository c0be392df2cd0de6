//! Lifecycle transitions as pure collection transforms
//!
//! Each function takes the collection by value and hands back the transformed
//! one, so the sync engine can run them inside `mutate_residents` and diff the
//! result. Records that do not match a transition are left untouched; input
//! validation lives in [`crate::command`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::collection::ResidentCollection;
use crate::model::{Pregnancy, PregnancyRisk, Resident, ResidentId, ResidentStatus, StatusKind};

/// Who a household-scoped transition applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A single resident
    Member(ResidentId),
    /// Every resident sharing the household number
    Household(String),
}

impl Target {
    pub fn matches(&self, resident: &Resident) -> bool {
        match self {
            Target::Member(id) => &resident.id == id,
            Target::Household(no_kk) => resident.in_household(no_kk),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Member(id) => write!(f, "resident {}", id),
            Target::Household(no_kk) => write!(f, "household {}", no_kk.trim()),
        }
    }
}

/// Mark an active resident deceased. Pregnancy is cleared.
pub fn report_death(
    mut residents: ResidentCollection,
    id: &ResidentId,
    date: NaiveDate,
) -> ResidentCollection {
    residents.update_where(
        |r| &r.id == id && r.is_active(),
        |r| {
            r.status = ResidentStatus::Deceased { death_date: date };
            r.pregnancy = None;
        },
    );
    residents
}

/// Relocate every active member of a household as one unit
pub fn report_relocation(
    mut residents: ResidentCollection,
    no_kk: &str,
    destination: &str,
    date: NaiveDate,
) -> ResidentCollection {
    let moved = residents.update_where(
        |r| r.in_household(no_kk) && r.is_active(),
        |r| {
            r.status = ResidentStatus::Relocated {
                move_date: date,
                destination: destination.trim().to_string(),
            };
        },
    );
    debug!(no_kk = no_kk.trim(), moved, "Household relocated");
    residents
}

/// Move active residents to the deleted archive.
///
/// A member target deletes one person; a household target (head-initiated)
/// deletes every active member of the household.
pub fn report_deletion(
    mut residents: ResidentCollection,
    target: &Target,
    reason: &str,
    date: NaiveDate,
) -> ResidentCollection {
    let deleted = residents.update_where(
        |r| target.matches(r) && r.is_active(),
        |r| {
            r.status = ResidentStatus::Deleted {
                delete_date: date,
                reason: reason.trim().to_string(),
            };
        },
    );
    debug!(scope = %target, deleted, "Residents moved to deleted archive");
    residents
}

/// Bring archived records back to active, clearing their event metadata.
///
/// Only records currently at `from` are restored, so restoring a relocated
/// household does not resurrect a member who died before the move.
pub fn restore(
    mut residents: ResidentCollection,
    target: &Target,
    from: StatusKind,
) -> ResidentCollection {
    if from == StatusKind::Active {
        return residents;
    }
    let restored = residents.update_where(
        |r| target.matches(r) && r.status.kind() == from,
        |r| r.status = ResidentStatus::Active,
    );
    debug!(scope = %target, ?from, restored, "Residents restored");
    residents
}

/// Physically remove archived records. Irreversible.
pub fn permanently_delete(
    mut residents: ResidentCollection,
    target: &Target,
    from: StatusKind,
) -> ResidentCollection {
    if from == StatusKind::Active {
        return residents;
    }
    let removed = residents.retain(|r| !(target.matches(r) && r.status.kind() == from));
    debug!(scope = %target, ?from, removed, "Archived residents permanently deleted");
    residents
}

pub fn set_pregnancy(
    mut residents: ResidentCollection,
    id: &ResidentId,
    start_date: NaiveDate,
    risk: Option<PregnancyRisk>,
) -> ResidentCollection {
    residents.update_where(
        |r| &r.id == id && r.is_active(),
        |r| r.pregnancy = Some(Pregnancy { start_date, risk }),
    );
    residents
}

pub fn clear_pregnancy(mut residents: ResidentCollection, id: &ResidentId) -> ResidentCollection {
    residents.update_where(|r| &r.id == id, |r| r.pregnancy = None);
    residents
}

/// Replace a record from an edit form.
///
/// Id and status are kept from the stored record; status only changes through
/// the transitions above.
pub fn update_resident(mut residents: ResidentCollection, edited: Resident) -> ResidentCollection {
    if let Some(current) = residents.get(&edited.id) {
        let status = current.status.clone();
        let mut next = edited;
        next.status = status;
        if !next.is_active() {
            next.pregnancy = None;
        }
        residents.upsert(next);
    }
    residents
}

/// Insert freshly created records
pub fn insert_all(mut residents: ResidentCollection, created: Vec<Resident>) -> ResidentCollection {
    residents.extend(created);
    residents
}
