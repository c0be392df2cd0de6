//! Validated mutation commands
//!
//! A [`ResidentCommand`] is what a form submits. `validate` checks it against
//! the current collection and, for intake, builds the new records with fresh
//! ids. The resulting [`ValidatedCommand`] applies infallibly, which lets the
//! sync engine validate and transform under one lock.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::collection::ResidentCollection;
use crate::error::ValidationError;
use crate::intake::{self, AddMember, Birth, ImportRow, NewFamily};
use crate::lifecycle::{self, Target};
use crate::model::{Gender, PregnancyRisk, Resident, ResidentId, StatusKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ResidentCommand {
    ReportDeath {
        id: ResidentId,
        date: NaiveDate,
    },
    ReportRelocation {
        no_kk: String,
        destination: String,
        date: NaiveDate,
    },
    ReportDeletion {
        target: Target,
        reason: String,
        date: NaiveDate,
    },
    Restore {
        target: Target,
        from: StatusKind,
    },
    PermanentlyDelete {
        target: Target,
        from: StatusKind,
    },
    SetPregnancy {
        id: ResidentId,
        start_date: NaiveDate,
        risk: Option<PregnancyRisk>,
    },
    ClearPregnancy {
        id: ResidentId,
    },
    UpdateResident {
        resident: Resident,
    },
    RegisterFamily(NewFamily),
    RegisterBirth(Birth),
    AddMember(AddMember),
    Import {
        rows: Vec<ImportRow>,
    },
}

/// A command that passed validation against a specific collection
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCommand {
    action: Action,
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Death(ResidentId, NaiveDate),
    Relocation {
        no_kk: String,
        destination: String,
        date: NaiveDate,
    },
    Deletion {
        target: Target,
        reason: String,
        date: NaiveDate,
    },
    Restore(Target, StatusKind),
    PermanentDelete(Target, StatusKind),
    SetPregnancy(ResidentId, NaiveDate, Option<PregnancyRisk>),
    ClearPregnancy(ResidentId),
    Update(Resident),
    Insert(Vec<Resident>),
}

fn require_active<'a>(
    residents: &'a ResidentCollection,
    id: &ResidentId,
) -> Result<&'a Resident, ValidationError> {
    let resident = residents
        .get(id)
        .ok_or_else(|| ValidationError::UnknownResident(id.clone()))?;
    if !resident.is_active() {
        return Err(ValidationError::WrongStatus {
            id: id.clone(),
            expected: StatusKind::Active,
            actual: resident.status.kind(),
        });
    }
    Ok(resident)
}

fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn require_archived_match(
    residents: &ResidentCollection,
    target: &Target,
    from: StatusKind,
) -> Result<(), ValidationError> {
    if from == StatusKind::Active {
        return Err(ValidationError::ActiveArchive);
    }
    if !residents
        .iter()
        .any(|r| target.matches(r) && r.status.kind() == from)
    {
        return Err(ValidationError::NothingToApply {
            target: target.to_string(),
            status: from,
        });
    }
    Ok(())
}

impl ResidentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ResidentCommand::ReportDeath { .. } => "report_death",
            ResidentCommand::ReportRelocation { .. } => "report_relocation",
            ResidentCommand::ReportDeletion { .. } => "report_deletion",
            ResidentCommand::Restore { .. } => "restore",
            ResidentCommand::PermanentlyDelete { .. } => "permanently_delete",
            ResidentCommand::SetPregnancy { .. } => "set_pregnancy",
            ResidentCommand::ClearPregnancy { .. } => "clear_pregnancy",
            ResidentCommand::UpdateResident { .. } => "update_resident",
            ResidentCommand::RegisterFamily(_) => "register_family",
            ResidentCommand::RegisterBirth(_) => "register_birth",
            ResidentCommand::AddMember(_) => "add_member",
            ResidentCommand::Import { .. } => "import",
        }
    }

    pub fn validate(self, residents: &ResidentCollection) -> Result<ValidatedCommand, ValidationError> {
        let action = match self {
            ResidentCommand::ReportDeath { id, date } => {
                require_active(residents, &id)?;
                Action::Death(id, date)
            }
            ResidentCommand::ReportRelocation {
                no_kk,
                destination,
                date,
            } => {
                require_text(&destination, "destination")?;
                if residents.head_of_household(&no_kk).is_none() {
                    return Err(ValidationError::MissingHead(no_kk.trim().to_string()));
                }
                Action::Relocation {
                    no_kk,
                    destination,
                    date,
                }
            }
            ResidentCommand::ReportDeletion { target, reason, date } => {
                require_text(&reason, "reason")?;
                match &target {
                    Target::Member(id) => {
                        require_active(residents, id)?;
                    }
                    Target::Household(no_kk) => {
                        if !residents.household(no_kk).any(|r| r.is_active()) {
                            return Err(ValidationError::UnknownHousehold(no_kk.trim().to_string()));
                        }
                    }
                }
                Action::Deletion { target, reason, date }
            }
            ResidentCommand::Restore { target, from } => {
                require_archived_match(residents, &target, from)?;
                if let Target::Household(no_kk) = &target {
                    let restoring_head = residents.household(no_kk).any(|r| {
                        r.is_head_of_family && r.status.kind() == from
                    });
                    if restoring_head && residents.head_of_household(no_kk).is_some() {
                        return Err(ValidationError::DuplicateHead(no_kk.trim().to_string()));
                    }
                }
                Action::Restore(target, from)
            }
            ResidentCommand::PermanentlyDelete { target, from } => {
                require_archived_match(residents, &target, from)?;
                Action::PermanentDelete(target, from)
            }
            ResidentCommand::SetPregnancy { id, start_date, risk } => {
                let resident = require_active(residents, &id)?;
                if resident.gender != Gender::Female {
                    return Err(ValidationError::NotFemale(id));
                }
                Action::SetPregnancy(id, start_date, risk)
            }
            ResidentCommand::ClearPregnancy { id } => {
                if !residents.contains(&id) {
                    return Err(ValidationError::UnknownResident(id));
                }
                Action::ClearPregnancy(id)
            }
            ResidentCommand::UpdateResident { resident } => {
                let current = residents
                    .get(&resident.id)
                    .ok_or_else(|| ValidationError::UnknownResident(resident.id.clone()))?;
                intake::validate_nik(&resident.nik)?;
                intake::validate_no_kk(&resident.no_kk)?;
                require_text(&resident.full_name, "full name")?;
                let becomes_head = resident.is_head_of_family
                    && current.is_active()
                    && (!current.is_head_of_family || !current.in_household(&resident.no_kk));
                if becomes_head && residents.head_of_household(&resident.no_kk).is_some() {
                    return Err(ValidationError::DuplicateHead(resident.no_kk.trim().to_string()));
                }
                Action::Update(resident)
            }
            ResidentCommand::RegisterFamily(family) => Action::Insert(family.build(residents)?),
            ResidentCommand::RegisterBirth(birth) => Action::Insert(vec![birth.build(residents)?]),
            ResidentCommand::AddMember(add) => Action::Insert(vec![add.build(residents)?]),
            ResidentCommand::Import { rows } => Action::Insert(intake::import_rows(&rows)),
        };
        Ok(ValidatedCommand { action })
    }
}

impl ValidatedCommand {
    /// Records this command creates, empty for anything but intake
    pub fn created(&self) -> &[Resident] {
        match &self.action {
            Action::Insert(records) => records.as_slice(),
            _ => &[],
        }
    }

    pub fn apply(self, residents: ResidentCollection) -> ResidentCollection {
        match self.action {
            Action::Death(id, date) => lifecycle::report_death(residents, &id, date),
            Action::Relocation {
                no_kk,
                destination,
                date,
            } => lifecycle::report_relocation(residents, &no_kk, &destination, date),
            Action::Deletion { target, reason, date } => {
                lifecycle::report_deletion(residents, &target, &reason, date)
            }
            Action::Restore(target, from) => lifecycle::restore(residents, &target, from),
            Action::PermanentDelete(target, from) => {
                lifecycle::permanently_delete(residents, &target, from)
            }
            Action::SetPregnancy(id, start, risk) => {
                lifecycle::set_pregnancy(residents, &id, start, risk)
            }
            Action::ClearPregnancy(id) => lifecycle::clear_pregnancy(residents, &id),
            Action::Update(resident) => lifecycle::update_resident(residents, resident),
            Action::Insert(created) => lifecycle::insert_all(residents, created),
        }
    }
}
