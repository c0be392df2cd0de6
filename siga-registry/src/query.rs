//! Household lookups, archive views and dashboard statistics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::collection::ResidentCollection;
use crate::model::{Gender, Resident, StatusKind};

/// Completed years between `birth_date` and `today`, zero for future dates
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> u32 {
    today.years_since(birth_date).unwrap_or(0)
}

/// Gestational age as whole weeks plus remaining days
pub fn pregnancy_age(start_date: NaiveDate, today: NaiveDate) -> (i64, i64) {
    let days = (today - start_date).num_days().max(0);
    (days / 7, days % 7)
}

/// Dashboard age brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeGroup {
    Infant,
    Toddler,
    Child,
    Teen,
    YoungAdult,
    Adult,
    PreElderly,
    Elderly,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 8] = [
        AgeGroup::Infant,
        AgeGroup::Toddler,
        AgeGroup::Child,
        AgeGroup::Teen,
        AgeGroup::YoungAdult,
        AgeGroup::Adult,
        AgeGroup::PreElderly,
        AgeGroup::Elderly,
    ];

    pub fn for_age(age: u32) -> Self {
        match age {
            0..=1 => AgeGroup::Infant,
            2..=5 => AgeGroup::Toddler,
            6..=12 => AgeGroup::Child,
            13..=18 => AgeGroup::Teen,
            19..=30 => AgeGroup::YoungAdult,
            31..=45 => AgeGroup::Adult,
            46..=59 => AgeGroup::PreElderly,
            _ => AgeGroup::Elderly,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgeGroup::Infant => "0-1 Bayi",
            AgeGroup::Toddler => "1-5 Balita",
            AgeGroup::Child => "6-12 Anak-anak",
            AgeGroup::Teen => "13-18 Remaja",
            AgeGroup::YoungAdult => "19-30 Dewasa",
            AgeGroup::Adult => "31-45 Dewasa Produktif",
            AgeGroup::PreElderly => "46-59 Pra Lansia",
            AgeGroup::Elderly => "60+ Lansia",
        }
    }
}

impl ResidentCollection {
    pub fn active(&self) -> impl Iterator<Item = &Resident> + '_ {
        self.iter().filter(|r| r.is_active())
    }

    /// Archive tab for `kind`.
    ///
    /// Relocation and deletion archive whole households, so those tabs list
    /// the head of family only. Deaths are listed per person.
    pub fn archived(&self, kind: StatusKind) -> impl Iterator<Item = &Resident> + '_ {
        self.iter().filter(move |r| {
            kind != StatusKind::Active
                && r.status.kind() == kind
                && (!kind.is_household_scoped() || r.is_head_of_family)
        })
    }

    /// Every record in the household, whatever its status
    pub fn household(&self, no_kk: &str) -> impl Iterator<Item = &Resident> + '_ {
        let no_kk = no_kk.trim().to_string();
        self.iter().filter(move |r| r.in_household(&no_kk))
    }

    pub fn head_of_household(&self, no_kk: &str) -> Option<&Resident> {
        self.household(no_kk)
            .find(|r| r.is_active() && r.is_head_of_family)
    }

    /// Household numbers with at least one active member
    pub fn households(&self) -> BTreeSet<&str> {
        self.active().map(|r| r.no_kk.trim()).collect()
    }

    pub fn pregnant(&self) -> impl Iterator<Item = &Resident> + '_ {
        self.active().filter(|r| r.is_pregnant())
    }

    /// Active residents aged one year or less
    pub fn infants(&self, today: NaiveDate) -> impl Iterator<Item = &Resident> + '_ {
        self.active()
            .filter(move |r| age_on(r.birth_date, today) <= 1)
    }
}

/// Figures shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationSummary {
    pub total: usize,
    pub male: usize,
    pub female: usize,
    pub households: usize,
    pub pregnant: usize,
    pub by_age_group: BTreeMap<AgeGroup, usize>,
    pub by_dusun: BTreeMap<String, usize>,
    pub deceased: usize,
    pub relocated_households: usize,
    pub deleted_households: usize,
}

impl PopulationSummary {
    pub fn from_collection(residents: &ResidentCollection, today: NaiveDate) -> Self {
        let mut summary = PopulationSummary {
            by_age_group: AgeGroup::ALL.iter().map(|g| (*g, 0)).collect(),
            households: residents.households().len(),
            deceased: residents.archived(StatusKind::Deceased).count(),
            relocated_households: residents.archived(StatusKind::Relocated).count(),
            deleted_households: residents.archived(StatusKind::Deleted).count(),
            ..Default::default()
        };

        for resident in residents.active() {
            summary.total += 1;
            match resident.gender {
                Gender::Male => summary.male += 1,
                Gender::Female => summary.female += 1,
            }
            if resident.is_pregnant() {
                summary.pregnant += 1;
            }
            let group = AgeGroup::for_age(age_on(resident.birth_date, today));
            *summary.by_age_group.entry(group).or_default() += 1;
            *summary
                .by_dusun
                .entry(resident.address.dusun.clone())
                .or_default() += 1;
        }
        summary
    }
}
