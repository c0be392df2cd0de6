//! Intake: new families, births, added members and bulk imports

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::collection::ResidentCollection;
use crate::error::ValidationError;
use crate::model::{Address, Gender, Resident, ResidentId, ResidentStatus};

/// Length of NIK and KK numbers
pub const ID_NUMBER_LEN: usize = 16;

/// Relationship label given to newborns
pub const CHILD_RELATIONSHIP: &str = "3. Anak Kandung/Tiri";

/// Keep digits only, truncated to the id-number length
pub fn digits_only(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .take(ID_NUMBER_LEN)
        .collect()
}

/// Relationship codes starting with "1" denote the head of family
pub fn relationship_marks_head(relationship: &str) -> bool {
    let rel = relationship.trim();
    rel.starts_with('1') || rel.to_lowercase().contains("kepala keluarga")
}

pub fn validate_nik(nik: &str) -> Result<(), ValidationError> {
    if nik.len() == ID_NUMBER_LEN && nik.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidNik(nik.to_string()))
    }
}

pub fn validate_no_kk(no_kk: &str) -> Result<(), ValidationError> {
    if no_kk.len() == ID_NUMBER_LEN && no_kk.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidNoKk(no_kk.to_string()))
    }
}

/// Form data for one person, before it becomes a [`Resident`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDraft {
    pub nik: String,
    pub full_name: String,
    pub relationship: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub birth_place: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mother_name: String,
}

impl MemberDraft {
    pub fn is_head(&self) -> bool {
        relationship_marks_head(&self.relationship)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_nik(&self.nik)?;
        if self.full_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("full name"));
        }
        Ok(())
    }

    fn into_resident(self, prefix: &str, no_kk: &str, address: &Address) -> Resident {
        let is_head_of_family = self.is_head();
        Resident {
            id: ResidentId::generate(prefix),
            no_kk: no_kk.trim().to_string(),
            nik: self.nik,
            full_name: self.full_name.trim().to_uppercase(),
            relationship: self.relationship,
            gender: self.gender,
            birth_date: self.birth_date,
            birth_place: self.birth_place,
            father_name: self.father_name,
            mother_name: self.mother_name,
            address: address.clone(),
            is_head_of_family,
            status: ResidentStatus::Active,
            pregnancy: None,
        }
    }
}

fn ensure_nik_free(residents: &ResidentCollection, nik: &str) -> Result<(), ValidationError> {
    if residents.active().any(|r| r.nik == nik) {
        return Err(ValidationError::DuplicateNik(nik.to_string()));
    }
    Ok(())
}

/// Register a whole new household
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFamily {
    #[serde(rename = "noKK")]
    pub no_kk: String,
    pub address: Address,
    pub members: Vec<MemberDraft>,
}

impl NewFamily {
    pub fn build(self, residents: &ResidentCollection) -> Result<Vec<Resident>, ValidationError> {
        validate_no_kk(&self.no_kk)?;
        if self.members.is_empty() {
            return Err(ValidationError::EmptyField("members"));
        }

        let mut seen = BTreeSet::new();
        for member in &self.members {
            member.validate()?;
            ensure_nik_free(residents, &member.nik)?;
            if !seen.insert(member.nik.as_str()) {
                return Err(ValidationError::DuplicateNik(member.nik.clone()));
            }
        }

        let heads = self.members.iter().filter(|m| m.is_head()).count();
        if heads != 1 {
            return Err(ValidationError::HeadCount {
                no_kk: self.no_kk,
                found: heads,
            });
        }
        if residents.head_of_household(&self.no_kk).is_some() {
            return Err(ValidationError::DuplicateHead(self.no_kk));
        }

        let no_kk = self.no_kk;
        let address = self.address;
        Ok(self
            .members
            .into_iter()
            .map(|m| m.into_resident("man", &no_kk, &address))
            .collect())
    }
}

/// Register a newborn into an existing household
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Birth {
    #[serde(rename = "noKK")]
    pub no_kk: String,
    pub nik: String,
    pub full_name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub birth_place: String,
}

impl Birth {
    /// The baby inherits address and father from the head of family, and
    /// the mother from the household's wife entry when there is one.
    pub fn build(self, residents: &ResidentCollection) -> Result<Resident, ValidationError> {
        validate_nik(&self.nik)?;
        ensure_nik_free(residents, &self.nik)?;
        if self.full_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("full name"));
        }
        let head = residents
            .head_of_household(&self.no_kk)
            .ok_or_else(|| ValidationError::MissingHead(self.no_kk.trim().to_string()))?;
        let mother = residents
            .household(&self.no_kk)
            .find(|r| r.is_active() && r.relationship.contains("Istri"))
            .map(|r| r.full_name.clone())
            .unwrap_or_default();

        let draft = MemberDraft {
            nik: self.nik,
            full_name: self.full_name,
            relationship: CHILD_RELATIONSHIP.to_string(),
            gender: self.gender,
            birth_date: self.birth_date,
            birth_place: self.birth_place,
            father_name: head.full_name.clone(),
            mother_name: mother,
        };
        Ok(draft.into_resident("birth", &head.no_kk, &head.address))
    }
}

/// Add a person to an existing active household
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMember {
    #[serde(rename = "noKK")]
    pub no_kk: String,
    pub member: MemberDraft,
}

impl AddMember {
    pub fn build(self, residents: &ResidentCollection) -> Result<Resident, ValidationError> {
        self.member.validate()?;
        ensure_nik_free(residents, &self.member.nik)?;
        let anchor = residents
            .household(&self.no_kk)
            .find(|r| r.is_active())
            .ok_or_else(|| ValidationError::UnknownHousehold(self.no_kk.trim().to_string()))?;
        if self.member.is_head() && residents.head_of_household(&self.no_kk).is_some() {
            return Err(ValidationError::DuplicateHead(self.no_kk.trim().to_string()));
        }
        let address = anchor.address.clone();
        let no_kk = anchor.no_kk.clone();
        Ok(self.member.into_resident("member", &no_kk, &address))
    }
}

/// One row of a spreadsheet import, keyed by column header
pub type ImportRow = BTreeMap<String, String>;

fn column<'a>(row: &'a ImportRow, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| row.get(*name))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

/// Convert loosely typed import rows into active residents.
///
/// Mirrors the village master-data template: digits are stripped from NIK and
/// KK and truncated to 16, names are upper-cased, missing address parts become
/// "-", and the head of family is detected from the relationship column.
/// Rows are never rejected; unparseable birth dates fall back to 1990-01-01.
pub fn import_rows(rows: &[ImportRow]) -> Vec<Resident> {
    let fallback_birth = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default();
    rows.iter()
        .map(|row| {
            let relationship = column(row, &["Status Hubungan dalam Keluarga", "Hubungan"])
                .unwrap_or_default()
                .to_string();
            let gender = match column(row, &["Jenis Kelamin", "JK"]) {
                Some(g) if g.contains('P') => Gender::Female,
                _ => Gender::Male,
            };
            let birth_date = column(row, &["Tanggal Lahir", "Tgl Lahir"])
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .unwrap_or(fallback_birth);

            Resident {
                id: ResidentId::generate("imp"),
                no_kk: digits_only(column(row, &["No.KK", "No. KK"]).unwrap_or_default()),
                nik: digits_only(column(row, &["NIK"]).unwrap_or_default()),
                full_name: column(row, &["Nama Lengkap"]).unwrap_or("-").to_uppercase(),
                is_head_of_family: relationship_marks_head(&relationship),
                relationship,
                gender,
                birth_date,
                birth_place: column(row, &["Tempat Lahir"]).unwrap_or_default().to_string(),
                father_name: column(row, &["Nama Ayah Kandung"]).unwrap_or_default().to_string(),
                mother_name: column(row, &["Nama Ibu Kandung"]).unwrap_or_default().to_string(),
                address: Address {
                    dusun: column(row, &["Dusun"]).unwrap_or("-").to_string(),
                    rt: column(row, &["RT"]).unwrap_or("-").to_string(),
                    rw: column(row, &["RW"]).unwrap_or("-").to_string(),
                },
                status: ResidentStatus::Active,
                pregnancy: None,
            }
        })
        .collect()
}
