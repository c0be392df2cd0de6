//! Id-keyed resident working set

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::{Resident, ResidentId};

/// The resident collection owned by the sync engine.
///
/// Ordering is irrelevant; records are keyed by [`ResidentId`]. Serialized as a
/// plain JSON array so the local cache stays readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Resident>", into = "Vec<Resident>")]
pub struct ResidentCollection {
    records: BTreeMap<ResidentId, Resident>,
}

/// Record-level difference between two collections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDiff {
    /// Added or modified in the newer collection
    pub changed: BTreeSet<ResidentId>,
    /// Present before, gone now
    pub removed: BTreeSet<ResidentId>,
}

impl CollectionDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

impl ResidentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &ResidentId) -> Option<&Resident> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &ResidentId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or replace a record, returning the previous version
    pub fn upsert(&mut self, resident: Resident) -> Option<Resident> {
        self.records.insert(resident.id.clone(), resident)
    }

    pub fn remove(&mut self, id: &ResidentId) -> Option<Resident> {
        self.records.remove(id)
    }

    pub fn iter(&self) -> btree_map::Values<'_, ResidentId, Resident> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResidentId> {
        self.records.keys()
    }

    /// Apply `f` to every record matching `pred`, returning how many matched
    pub fn update_where<P, F>(&mut self, mut pred: P, mut f: F) -> usize
    where
        P: FnMut(&Resident) -> bool,
        F: FnMut(&mut Resident),
    {
        let mut touched = 0;
        for resident in self.records.values_mut() {
            if pred(resident) {
                f(resident);
                touched += 1;
            }
        }
        touched
    }

    /// Keep only records matching `pred`, returning how many were dropped
    pub fn retain<P>(&mut self, mut pred: P) -> usize
    where
        P: FnMut(&Resident) -> bool,
    {
        let before = self.records.len();
        self.records.retain(|_, r| pred(r));
        before - self.records.len()
    }

    /// Compare against an older version of this collection
    pub fn diff_from(&self, older: &ResidentCollection) -> CollectionDiff {
        let mut diff = CollectionDiff::default();
        for (id, resident) in &self.records {
            if older.records.get(id) != Some(resident) {
                diff.changed.insert(id.clone());
            }
        }
        for id in older.records.keys() {
            if !self.records.contains_key(id) {
                diff.removed.insert(id.clone());
            }
        }
        diff
    }

    /// Households with more than one active head of family
    pub fn head_conflicts(&self) -> Vec<String> {
        let mut heads: BTreeMap<&str, usize> = BTreeMap::new();
        for resident in self.iter().filter(|r| r.is_active() && r.is_head_of_family) {
            *heads.entry(resident.no_kk.trim()).or_default() += 1;
        }
        heads
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(no_kk, _)| no_kk.to_string())
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<Vec<Resident>> for ResidentCollection {
    fn from(list: Vec<Resident>) -> Self {
        list.into_iter().collect()
    }
}

impl From<ResidentCollection> for Vec<Resident> {
    fn from(collection: ResidentCollection) -> Self {
        collection.records.into_values().collect()
    }
}

impl FromIterator<Resident> for ResidentCollection {
    fn from_iter<I: IntoIterator<Item = Resident>>(iter: I) -> Self {
        let mut collection = ResidentCollection::new();
        collection.extend(iter);
        collection
    }
}

impl Extend<Resident> for ResidentCollection {
    fn extend<I: IntoIterator<Item = Resident>>(&mut self, iter: I) {
        for resident in iter {
            self.upsert(resident);
        }
    }
}

impl IntoIterator for ResidentCollection {
    type Item = Resident;
    type IntoIter = btree_map::IntoValues<ResidentId, Resident>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

impl<'a> IntoIterator for &'a ResidentCollection {
    type Item = &'a Resident;
    type IntoIter = btree_map::Values<'a, ResidentId, Resident>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}
