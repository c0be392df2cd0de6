//! Pending remote writes
//!
//! Tracks which residents changed locally since the last successful push.
//! Entries are deduplicated by id (the latest local state is what gets sent),
//! so a thousand edits to one record still cost one remote write.

use siga_registry::{CollectionDiff, ResidentId};
use std::collections::BTreeSet;

/// Ids taken from the queue for one push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingPush {
    /// Upsert with the current local record
    pub changed: BTreeSet<ResidentId>,
    /// Tombstone on the remote side
    pub removed: BTreeSet<ResidentId>,
}

impl PendingPush {
    pub fn len(&self) -> usize {
        self.changed.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PushQueue {
    queued: PendingPush,
    in_flight: PendingPush,
}

impl PushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local change. A later change to the same id supersedes an
    /// earlier one.
    pub fn record(&mut self, diff: &CollectionDiff) {
        for id in &diff.changed {
            self.mark_changed(id.clone());
        }
        for id in &diff.removed {
            self.queued.changed.remove(id);
            self.queued.removed.insert(id.clone());
        }
    }

    pub fn mark_changed(&mut self, id: ResidentId) {
        self.queued.removed.remove(&id);
        self.queued.changed.insert(id);
    }

    /// Whether `id` has local changes the remote has not confirmed yet
    pub fn is_dirty(&self, id: &ResidentId) -> bool {
        self.queued.changed.contains(id)
            || self.queued.removed.contains(id)
            || self.in_flight.changed.contains(id)
            || self.in_flight.removed.contains(id)
    }

    /// Queued entries, not counting an in-flight push
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Move everything queued into flight
    pub fn take_batch(&mut self) -> Option<PendingPush> {
        if self.queued.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut self.queued);
        self.in_flight.changed.extend(batch.changed.iter().cloned());
        self.in_flight.removed.extend(batch.removed.iter().cloned());
        Some(batch)
    }

    /// The in-flight push reached the remote store
    pub fn complete(&mut self) {
        self.in_flight = PendingPush::default();
    }

    /// The in-flight push failed; queue it again unless newer local changes
    /// already cover the same ids
    pub fn requeue(&mut self) {
        let failed = std::mem::take(&mut self.in_flight);
        for id in failed.changed {
            if !self.queued.removed.contains(&id) {
                self.queued.changed.insert(id);
            }
        }
        for id in failed.removed {
            if !self.queued.changed.contains(&id) {
                self.queued.removed.insert(id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.queued = PendingPush::default();
        self.in_flight = PendingPush::default();
    }
}
