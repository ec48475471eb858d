//! Layer 9: Revision history
//!
//! Append-only sequence of immutable revisions, one per logical commit.
//! Alongside the global sequence, the store indexes changes by concerned
//! topic and by association type, and tracks last-modification timestamps.
//!
//! Revisions are opened lazily: an operation that turns out to be a no-op
//! leaves no empty revision behind.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::id::{ConstructId, RevisionId};
use crate::time::WallClock;

/// Immutable ordered batch of changes for one logical commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    id: RevisionId,
    timestamp: WallClock,
    changes: Vec<Change>,
}

impl Revision {
    pub fn id(&self) -> RevisionId {
        self.id
    }

    pub fn timestamp(&self) -> WallClock {
        self.timestamp
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Reference into the revision sequence: (revision, index of change).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeRef {
    pub revision: RevisionId,
    pub index: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RevisionStore {
    /// Sealed revisions, ordered by id; ids are index+1.
    revisions: Vec<Revision>,
    /// Open revision, if an operation is in flight.
    open: Option<Revision>,
    tags: BTreeMap<String, RevisionId>,
    /// Topic -> changes concerning it (subject, old/new value, or player).
    topic_changes: BTreeMap<ConstructId, Vec<ChangeRef>>,
    /// Association type (captured at change time) -> changes.
    type_changes: BTreeMap<ConstructId, Vec<ChangeRef>>,
    topic_modified: BTreeMap<ConstructId, WallClock>,
    last_modified: Option<WallClock>,
}

impl RevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new revision at the next id. Caller must seal (or abandon)
    /// before opening another.
    pub(crate) fn create_revision(&mut self, now: WallClock) -> RevisionId {
        debug_assert!(self.open.is_none());
        let id = RevisionId::new(self.revisions.len() as u64 + 1);
        // Clamp so the sequence stays non-decreasing in time even if the
        // system clock steps backwards.
        let timestamp = self
            .revisions
            .last()
            .map(|r| r.timestamp)
            .unwrap_or_default()
            .max(now);
        self.open = Some(Revision {
            id,
            timestamp,
            changes: Vec::new(),
        });
        id
    }

    pub(crate) fn has_open_revision(&self) -> bool {
        self.open.is_some()
    }

    /// Append a change to the open revision and index it under every
    /// concerned topic and the association type it concerns (captured by
    /// the caller at change time).
    pub(crate) fn add_change(
        &mut self,
        change: Change,
        concerned_topics: &BTreeSet<ConstructId>,
        association_type: Option<ConstructId>,
    ) {
        let Some(open) = self.open.as_mut() else {
            debug_assert!(false, "add_change without an open revision");
            return;
        };
        let reference = ChangeRef {
            revision: open.id,
            index: open.changes.len(),
        };
        let timestamp = open.timestamp;
        open.changes.push(change);
        for &topic in concerned_topics {
            self.topic_changes.entry(topic).or_default().push(reference);
            self.topic_modified.insert(topic, timestamp);
        }
        if let Some(typ) = association_type {
            self.type_changes.entry(typ).or_default().push(reference);
        }
        self.last_modified = Some(timestamp);
    }

    /// Seal the open revision. Empty revisions are dropped, not appended.
    pub(crate) fn seal_revision(&mut self) -> Option<RevisionId> {
        let open = self.open.take()?;
        if open.changes.is_empty() {
            return None;
        }
        let id = open.id;
        self.revisions.push(open);
        Some(id)
    }

    pub fn first_revision(&self) -> Option<&Revision> {
        self.revisions.first()
    }

    pub fn last_revision(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    pub fn revision(&self, id: RevisionId) -> Option<&Revision> {
        let index = id.get().checked_sub(1)? as usize;
        self.revisions.get(index)
    }

    /// Latest revision whose timestamp is at or before `at`.
    pub fn revision_at_or_before(&self, at: WallClock) -> Option<&Revision> {
        let index = self.revisions.partition_point(|r| r.timestamp <= at);
        index.checked_sub(1).and_then(|i| self.revisions.get(i))
    }

    /// Tag a revision; re-tagging moves the tag.
    pub fn tag_revision(&mut self, id: RevisionId, tag: impl Into<String>) -> bool {
        if self.revision(id).is_none() {
            return false;
        }
        self.tags.insert(tag.into(), id);
        true
    }

    pub fn revision_by_tag(&self, tag: &str) -> Option<&Revision> {
        self.tags.get(tag).and_then(|&id| self.revision(id))
    }

    /// Changes concerning `topic`, in revision order.
    pub fn changes_for_topic(&self, topic: ConstructId) -> impl Iterator<Item = &Change> {
        self.topic_changes
            .get(&topic)
            .into_iter()
            .flatten()
            .filter_map(|r| self.change(r))
    }

    /// Changes concerning associations of `typ` (type captured at change
    /// time), in revision order.
    pub fn changes_for_association_type(
        &self,
        typ: ConstructId,
    ) -> impl Iterator<Item = &Change> {
        self.type_changes
            .get(&typ)
            .into_iter()
            .flatten()
            .filter_map(|r| self.change(r))
    }

    fn change(&self, reference: &ChangeRef) -> Option<&Change> {
        self.revision(reference.revision)?.changes().get(reference.index)
    }

    pub fn last_modified(&self) -> Option<WallClock> {
        self.last_modified
    }

    pub fn last_modified_topic(&self, topic: ConstructId) -> Option<WallClock> {
        self.topic_modified.get(&topic).copied()
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }
}
