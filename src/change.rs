//! Layer 8: Atomic changes
//!
//! One `Change` per atomic mutation: what happened, to which construct,
//! old and new values. Changes are immutable once built; construct-valued
//! payloads are frozen snapshots, never references into the live arena.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{ConstructId, ScopeId};
use crate::locator::Locator;
use crate::model::ConstructSnapshot;

/// The closed set of change kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ConstructAdded,
    ConstructRemoved,
    TypeSet,
    TypeAdded,
    TypeRemoved,
    SupertypeAdded,
    SupertypeRemoved,
    PlayerModified,
    ScopeModified,
    ValueModified,
    ReifierSet,
    ItemIdentifierAdded,
    ItemIdentifierRemoved,
    SubjectIdentifierAdded,
    SubjectIdentifierRemoved,
    SubjectLocatorAdded,
    SubjectLocatorRemoved,
    Merged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::ConstructAdded => "construct-added",
            ChangeKind::ConstructRemoved => "construct-removed",
            ChangeKind::TypeSet => "type-set",
            ChangeKind::TypeAdded => "type-added",
            ChangeKind::TypeRemoved => "type-removed",
            ChangeKind::SupertypeAdded => "supertype-added",
            ChangeKind::SupertypeRemoved => "supertype-removed",
            ChangeKind::PlayerModified => "player-modified",
            ChangeKind::ScopeModified => "scope-modified",
            ChangeKind::ValueModified => "value-modified",
            ChangeKind::ReifierSet => "reifier-set",
            ChangeKind::ItemIdentifierAdded => "item-identifier-added",
            ChangeKind::ItemIdentifierRemoved => "item-identifier-removed",
            ChangeKind::SubjectIdentifierAdded => "subject-identifier-added",
            ChangeKind::SubjectIdentifierRemoved => "subject-identifier-removed",
            ChangeKind::SubjectLocatorAdded => "subject-locator-added",
            ChangeKind::SubjectLocatorRemoved => "subject-locator-removed",
            ChangeKind::Merged => "merged",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old/new payload of a change.
///
/// `Scope` carries the theme set itself, not just the id, so the payload
/// stays meaningful after later scope rewrites.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeValue {
    None,
    Construct(ConstructId),
    Snapshot(Box<ConstructSnapshot>),
    Locator(Locator),
    Text(String),
    Literal { value: String, datatype: Locator },
    Scope { id: ScopeId, themes: BTreeSet<ConstructId> },
}

impl ChangeValue {
    /// Topic ids a payload contributes to the concerned-topic set.
    pub(crate) fn referenced_construct(&self) -> Option<ConstructId> {
        match self {
            ChangeValue::Construct(id) => Some(*id),
            ChangeValue::Snapshot(snap) => Some(snap.id()),
            _ => None,
        }
    }
}

/// Immutable atomic change record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub subject: ConstructId,
    pub new_value: ChangeValue,
    pub old_value: ChangeValue,
}

impl Change {
    pub fn new(
        kind: ChangeKind,
        subject: ConstructId,
        new_value: ChangeValue,
        old_value: ChangeValue,
    ) -> Self {
        Self {
            kind,
            subject,
            new_value,
            old_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_shape_is_snake_case() {
        let change = Change::new(
            ChangeKind::ConstructAdded,
            ConstructId::new(2),
            ChangeValue::Construct(ConstructId::new(2)),
            ChangeValue::None,
        );
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["kind"], "construct_added");
        assert_eq!(json["new_value"]["construct"], 2);
    }

    #[test]
    fn snapshot_payload_reports_its_construct() {
        use crate::model::{Construct, ConstructSnapshot, Topic};
        let snap = ConstructSnapshot {
            construct: Construct::Topic(Topic::new(ConstructId::new(9), ConstructId::new(1))),
            children: vec![],
        };
        let value = ChangeValue::Snapshot(Box::new(snap));
        assert_eq!(value.referenced_construct(), Some(ConstructId::new(9)));
    }
}
