//! Layer 4: Construct records
//!
//! One record per construct kind. Relations are id-to-id edges: a record
//! never owns another construct, it names it. Ownership lives in the arena;
//! rewiring an edge is a map update, not a graph mutation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::{ConstructId, ConstructKind, ScopeId};
use crate::locator::Locator;

/// Root record for the map itself.
///
/// The map is addressable like any construct (item identifiers attach to
/// it) but has no parent and cannot be reified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRecord {
    pub id: ConstructId,
    pub item_identifiers: BTreeSet<Locator>,
    pub topics: BTreeSet<ConstructId>,
    pub associations: BTreeSet<ConstructId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: ConstructId,
    pub parent: ConstructId,
    pub item_identifiers: BTreeSet<Locator>,
    pub subject_identifiers: BTreeSet<Locator>,
    pub subject_locators: BTreeSet<Locator>,
    pub types: BTreeSet<ConstructId>,
    pub supertypes: BTreeSet<ConstructId>,
    pub names: BTreeSet<ConstructId>,
    pub occurrences: BTreeSet<ConstructId>,
    pub roles_played: BTreeSet<ConstructId>,
    /// Construct this topic reifies, if any. Symmetric with that
    /// construct's `reifier` edge.
    pub reifies: Option<ConstructId>,
}

impl Topic {
    pub(crate) fn new(id: ConstructId, parent: ConstructId) -> Self {
        Self {
            id,
            parent,
            item_identifiers: BTreeSet::new(),
            subject_identifiers: BTreeSet::new(),
            subject_locators: BTreeSet::new(),
            types: BTreeSet::new(),
            supertypes: BTreeSet::new(),
            names: BTreeSet::new(),
            occurrences: BTreeSet::new(),
            roles_played: BTreeSet::new(),
            reifies: None,
        }
    }

    /// Owned characteristics plus played roles - the merge engine uses this
    /// to pick the cheaper side to absorb.
    pub(crate) fn content_size(&self) -> usize {
        self.names.len() + self.occurrences.len() + self.roles_played.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: ConstructId,
    pub parent: ConstructId,
    pub item_identifiers: BTreeSet<Locator>,
    pub typ: ConstructId,
    pub scope: ScopeId,
    pub roles: BTreeSet<ConstructId>,
    pub reifier: Option<ConstructId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: ConstructId,
    pub parent: ConstructId,
    pub item_identifiers: BTreeSet<Locator>,
    pub typ: ConstructId,
    pub player: ConstructId,
    pub reifier: Option<ConstructId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub id: ConstructId,
    pub parent: ConstructId,
    pub item_identifiers: BTreeSet<Locator>,
    pub typ: ConstructId,
    pub scope: ScopeId,
    pub value: String,
    pub variants: BTreeSet<ConstructId>,
    pub reifier: Option<ConstructId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: ConstructId,
    pub parent: ConstructId,
    pub item_identifiers: BTreeSet<Locator>,
    pub typ: ConstructId,
    pub scope: ScopeId,
    pub value: String,
    pub datatype: Locator,
    pub reifier: Option<ConstructId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: ConstructId,
    pub parent: ConstructId,
    pub item_identifiers: BTreeSet<Locator>,
    pub scope: ScopeId,
    pub value: String,
    pub datatype: Locator,
    pub reifier: Option<ConstructId>,
}

/// The construct sum - what the arena stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construct {
    TopicMap(MapRecord),
    Topic(Topic),
    Association(Association),
    Role(Role),
    Name(Name),
    Occurrence(Occurrence),
    Variant(Variant),
}

impl Construct {
    pub fn id(&self) -> ConstructId {
        match self {
            Construct::TopicMap(c) => c.id,
            Construct::Topic(c) => c.id,
            Construct::Association(c) => c.id,
            Construct::Role(c) => c.id,
            Construct::Name(c) => c.id,
            Construct::Occurrence(c) => c.id,
            Construct::Variant(c) => c.id,
        }
    }

    pub fn kind(&self) -> ConstructKind {
        match self {
            Construct::TopicMap(_) => ConstructKind::TopicMap,
            Construct::Topic(_) => ConstructKind::Topic,
            Construct::Association(_) => ConstructKind::Association,
            Construct::Role(_) => ConstructKind::Role,
            Construct::Name(_) => ConstructKind::Name,
            Construct::Occurrence(_) => ConstructKind::Occurrence,
            Construct::Variant(_) => ConstructKind::Variant,
        }
    }

    /// Parent construct; `None` only for the map itself.
    pub fn parent(&self) -> Option<ConstructId> {
        match self {
            Construct::TopicMap(_) => None,
            Construct::Topic(c) => Some(c.parent),
            Construct::Association(c) => Some(c.parent),
            Construct::Role(c) => Some(c.parent),
            Construct::Name(c) => Some(c.parent),
            Construct::Occurrence(c) => Some(c.parent),
            Construct::Variant(c) => Some(c.parent),
        }
    }

    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        match self {
            Construct::TopicMap(c) => &c.item_identifiers,
            Construct::Topic(c) => &c.item_identifiers,
            Construct::Association(c) => &c.item_identifiers,
            Construct::Role(c) => &c.item_identifiers,
            Construct::Name(c) => &c.item_identifiers,
            Construct::Occurrence(c) => &c.item_identifiers,
            Construct::Variant(c) => &c.item_identifiers,
        }
    }

    pub(crate) fn item_identifiers_mut(&mut self) -> &mut BTreeSet<Locator> {
        match self {
            Construct::TopicMap(c) => &mut c.item_identifiers,
            Construct::Topic(c) => &mut c.item_identifiers,
            Construct::Association(c) => &mut c.item_identifiers,
            Construct::Role(c) => &mut c.item_identifiers,
            Construct::Name(c) => &mut c.item_identifiers,
            Construct::Occurrence(c) => &mut c.item_identifiers,
            Construct::Variant(c) => &mut c.item_identifiers,
        }
    }

    /// Reifying topic, for reifiable kinds.
    pub fn reifier(&self) -> Option<ConstructId> {
        match self {
            Construct::TopicMap(_) | Construct::Topic(_) => None,
            Construct::Association(c) => c.reifier,
            Construct::Role(c) => c.reifier,
            Construct::Name(c) => c.reifier,
            Construct::Occurrence(c) => c.reifier,
            Construct::Variant(c) => c.reifier,
        }
    }

    pub(crate) fn set_reifier(&mut self, reifier: Option<ConstructId>) -> bool {
        let slot = match self {
            Construct::TopicMap(_) | Construct::Topic(_) => return false,
            Construct::Association(c) => &mut c.reifier,
            Construct::Role(c) => &mut c.reifier,
            Construct::Name(c) => &mut c.reifier,
            Construct::Occurrence(c) => &mut c.reifier,
            Construct::Variant(c) => &mut c.reifier,
        };
        *slot = reifier;
        true
    }

    /// Scope, for scoped kinds (association, name, occurrence, variant).
    pub fn scope(&self) -> Option<ScopeId> {
        match self {
            Construct::Association(c) => Some(c.scope),
            Construct::Name(c) => Some(c.scope),
            Construct::Occurrence(c) => Some(c.scope),
            Construct::Variant(c) => Some(c.scope),
            _ => None,
        }
    }

    pub(crate) fn set_scope(&mut self, scope: ScopeId) -> bool {
        let slot = match self {
            Construct::Association(c) => &mut c.scope,
            Construct::Name(c) => &mut c.scope,
            Construct::Occurrence(c) => &mut c.scope,
            Construct::Variant(c) => &mut c.scope,
            _ => return false,
        };
        *slot = scope;
        true
    }

    /// Type topic, for typed kinds (association, role, name, occurrence).
    pub fn typ(&self) -> Option<ConstructId> {
        match self {
            Construct::Association(c) => Some(c.typ),
            Construct::Role(c) => Some(c.typ),
            Construct::Name(c) => Some(c.typ),
            Construct::Occurrence(c) => Some(c.typ),
            _ => None,
        }
    }

    pub(crate) fn set_typ(&mut self, typ: ConstructId) -> bool {
        let slot = match self {
            Construct::Association(c) => &mut c.typ,
            Construct::Role(c) => &mut c.typ,
            Construct::Name(c) => &mut c.typ,
            Construct::Occurrence(c) => &mut c.typ,
            _ => return false,
        };
        *slot = typ;
        true
    }
}

/// Frozen deep copy of a construct and its owned subtree.
///
/// Captured at removal/merge time so history queries see pre-removal state
/// no matter what happens to the live graph afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructSnapshot {
    pub construct: Construct,
    pub children: Vec<ConstructSnapshot>,
}

impl ConstructSnapshot {
    pub fn id(&self) -> ConstructId {
        self.construct.id()
    }

    pub fn kind(&self) -> ConstructKind {
        self.construct.kind()
    }

    /// Total constructs captured, the root included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(ConstructSnapshot::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_not_reifiable_or_typed() {
        let t = Construct::Topic(Topic::new(ConstructId::new(2), ConstructId::new(1)));
        assert_eq!(t.reifier(), None);
        assert_eq!(t.typ(), None);
        assert_eq!(t.scope(), None);
        assert_eq!(t.kind(), ConstructKind::Topic);
    }

    #[test]
    fn snapshot_len_counts_subtree() {
        let root = ConstructSnapshot {
            construct: Construct::Topic(Topic::new(ConstructId::new(2), ConstructId::new(1))),
            children: vec![ConstructSnapshot {
                construct: Construct::Topic(Topic::new(ConstructId::new(3), ConstructId::new(1))),
                children: vec![],
            }],
        };
        assert_eq!(root.len(), 2);
    }
}
