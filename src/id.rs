//! Layer 1: Identity atoms
//!
//! ConstructId: process-unique, never-reused construct identifier.
//! ScopeId: canonical theme-set identifier.
//! RevisionId: strictly increasing revision identifier.
//! TopicMapId: store instance identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Construct identifier - allocated from a per-map monotonic counter.
///
/// Ids are never reused; a removed construct's id stays burned so stale
/// references are detectable instead of silently re-resolving.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstructId(u64);

impl ConstructId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ConstructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstructId({})", self.0)
    }
}

impl fmt::Display for ConstructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical scope identifier.
///
/// One id per distinct theme set within a map; `UNCONSTRAINED` is the
/// interned empty set. Ids are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(u64);

impl ScopeId {
    /// The empty scope - statements valid in every context.
    pub const UNCONSTRAINED: ScopeId = ScopeId(0);

    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_unconstrained(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

/// Revision identifier - strictly increasing, starting at 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(u64);

impl RevisionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    pub(crate) fn next(&self) -> RevisionId {
        RevisionId(self.0 + 1)
    }
}

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", self.0)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store instance identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicMapId(Uuid);

impl TopicMapId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TopicMapId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for TopicMapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicMapId({})", self.0)
    }
}

impl fmt::Display for TopicMapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Construct kind discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
    TopicMap,
    Topic,
    Association,
    Role,
    Name,
    Occurrence,
    Variant,
}

impl ConstructKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstructKind::TopicMap => "topic-map",
            ConstructKind::Topic => "topic",
            ConstructKind::Association => "association",
            ConstructKind::Role => "role",
            ConstructKind::Name => "name",
            ConstructKind::Occurrence => "occurrence",
            ConstructKind::Variant => "variant",
        }
    }
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_zero_is_unconstrained() {
        assert!(ScopeId::UNCONSTRAINED.is_unconstrained());
        assert!(!ScopeId::new(1).is_unconstrained());
    }

    #[test]
    fn revision_ids_increase() {
        let r = RevisionId::new(1);
        assert_eq!(r.next().get(), 2);
    }
}
