//! Layer 7: Identity store
//!
//! Bijection between locators and constructs: three tables (item
//! identifiers, subject identifiers, subject locators), each mapping a
//! locator to at most one construct map-wide. This store does the
//! bookkeeping; collision *policy* (merge vs. hard conflict) lives in the
//! map, which knows construct kinds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ConstructId;
use crate::locator::{IdentityKind, Locator};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityStore {
    item_identifiers: BTreeMap<Locator, ConstructId>,
    subject_identifiers: BTreeMap<Locator, ConstructId>,
    subject_locators: BTreeMap<Locator, ConstructId>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: IdentityKind) -> &BTreeMap<Locator, ConstructId> {
        match kind {
            IdentityKind::ItemIdentifier => &self.item_identifiers,
            IdentityKind::SubjectIdentifier => &self.subject_identifiers,
            IdentityKind::SubjectLocator => &self.subject_locators,
        }
    }

    fn table_mut(&mut self, kind: IdentityKind) -> &mut BTreeMap<Locator, ConstructId> {
        match kind {
            IdentityKind::ItemIdentifier => &mut self.item_identifiers,
            IdentityKind::SubjectIdentifier => &mut self.subject_identifiers,
            IdentityKind::SubjectLocator => &mut self.subject_locators,
        }
    }

    pub fn resolve_item_identifier(&self, locator: &Locator) -> Option<ConstructId> {
        self.item_identifiers.get(locator).copied()
    }

    pub fn resolve_subject_identifier(&self, locator: &Locator) -> Option<ConstructId> {
        self.subject_identifiers.get(locator).copied()
    }

    pub fn resolve_subject_locator(&self, locator: &Locator) -> Option<ConstructId> {
        self.subject_locators.get(locator).copied()
    }

    /// Current holder of `locator` in the `kind` table.
    pub fn holder(&self, kind: IdentityKind, locator: &Locator) -> Option<ConstructId> {
        self.table(kind).get(locator).copied()
    }

    /// Bind unconditionally. The map has already decided the collision
    /// policy by the time this runs.
    pub(crate) fn bind(&mut self, kind: IdentityKind, locator: Locator, id: ConstructId) {
        self.table_mut(kind).insert(locator, id);
    }

    pub(crate) fn unbind(&mut self, kind: IdentityKind, locator: &Locator) -> Option<ConstructId> {
        self.table_mut(kind).remove(locator)
    }

    pub fn item_identifier_count(&self) -> usize {
        self.item_identifiers.len()
    }

    pub fn subject_identifier_count(&self) -> usize {
        self.subject_identifiers.len()
    }

    pub fn subject_locator_count(&self) -> usize {
        self.subject_locators.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(raw: u64) -> ConstructId {
        ConstructId::new(raw)
    }

    fn loc(s: &str) -> Locator {
        Locator::new_unchecked(s)
    }

    #[test]
    fn resolve_is_stable_without_mutation() {
        let mut store = IdentityStore::new();
        store.bind(IdentityKind::SubjectIdentifier, loc("si:1"), cid(4));
        let a = store.resolve_subject_identifier(&loc("si:1"));
        let b = store.resolve_subject_identifier(&loc("si:1"));
        assert_eq!(a, b);
        assert_eq!(a, Some(cid(4)));
    }

    #[test]
    fn tables_are_independent() {
        let mut store = IdentityStore::new();
        store.bind(IdentityKind::ItemIdentifier, loc("x:1"), cid(4));
        store.bind(IdentityKind::SubjectIdentifier, loc("x:1"), cid(5));
        assert_eq!(store.resolve_item_identifier(&loc("x:1")), Some(cid(4)));
        assert_eq!(store.resolve_subject_identifier(&loc("x:1")), Some(cid(5)));
        assert_eq!(store.resolve_subject_locator(&loc("x:1")), None);
    }

    #[test]
    fn unbind_clears_one_binding() {
        let mut store = IdentityStore::new();
        store.bind(IdentityKind::SubjectLocator, loc("sl:1"), cid(4));
        assert_eq!(
            store.unbind(IdentityKind::SubjectLocator, &loc("sl:1")),
            Some(cid(4))
        );
        assert_eq!(store.resolve_subject_locator(&loc("sl:1")), None);
    }
}
