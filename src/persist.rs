//! Layer 11: Persistence adapter boundary
//!
//! The store itself is memory-resident; durability is delegated through
//! this trait. The call shape is identical whether the backing is a
//! relational schema or nothing at all: one call per construct created or
//! removed, one call per attribute touched, `ParamType` naming the
//! attribute.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::change::{Change, ChangeKind, ChangeValue};
use crate::id::ConstructId;
use crate::listener::ChangeListener;
use crate::model::ConstructSnapshot;

/// Closed enumeration of persisted attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    ItemIdentifier,
    SubjectIdentifier,
    SubjectLocator,
    Type,
    Supertype,
    Player,
    Scope,
    Value,
    Reifier,
}

/// Attribute value crossing the adapter boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    None,
    Construct(ConstructId),
    Constructs(Vec<ConstructId>),
    Text(String),
    Locator(String),
}

#[derive(Debug, Error)]
#[error("persistence adapter failed: {reason}")]
pub struct PersistError {
    pub reason: String,
}

/// Consumed persistence interface.
///
/// Implementations map these calls onto their layout (one row per
/// construct, junction tables per many-to-many relation); the store never
/// sees that layout.
pub trait PersistenceAdapter: Send + Sync {
    fn create(&self, id: ConstructId) -> Result<(), PersistError>;
    fn modify(&self, id: ConstructId, param: ParamType, value: ParamValue)
    -> Result<(), PersistError>;
    fn remove(&self, id: ConstructId) -> Result<(), PersistError>;
    fn read(&self, id: ConstructId, param: ParamType) -> Result<Option<ParamValue>, PersistError>;
}

/// Memory-resident adapter: records the calls, persists nothing.
#[derive(Default)]
pub struct InMemoryAdapter {
    rows: Mutex<BTreeMap<ConstructId, BTreeMap<ParamType, ParamValue>>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().expect("adapter poisoned").len()
    }
}

impl PersistenceAdapter for InMemoryAdapter {
    fn create(&self, id: ConstructId) -> Result<(), PersistError> {
        self.rows
            .lock()
            .expect("adapter poisoned")
            .entry(id)
            .or_default();
        Ok(())
    }

    fn modify(
        &self,
        id: ConstructId,
        param: ParamType,
        value: ParamValue,
    ) -> Result<(), PersistError> {
        self.rows
            .lock()
            .expect("adapter poisoned")
            .entry(id)
            .or_default()
            .insert(param, value);
        Ok(())
    }

    fn remove(&self, id: ConstructId) -> Result<(), PersistError> {
        self.rows.lock().expect("adapter poisoned").remove(&id);
        Ok(())
    }

    fn read(&self, id: ConstructId, param: ParamType) -> Result<Option<ParamValue>, PersistError> {
        Ok(self
            .rows
            .lock()
            .expect("adapter poisoned")
            .get(&id)
            .and_then(|row| row.get(&param))
            .cloned())
    }
}

/// Bridges the listener surface onto an adapter: each atomic change becomes
/// the corresponding create/modify/remove call. Register it like any other
/// listener; adapter errors are logged, not surfaced - the in-memory store
/// is the source of truth and persistence is best-effort by contract.
pub struct PersistenceBridge<A> {
    adapter: A,
}

impl<A: PersistenceAdapter> PersistenceBridge<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn remove_subtree(&self, snapshot: &ConstructSnapshot) -> Result<(), PersistError> {
        for child in &snapshot.children {
            self.remove_subtree(child)?;
        }
        self.adapter.remove(snapshot.id())
    }

    fn apply(&self, change: &Change) -> Result<(), PersistError> {
        let id = change.subject;
        match change.kind {
            ChangeKind::ConstructAdded => self.adapter.create(id),
            ChangeKind::ConstructRemoved => {
                // The whole owned subtree went with the construct.
                if let ChangeValue::Snapshot(snap) = &change.old_value {
                    self.remove_subtree(snap)
                } else {
                    self.adapter.remove(id)
                }
            }
            ChangeKind::Merged => {
                // Only the absorbed topic's row dies; its surviving
                // children were re-homed, not removed.
                if let ChangeValue::Snapshot(snap) = &change.old_value {
                    self.adapter.remove(snap.id())?;
                }
                Ok(())
            }
            ChangeKind::TypeSet | ChangeKind::TypeAdded | ChangeKind::TypeRemoved => self
                .adapter
                .modify(id, ParamType::Type, param_value(&change.new_value)),
            ChangeKind::SupertypeAdded | ChangeKind::SupertypeRemoved => self
                .adapter
                .modify(id, ParamType::Supertype, param_value(&change.new_value)),
            ChangeKind::PlayerModified => self
                .adapter
                .modify(id, ParamType::Player, param_value(&change.new_value)),
            ChangeKind::ScopeModified => self
                .adapter
                .modify(id, ParamType::Scope, param_value(&change.new_value)),
            ChangeKind::ValueModified => self
                .adapter
                .modify(id, ParamType::Value, param_value(&change.new_value)),
            ChangeKind::ReifierSet => self
                .adapter
                .modify(id, ParamType::Reifier, param_value(&change.new_value)),
            ChangeKind::ItemIdentifierAdded | ChangeKind::ItemIdentifierRemoved => self
                .adapter
                .modify(id, ParamType::ItemIdentifier, param_value(&change.new_value)),
            ChangeKind::SubjectIdentifierAdded | ChangeKind::SubjectIdentifierRemoved => self
                .adapter
                .modify(
                    id,
                    ParamType::SubjectIdentifier,
                    param_value(&change.new_value),
                ),
            ChangeKind::SubjectLocatorAdded | ChangeKind::SubjectLocatorRemoved => self
                .adapter
                .modify(id, ParamType::SubjectLocator, param_value(&change.new_value)),
        }
    }
}

impl<A: PersistenceAdapter> ChangeListener for PersistenceBridge<A> {
    fn notify(&self, change: &Change) {
        if let Err(err) = self.apply(change) {
            tracing::warn!(change = %change.kind, error = %err, "persistence adapter rejected change");
        }
    }
}

fn param_value(value: &ChangeValue) -> ParamValue {
    match value {
        ChangeValue::None => ParamValue::None,
        ChangeValue::Construct(id) => ParamValue::Construct(*id),
        ChangeValue::Snapshot(snap) => ParamValue::Construct(snap.id()),
        ChangeValue::Locator(l) => ParamValue::Locator(l.as_str().to_owned()),
        ChangeValue::Text(s) => ParamValue::Text(s.clone()),
        ChangeValue::Literal { value, .. } => ParamValue::Text(value.clone()),
        ChangeValue::Scope { themes, .. } => {
            ParamValue::Constructs(themes.iter().copied().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_translates_adds_and_removes() {
        let bridge = PersistenceBridge::new(InMemoryAdapter::new());
        let id = ConstructId::new(4);
        bridge.notify(&Change::new(
            ChangeKind::ConstructAdded,
            id,
            ChangeValue::Construct(id),
            ChangeValue::None,
        ));
        assert_eq!(bridge.adapter().row_count(), 1);
        bridge.notify(&Change::new(
            ChangeKind::ConstructRemoved,
            id,
            ChangeValue::None,
            ChangeValue::None,
        ));
        assert_eq!(bridge.adapter().row_count(), 0);
    }

    #[test]
    fn modify_round_trips_through_read() {
        let adapter = InMemoryAdapter::new();
        let id = ConstructId::new(4);
        adapter.create(id).unwrap();
        adapter
            .modify(id, ParamType::Value, ParamValue::Text("x".into()))
            .unwrap();
        assert_eq!(
            adapter.read(id, ParamType::Value).unwrap(),
            Some(ParamValue::Text("x".into()))
        );
        assert_eq!(adapter.read(id, ParamType::Player).unwrap(), None);
    }
}
