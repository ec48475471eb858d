//! Layer 12: The topic map store
//!
//! `TopicMap` owns the arena, the identity/scope stores, the reverse
//! indexes, the revision history, and the listener set. Every public
//! mutation validates eagerly, applies, records its changes into the open
//! revision (one revision per outermost operation), and notifies listeners
//! once per atomic change.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::arena::ConstructArena;
use crate::change::{Change, ChangeKind, ChangeValue};
use crate::error::{IdentityConflict, InvalidScope, InvalidType, Result};
use crate::history::RevisionStore;
use crate::id::{ConstructId, ConstructKind, ScopeId, TopicMapId};
use crate::identity::IdentityStore;
use crate::listener::{ChangeListener, ListenerId, ListenerSet};
use crate::locator::{IdentityKind, Locator};
use crate::model::{
    Association, Construct, MapRecord, Name, Occurrence, Role, Topic, Variant,
};
use crate::scope::ScopeStore;
use crate::time::WallClock;

#[derive(Clone, Copy, Debug)]
pub struct TopicMapConfig {
    /// Record revisions. Listeners fire either way.
    pub history: bool,
}

impl Default for TopicMapConfig {
    fn default() -> Self {
        Self { history: true }
    }
}

#[derive(Clone, Debug)]
pub struct TopicMap {
    id: TopicMapId,
    map_id: ConstructId,
    pub(crate) arena: ConstructArena,
    pub(crate) identity: IdentityStore,
    pub(crate) scopes: ScopeStore,
    pub(crate) history: RevisionStore,
    config: TopicMapConfig,
    listeners: ListenerSet,
    /// Type topic -> typed constructs (associations, roles, names,
    /// occurrences). Topics typed by a topic live in `instances`.
    pub(crate) typed_by: BTreeMap<ConstructId, BTreeSet<ConstructId>>,
    pub(crate) instances: BTreeMap<ConstructId, BTreeSet<ConstructId>>,
    pub(crate) subtypes: BTreeMap<ConstructId, BTreeSet<ConstructId>>,
    /// Absorbed topic -> survivor, for resolving ids across merges.
    pub(crate) merged_into: BTreeMap<ConstructId, ConstructId>,
    op_depth: u32,
    muted: bool,
    pending: Vec<Change>,
}

impl Default for TopicMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicMap {
    pub fn new() -> Self {
        Self::with_config(TopicMapConfig::default())
    }

    pub fn with_config(config: TopicMapConfig) -> Self {
        let mut arena = ConstructArena::new();
        let map_id = arena.allocate_id();
        arena.insert(Construct::TopicMap(MapRecord {
            id: map_id,
            item_identifiers: BTreeSet::new(),
            topics: BTreeSet::new(),
            associations: BTreeSet::new(),
        }));
        Self {
            id: TopicMapId::generate(),
            map_id,
            arena,
            identity: IdentityStore::new(),
            scopes: ScopeStore::new(),
            history: RevisionStore::new(),
            config,
            listeners: ListenerSet::new(),
            typed_by: BTreeMap::new(),
            instances: BTreeMap::new(),
            subtypes: BTreeMap::new(),
            merged_into: BTreeMap::new(),
            op_depth: 0,
            muted: false,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> TopicMapId {
        self.id
    }

    /// Id of the map construct itself.
    pub fn map_construct(&self) -> ConstructId {
        self.map_id
    }

    pub fn history(&self) -> &RevisionStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut RevisionStore {
        &mut self.history
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn register_listener(&mut self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    // =========================================================================
    // Operation batching and change recording
    // =========================================================================

    pub(crate) fn begin_op(&mut self) {
        self.op_depth += 1;
    }

    pub(crate) fn end_op(&mut self) {
        debug_assert!(self.op_depth > 0);
        self.op_depth -= 1;
        if self.op_depth == 0 && self.config.history {
            self.history.seal_revision();
        }
    }

    fn with_op<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin_op();
        let out = f(self);
        self.end_op();
        out
    }

    /// Group several operations into one revision. Grouping only - if `f`
    /// fails midway, already-applied operations stay applied; atomicity is
    /// the transaction layer's job.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.with_op(f)
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub(crate) fn take_pending(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn notify_raw(&self, change: &Change) {
        self.listeners.notify(change);
    }

    /// Record one atomic change: changeset append first (when history is
    /// on), then listener fan-out.
    pub(crate) fn record(&mut self, change: Change) {
        let (topics, association_type) = self.concerns(&change);
        if self.config.history {
            if !self.history.has_open_revision() {
                self.history.create_revision(WallClock::now());
            }
            self.history.add_change(change.clone(), &topics, association_type);
        }
        if self.muted {
            self.pending.push(change);
        } else {
            self.listeners.notify(&change);
        }
    }

    /// Topics and association type a change concerns. A topic is concerned
    /// if it is the subject, an old/new value, or (for role subjects) the
    /// role's player; the association type is captured at change time.
    fn concerns(&self, change: &Change) -> (BTreeSet<ConstructId>, Option<ConstructId>) {
        let mut topics = BTreeSet::new();
        let mut association_type = None;

        let subject_kind = self
            .arena
            .get_opt(change.subject)
            .map(Construct::kind)
            .or_else(|| match &change.old_value {
                ChangeValue::Snapshot(snap) if snap.id() == change.subject => Some(snap.kind()),
                _ => None,
            });

        match subject_kind {
            Some(ConstructKind::Topic) => {
                topics.insert(change.subject);
            }
            Some(ConstructKind::Role) => {
                let edges = match self.arena.get_opt(change.subject) {
                    Some(Construct::Role(role)) => Some((role.player, role.parent)),
                    _ => match &change.old_value {
                        ChangeValue::Snapshot(snap) => match &snap.construct {
                            Construct::Role(role) => Some((role.player, role.parent)),
                            _ => None,
                        },
                        _ => None,
                    },
                };
                if let Some((player, parent)) = edges {
                    topics.insert(player);
                    if let Some(Construct::Association(assoc)) = self.arena.get_opt(parent) {
                        association_type = Some(assoc.typ);
                    }
                }
            }
            Some(ConstructKind::Association) => {
                // A retype is indexed under the type the association had
                // when the change was initiated.
                let typ = if change.kind == ChangeKind::TypeSet {
                    match &change.old_value {
                        ChangeValue::Construct(id) => Some(*id),
                        _ => None,
                    }
                } else {
                    self.arena
                        .get_opt(change.subject)
                        .and_then(Construct::typ)
                        .or_else(|| match &change.old_value {
                            ChangeValue::Snapshot(snap) => snap.construct.typ(),
                            _ => None,
                        })
                };
                association_type = typ;
            }
            _ => {}
        }

        for value in [&change.old_value, &change.new_value] {
            if let Some(id) = value.referenced_construct() {
                let is_topic = match self.arena.get_opt(id) {
                    Some(c) => c.kind() == ConstructKind::Topic,
                    None => matches!(value, ChangeValue::Snapshot(s) if s.kind() == ConstructKind::Topic),
                };
                if is_topic {
                    topics.insert(id);
                }
            }
        }

        (topics, association_type)
    }

    // =========================================================================
    // Kind-checked access
    // =========================================================================

    pub fn construct_by_id(&self, id: ConstructId) -> Result<&Construct> {
        self.arena.get(id)
    }

    fn kind_mismatch(id: ConstructId, expected: ConstructKind, actual: ConstructKind) -> crate::error::TopicMapError {
        InvalidType::KindMismatch {
            id,
            expected,
            actual,
        }
        .into()
    }

    pub fn topic(&self, id: ConstructId) -> Result<&Topic> {
        match self.arena.get(id)? {
            Construct::Topic(t) => Ok(t),
            c => Err(Self::kind_mismatch(id, ConstructKind::Topic, c.kind())),
        }
    }

    pub(crate) fn topic_mut(&mut self, id: ConstructId) -> Result<&mut Topic> {
        match self.arena.get_mut(id)? {
            Construct::Topic(t) => Ok(t),
            c => Err(Self::kind_mismatch(id, ConstructKind::Topic, c.kind())),
        }
    }

    pub fn association(&self, id: ConstructId) -> Result<&Association> {
        match self.arena.get(id)? {
            Construct::Association(a) => Ok(a),
            c => Err(Self::kind_mismatch(id, ConstructKind::Association, c.kind())),
        }
    }

    pub(crate) fn association_mut(&mut self, id: ConstructId) -> Result<&mut Association> {
        match self.arena.get_mut(id)? {
            Construct::Association(a) => Ok(a),
            c => Err(Self::kind_mismatch(id, ConstructKind::Association, c.kind())),
        }
    }

    pub fn role(&self, id: ConstructId) -> Result<&Role> {
        match self.arena.get(id)? {
            Construct::Role(r) => Ok(r),
            c => Err(Self::kind_mismatch(id, ConstructKind::Role, c.kind())),
        }
    }

    pub(crate) fn role_mut(&mut self, id: ConstructId) -> Result<&mut Role> {
        match self.arena.get_mut(id)? {
            Construct::Role(r) => Ok(r),
            c => Err(Self::kind_mismatch(id, ConstructKind::Role, c.kind())),
        }
    }

    pub fn name(&self, id: ConstructId) -> Result<&Name> {
        match self.arena.get(id)? {
            Construct::Name(n) => Ok(n),
            c => Err(Self::kind_mismatch(id, ConstructKind::Name, c.kind())),
        }
    }

    pub(crate) fn name_mut(&mut self, id: ConstructId) -> Result<&mut Name> {
        match self.arena.get_mut(id)? {
            Construct::Name(n) => Ok(n),
            c => Err(Self::kind_mismatch(id, ConstructKind::Name, c.kind())),
        }
    }

    pub fn occurrence(&self, id: ConstructId) -> Result<&Occurrence> {
        match self.arena.get(id)? {
            Construct::Occurrence(o) => Ok(o),
            c => Err(Self::kind_mismatch(id, ConstructKind::Occurrence, c.kind())),
        }
    }

    pub(crate) fn occurrence_mut(&mut self, id: ConstructId) -> Result<&mut Occurrence> {
        match self.arena.get_mut(id)? {
            Construct::Occurrence(o) => Ok(o),
            c => Err(Self::kind_mismatch(id, ConstructKind::Occurrence, c.kind())),
        }
    }

    pub fn variant(&self, id: ConstructId) -> Result<&Variant> {
        match self.arena.get(id)? {
            Construct::Variant(v) => Ok(v),
            c => Err(Self::kind_mismatch(id, ConstructKind::Variant, c.kind())),
        }
    }

    pub(crate) fn variant_mut(&mut self, id: ConstructId) -> Result<&mut Variant> {
        match self.arena.get_mut(id)? {
            Construct::Variant(v) => Ok(v),
            c => Err(Self::kind_mismatch(id, ConstructKind::Variant, c.kind())),
        }
    }

    pub(crate) fn map_record_mut(&mut self) -> &mut MapRecord {
        match self.arena.get_mut(self.map_id) {
            Ok(Construct::TopicMap(m)) => m,
            _ => unreachable!("map record is never removed"),
        }
    }

    fn map_record(&self) -> &MapRecord {
        match self.arena.get_opt(self.map_id) {
            Some(Construct::TopicMap(m)) => m,
            _ => unreachable!("map record is never removed"),
        }
    }

    fn require_topic(&self, id: ConstructId) -> Result<()> {
        self.topic(id).map(|_| ())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.map_record().topics.iter().filter_map(|id| {
            match self.arena.get_opt(*id) {
                Some(Construct::Topic(t)) => Some(t),
                _ => None,
            }
        })
    }

    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.map_record().associations.iter().filter_map(|id| {
            match self.arena.get_opt(*id) {
                Some(Construct::Association(a)) => Some(a),
                _ => None,
            }
        })
    }

    pub fn topic_count(&self) -> usize {
        self.map_record().topics.len()
    }

    pub fn association_count(&self) -> usize {
        self.map_record().associations.len()
    }

    pub fn topic_by_subject_identifier(&self, locator: &Locator) -> Option<&Topic> {
        let id = self.identity.resolve_subject_identifier(locator)?;
        self.topic(id).ok()
    }

    pub fn topic_by_subject_locator(&self, locator: &Locator) -> Option<&Topic> {
        let id = self.identity.resolve_subject_locator(locator)?;
        self.topic(id).ok()
    }

    pub fn construct_by_item_identifier(&self, locator: &Locator) -> Option<&Construct> {
        let id = self.identity.resolve_item_identifier(locator)?;
        self.arena.get_opt(id)
    }

    /// Topics carrying `typ` directly in their type set.
    pub fn topics_by_type(&self, typ: ConstructId) -> BTreeSet<ConstructId> {
        self.instances.get(&typ).cloned().unwrap_or_default()
    }

    /// Follow merges: the id that now carries `id`'s subject. Identity for
    /// ids that were never absorbed.
    pub fn surviving_id(&self, id: ConstructId) -> ConstructId {
        let mut current = id;
        while let Some(&next) = self.merged_into.get(&current) {
            current = next;
        }
        current
    }

    /// Canonical scope for a validated theme set.
    pub fn get_scope(&mut self, themes: &[ConstructId]) -> Result<ScopeId> {
        self.intern_scope(themes)
    }

    pub fn scope_themes(&self, scope: ScopeId) -> &BTreeSet<ConstructId> {
        self.scopes.themes(scope)
    }

    /// Constructs bearing exactly `scope`.
    pub fn scoped_constructs(&self, scope: ScopeId) -> &BTreeSet<ConstructId> {
        self.scopes.get_scoped(scope)
    }

    fn intern_scope(&mut self, themes: &[ConstructId]) -> Result<ScopeId> {
        for &theme in themes {
            if self.topic(theme).is_err() {
                return Err(InvalidScope::ThemeNotATopic { theme }.into());
            }
        }
        Ok(self.scopes.get_scope(themes.iter().copied()))
    }

    pub(crate) fn scope_value(&self, scope: ScopeId) -> ChangeValue {
        ChangeValue::Scope {
            id: scope,
            themes: self.scopes.themes(scope).clone(),
        }
    }

    // =========================================================================
    // Topic creation and identity
    // =========================================================================

    pub fn create_topic(&mut self) -> ConstructId {
        self.begin_op();
        let id = self.insert_topic();
        self.end_op();
        id
    }

    pub(crate) fn insert_topic(&mut self) -> ConstructId {
        let id = self.arena.allocate_id();
        let map_id = self.map_id;
        self.arena.insert(Construct::Topic(Topic::new(id, map_id)));
        self.map_record_mut().topics.insert(id);
        self.record(Change::new(
            ChangeKind::ConstructAdded,
            id,
            ChangeValue::Construct(id),
            ChangeValue::None,
        ));
        id
    }

    /// Resolve-or-create by subject identifier.
    pub fn create_topic_by_subject_identifier(&mut self, locator: Locator) -> Result<ConstructId> {
        if let Some(holder) = self.identity.resolve_subject_identifier(&locator) {
            return Ok(holder);
        }
        if let Some(holder) = self.identity.resolve_item_identifier(&locator) {
            if self.topic(holder).is_ok() {
                self.add_subject_identifier(holder, locator)?;
                return Ok(holder);
            }
        }
        self.with_op(|m| {
            let id = m.insert_topic();
            m.bind_identifier(id, IdentityKind::SubjectIdentifier, locator)?;
            Ok(id)
        })
    }

    /// Resolve-or-create by subject locator.
    pub fn create_topic_by_subject_locator(&mut self, locator: Locator) -> Result<ConstructId> {
        if let Some(holder) = self.identity.resolve_subject_locator(&locator) {
            return Ok(holder);
        }
        self.with_op(|m| {
            let id = m.insert_topic();
            m.bind_identifier(id, IdentityKind::SubjectLocator, locator)?;
            Ok(id)
        })
    }

    /// Resolve-or-create by item identifier. Resolves to an existing topic
    /// holding the locator as item or subject identifier; a non-topic
    /// holder is a hard conflict.
    pub fn create_topic_by_item_identifier(&mut self, locator: Locator) -> Result<ConstructId> {
        if let Some(holder) = self.identity.resolve_item_identifier(&locator) {
            return match self.topic(holder) {
                Ok(_) => Ok(holder),
                Err(_) => Err(IdentityConflict {
                    locator,
                    kind: IdentityKind::ItemIdentifier,
                    holder,
                    candidate: None,
                }
                .into()),
            };
        }
        if let Some(holder) = self.identity.resolve_subject_identifier(&locator) {
            self.add_item_identifier(holder, locator)?;
            return Ok(holder);
        }
        self.with_op(|m| {
            let id = m.insert_topic();
            m.bind_identifier(id, IdentityKind::ItemIdentifier, locator)?;
            Ok(id)
        })
    }

    /// Register a subject identifier. A collision with another topic is the
    /// merge trigger: consolidation runs first, then registration completes
    /// on the survivor.
    pub fn add_subject_identifier(&mut self, topic: ConstructId, locator: Locator) -> Result<()> {
        self.require_topic(topic)?;
        self.with_op(|m| {
            if let Some(holder) = m.identity.resolve_subject_identifier(&locator) {
                if holder == topic {
                    return Ok(());
                }
                tracing::debug!(%locator, %holder, candidate = %topic, "subject identifier collision, merging");
                let survivor = m.merge_topics(holder, topic)?;
                return m.bind_identifier(survivor, IdentityKind::SubjectIdentifier, locator);
            }
            if let Some(holder) = m.identity.resolve_item_identifier(&locator) {
                if holder != topic && m.topic(holder).is_ok() {
                    tracing::debug!(%locator, %holder, candidate = %topic, "subject/item identifier collision, merging");
                    let survivor = m.merge_topics(holder, topic)?;
                    return m.bind_identifier(survivor, IdentityKind::SubjectIdentifier, locator);
                }
            }
            m.bind_identifier(topic, IdentityKind::SubjectIdentifier, locator)
        })
    }

    pub fn remove_subject_identifier(&mut self, topic: ConstructId, locator: &Locator) -> Result<()> {
        self.require_topic(topic)?;
        self.with_op(|m| m.unbind_identifier(topic, IdentityKind::SubjectIdentifier, locator))
    }

    /// Register a subject locator. Only topics hold subject locators, so a
    /// collision always consolidates.
    pub fn add_subject_locator(&mut self, topic: ConstructId, locator: Locator) -> Result<()> {
        self.require_topic(topic)?;
        self.with_op(|m| {
            if let Some(holder) = m.identity.resolve_subject_locator(&locator) {
                if holder == topic {
                    return Ok(());
                }
                tracing::debug!(%locator, %holder, candidate = %topic, "subject locator collision, merging");
                let survivor = m.merge_topics(holder, topic)?;
                return m.bind_identifier(survivor, IdentityKind::SubjectLocator, locator);
            }
            m.bind_identifier(topic, IdentityKind::SubjectLocator, locator)
        })
    }

    pub fn remove_subject_locator(&mut self, topic: ConstructId, locator: &Locator) -> Result<()> {
        self.require_topic(topic)?;
        self.with_op(|m| m.unbind_identifier(topic, IdentityKind::SubjectLocator, locator))
    }

    /// Register an item identifier on any construct. A collision between
    /// two topics consolidates; any other collision is fatal.
    pub fn add_item_identifier(&mut self, construct: ConstructId, locator: Locator) -> Result<()> {
        let kind = self.arena.get(construct)?.kind();
        self.with_op(|m| {
            if let Some(holder) = m.identity.resolve_item_identifier(&locator) {
                if holder == construct {
                    return Ok(());
                }
                let both_topics = kind == ConstructKind::Topic && m.topic(holder).is_ok();
                if both_topics {
                    tracing::debug!(%locator, %holder, candidate = %construct, "item identifier collision, merging");
                    let survivor = m.merge_topics(holder, construct)?;
                    return m.bind_identifier(survivor, IdentityKind::ItemIdentifier, locator);
                }
                return Err(IdentityConflict {
                    locator,
                    kind: IdentityKind::ItemIdentifier,
                    holder,
                    candidate: Some(construct),
                }
                .into());
            }
            if kind == ConstructKind::Topic {
                if let Some(holder) = m.identity.resolve_subject_identifier(&locator) {
                    if holder != construct && m.topic(holder).is_ok() {
                        tracing::debug!(%locator, %holder, candidate = %construct, "item/subject identifier collision, merging");
                        let survivor = m.merge_topics(holder, construct)?;
                        return m.bind_identifier(survivor, IdentityKind::ItemIdentifier, locator);
                    }
                }
            }
            m.bind_identifier(construct, IdentityKind::ItemIdentifier, locator)
        })
    }

    pub fn remove_item_identifier(&mut self, construct: ConstructId, locator: &Locator) -> Result<()> {
        self.arena.get(construct)?;
        self.with_op(|m| m.unbind_identifier(construct, IdentityKind::ItemIdentifier, locator))
    }

    /// Resolution surface (read-only, stable without intervening mutation).
    pub fn resolve_subject_identifier(&self, locator: &Locator) -> Option<ConstructId> {
        self.identity.resolve_subject_identifier(locator)
    }

    pub fn resolve_subject_locator(&self, locator: &Locator) -> Option<ConstructId> {
        self.identity.resolve_subject_locator(locator)
    }

    pub fn resolve_item_identifier(&self, locator: &Locator) -> Option<ConstructId> {
        self.identity.resolve_item_identifier(locator)
    }

    /// Bind `locator` to `construct` in the `kind` table; record + notify.
    /// Collision policy has already run. Idempotent.
    pub(crate) fn bind_identifier(
        &mut self,
        construct: ConstructId,
        kind: IdentityKind,
        locator: Locator,
    ) -> Result<()> {
        let inserted = match (kind, self.arena.get_mut(construct)?) {
            (IdentityKind::ItemIdentifier, c) => c.item_identifiers_mut().insert(locator.clone()),
            (IdentityKind::SubjectIdentifier, Construct::Topic(t)) => {
                t.subject_identifiers.insert(locator.clone())
            }
            (IdentityKind::SubjectLocator, Construct::Topic(t)) => {
                t.subject_locators.insert(locator.clone())
            }
            (_, c) => {
                let actual = c.kind();
                return Err(Self::kind_mismatch(construct, ConstructKind::Topic, actual));
            }
        };
        if !inserted {
            return Ok(());
        }
        self.identity.bind(kind, locator.clone(), construct);
        let change_kind = match kind {
            IdentityKind::ItemIdentifier => ChangeKind::ItemIdentifierAdded,
            IdentityKind::SubjectIdentifier => ChangeKind::SubjectIdentifierAdded,
            IdentityKind::SubjectLocator => ChangeKind::SubjectLocatorAdded,
        };
        self.record(Change::new(
            change_kind,
            construct,
            ChangeValue::Locator(locator),
            ChangeValue::None,
        ));
        Ok(())
    }

    fn unbind_identifier(
        &mut self,
        construct: ConstructId,
        kind: IdentityKind,
        locator: &Locator,
    ) -> Result<()> {
        let removed = match (kind, self.arena.get_mut(construct)?) {
            (IdentityKind::ItemIdentifier, c) => c.item_identifiers_mut().remove(locator),
            (IdentityKind::SubjectIdentifier, Construct::Topic(t)) => {
                t.subject_identifiers.remove(locator)
            }
            (IdentityKind::SubjectLocator, Construct::Topic(t)) => {
                t.subject_locators.remove(locator)
            }
            (_, c) => {
                let actual = c.kind();
                return Err(Self::kind_mismatch(construct, ConstructKind::Topic, actual));
            }
        };
        if !removed {
            return Ok(());
        }
        self.identity.unbind(kind, locator);
        let change_kind = match kind {
            IdentityKind::ItemIdentifier => ChangeKind::ItemIdentifierRemoved,
            IdentityKind::SubjectIdentifier => ChangeKind::SubjectIdentifierRemoved,
            IdentityKind::SubjectLocator => ChangeKind::SubjectLocatorRemoved,
        };
        self.record(Change::new(
            change_kind,
            construct,
            ChangeValue::None,
            ChangeValue::Locator(locator.clone()),
        ));
        Ok(())
    }

    // =========================================================================
    // Types and supertypes
    // =========================================================================

    pub fn add_topic_type(&mut self, topic: ConstructId, typ: ConstructId) -> Result<()> {
        self.require_topic(topic)?;
        self.require_topic(typ)?;
        self.with_op(|m| {
            if !m.topic_mut(topic)?.types.insert(typ) {
                return Ok(());
            }
            m.instances.entry(typ).or_default().insert(topic);
            m.record(Change::new(
                ChangeKind::TypeAdded,
                topic,
                ChangeValue::Construct(typ),
                ChangeValue::None,
            ));
            Ok(())
        })
    }

    pub fn remove_topic_type(&mut self, topic: ConstructId, typ: ConstructId) -> Result<()> {
        self.require_topic(topic)?;
        self.with_op(|m| {
            if !m.topic_mut(topic)?.types.remove(&typ) {
                return Ok(());
            }
            if let Some(set) = m.instances.get_mut(&typ) {
                set.remove(&topic);
                if set.is_empty() {
                    m.instances.remove(&typ);
                }
            }
            m.record(Change::new(
                ChangeKind::TypeRemoved,
                topic,
                ChangeValue::None,
                ChangeValue::Construct(typ),
            ));
            Ok(())
        })
    }

    /// Supertype edges must stay acyclic; the check runs here, at the
    /// introducing call.
    pub fn add_supertype(&mut self, topic: ConstructId, supertype: ConstructId) -> Result<()> {
        self.require_topic(topic)?;
        self.require_topic(supertype)?;
        if topic == supertype || self.supertype_closure(supertype).contains(&topic) {
            return Err(InvalidType::SupertypeCycle { topic, supertype }.into());
        }
        self.with_op(|m| {
            if !m.topic_mut(topic)?.supertypes.insert(supertype) {
                return Ok(());
            }
            m.subtypes.entry(supertype).or_default().insert(topic);
            m.record(Change::new(
                ChangeKind::SupertypeAdded,
                topic,
                ChangeValue::Construct(supertype),
                ChangeValue::None,
            ));
            Ok(())
        })
    }

    pub fn remove_supertype(&mut self, topic: ConstructId, supertype: ConstructId) -> Result<()> {
        self.require_topic(topic)?;
        self.with_op(|m| {
            if !m.topic_mut(topic)?.supertypes.remove(&supertype) {
                return Ok(());
            }
            if let Some(set) = m.subtypes.get_mut(&supertype) {
                set.remove(&topic);
                if set.is_empty() {
                    m.subtypes.remove(&supertype);
                }
            }
            m.record(Change::new(
                ChangeKind::SupertypeRemoved,
                topic,
                ChangeValue::None,
                ChangeValue::Construct(supertype),
            ));
            Ok(())
        })
    }

    /// Transitive supertypes of `topic`, `topic` excluded.
    pub fn supertype_closure(&self, topic: ConstructId) -> BTreeSet<ConstructId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![topic];
        while let Some(current) = stack.pop() {
            let Ok(t) = self.topic(current) else { continue };
            for &sup in &t.supertypes {
                if seen.insert(sup) {
                    stack.push(sup);
                }
            }
        }
        seen
    }

    // =========================================================================
    // Statement creation
    // =========================================================================

    pub fn create_association(
        &mut self,
        typ: ConstructId,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        self.require_topic(typ)?;
        let scope = self.intern_scope(themes)?;
        self.with_op(|m| {
            let id = m.arena.allocate_id();
            let map_id = m.map_id;
            m.arena.insert(Construct::Association(Association {
                id,
                parent: map_id,
                item_identifiers: BTreeSet::new(),
                typ,
                scope,
                roles: BTreeSet::new(),
                reifier: None,
            }));
            m.map_record_mut().associations.insert(id);
            m.typed_by.entry(typ).or_default().insert(id);
            m.scopes.attach(scope, id);
            m.record(Change::new(
                ChangeKind::ConstructAdded,
                id,
                ChangeValue::Construct(id),
                ChangeValue::None,
            ));
            Ok(id)
        })
    }

    pub fn create_role(
        &mut self,
        association: ConstructId,
        typ: ConstructId,
        player: ConstructId,
    ) -> Result<ConstructId> {
        self.association(association)?;
        self.require_topic(typ)?;
        self.require_topic(player)?;
        self.with_op(|m| {
            let id = m.arena.allocate_id();
            m.arena.insert(Construct::Role(Role {
                id,
                parent: association,
                item_identifiers: BTreeSet::new(),
                typ,
                player,
                reifier: None,
            }));
            m.association_mut(association)?.roles.insert(id);
            m.topic_mut(player)?.roles_played.insert(id);
            m.typed_by.entry(typ).or_default().insert(id);
            m.record(Change::new(
                ChangeKind::ConstructAdded,
                id,
                ChangeValue::Construct(id),
                ChangeValue::None,
            ));
            Ok(id)
        })
    }

    pub fn create_name(
        &mut self,
        topic: ConstructId,
        typ: ConstructId,
        value: impl Into<String>,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        self.require_topic(topic)?;
        self.require_topic(typ)?;
        let scope = self.intern_scope(themes)?;
        self.with_op(|m| {
            let id = m.arena.allocate_id();
            m.arena.insert(Construct::Name(Name {
                id,
                parent: topic,
                item_identifiers: BTreeSet::new(),
                typ,
                scope,
                value: value.into(),
                variants: BTreeSet::new(),
                reifier: None,
            }));
            m.topic_mut(topic)?.names.insert(id);
            m.typed_by.entry(typ).or_default().insert(id);
            m.scopes.attach(scope, id);
            m.record(Change::new(
                ChangeKind::ConstructAdded,
                id,
                ChangeValue::Construct(id),
                ChangeValue::None,
            ));
            Ok(id)
        })
    }

    pub fn create_occurrence(
        &mut self,
        topic: ConstructId,
        typ: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        self.require_topic(topic)?;
        self.require_topic(typ)?;
        let scope = self.intern_scope(themes)?;
        self.with_op(|m| {
            let id = m.arena.allocate_id();
            m.arena.insert(Construct::Occurrence(Occurrence {
                id,
                parent: topic,
                item_identifiers: BTreeSet::new(),
                typ,
                scope,
                value: value.into(),
                datatype,
                reifier: None,
            }));
            m.topic_mut(topic)?.occurrences.insert(id);
            m.typed_by.entry(typ).or_default().insert(id);
            m.scopes.attach(scope, id);
            m.record(Change::new(
                ChangeKind::ConstructAdded,
                id,
                ChangeValue::Construct(id),
                ChangeValue::None,
            ));
            Ok(id)
        })
    }

    /// Variant scope must properly contain the parent name's scope.
    pub fn create_variant(
        &mut self,
        name: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        let name_scope = self.name(name)?.scope;
        let scope = self.intern_scope(themes)?;
        let name_themes = self.scopes.themes(name_scope).clone();
        let variant_themes = self.scopes.themes(scope);
        if !variant_themes.is_superset(&name_themes) || variant_themes.len() == name_themes.len() {
            return Err(InvalidScope::VariantScopeNotSuperset {
                variant: None,
                name,
            }
            .into());
        }
        self.with_op(|m| {
            let id = m.arena.allocate_id();
            m.arena.insert(Construct::Variant(Variant {
                id,
                parent: name,
                item_identifiers: BTreeSet::new(),
                scope,
                value: value.into(),
                datatype,
                reifier: None,
            }));
            m.name_mut(name)?.variants.insert(id);
            m.scopes.attach(scope, id);
            m.record(Change::new(
                ChangeKind::ConstructAdded,
                id,
                ChangeValue::Construct(id),
                ChangeValue::None,
            ));
            Ok(id)
        })
    }

    // =========================================================================
    // Statement mutation
    // =========================================================================

    pub fn set_name_value(&mut self, name: ConstructId, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.with_op(|m| {
            let record = m.name_mut(name)?;
            if record.value == value {
                return Ok(());
            }
            let old = std::mem::replace(&mut record.value, value.clone());
            m.record(Change::new(
                ChangeKind::ValueModified,
                name,
                ChangeValue::Text(value),
                ChangeValue::Text(old),
            ));
            Ok(())
        })
    }

    pub fn set_occurrence_value(
        &mut self,
        occurrence: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
    ) -> Result<()> {
        let value = value.into();
        self.with_op(|m| {
            let record = m.occurrence_mut(occurrence)?;
            if record.value == value && record.datatype == datatype {
                return Ok(());
            }
            let old_value = std::mem::replace(&mut record.value, value.clone());
            let old_datatype = std::mem::replace(&mut record.datatype, datatype.clone());
            m.record(Change::new(
                ChangeKind::ValueModified,
                occurrence,
                ChangeValue::Literal { value, datatype },
                ChangeValue::Literal {
                    value: old_value,
                    datatype: old_datatype,
                },
            ));
            Ok(())
        })
    }

    pub fn set_variant_value(
        &mut self,
        variant: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
    ) -> Result<()> {
        let value = value.into();
        self.with_op(|m| {
            let record = m.variant_mut(variant)?;
            if record.value == value && record.datatype == datatype {
                return Ok(());
            }
            let old_value = std::mem::replace(&mut record.value, value.clone());
            let old_datatype = std::mem::replace(&mut record.datatype, datatype.clone());
            m.record(Change::new(
                ChangeKind::ValueModified,
                variant,
                ChangeValue::Literal { value, datatype },
                ChangeValue::Literal {
                    value: old_value,
                    datatype: old_datatype,
                },
            ));
            Ok(())
        })
    }

    /// Retype an association, role, name, or occurrence.
    pub fn set_type(&mut self, construct: ConstructId, typ: ConstructId) -> Result<()> {
        self.require_topic(typ)?;
        let current = match self.arena.get(construct)?.typ() {
            Some(t) => t,
            None => {
                let actual = self.arena.get(construct)?.kind();
                return Err(Self::kind_mismatch(
                    construct,
                    ConstructKind::Association,
                    actual,
                ));
            }
        };
        if current == typ {
            return Ok(());
        }
        self.with_op(|m| {
            let record = m.arena.get_mut(construct)?;
            record.set_typ(typ);
            if let Some(set) = m.typed_by.get_mut(&current) {
                set.remove(&construct);
                if set.is_empty() {
                    m.typed_by.remove(&current);
                }
            }
            m.typed_by.entry(typ).or_default().insert(construct);
            m.record(Change::new(
                ChangeKind::TypeSet,
                construct,
                ChangeValue::Construct(typ),
                ChangeValue::Construct(current),
            ));
            Ok(())
        })
    }

    /// Rescope an association, name, occurrence, or variant.
    pub fn set_scope(&mut self, construct: ConstructId, themes: &[ConstructId]) -> Result<()> {
        let scope = self.intern_scope(themes)?;
        let current = match self.arena.get(construct)?.scope() {
            Some(s) => s,
            None => {
                let actual = self.arena.get(construct)?.kind();
                return Err(Self::kind_mismatch(
                    construct,
                    ConstructKind::Association,
                    actual,
                ));
            }
        };
        if current == scope {
            return Ok(());
        }
        // Variant/name scope containment stays valid, checked eagerly.
        match self.arena.get(construct)? {
            Construct::Variant(v) => {
                let name_themes = self.scopes.themes(self.name(v.parent)?.scope).clone();
                let new_themes = self.scopes.themes(scope);
                if !new_themes.is_superset(&name_themes) || new_themes.len() == name_themes.len() {
                    return Err(InvalidScope::VariantScopeNotSuperset {
                        variant: Some(construct),
                        name: v.parent,
                    }
                    .into());
                }
            }
            Construct::Name(n) => {
                let new_themes = self.scopes.themes(scope).clone();
                for &variant in &n.variants {
                    let variant_themes = self.scopes.themes(self.variant(variant)?.scope);
                    if !variant_themes.is_superset(&new_themes)
                        || variant_themes.len() == new_themes.len()
                    {
                        return Err(InvalidScope::VariantScopeNotSuperset {
                            variant: Some(variant),
                            name: construct,
                        }
                        .into());
                    }
                }
            }
            _ => {}
        }
        self.with_op(|m| {
            let old_value = m.scope_value(current);
            let new_value = m.scope_value(scope);
            m.arena.get_mut(construct)?.set_scope(scope);
            m.scopes.detach(current, construct);
            m.scopes.attach(scope, construct);
            m.record(Change::new(
                ChangeKind::ScopeModified,
                construct,
                new_value,
                old_value,
            ));
            Ok(())
        })
    }

    pub fn set_player(&mut self, role: ConstructId, player: ConstructId) -> Result<()> {
        self.require_topic(player)?;
        let current = self.role(role)?.player;
        if current == player {
            return Ok(());
        }
        self.with_op(|m| {
            m.role_mut(role)?.player = player;
            m.topic_mut(current)?.roles_played.remove(&role);
            m.topic_mut(player)?.roles_played.insert(role);
            m.record(Change::new(
                ChangeKind::PlayerModified,
                role,
                ChangeValue::Construct(player),
                ChangeValue::Construct(current),
            ));
            Ok(())
        })
    }

    /// Reification is 1:1 and symmetric; a topic reifying something else
    /// cannot be attached elsewhere.
    pub fn set_reifier(
        &mut self,
        construct: ConstructId,
        reifier: Option<ConstructId>,
    ) -> Result<()> {
        let current = match self.arena.get(construct)? {
            c @ (Construct::TopicMap(_) | Construct::Topic(_)) => {
                let actual = c.kind();
                return Err(Self::kind_mismatch(
                    construct,
                    ConstructKind::Association,
                    actual,
                ));
            }
            c => c.reifier(),
        };
        if current == reifier {
            return Ok(());
        }
        if let Some(r) = reifier {
            if let Some(reifies) = self.topic(r)?.reifies {
                if reifies != construct {
                    return Err(InvalidType::ReifierTaken {
                        reifier: r,
                        reifies,
                    }
                    .into());
                }
            }
        }
        self.with_op(|m| {
            if let Some(old) = current {
                m.topic_mut(old)?.reifies = None;
            }
            if let Some(new) = reifier {
                m.topic_mut(new)?.reifies = Some(construct);
            }
            m.arena.get_mut(construct)?.set_reifier(reifier);
            m.record(Change::new(
                ChangeKind::ReifierSet,
                construct,
                reifier.map_or(ChangeValue::None, ChangeValue::Construct),
                current.map_or(ChangeValue::None, ChangeValue::Construct),
            ));
            Ok(())
        })
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// A topic in use as a type, theme, player, or reifier cannot be
    /// removed.
    pub fn remove_topic(&mut self, topic: ConstructId) -> Result<()> {
        self.require_topic(topic)?;
        if self.topic_in_use(topic) {
            return Err(InvalidType::TopicInUse { id: topic }.into());
        }
        self.with_op(|m| m.remove_topic_unchecked(topic))
    }

    fn topic_in_use(&self, topic: ConstructId) -> bool {
        if self.instances.contains_key(&topic)
            || self.typed_by.contains_key(&topic)
            || self.subtypes.contains_key(&topic)
        {
            return true;
        }
        let record = match self.topic(topic) {
            Ok(t) => t,
            Err(_) => return false,
        };
        if !record.roles_played.is_empty() || record.reifies.is_some() {
            return true;
        }
        self.scopes
            .scopes_of_theme(topic)
            .iter()
            .any(|&s| !self.scopes.get_scoped(s).is_empty())
    }

    /// Removal body without the in-use check; records the removal change.
    fn remove_topic_unchecked(&mut self, topic: ConstructId) -> Result<()> {
        let snapshot = self.arena.snapshot(topic)?;
        let record = self.topic(topic)?.clone();
        for name in &record.names {
            self.delete_name_silent(*name)?;
        }
        for occurrence in &record.occurrences {
            self.delete_occurrence_silent(*occurrence)?;
        }
        for locator in &record.item_identifiers {
            self.identity.unbind(IdentityKind::ItemIdentifier, locator);
        }
        for locator in &record.subject_identifiers {
            self.identity.unbind(IdentityKind::SubjectIdentifier, locator);
        }
        for locator in &record.subject_locators {
            self.identity.unbind(IdentityKind::SubjectLocator, locator);
        }
        for typ in &record.types {
            if let Some(set) = self.instances.get_mut(typ) {
                set.remove(&topic);
                if set.is_empty() {
                    self.instances.remove(typ);
                }
            }
        }
        for sup in &record.supertypes {
            if let Some(set) = self.subtypes.get_mut(sup) {
                set.remove(&topic);
                if set.is_empty() {
                    self.subtypes.remove(sup);
                }
            }
        }
        if let Some(reified) = record.reifies {
            if let Ok(c) = self.arena.get_mut(reified) {
                c.set_reifier(None);
            }
        }
        // Scopes that carried the topic as a theme are rewritten over the
        // remaining themes. The in-use check already guaranteed none of
        // them had bearers, so there are no members to re-point.
        for (_, _, members) in self.scopes.rewrite_theme(topic, None) {
            debug_assert!(members.is_empty());
        }
        self.map_record_mut().topics.remove(&topic);
        self.arena.remove(topic)?;
        self.record(Change::new(
            ChangeKind::ConstructRemoved,
            topic,
            ChangeValue::None,
            ChangeValue::Snapshot(Box::new(snapshot)),
        ));
        Ok(())
    }

    pub fn remove_association(&mut self, association: ConstructId) -> Result<()> {
        self.association(association)?;
        self.with_op(|m| {
            let snapshot = m.arena.snapshot(association)?;
            m.delete_association_silent(association)?;
            m.record(Change::new(
                ChangeKind::ConstructRemoved,
                association,
                ChangeValue::None,
                ChangeValue::Snapshot(Box::new(snapshot)),
            ));
            Ok(())
        })
    }

    pub fn remove_role(&mut self, role: ConstructId) -> Result<()> {
        let parent = self.role(role)?.parent;
        self.with_op(|m| {
            let snapshot = m.arena.snapshot(role)?;
            m.delete_role_silent(role)?;
            m.association_mut(parent)?.roles.remove(&role);
            m.record(Change::new(
                ChangeKind::ConstructRemoved,
                role,
                ChangeValue::None,
                ChangeValue::Snapshot(Box::new(snapshot)),
            ));
            Ok(())
        })
    }

    pub fn remove_name(&mut self, name: ConstructId) -> Result<()> {
        let parent = self.name(name)?.parent;
        self.with_op(|m| {
            let snapshot = m.arena.snapshot(name)?;
            m.delete_name_silent(name)?;
            m.topic_mut(parent)?.names.remove(&name);
            m.record(Change::new(
                ChangeKind::ConstructRemoved,
                name,
                ChangeValue::None,
                ChangeValue::Snapshot(Box::new(snapshot)),
            ));
            Ok(())
        })
    }

    pub fn remove_occurrence(&mut self, occurrence: ConstructId) -> Result<()> {
        let parent = self.occurrence(occurrence)?.parent;
        self.with_op(|m| {
            let snapshot = m.arena.snapshot(occurrence)?;
            m.delete_occurrence_silent(occurrence)?;
            m.topic_mut(parent)?.occurrences.remove(&occurrence);
            m.record(Change::new(
                ChangeKind::ConstructRemoved,
                occurrence,
                ChangeValue::None,
                ChangeValue::Snapshot(Box::new(snapshot)),
            ));
            Ok(())
        })
    }

    pub fn remove_variant(&mut self, variant: ConstructId) -> Result<()> {
        let parent = self.variant(variant)?.parent;
        self.with_op(|m| {
            let snapshot = m.arena.snapshot(variant)?;
            m.delete_variant_silent(variant)?;
            m.name_mut(parent)?.variants.remove(&variant);
            m.record(Change::new(
                ChangeKind::ConstructRemoved,
                variant,
                ChangeValue::None,
                ChangeValue::Snapshot(Box::new(snapshot)),
            ));
            Ok(())
        })
    }

    /// Remove any construct by id.
    pub fn remove_construct(&mut self, id: ConstructId) -> Result<()> {
        match self.arena.get(id)?.kind() {
            ConstructKind::Topic => self.remove_topic(id),
            ConstructKind::Association => self.remove_association(id),
            ConstructKind::Role => self.remove_role(id),
            ConstructKind::Name => self.remove_name(id),
            ConstructKind::Occurrence => self.remove_occurrence(id),
            ConstructKind::Variant => self.remove_variant(id),
            ConstructKind::TopicMap => Err(InvalidType::TopicInUse { id }.into()),
        }
    }

    // -------------------------------------------------------------------------
    // Silent deletion plumbing: detaches indexes and the arena record,
    // records nothing. Callers record the enclosing change (removal gets a
    // snapshot, merge gets one Merged change).
    // -------------------------------------------------------------------------

    pub(crate) fn delete_association_silent(&mut self, association: ConstructId) -> Result<()> {
        let record = self.association(association)?.clone();
        for role in &record.roles {
            self.delete_role_silent(*role)?;
        }
        self.detach_common(association, record.typ.into(), Some(record.scope), record.reifier)?;
        for locator in &record.item_identifiers {
            self.identity.unbind(IdentityKind::ItemIdentifier, locator);
        }
        self.map_record_mut().associations.remove(&association);
        self.arena.remove(association)?;
        Ok(())
    }

    pub(crate) fn delete_role_silent(&mut self, role: ConstructId) -> Result<()> {
        let record = self.role(role)?.clone();
        if let Ok(player) = self.topic_mut(record.player) {
            player.roles_played.remove(&role);
        }
        self.detach_common(role, record.typ.into(), None, record.reifier)?;
        for locator in &record.item_identifiers {
            self.identity.unbind(IdentityKind::ItemIdentifier, locator);
        }
        self.arena.remove(role)?;
        Ok(())
    }

    pub(crate) fn delete_name_silent(&mut self, name: ConstructId) -> Result<()> {
        let record = self.name(name)?.clone();
        for variant in &record.variants {
            self.delete_variant_silent(*variant)?;
        }
        self.detach_common(name, record.typ.into(), Some(record.scope), record.reifier)?;
        for locator in &record.item_identifiers {
            self.identity.unbind(IdentityKind::ItemIdentifier, locator);
        }
        self.arena.remove(name)?;
        Ok(())
    }

    pub(crate) fn delete_occurrence_silent(&mut self, occurrence: ConstructId) -> Result<()> {
        let record = self.occurrence(occurrence)?.clone();
        self.detach_common(occurrence, record.typ.into(), Some(record.scope), record.reifier)?;
        for locator in &record.item_identifiers {
            self.identity.unbind(IdentityKind::ItemIdentifier, locator);
        }
        self.arena.remove(occurrence)?;
        Ok(())
    }

    pub(crate) fn delete_variant_silent(&mut self, variant: ConstructId) -> Result<()> {
        let record = self.variant(variant)?.clone();
        self.detach_common(variant, None, Some(record.scope), record.reifier)?;
        for locator in &record.item_identifiers {
            self.identity.unbind(IdentityKind::ItemIdentifier, locator);
        }
        self.arena.remove(variant)?;
        Ok(())
    }

    fn detach_common(
        &mut self,
        construct: ConstructId,
        typ: Option<ConstructId>,
        scope: Option<ScopeId>,
        reifier: Option<ConstructId>,
    ) -> Result<()> {
        if let Some(typ) = typ {
            if let Some(set) = self.typed_by.get_mut(&typ) {
                set.remove(&construct);
                if set.is_empty() {
                    self.typed_by.remove(&typ);
                }
            }
        }
        if let Some(scope) = scope {
            self.scopes.detach(scope, construct);
        }
        if let Some(reifier) = reifier {
            if let Ok(t) = self.topic_mut(reifier) {
                t.reifies = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Locator {
        Locator::new_unchecked(s)
    }

    #[test]
    fn create_topic_records_one_revision() {
        let mut map = TopicMap::new();
        let t = map.create_topic();
        let last = map.history().last_revision().expect("revision");
        assert_eq!(last.changes().len(), 1);
        assert_eq!(last.changes()[0].kind, ChangeKind::ConstructAdded);
        assert_eq!(last.changes()[0].subject, t);
    }

    #[test]
    fn resolve_or_create_by_subject_identifier_is_stable() {
        let mut map = TopicMap::new();
        let a = map
            .create_topic_by_subject_identifier(loc("si:a"))
            .unwrap();
        let b = map
            .create_topic_by_subject_identifier(loc("si:a"))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(map.topic_count(), 1);
    }

    #[test]
    fn item_identifier_conflict_with_non_topic_is_fatal() {
        let mut map = TopicMap::new();
        let typ = map.create_topic();
        let assoc = map.create_association(typ, &[]).unwrap();
        map.add_item_identifier(assoc, loc("ii:x")).unwrap();
        let topic = map.create_topic();
        let err = map.add_item_identifier(topic, loc("ii:x")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TopicMapError::IdentityConflict(_)
        ));
    }

    #[test]
    fn supertype_cycles_are_rejected() {
        let mut map = TopicMap::new();
        let a = map.create_topic();
        let b = map.create_topic();
        let c = map.create_topic();
        map.add_supertype(a, b).unwrap();
        map.add_supertype(b, c).unwrap();
        let err = map.add_supertype(c, a).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TopicMapError::InvalidType(InvalidType::SupertypeCycle { .. })
        ));
        let err = map.add_supertype(a, a).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TopicMapError::InvalidType(InvalidType::SupertypeCycle { .. })
        ));
    }

    #[test]
    fn variant_scope_must_properly_contain_name_scope() {
        let mut map = TopicMap::new();
        let t = map.create_topic();
        let nt = map.create_topic();
        let theme = map.create_topic();
        let name = map.create_name(t, nt, "x", &[theme]).unwrap();
        let err = map
            .create_variant(name, "x-variant", loc("dt:string"), &[theme])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::TopicMapError::InvalidScope(InvalidScope::VariantScopeNotSuperset { .. })
        ));
        let extra = map.create_topic();
        let v = map
            .create_variant(name, "x-variant", loc("dt:string"), &[theme, extra])
            .unwrap();
        assert_eq!(map.variant(v).unwrap().parent, name);
    }

    #[test]
    fn removed_topic_reads_construct_removed() {
        let mut map = TopicMap::new();
        let t = map.create_topic();
        map.remove_topic(t).unwrap();
        assert!(matches!(
            map.topic(t),
            Err(crate::error::TopicMapError::ConstructRemoved(_))
        ));
    }

    #[test]
    fn topic_in_use_cannot_be_removed() {
        let mut map = TopicMap::new();
        let t = map.create_topic();
        let typ = map.create_topic();
        map.add_topic_type(t, typ).unwrap();
        assert!(matches!(
            map.remove_topic(typ),
            Err(crate::error::TopicMapError::InvalidType(
                InvalidType::TopicInUse { .. }
            ))
        ));
    }

    #[test]
    fn reifier_is_one_to_one() {
        let mut map = TopicMap::new();
        let typ = map.create_topic();
        let a1 = map.create_association(typ, &[]).unwrap();
        let a2 = map.create_association(typ, &[]).unwrap();
        let r = map.create_topic();
        map.set_reifier(a1, Some(r)).unwrap();
        let err = map.set_reifier(a2, Some(r)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TopicMapError::InvalidType(InvalidType::ReifierTaken { .. })
        ));
        map.set_reifier(a1, None).unwrap();
        map.set_reifier(a2, Some(r)).unwrap();
        assert_eq!(map.topic(r).unwrap().reifies, Some(a2));
    }

    #[test]
    fn removal_snapshot_freezes_subtree() {
        let mut map = TopicMap::new();
        let t = map.create_topic();
        let nt = map.create_topic();
        map.create_name(t, nt, "frozen", &[]).unwrap();
        map.remove_topic(t).unwrap();
        let last = map.history().last_revision().expect("revision");
        let removal = last
            .changes()
            .iter()
            .find(|c| c.kind == ChangeKind::ConstructRemoved)
            .expect("removal change");
        match &removal.old_value {
            ChangeValue::Snapshot(snap) => {
                assert_eq!(snap.id(), t);
                assert_eq!(snap.len(), 2);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }
}
