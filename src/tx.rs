//! Layer 14: Transactional lazy overlay
//!
//! A transaction is a private, disposable view over a committed map: an
//! id-keyed read-through cache populated on first access, plus an ordered
//! queue of recorded commands. Constructs crossing the boundary are copied
//! once per transaction; removed ids are tracked so later reads fail with
//! `ConstructRemoved` before the committed store is consulted.
//!
//! Commit takes the instance lock, replays the queue in issue order against
//! a scratch clone of the committed store - translating transaction-local
//! ids through an incrementally built table and following commit-time
//! merges - and swaps the clone in only on full success. Rollback discards
//! the overlay; the committed store never sees a failed or abandoned
//! transaction.
//!
//! Staged identifier collisions consolidate at the identity level inside
//! the view (the colliding topics alias to one representative); the full
//! structural merge materializes at commit, where the real merge engine
//! runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::error::{ConstructRemoved, Result, TopicMapError, TransactionError};
use crate::id::{ConstructId, ConstructKind, ScopeId};
use crate::identity::IdentityStore;
use crate::listener::{ChangeListener, ListenerId};
use crate::locator::{IdentityKind, Locator};
use crate::model::{Association, Construct, Name, Occurrence, Role, Topic, Variant};
use crate::store::TopicMap;

/// Shared handle to one committed map instance. Commit/rollback and direct
/// mutation are mutually exclusive through the single lock.
#[derive(Clone)]
pub struct SharedTopicMap {
    inner: Arc<Mutex<TopicMap>>,
}

impl SharedTopicMap {
    pub fn new(map: TopicMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&TopicMap) -> R) -> R {
        let guard = self.inner.lock().expect("topic map instance lock poisoned");
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut TopicMap) -> R) -> R {
        let mut guard = self.inner.lock().expect("topic map instance lock poisoned");
        f(&mut guard)
    }

    pub fn register_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.write(|map| map.register_listener(listener))
    }

    /// Open a transaction against the current committed state.
    pub fn begin(&self) -> Transaction {
        let next_id = self.read(|map| map.arena.next_unissued());
        Transaction {
            base: Arc::clone(&self.inner),
            cache: BTreeMap::new(),
            identity: IdentityStore::new(),
            unbound: BTreeSet::new(),
            scope_themes: BTreeMap::new(),
            local: BTreeSet::new(),
            removed: BTreeSet::new(),
            merged: BTreeMap::new(),
            queue: Vec::new(),
            next_id,
            next_scope: TX_SCOPE_BASE,
            open: true,
        }
    }
}

/// Transaction-local scope ids live far above anything a committed store
/// interns; they never leave the view (commands carry theme sets).
const TX_SCOPE_BASE: u64 = 1 << 48;

#[derive(Clone, Debug)]
enum Command {
    CreateTopic { local: ConstructId },
    CreateTopicBySubjectIdentifier { local: ConstructId, locator: Locator },
    CreateTopicBySubjectLocator { local: ConstructId, locator: Locator },
    CreateTopicByItemIdentifier { local: ConstructId, locator: Locator },
    CreateAssociation { local: ConstructId, typ: ConstructId, themes: Vec<ConstructId> },
    CreateRole { local: ConstructId, association: ConstructId, typ: ConstructId, player: ConstructId },
    CreateName { local: ConstructId, topic: ConstructId, typ: ConstructId, value: String, themes: Vec<ConstructId> },
    CreateOccurrence { local: ConstructId, topic: ConstructId, typ: ConstructId, value: String, datatype: Locator, themes: Vec<ConstructId> },
    CreateVariant { local: ConstructId, name: ConstructId, value: String, datatype: Locator, themes: Vec<ConstructId> },
    AddTopicType { topic: ConstructId, typ: ConstructId },
    RemoveTopicType { topic: ConstructId, typ: ConstructId },
    AddSupertype { topic: ConstructId, supertype: ConstructId },
    RemoveSupertype { topic: ConstructId, supertype: ConstructId },
    AddIdentifier { construct: ConstructId, kind: IdentityKind, locator: Locator },
    RemoveIdentifier { construct: ConstructId, kind: IdentityKind, locator: Locator },
    SetNameValue { name: ConstructId, value: String },
    SetOccurrenceValue { occurrence: ConstructId, value: String, datatype: Locator },
    SetVariantValue { variant: ConstructId, value: String, datatype: Locator },
    SetType { construct: ConstructId, typ: ConstructId },
    SetScope { construct: ConstructId, themes: Vec<ConstructId> },
    SetPlayer { role: ConstructId, player: ConstructId },
    SetReifier { construct: ConstructId, reifier: Option<ConstructId> },
    RemoveConstruct { construct: ConstructId },
    MergeTopics { left: ConstructId, right: ConstructId },
}

pub struct Transaction {
    base: Arc<Mutex<TopicMap>>,
    /// Overlay copies, one per construct that crossed the boundary.
    cache: BTreeMap<ConstructId, Construct>,
    /// Staged identifier bindings.
    identity: IdentityStore,
    /// Identifiers unbound in this view (shadow base bindings).
    unbound: BTreeSet<(IdentityKind, Locator)>,
    /// Theme sets for scopes seen or created by this view.
    scope_themes: BTreeMap<ScopeId, BTreeSet<ConstructId>>,
    local: BTreeSet<ConstructId>,
    removed: BTreeSet<ConstructId>,
    /// Staged consolidations: absorbed -> representative.
    merged: BTreeMap<ConstructId, ConstructId>,
    queue: Vec<Command>,
    next_id: u64,
    next_scope: u64,
    open: bool,
}

impl Transaction {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransactionError::Closed.into())
        }
    }

    fn alias(&self, id: ConstructId) -> ConstructId {
        let mut current = id;
        while let Some(&next) = self.merged.get(&current) {
            current = next;
        }
        current
    }

    fn alloc_local(&mut self) -> ConstructId {
        let id = ConstructId::new(self.next_id);
        self.next_id += 1;
        self.local.insert(id);
        id
    }

    fn alloc_scope(&mut self, themes: BTreeSet<ConstructId>) -> ScopeId {
        if themes.is_empty() {
            return ScopeId::UNCONSTRAINED;
        }
        if let Some((&id, _)) = self.scope_themes.iter().find(|(_, t)| **t == themes) {
            return id;
        }
        if let Some(id) = self.with_base(|map| map.scopes.find_scope(&themes)) {
            self.scope_themes.insert(id, themes);
            return id;
        }
        let id = ScopeId::new(self.next_scope);
        self.next_scope += 1;
        self.scope_themes.insert(id, themes);
        id
    }

    fn with_base<R>(&self, f: impl FnOnce(&TopicMap) -> R) -> R {
        let guard = self.base.lock().expect("topic map instance lock poisoned");
        f(&guard)
    }

    /// Fault `id` into the overlay cache, copying it out of the committed
    /// store on first access.
    fn fault(&mut self, id: ConstructId) -> Result<ConstructId> {
        self.ensure_open()?;
        let id = self.alias(id);
        if self.removed.contains(&id) {
            return Err(ConstructRemoved { id }.into());
        }
        if self.cache.contains_key(&id) {
            return Ok(id);
        }
        let (construct, scope) = self.with_base(|map| {
            let construct = map.construct_by_id(id)?.clone();
            let scope = construct
                .scope()
                .map(|s| (s, map.scope_themes(s).clone()));
            Ok::<_, TopicMapError>((construct, scope))
        })?;
        if let Some((scope, themes)) = scope {
            self.scope_themes.entry(scope).or_insert(themes);
        }
        self.cache.insert(id, construct);
        Ok(id)
    }

    /// Read a construct through the overlay. The returned reference is the
    /// per-transaction copy: repeated reads see the same staged state.
    pub fn construct(&mut self, id: ConstructId) -> Result<&Construct> {
        let id = self.fault(id)?;
        Ok(&self.cache[&id])
    }

    pub fn topic(&mut self, id: ConstructId) -> Result<&Topic> {
        let id = self.fault(id)?;
        match &self.cache[&id] {
            Construct::Topic(t) => Ok(t),
            c => Err(kind_mismatch(id, ConstructKind::Topic, c.kind())),
        }
    }

    fn topic_overlay_mut(&mut self, id: ConstructId) -> Result<&mut Topic> {
        let id = self.fault(id)?;
        match self.cache.get_mut(&id) {
            Some(Construct::Topic(t)) => Ok(t),
            Some(c) => {
                let actual = c.kind();
                Err(kind_mismatch(id, ConstructKind::Topic, actual))
            }
            None => unreachable!("construct faulted above"),
        }
    }

    fn overlay_mut(&mut self, id: ConstructId) -> Result<&mut Construct> {
        let id = self.fault(id)?;
        Ok(self
            .cache
            .get_mut(&id)
            .unwrap_or_else(|| unreachable!("construct faulted above")))
    }

    fn kind_of(&mut self, id: ConstructId) -> Result<ConstructKind> {
        Ok(self.construct(id)?.kind())
    }

    fn require_topic(&mut self, id: ConstructId) -> Result<ConstructId> {
        let id = self.fault(id)?;
        match &self.cache[&id] {
            Construct::Topic(_) => Ok(id),
            c => Err(kind_mismatch(id, ConstructKind::Topic, c.kind())),
        }
    }

    // =========================================================================
    // Identity resolution through the overlay
    // =========================================================================

    fn resolve(&mut self, kind: IdentityKind, locator: &Locator) -> Option<ConstructId> {
        if let Some(id) = self.identity.holder(kind, locator) {
            return Some(self.alias(id));
        }
        if self.unbound.contains(&(kind, locator.clone())) {
            return None;
        }
        let id = self.with_base(|map| map.identity.holder(kind, locator))?;
        let id = self.alias(id);
        if self.removed.contains(&id) { None } else { Some(id) }
    }

    pub fn resolve_subject_identifier(&mut self, locator: &Locator) -> Option<ConstructId> {
        self.resolve(IdentityKind::SubjectIdentifier, locator)
    }

    pub fn resolve_subject_locator(&mut self, locator: &Locator) -> Option<ConstructId> {
        self.resolve(IdentityKind::SubjectLocator, locator)
    }

    pub fn resolve_item_identifier(&mut self, locator: &Locator) -> Option<ConstructId> {
        self.resolve(IdentityKind::ItemIdentifier, locator)
    }

    // =========================================================================
    // Staged creation
    // =========================================================================

    pub fn create_topic(&mut self) -> Result<ConstructId> {
        self.ensure_open()?;
        let map_id = self.with_base(|map| map.map_construct());
        let local = self.alloc_local();
        self.cache
            .insert(local, Construct::Topic(Topic::new(local, map_id)));
        self.queue.push(Command::CreateTopic { local });
        Ok(local)
    }

    fn create_topic_with_identity(
        &mut self,
        kind: IdentityKind,
        locator: Locator,
    ) -> Result<ConstructId> {
        if let Some(holder) = self.resolve(kind, &locator) {
            if self.kind_of(holder)? == ConstructKind::Topic {
                return Ok(holder);
            }
            return Err(TopicMapError::IdentityConflict(crate::error::IdentityConflict {
                locator,
                kind,
                holder,
                candidate: None,
            }));
        }
        let local = self.create_topic()?;
        // Replace the bare create with the resolve-or-create form.
        self.queue.pop();
        self.queue.push(match kind {
            IdentityKind::SubjectIdentifier => Command::CreateTopicBySubjectIdentifier {
                local,
                locator: locator.clone(),
            },
            IdentityKind::SubjectLocator => Command::CreateTopicBySubjectLocator {
                local,
                locator: locator.clone(),
            },
            IdentityKind::ItemIdentifier => Command::CreateTopicByItemIdentifier {
                local,
                locator: locator.clone(),
            },
        });
        self.bind_overlay(local, kind, locator)?;
        Ok(local)
    }

    pub fn create_topic_by_subject_identifier(&mut self, locator: Locator) -> Result<ConstructId> {
        self.create_topic_with_identity(IdentityKind::SubjectIdentifier, locator)
    }

    pub fn create_topic_by_subject_locator(&mut self, locator: Locator) -> Result<ConstructId> {
        self.create_topic_with_identity(IdentityKind::SubjectLocator, locator)
    }

    pub fn create_topic_by_item_identifier(&mut self, locator: Locator) -> Result<ConstructId> {
        self.create_topic_with_identity(IdentityKind::ItemIdentifier, locator)
    }

    fn validated_themes(&mut self, themes: &[ConstructId]) -> Result<BTreeSet<ConstructId>> {
        let mut set = BTreeSet::new();
        for &theme in themes {
            let theme = self.require_topic(theme).map_err(|_| {
                TopicMapError::InvalidScope(crate::error::InvalidScope::ThemeNotATopic { theme })
            })?;
            set.insert(theme);
        }
        Ok(set)
    }

    pub fn create_association(
        &mut self,
        typ: ConstructId,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        let typ = self.require_topic(typ)?;
        let theme_set = self.validated_themes(themes)?;
        let scope = self.alloc_scope(theme_set.clone());
        let map_id = self.with_base(|map| map.map_construct());
        let local = self.alloc_local();
        self.cache.insert(
            local,
            Construct::Association(Association {
                id: local,
                parent: map_id,
                item_identifiers: BTreeSet::new(),
                typ,
                scope,
                roles: BTreeSet::new(),
                reifier: None,
            }),
        );
        self.queue.push(Command::CreateAssociation {
            local,
            typ,
            themes: theme_set.into_iter().collect(),
        });
        Ok(local)
    }

    pub fn create_role(
        &mut self,
        association: ConstructId,
        typ: ConstructId,
        player: ConstructId,
    ) -> Result<ConstructId> {
        let association = self.fault(association)?;
        if self.kind_of(association)? != ConstructKind::Association {
            let actual = self.kind_of(association)?;
            return Err(kind_mismatch(association, ConstructKind::Association, actual));
        }
        let typ = self.require_topic(typ)?;
        let player = self.require_topic(player)?;
        let local = self.alloc_local();
        self.cache.insert(
            local,
            Construct::Role(Role {
                id: local,
                parent: association,
                item_identifiers: BTreeSet::new(),
                typ,
                player,
                reifier: None,
            }),
        );
        if let Construct::Association(a) = self.overlay_mut(association)? {
            a.roles.insert(local);
        }
        self.topic_overlay_mut(player)?.roles_played.insert(local);
        self.queue.push(Command::CreateRole {
            local,
            association,
            typ,
            player,
        });
        Ok(local)
    }

    pub fn create_name(
        &mut self,
        topic: ConstructId,
        typ: ConstructId,
        value: impl Into<String>,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        let topic = self.require_topic(topic)?;
        let typ = self.require_topic(typ)?;
        let theme_set = self.validated_themes(themes)?;
        let scope = self.alloc_scope(theme_set.clone());
        let value = value.into();
        let local = self.alloc_local();
        self.cache.insert(
            local,
            Construct::Name(Name {
                id: local,
                parent: topic,
                item_identifiers: BTreeSet::new(),
                typ,
                scope,
                value: value.clone(),
                variants: BTreeSet::new(),
                reifier: None,
            }),
        );
        self.topic_overlay_mut(topic)?.names.insert(local);
        self.queue.push(Command::CreateName {
            local,
            topic,
            typ,
            value,
            themes: theme_set.into_iter().collect(),
        });
        Ok(local)
    }

    pub fn create_occurrence(
        &mut self,
        topic: ConstructId,
        typ: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        let topic = self.require_topic(topic)?;
        let typ = self.require_topic(typ)?;
        let theme_set = self.validated_themes(themes)?;
        let scope = self.alloc_scope(theme_set.clone());
        let value = value.into();
        let local = self.alloc_local();
        self.cache.insert(
            local,
            Construct::Occurrence(Occurrence {
                id: local,
                parent: topic,
                item_identifiers: BTreeSet::new(),
                typ,
                scope,
                value: value.clone(),
                datatype: datatype.clone(),
                reifier: None,
            }),
        );
        self.topic_overlay_mut(topic)?.occurrences.insert(local);
        self.queue.push(Command::CreateOccurrence {
            local,
            topic,
            typ,
            value,
            datatype,
            themes: theme_set.into_iter().collect(),
        });
        Ok(local)
    }

    pub fn create_variant(
        &mut self,
        name: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
        themes: &[ConstructId],
    ) -> Result<ConstructId> {
        let name = self.fault(name)?;
        let name_scope = match &self.cache[&name] {
            Construct::Name(n) => n.scope,
            c => return Err(kind_mismatch(name, ConstructKind::Name, c.kind())),
        };
        let theme_set = self.validated_themes(themes)?;
        let name_themes = self.scope_themes_of(name_scope);
        if !theme_set.is_superset(&name_themes) || theme_set.len() == name_themes.len() {
            return Err(TopicMapError::InvalidScope(
                crate::error::InvalidScope::VariantScopeNotSuperset {
                    variant: None,
                    name,
                },
            ));
        }
        let scope = self.alloc_scope(theme_set.clone());
        let value = value.into();
        let local = self.alloc_local();
        self.cache.insert(
            local,
            Construct::Variant(Variant {
                id: local,
                parent: name,
                item_identifiers: BTreeSet::new(),
                scope,
                value: value.clone(),
                datatype: datatype.clone(),
                reifier: None,
            }),
        );
        if let Construct::Name(n) = self.overlay_mut(name)? {
            n.variants.insert(local);
        }
        self.queue.push(Command::CreateVariant {
            local,
            name,
            value,
            datatype,
            themes: theme_set.into_iter().collect(),
        });
        Ok(local)
    }

    fn scope_themes_of(&mut self, scope: ScopeId) -> BTreeSet<ConstructId> {
        if let Some(themes) = self.scope_themes.get(&scope) {
            return themes.clone();
        }
        let themes = self.with_base(|map| map.scope_themes(scope).clone());
        self.scope_themes.insert(scope, themes.clone());
        themes
    }

    // =========================================================================
    // Staged mutation
    // =========================================================================

    pub fn add_topic_type(&mut self, topic: ConstructId, typ: ConstructId) -> Result<()> {
        let topic = self.require_topic(topic)?;
        let typ = self.require_topic(typ)?;
        self.topic_overlay_mut(topic)?.types.insert(typ);
        self.queue.push(Command::AddTopicType { topic, typ });
        Ok(())
    }

    pub fn remove_topic_type(&mut self, topic: ConstructId, typ: ConstructId) -> Result<()> {
        let topic = self.require_topic(topic)?;
        self.topic_overlay_mut(topic)?.types.remove(&typ);
        self.queue.push(Command::RemoveTopicType { topic, typ });
        Ok(())
    }

    pub fn add_supertype(&mut self, topic: ConstructId, supertype: ConstructId) -> Result<()> {
        let topic = self.require_topic(topic)?;
        let supertype = self.require_topic(supertype)?;
        self.topic_overlay_mut(topic)?.supertypes.insert(supertype);
        self.queue.push(Command::AddSupertype { topic, supertype });
        Ok(())
    }

    pub fn remove_supertype(&mut self, topic: ConstructId, supertype: ConstructId) -> Result<()> {
        let topic = self.require_topic(topic)?;
        self.topic_overlay_mut(topic)?.supertypes.remove(&supertype);
        self.queue.push(Command::RemoveSupertype { topic, supertype });
        Ok(())
    }

    fn bind_overlay(
        &mut self,
        construct: ConstructId,
        kind: IdentityKind,
        locator: Locator,
    ) -> Result<()> {
        match (kind, self.overlay_mut(construct)?) {
            (IdentityKind::ItemIdentifier, c) => {
                c.item_identifiers_mut().insert(locator.clone());
            }
            (IdentityKind::SubjectIdentifier, Construct::Topic(t)) => {
                t.subject_identifiers.insert(locator.clone());
            }
            (IdentityKind::SubjectLocator, Construct::Topic(t)) => {
                t.subject_locators.insert(locator.clone());
            }
            (_, c) => {
                let actual = c.kind();
                return Err(kind_mismatch(construct, ConstructKind::Topic, actual));
            }
        }
        self.unbound.remove(&(kind, locator.clone()));
        self.identity.bind(kind, locator, construct);
        Ok(())
    }

    /// Stage an identifier registration. A collision with another topic
    /// stages a consolidation: both ids alias one representative in this
    /// view, and the committed merge happens at replay.
    pub fn add_identifier(
        &mut self,
        construct: ConstructId,
        kind: IdentityKind,
        locator: Locator,
    ) -> Result<()> {
        let construct = self.fault(construct)?;
        let construct_kind = self.kind_of(construct)?;
        if kind != IdentityKind::ItemIdentifier && construct_kind != ConstructKind::Topic {
            return Err(kind_mismatch(construct, ConstructKind::Topic, construct_kind));
        }
        if let Some(holder) = self.resolve(kind, &locator) {
            if holder != construct {
                let both_topics = construct_kind == ConstructKind::Topic
                    && self.kind_of(holder)? == ConstructKind::Topic;
                if !both_topics {
                    return Err(TopicMapError::IdentityConflict(
                        crate::error::IdentityConflict {
                            locator,
                            kind,
                            holder,
                            candidate: Some(construct),
                        },
                    ));
                }
                self.stage_merge(holder, construct)?;
            }
        }
        let target = self.alias(construct);
        self.bind_overlay(target, kind, locator.clone())?;
        self.queue.push(Command::AddIdentifier {
            construct,
            kind,
            locator,
        });
        Ok(())
    }

    pub fn remove_identifier(
        &mut self,
        construct: ConstructId,
        kind: IdentityKind,
        locator: Locator,
    ) -> Result<()> {
        let construct = self.fault(construct)?;
        match (kind, self.overlay_mut(construct)?) {
            (IdentityKind::ItemIdentifier, c) => {
                c.item_identifiers_mut().remove(&locator);
            }
            (IdentityKind::SubjectIdentifier, Construct::Topic(t)) => {
                t.subject_identifiers.remove(&locator);
            }
            (IdentityKind::SubjectLocator, Construct::Topic(t)) => {
                t.subject_locators.remove(&locator);
            }
            (_, c) => {
                let actual = c.kind();
                return Err(kind_mismatch(construct, ConstructKind::Topic, actual));
            }
        }
        self.identity.unbind(kind, &locator);
        self.unbound.insert((kind, locator.clone()));
        self.queue.push(Command::RemoveIdentifier {
            construct,
            kind,
            locator,
        });
        Ok(())
    }

    pub fn set_name_value(&mut self, name: ConstructId, value: impl Into<String>) -> Result<()> {
        let name = self.fault(name)?;
        let value = value.into();
        match self.overlay_mut(name)? {
            Construct::Name(n) => n.value = value.clone(),
            c => {
                let actual = c.kind();
                return Err(kind_mismatch(name, ConstructKind::Name, actual));
            }
        }
        self.queue.push(Command::SetNameValue { name, value });
        Ok(())
    }

    pub fn set_occurrence_value(
        &mut self,
        occurrence: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
    ) -> Result<()> {
        let occurrence = self.fault(occurrence)?;
        let value = value.into();
        match self.overlay_mut(occurrence)? {
            Construct::Occurrence(o) => {
                o.value = value.clone();
                o.datatype = datatype.clone();
            }
            c => {
                let actual = c.kind();
                return Err(kind_mismatch(occurrence, ConstructKind::Occurrence, actual));
            }
        }
        self.queue.push(Command::SetOccurrenceValue {
            occurrence,
            value,
            datatype,
        });
        Ok(())
    }

    pub fn set_variant_value(
        &mut self,
        variant: ConstructId,
        value: impl Into<String>,
        datatype: Locator,
    ) -> Result<()> {
        let variant = self.fault(variant)?;
        let value = value.into();
        match self.overlay_mut(variant)? {
            Construct::Variant(v) => {
                v.value = value.clone();
                v.datatype = datatype.clone();
            }
            c => {
                let actual = c.kind();
                return Err(kind_mismatch(variant, ConstructKind::Variant, actual));
            }
        }
        self.queue.push(Command::SetVariantValue {
            variant,
            value,
            datatype,
        });
        Ok(())
    }

    pub fn set_type(&mut self, construct: ConstructId, typ: ConstructId) -> Result<()> {
        let construct = self.fault(construct)?;
        let typ = self.require_topic(typ)?;
        if !self.overlay_mut(construct)?.set_typ(typ) {
            let actual = self.kind_of(construct)?;
            return Err(kind_mismatch(construct, ConstructKind::Association, actual));
        }
        self.queue.push(Command::SetType { construct, typ });
        Ok(())
    }

    pub fn set_scope(&mut self, construct: ConstructId, themes: &[ConstructId]) -> Result<()> {
        let construct = self.fault(construct)?;
        let theme_set = self.validated_themes(themes)?;
        let scope = self.alloc_scope(theme_set.clone());
        if !self.overlay_mut(construct)?.set_scope(scope) {
            let actual = self.kind_of(construct)?;
            return Err(kind_mismatch(construct, ConstructKind::Association, actual));
        }
        self.queue.push(Command::SetScope {
            construct,
            themes: theme_set.into_iter().collect(),
        });
        Ok(())
    }

    pub fn set_player(&mut self, role: ConstructId, player: ConstructId) -> Result<()> {
        let role = self.fault(role)?;
        let player = self.require_topic(player)?;
        let previous = match self.overlay_mut(role)? {
            Construct::Role(r) => std::mem::replace(&mut r.player, player),
            c => {
                let actual = c.kind();
                return Err(kind_mismatch(role, ConstructKind::Role, actual));
            }
        };
        if self.cache.contains_key(&previous) {
            self.topic_overlay_mut(previous)?.roles_played.remove(&role);
        }
        self.topic_overlay_mut(player)?.roles_played.insert(role);
        self.queue.push(Command::SetPlayer { role, player });
        Ok(())
    }

    pub fn set_reifier(
        &mut self,
        construct: ConstructId,
        reifier: Option<ConstructId>,
    ) -> Result<()> {
        let construct = self.fault(construct)?;
        let reifier = match reifier {
            Some(r) => Some(self.require_topic(r)?),
            None => None,
        };
        let previous = self.cache[&construct].reifier();
        if !self.overlay_mut(construct)?.set_reifier(reifier) {
            let actual = self.kind_of(construct)?;
            return Err(kind_mismatch(construct, ConstructKind::Association, actual));
        }
        if let Some(prev) = previous {
            if self.cache.contains_key(&prev) {
                self.topic_overlay_mut(prev)?.reifies = None;
            }
        }
        if let Some(r) = reifier {
            self.topic_overlay_mut(r)?.reifies = Some(construct);
        }
        self.queue.push(Command::SetReifier { construct, reifier });
        Ok(())
    }

    pub fn remove_construct(&mut self, construct: ConstructId) -> Result<()> {
        let construct = self.fault(construct)?;
        self.cache.remove(&construct);
        self.removed.insert(construct);
        self.queue.push(Command::RemoveConstruct { construct });
        Ok(())
    }

    pub fn merge_topics(&mut self, left: ConstructId, right: ConstructId) -> Result<()> {
        let left = self.require_topic(left)?;
        let right = self.require_topic(right)?;
        if left != right {
            self.stage_merge(left, right)?;
            self.queue.push(Command::MergeTopics { left, right });
        }
        Ok(())
    }

    /// Identity-level consolidation inside the view: the representative
    /// takes both topics' identifiers; the absorbed id aliases to it.
    fn stage_merge(&mut self, representative: ConstructId, absorbed: ConstructId) -> Result<()> {
        let representative = self.fault(representative)?;
        let absorbed = self.fault(absorbed)?;
        if representative == absorbed {
            return Ok(());
        }
        tracing::debug!(%representative, %absorbed, "staging consolidation in transaction view");
        let record = match self.cache.remove(&absorbed) {
            Some(Construct::Topic(t)) => t,
            Some(other) => {
                let actual = other.kind();
                self.cache.insert(absorbed, other);
                return Err(kind_mismatch(absorbed, ConstructKind::Topic, actual));
            }
            None => unreachable!("construct faulted above"),
        };
        for locator in &record.item_identifiers {
            self.identity
                .bind(IdentityKind::ItemIdentifier, locator.clone(), representative);
        }
        for locator in &record.subject_identifiers {
            self.identity.bind(
                IdentityKind::SubjectIdentifier,
                locator.clone(),
                representative,
            );
        }
        for locator in &record.subject_locators {
            self.identity
                .bind(IdentityKind::SubjectLocator, locator.clone(), representative);
        }
        let target = self.topic_overlay_mut(representative)?;
        target.item_identifiers.extend(record.item_identifiers);
        target.subject_identifiers.extend(record.subject_identifiers);
        target.subject_locators.extend(record.subject_locators);
        target.types.extend(record.types);
        // A transaction-local absorbed id stays in `local`: its translation
        // entry is how later commands reach the committed survivor.
        self.merged.insert(absorbed, representative);
        Ok(())
    }

    // =========================================================================
    // Commit / rollback
    // =========================================================================

    /// Replay the staged queue against the committed store, all-or-nothing.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        let queue = std::mem::take(&mut self.queue);
        let local = std::mem::take(&mut self.local);
        tracing::debug!(commands = queue.len(), "committing transaction");

        let mut guard = self.base.lock().expect("topic map instance lock poisoned");
        let mut scratch = guard.clone();
        scratch.set_muted(true);
        scratch.begin_op();
        let mut table: BTreeMap<ConstructId, ConstructId> = BTreeMap::new();
        let result = replay(&mut scratch, &queue, &local, &mut table);
        scratch.end_op();
        match result {
            Ok(()) => {
                scratch.set_muted(false);
                let pending = scratch.take_pending();
                *guard = scratch;
                for change in &pending {
                    guard.notify_raw(change);
                }
                Ok(())
            }
            Err(source) => {
                tracing::debug!(error = %source, "transaction replay failed; committed store unchanged");
                Err(TransactionError::Replay {
                    source: Box::new(source),
                }
                .into())
            }
        }
    }

    /// Discard the overlay and queue. No effect on the committed store.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        self.cache.clear();
        self.queue.clear();
        self.identity = IdentityStore::new();
        self.removed.clear();
        self.merged.clear();
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

fn kind_mismatch(id: ConstructId, expected: ConstructKind, actual: ConstructKind) -> TopicMapError {
    crate::error::InvalidType::KindMismatch {
        id,
        expected,
        actual,
    }
    .into()
}

/// Substitute transaction-local ids with their materialized counterparts
/// and follow commit-time merges.
fn translate(
    scratch: &TopicMap,
    table: &BTreeMap<ConstructId, ConstructId>,
    local: &BTreeSet<ConstructId>,
    id: ConstructId,
) -> Result<ConstructId> {
    let id = if local.contains(&id) {
        *table
            .get(&id)
            .ok_or(TransactionError::Translation { local: id })?
    } else {
        id
    };
    Ok(scratch.surviving_id(id))
}

fn replay(
    scratch: &mut TopicMap,
    queue: &[Command],
    local: &BTreeSet<ConstructId>,
    table: &mut BTreeMap<ConstructId, ConstructId>,
) -> Result<()> {
    for command in queue {
        replay_one(scratch, command, local, table)?;
    }
    Ok(())
}

fn replay_one(
    scratch: &mut TopicMap,
    command: &Command,
    local: &BTreeSet<ConstructId>,
    table: &mut BTreeMap<ConstructId, ConstructId>,
) -> Result<()> {
    let tr = |id: ConstructId, scratch: &TopicMap| translate(scratch, table, local, id);
    match command {
        Command::CreateTopic { local: id } => {
            let committed = scratch.create_topic();
            table.insert(*id, committed);
        }
        Command::CreateTopicBySubjectIdentifier { local: id, locator } => {
            let committed = scratch.create_topic_by_subject_identifier(locator.clone())?;
            table.insert(*id, committed);
        }
        Command::CreateTopicBySubjectLocator { local: id, locator } => {
            let committed = scratch.create_topic_by_subject_locator(locator.clone())?;
            table.insert(*id, committed);
        }
        Command::CreateTopicByItemIdentifier { local: id, locator } => {
            let committed = scratch.create_topic_by_item_identifier(locator.clone())?;
            table.insert(*id, committed);
        }
        Command::CreateAssociation { local: id, typ, themes } => {
            let typ = tr(*typ, scratch)?;
            let themes = translate_all(scratch, table, local, themes)?;
            let committed = scratch.create_association(typ, &themes)?;
            table.insert(*id, committed);
        }
        Command::CreateRole { local: id, association, typ, player } => {
            let association = tr(*association, scratch)?;
            let typ = tr(*typ, scratch)?;
            let player = tr(*player, scratch)?;
            let committed = scratch.create_role(association, typ, player)?;
            table.insert(*id, committed);
        }
        Command::CreateName { local: id, topic, typ, value, themes } => {
            let topic = tr(*topic, scratch)?;
            let typ = tr(*typ, scratch)?;
            let themes = translate_all(scratch, table, local, themes)?;
            let committed = scratch.create_name(topic, typ, value.clone(), &themes)?;
            table.insert(*id, committed);
        }
        Command::CreateOccurrence { local: id, topic, typ, value, datatype, themes } => {
            let topic = tr(*topic, scratch)?;
            let typ = tr(*typ, scratch)?;
            let themes = translate_all(scratch, table, local, themes)?;
            let committed =
                scratch.create_occurrence(topic, typ, value.clone(), datatype.clone(), &themes)?;
            table.insert(*id, committed);
        }
        Command::CreateVariant { local: id, name, value, datatype, themes } => {
            let name = tr(*name, scratch)?;
            let themes = translate_all(scratch, table, local, themes)?;
            let committed =
                scratch.create_variant(name, value.clone(), datatype.clone(), &themes)?;
            table.insert(*id, committed);
        }
        Command::AddTopicType { topic, typ } => {
            let topic = tr(*topic, scratch)?;
            let typ = tr(*typ, scratch)?;
            scratch.add_topic_type(topic, typ)?;
        }
        Command::RemoveTopicType { topic, typ } => {
            let topic = tr(*topic, scratch)?;
            let typ = tr(*typ, scratch)?;
            scratch.remove_topic_type(topic, typ)?;
        }
        Command::AddSupertype { topic, supertype } => {
            let topic = tr(*topic, scratch)?;
            let supertype = tr(*supertype, scratch)?;
            scratch.add_supertype(topic, supertype)?;
        }
        Command::RemoveSupertype { topic, supertype } => {
            let topic = tr(*topic, scratch)?;
            let supertype = tr(*supertype, scratch)?;
            scratch.remove_supertype(topic, supertype)?;
        }
        Command::AddIdentifier { construct, kind, locator } => {
            let construct = tr(*construct, scratch)?;
            match kind {
                IdentityKind::ItemIdentifier => {
                    scratch.add_item_identifier(construct, locator.clone())?;
                }
                IdentityKind::SubjectIdentifier => {
                    scratch.add_subject_identifier(construct, locator.clone())?;
                }
                IdentityKind::SubjectLocator => {
                    scratch.add_subject_locator(construct, locator.clone())?;
                }
            }
        }
        Command::RemoveIdentifier { construct, kind, locator } => {
            let construct = tr(*construct, scratch)?;
            match kind {
                IdentityKind::ItemIdentifier => {
                    scratch.remove_item_identifier(construct, locator)?;
                }
                IdentityKind::SubjectIdentifier => {
                    scratch.remove_subject_identifier(construct, locator)?;
                }
                IdentityKind::SubjectLocator => {
                    scratch.remove_subject_locator(construct, locator)?;
                }
            }
        }
        Command::SetNameValue { name, value } => {
            let name = tr(*name, scratch)?;
            scratch.set_name_value(name, value.clone())?;
        }
        Command::SetOccurrenceValue { occurrence, value, datatype } => {
            let occurrence = tr(*occurrence, scratch)?;
            scratch.set_occurrence_value(occurrence, value.clone(), datatype.clone())?;
        }
        Command::SetVariantValue { variant, value, datatype } => {
            let variant = tr(*variant, scratch)?;
            scratch.set_variant_value(variant, value.clone(), datatype.clone())?;
        }
        Command::SetType { construct, typ } => {
            let construct = tr(*construct, scratch)?;
            let typ = tr(*typ, scratch)?;
            scratch.set_type(construct, typ)?;
        }
        Command::SetScope { construct, themes } => {
            let construct = tr(*construct, scratch)?;
            let themes = translate_all(scratch, table, local, themes)?;
            scratch.set_scope(construct, &themes)?;
        }
        Command::SetPlayer { role, player } => {
            let role = tr(*role, scratch)?;
            let player = tr(*player, scratch)?;
            scratch.set_player(role, player)?;
        }
        Command::SetReifier { construct, reifier } => {
            let construct = tr(*construct, scratch)?;
            let reifier = match reifier {
                Some(r) => Some(tr(*r, scratch)?),
                None => None,
            };
            scratch.set_reifier(construct, reifier)?;
        }
        Command::RemoveConstruct { construct } => {
            let construct = tr(*construct, scratch)?;
            scratch.remove_construct(construct)?;
        }
        Command::MergeTopics { left, right } => {
            let left = tr(*left, scratch)?;
            let right = tr(*right, scratch)?;
            if left != right {
                scratch.merge_topics(left, right)?;
            }
        }
    }
    Ok(())
}

fn translate_all(
    scratch: &TopicMap,
    table: &BTreeMap<ConstructId, ConstructId>,
    local: &BTreeSet<ConstructId>,
    ids: &[ConstructId],
) -> Result<Vec<ConstructId>> {
    ids.iter()
        .map(|&id| translate(scratch, table, local, id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Locator {
        Locator::new_unchecked(s)
    }

    #[test]
    fn staged_mutations_are_invisible_until_commit() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let mut tx = shared.begin();
        let t = tx.create_topic().unwrap();
        tx.add_identifier(t, IdentityKind::SubjectIdentifier, loc("si:tx"))
            .unwrap();
        assert_eq!(shared.read(|map| map.topic_count()), 0);
        tx.commit().unwrap();
        assert_eq!(shared.read(|map| map.topic_count()), 1);
        assert!(shared.read(|map| map
            .resolve_subject_identifier(&loc("si:tx"))
            .is_some()));
    }

    #[test]
    fn rollback_leaves_counts_unchanged() {
        let shared = SharedTopicMap::new(TopicMap::new());
        shared.write(|map| map.create_topic());
        let before_topics = shared.read(|map| map.topic_count());
        let before_assocs = shared.read(|map| map.association_count());
        let mut tx = shared.begin();
        let t = tx.create_topic().unwrap();
        let at = tx.create_topic().unwrap();
        let assoc = tx.create_association(at, &[]).unwrap();
        tx.create_role(assoc, at, t).unwrap();
        tx.rollback().unwrap();
        assert_eq!(shared.read(|map| map.topic_count()), before_topics);
        assert_eq!(shared.read(|map| map.association_count()), before_assocs);
    }

    #[test]
    fn commit_on_closed_transaction_fails() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let mut tx = shared.begin();
        tx.create_topic().unwrap();
        tx.commit().unwrap();
        assert!(matches!(
            tx.commit(),
            Err(TopicMapError::Transaction(TransactionError::Closed))
        ));
        assert!(matches!(
            tx.rollback(),
            Err(TopicMapError::Transaction(TransactionError::Closed))
        ));
    }

    #[test]
    fn local_ids_translate_to_committed_ids() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let mut tx = shared.begin();
        let t = tx.create_topic().unwrap();
        let nt = tx.create_topic().unwrap();
        tx.create_name(t, nt, "staged", &[]).unwrap();
        tx.commit().unwrap();
        shared.read(|map| {
            assert_eq!(map.topic_count(), 2);
            let named = map
                .topics()
                .find(|topic| !topic.names.is_empty())
                .expect("topic with name");
            let name = map.name(*named.names.iter().next().unwrap()).unwrap();
            assert_eq!(name.value, "staged");
        });
    }

    #[test]
    fn reads_fault_through_to_committed_state() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let t = shared.write(|map| {
            let t = map.create_topic();
            map.add_subject_identifier(t, loc("si:base")).unwrap();
            t
        });
        let mut tx = shared.begin();
        assert_eq!(tx.resolve_subject_identifier(&loc("si:base")), Some(t));
        let topic = tx.topic(t).unwrap();
        assert!(topic.subject_identifiers.contains(&loc("si:base")));
    }

    #[test]
    fn removed_in_view_reads_construct_removed_before_base() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let t = shared.write(|map| map.create_topic());
        let mut tx = shared.begin();
        tx.remove_construct(t).unwrap();
        assert!(matches!(
            tx.topic(t),
            Err(TopicMapError::ConstructRemoved(ConstructRemoved { id })) if id == t
        ));
        // The committed store still has it.
        assert_eq!(shared.read(|map| map.topic_count()), 1);
    }

    #[test]
    fn one_commit_seals_one_revision() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let mut tx = shared.begin();
        tx.create_topic().unwrap();
        tx.create_topic().unwrap();
        tx.create_topic().unwrap();
        tx.commit().unwrap();
        shared.read(|map| {
            assert_eq!(map.history().revision_count(), 1);
            assert_eq!(map.history().last_revision().unwrap().changes().len(), 3);
        });
    }

    #[test]
    fn staged_identifier_collision_merges_at_commit() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let a = shared.write(|map| {
            let a = map.create_topic();
            map.add_subject_identifier(a, loc("si:shared")).unwrap();
            a
        });
        let mut tx = shared.begin();
        let b = tx.create_topic().unwrap();
        tx.add_identifier(b, IdentityKind::ItemIdentifier, loc("ii:b"))
            .unwrap();
        tx.add_identifier(b, IdentityKind::SubjectIdentifier, loc("si:shared"))
            .unwrap();
        // The view already resolves both ids to one representative.
        assert_eq!(
            tx.resolve_subject_identifier(&loc("si:shared")),
            Some(a)
        );
        tx.commit().unwrap();
        shared.read(|map| {
            assert_eq!(map.topic_count(), 1);
            let survivor = map.resolve_subject_identifier(&loc("si:shared")).unwrap();
            let t = map.topic(survivor).unwrap();
            assert!(t.item_identifiers.contains(&loc("ii:b")));
        });
    }

    #[test]
    fn commands_after_staged_merge_land_on_survivor() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let (a, nt) = shared.write(|map| {
            let a = map.create_topic();
            let nt = map.create_topic();
            map.add_subject_identifier(a, loc("si:x")).unwrap();
            (a, nt)
        });
        let mut tx = shared.begin();
        let b = tx.create_topic().unwrap();
        tx.add_identifier(b, IdentityKind::SubjectIdentifier, loc("si:x"))
            .unwrap();
        // `b` aliases to `a` in the view now; naming it must stick to the
        // surviving topic after commit.
        tx.create_name(b, nt, "post-merge", &[]).unwrap();
        tx.commit().unwrap();
        shared.read(|map| {
            let survivor = map.resolve_subject_identifier(&loc("si:x")).unwrap();
            assert_eq!(map.surviving_id(a), survivor);
            let t = map.topic(survivor).unwrap();
            assert_eq!(t.names.len(), 1);
        });
    }

    #[test]
    fn failed_replay_leaves_committed_store_untouched() {
        let shared = SharedTopicMap::new(TopicMap::new());
        let assoc = shared.write(|map| {
            let at = map.create_topic();
            let assoc = map.create_association(at, &[]).unwrap();
            let r = map.create_topic();
            map.set_reifier(assoc, Some(r)).unwrap();
            assoc
        });
        let revisions_before = shared.read(|map| map.history().revision_count());
        let topics_before = shared.read(|map| map.topic_count());
        let mut tx = shared.begin();
        // The overlay is lax about reifier exclusivity; the committed
        // store is not, so the replay must fail and roll everything back.
        let r2 = tx.create_topic().unwrap();
        tx.set_reifier(assoc, Some(r2)).unwrap();
        let r3 = tx.create_topic().unwrap();
        tx.set_reifier(assoc, Some(r3)).unwrap();
        // Make the same topic reify two constructs at replay: stage a second
        // association carrying r3 as reifier too.
        let at2 = tx.create_topic().unwrap();
        let assoc2 = tx.create_association(at2, &[]).unwrap();
        tx.set_reifier(assoc2, Some(r3)).unwrap();
        let result = tx.commit();
        assert!(matches!(
            result,
            Err(TopicMapError::Transaction(TransactionError::Replay { .. }))
        ));
        assert_eq!(shared.read(|map| map.topic_count()), topics_before);
        assert_eq!(
            shared.read(|map| map.history().revision_count()),
            revisions_before
        );
    }
}
