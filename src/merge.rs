//! Layer 13: Merge engine
//!
//! Consolidates two topics that denote one subject: identity locators,
//! types, characteristics, and played associations move onto the survivor
//! with duplicate suppression; every remaining reference to the absorbed
//! topic is rewritten; the absorbed topic is deleted. The whole merge is
//! all-or-nothing: conflicts are detected by a read-only pre-validation
//! pass before the first destructive step.
//!
//! Duplicate keys compare with the absorbed topic already mapped to the
//! survivor, so statements that become equal *because of* the merge are
//! caught too. Values compare case-insensitively.

use std::collections::{BTreeMap, BTreeSet};

use crate::change::{Change, ChangeKind, ChangeValue};
use crate::error::{Result, UnresolvableIdentityConflict};
use crate::id::{ConstructId, ScopeId};
use crate::locator::{IdentityKind, Locator};
use crate::model::{Association, Construct, Name, Occurrence, Variant};
use crate::store::TopicMap;

type Themes = BTreeSet<ConstructId>;
type NameKey = (ConstructId, Themes, String);
type OccurrenceKey = (ConstructId, Themes, Locator, String);
type VariantKey = (Themes, Locator, String);
/// (type, themes, multiset of (role type, player)).
type AssociationKey = (ConstructId, Themes, BTreeMap<(ConstructId, ConstructId), usize>);

impl TopicMap {
    /// Consolidate `a` and `b`. The side with fewer characteristics and
    /// played roles is absorbed, so cost tracks the smaller topic; the
    /// surviving id is returned. Either order yields an isomorphic graph.
    pub fn merge_topics(&mut self, a: ConstructId, b: ConstructId) -> Result<ConstructId> {
        if a == b {
            self.topic(a)?;
            return Ok(a);
        }
        let size_a = self.topic(a)?.content_size();
        let size_b = self.topic(b)?.content_size();
        let (survivor, absorbed) = if size_a < size_b { (b, a) } else { (a, b) };
        self.begin_op();
        let out = self.merge_into(survivor, absorbed);
        self.end_op();
        out.map(|()| survivor)
    }

    /// Absorb `absorbed` into `survivor`. Used directly where the survivor
    /// is fixed (reifier unification into a fresh topic).
    pub(crate) fn merge_into(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        tracing::debug!(%survivor, %absorbed, "merging topics");
        self.prevalidate_merge(survivor, absorbed)?;
        let snapshot = self.arena.snapshot(absorbed)?;

        self.merge_identity(survivor, absorbed)?;
        self.merge_type_sets(survivor, absorbed)?;
        self.merge_names(survivor, absorbed)?;
        self.merge_occurrences(survivor, absorbed)?;
        self.merge_associations(survivor, absorbed)?;
        self.merge_topic_reifier(survivor, absorbed)?;
        self.rewrite_references(survivor, absorbed)?;

        // The absorbed topic is now an empty shell.
        let shell = self.topic(absorbed)?;
        debug_assert!(shell.names.is_empty());
        debug_assert!(shell.occurrences.is_empty());
        debug_assert!(shell.roles_played.is_empty());
        self.map_record_mut().topics.remove(&absorbed);
        self.arena.remove(absorbed)?;
        self.merged_into.insert(absorbed, survivor);

        self.record(Change::new(
            ChangeKind::Merged,
            survivor,
            ChangeValue::Construct(survivor),
            ChangeValue::Snapshot(Box::new(snapshot)),
        ));
        Ok(())
    }

    // =========================================================================
    // Pre-validation (read-only)
    // =========================================================================

    fn prevalidate_merge(&self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let record = self.topic(absorbed)?;
        for (kind, set) in [
            (IdentityKind::ItemIdentifier, &record.item_identifiers),
            (IdentityKind::SubjectIdentifier, &record.subject_identifiers),
            (IdentityKind::SubjectLocator, &record.subject_locators),
        ] {
            for locator in set {
                if let Some(holder) = self.identity.holder(kind, locator) {
                    if holder != absorbed {
                        return Err(UnresolvableIdentityConflict::ForeignHolder {
                            locator: locator.clone(),
                            kind,
                            holder,
                        }
                        .into());
                    }
                }
            }
        }
        // Reification is 1:1, so the only way both topics stay reifiers is
        // if the two reified statements consolidate into one.
        if let (Some(left), Some(right)) =
            (self.topic(survivor)?.reifies, record.reifies)
        {
            if left != right && !self.reified_will_consolidate(left, right, survivor, absorbed) {
                return Err(UnresolvableIdentityConflict::DistinctReified {
                    left: survivor,
                    right: absorbed,
                    left_reifies: left,
                    right_reifies: right,
                }
                .into());
            }
        }
        Ok(())
    }

    fn reified_will_consolidate(
        &self,
        left: ConstructId,
        right: ConstructId,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> bool {
        match (self.arena.get_opt(left), self.arena.get_opt(right)) {
            (Some(Construct::Name(l)), Some(Construct::Name(r))) => {
                self.name_key(l, survivor, absorbed) == self.name_key(r, survivor, absorbed)
                    && self.mapped(l.parent, survivor, absorbed)
                        == self.mapped(r.parent, survivor, absorbed)
            }
            (Some(Construct::Occurrence(l)), Some(Construct::Occurrence(r))) => {
                self.occurrence_key(l, survivor, absorbed)
                    == self.occurrence_key(r, survivor, absorbed)
                    && self.mapped(l.parent, survivor, absorbed)
                        == self.mapped(r.parent, survivor, absorbed)
            }
            (Some(Construct::Association(l)), Some(Construct::Association(r))) => {
                self.association_key(l, survivor, absorbed)
                    == self.association_key(r, survivor, absorbed)
            }
            _ => false,
        }
    }

    // =========================================================================
    // Duplicate keys (absorbed mapped to survivor)
    // =========================================================================

    fn mapped(&self, id: ConstructId, survivor: ConstructId, absorbed: ConstructId) -> ConstructId {
        if id == absorbed { survivor } else { id }
    }

    fn mapped_themes(&self, scope: ScopeId, survivor: ConstructId, absorbed: ConstructId) -> Themes {
        self.scopes
            .themes(scope)
            .iter()
            .map(|&t| self.mapped(t, survivor, absorbed))
            .collect()
    }

    fn name_key(&self, name: &Name, survivor: ConstructId, absorbed: ConstructId) -> NameKey {
        (
            self.mapped(name.typ, survivor, absorbed),
            self.mapped_themes(name.scope, survivor, absorbed),
            name.value.to_lowercase(),
        )
    }

    fn occurrence_key(
        &self,
        occurrence: &Occurrence,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> OccurrenceKey {
        (
            self.mapped(occurrence.typ, survivor, absorbed),
            self.mapped_themes(occurrence.scope, survivor, absorbed),
            occurrence.datatype.clone(),
            occurrence.value.to_lowercase(),
        )
    }

    fn variant_key(
        &self,
        variant: &Variant,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> VariantKey {
        (
            self.mapped_themes(variant.scope, survivor, absorbed),
            variant.datatype.clone(),
            variant.value.to_lowercase(),
        )
    }

    fn association_key(
        &self,
        association: &Association,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> AssociationKey {
        let mut roles: BTreeMap<(ConstructId, ConstructId), usize> = BTreeMap::new();
        for &role in &association.roles {
            if let Ok(r) = self.role(role) {
                let key = (
                    self.mapped(r.typ, survivor, absorbed),
                    self.mapped(r.player, survivor, absorbed),
                );
                *roles.entry(key).or_insert(0) += 1;
            }
        }
        (
            self.mapped(association.typ, survivor, absorbed),
            self.mapped_themes(association.scope, survivor, absorbed),
            roles,
        )
    }

    // =========================================================================
    // Identity, types
    // =========================================================================

    fn merge_identity(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let record = self.topic(absorbed)?.clone();
        for locator in &record.item_identifiers {
            self.identity.unbind(IdentityKind::ItemIdentifier, locator);
            self.identity
                .bind(IdentityKind::ItemIdentifier, locator.clone(), survivor);
        }
        for locator in &record.subject_identifiers {
            self.identity.unbind(IdentityKind::SubjectIdentifier, locator);
            self.identity
                .bind(IdentityKind::SubjectIdentifier, locator.clone(), survivor);
        }
        for locator in &record.subject_locators {
            self.identity.unbind(IdentityKind::SubjectLocator, locator);
            self.identity
                .bind(IdentityKind::SubjectLocator, locator.clone(), survivor);
        }
        {
            let absorbed_record = self.topic_mut(absorbed)?;
            absorbed_record.item_identifiers.clear();
            absorbed_record.subject_identifiers.clear();
            absorbed_record.subject_locators.clear();
        }
        let target = self.topic_mut(survivor)?;
        target.item_identifiers.extend(record.item_identifiers);
        target.subject_identifiers.extend(record.subject_identifiers);
        target.subject_locators.extend(record.subject_locators);
        Ok(())
    }

    fn merge_type_sets(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let record = self.topic(absorbed)?.clone();
        for &typ in &record.types {
            let mapped = self.mapped(typ, survivor, absorbed);
            if let Some(set) = self.instances.get_mut(&typ) {
                set.remove(&absorbed);
                if set.is_empty() {
                    self.instances.remove(&typ);
                }
            }
            self.topic_mut(survivor)?.types.insert(mapped);
            self.instances.entry(mapped).or_default().insert(survivor);
        }
        self.topic_mut(absorbed)?.types.clear();
        for &sup in &record.supertypes {
            let mapped = self.mapped(sup, survivor, absorbed);
            if let Some(set) = self.subtypes.get_mut(&sup) {
                set.remove(&absorbed);
                if set.is_empty() {
                    self.subtypes.remove(&sup);
                }
            }
            // Collapsing the pair can close a supertype loop; drop the
            // self-edge rather than violate acyclicity.
            if mapped == survivor || self.supertype_closure(mapped).contains(&survivor) {
                continue;
            }
            if self.topic_mut(survivor)?.supertypes.insert(mapped) {
                self.subtypes.entry(mapped).or_default().insert(survivor);
            }
        }
        self.topic_mut(absorbed)?.supertypes.clear();
        Ok(())
    }

    // =========================================================================
    // Characteristics
    // =========================================================================

    fn survivor_name_index(
        &self,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> Result<BTreeMap<NameKey, ConstructId>> {
        let mut index = BTreeMap::new();
        for &name in &self.topic(survivor)?.names {
            let record = self.name(name)?;
            index
                .entry(self.name_key(record, survivor, absorbed))
                .or_insert(name);
        }
        Ok(index)
    }

    fn merge_names(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let mut index = self.survivor_name_index(survivor, absorbed)?;
        let names: Vec<ConstructId> = self.topic(absorbed)?.names.iter().copied().collect();
        for name in names {
            let record = self.name(name)?.clone();
            let key = self.name_key(&record, survivor, absorbed);
            match index.get(&key).copied() {
                Some(duplicate) => {
                    let recursed =
                        self.merge_reifiers(duplicate, name, survivor, absorbed)?;
                    self.move_item_identifiers(name, duplicate)?;
                    self.topic_mut(absorbed)?.names.remove(&name);
                    self.delete_name_silent(name)?;
                    if recursed {
                        index = self.survivor_name_index(survivor, absorbed)?;
                    }
                }
                None => {
                    self.rehome_name(name, survivor, absorbed)?;
                    self.dedupe_variants(name, survivor, absorbed)?;
                    index.insert(key, name);
                }
            }
        }
        Ok(())
    }

    fn rehome_name(&mut self, name: ConstructId, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let typ = self.name(name)?.typ;
        self.topic_mut(absorbed)?.names.remove(&name);
        self.topic_mut(survivor)?.names.insert(name);
        self.name_mut(name)?.parent = survivor;
        if typ == absorbed {
            self.retype_silent(name, survivor)?;
        }
        Ok(())
    }

    /// Collapse variants of one name that become equal under the merge
    /// mapping.
    fn dedupe_variants(&mut self, name: ConstructId, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let mut index: BTreeMap<VariantKey, ConstructId> = BTreeMap::new();
        let variants: Vec<ConstructId> = self.name(name)?.variants.iter().copied().collect();
        for variant in variants {
            let record = self.variant(variant)?.clone();
            let key = self.variant_key(&record, survivor, absorbed);
            match index.get(&key).copied() {
                Some(duplicate) => {
                    self.merge_reifiers(duplicate, variant, survivor, absorbed)?;
                    self.move_item_identifiers(variant, duplicate)?;
                    self.name_mut(name)?.variants.remove(&variant);
                    self.delete_variant_silent(variant)?;
                }
                None => {
                    index.insert(key, variant);
                }
            }
        }
        Ok(())
    }

    fn survivor_occurrence_index(
        &self,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> Result<BTreeMap<OccurrenceKey, ConstructId>> {
        let mut index = BTreeMap::new();
        for &occurrence in &self.topic(survivor)?.occurrences {
            let record = self.occurrence(occurrence)?;
            index
                .entry(self.occurrence_key(record, survivor, absorbed))
                .or_insert(occurrence);
        }
        Ok(index)
    }

    fn merge_occurrences(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let mut index = self.survivor_occurrence_index(survivor, absorbed)?;
        let occurrences: Vec<ConstructId> =
            self.topic(absorbed)?.occurrences.iter().copied().collect();
        for occurrence in occurrences {
            let record = self.occurrence(occurrence)?.clone();
            let key = self.occurrence_key(&record, survivor, absorbed);
            match index.get(&key).copied() {
                Some(duplicate) => {
                    let recursed =
                        self.merge_reifiers(duplicate, occurrence, survivor, absorbed)?;
                    self.move_item_identifiers(occurrence, duplicate)?;
                    self.topic_mut(absorbed)?.occurrences.remove(&occurrence);
                    self.delete_occurrence_silent(occurrence)?;
                    if recursed {
                        index = self.survivor_occurrence_index(survivor, absorbed)?;
                    }
                }
                None => {
                    let typ = record.typ;
                    self.topic_mut(absorbed)?.occurrences.remove(&occurrence);
                    self.topic_mut(survivor)?.occurrences.insert(occurrence);
                    self.occurrence_mut(occurrence)?.parent = survivor;
                    if typ == absorbed {
                        self.retype_silent(occurrence, survivor)?;
                    }
                    index.insert(key, occurrence);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Associations
    // =========================================================================

    fn survivor_association_index(
        &self,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> Result<BTreeMap<AssociationKey, ConstructId>> {
        let mut index = BTreeMap::new();
        for &role in &self.topic(survivor)?.roles_played {
            let association = self.role(role)?.parent;
            let record = self.association(association)?;
            index
                .entry(self.association_key(record, survivor, absorbed))
                .or_insert(association);
        }
        Ok(index)
    }

    fn merge_associations(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let mut index = self.survivor_association_index(survivor, absorbed)?;
        loop {
            // Roles can disappear in bulk when an association is discarded
            // as a duplicate, so take them one at a time.
            let Some(&role) = self.topic(absorbed)?.roles_played.iter().next() else {
                break;
            };
            let association = self.role(role)?.parent;
            let record = self.association(association)?.clone();
            let key = self.association_key(&record, survivor, absorbed);
            match index.get(&key).copied() {
                Some(duplicate) if duplicate != association => {
                    let recursed =
                        self.merge_reifiers(duplicate, association, survivor, absorbed)?;
                    self.move_item_identifiers(association, duplicate)?;
                    self.merge_role_attachments(duplicate, &record, survivor, absorbed)?;
                    self.delete_association_silent(association)?;
                    if recursed {
                        index = self.survivor_association_index(survivor, absorbed)?;
                    }
                }
                _ => {
                    // Re-home: rewrite the roles the absorbed topic plays.
                    let roles: Vec<ConstructId> = record.roles.iter().copied().collect();
                    for r in roles {
                        if self.role(r)?.player == absorbed {
                            self.role_mut(r)?.player = survivor;
                            self.topic_mut(absorbed)?.roles_played.remove(&r);
                            self.topic_mut(survivor)?.roles_played.insert(r);
                        }
                    }
                    if record.typ == absorbed {
                        self.retype_silent(association, survivor)?;
                    }
                    index.insert(key, association);
                }
            }
        }
        Ok(())
    }

    /// Move role-level item identifiers and reifiers from a discarded
    /// duplicate association onto the matching roles of the kept one.
    fn merge_role_attachments(
        &mut self,
        kept: ConstructId,
        discarded: &Association,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> Result<()> {
        let kept_roles: Vec<ConstructId> = self.association(kept)?.roles.iter().copied().collect();
        let mut unmatched: Vec<ConstructId> = kept_roles;
        for &role in &discarded.roles {
            let record = self.role(role)?.clone();
            let key = (
                self.mapped(record.typ, survivor, absorbed),
                self.mapped(record.player, survivor, absorbed),
            );
            let position = unmatched.iter().position(|&candidate| {
                self.role(candidate).is_ok_and(|r| {
                    (
                        self.mapped(r.typ, survivor, absorbed),
                        self.mapped(r.player, survivor, absorbed),
                    ) == key
                })
            });
            if let Some(position) = position {
                let counterpart = unmatched.swap_remove(position);
                self.merge_reifiers(counterpart, role, survivor, absorbed)?;
                self.move_item_identifiers(role, counterpart)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Reifiers
    // =========================================================================

    /// Unify reification when `doomed` is discarded as a duplicate of
    /// `keep`. Returns true if a recursive topic merge ran (survivor-side
    /// duplicate indexes must be rebuilt).
    fn merge_reifiers(
        &mut self,
        keep: ConstructId,
        doomed: ConstructId,
        survivor: ConstructId,
        absorbed: ConstructId,
    ) -> Result<bool> {
        let kept_reifier = self.arena.get(keep)?.reifier();
        let doomed_reifier = self.arena.get(doomed)?.reifier();
        match (kept_reifier, doomed_reifier) {
            (_, None) => Ok(false),
            (None, Some(r)) => {
                let target = self.mapped(r, survivor, absorbed);
                self.arena.get_mut(doomed)?.set_reifier(None);
                self.topic_mut(r)?.reifies = None;
                match self.topic(target)?.reifies {
                    Some(existing) if existing != keep => {
                        tracing::warn!(
                            %target, %existing, dropped = %keep,
                            "surviving reifier already bound; dropping duplicate reification"
                        );
                    }
                    _ => {
                        self.arena.get_mut(keep)?.set_reifier(Some(target));
                        self.topic_mut(target)?.reifies = Some(keep);
                    }
                }
                Ok(false)
            }
            (Some(left), Some(right)) => {
                let left_mapped = self.mapped(left, survivor, absorbed);
                let right_mapped = self.mapped(right, survivor, absorbed);
                self.arena.get_mut(doomed)?.set_reifier(None);
                if self.topic(right)?.reifies == Some(doomed) {
                    self.topic_mut(right)?.reifies = None;
                }
                if left_mapped == right_mapped {
                    // Same subject on both sides (the merging pair itself);
                    // normalize onto the surviving topic.
                    if left != left_mapped {
                        self.topic_mut(left)?.reifies = None;
                        self.arena.get_mut(keep)?.set_reifier(Some(left_mapped));
                        self.topic_mut(left_mapped)?.reifies = Some(keep);
                    }
                    return Ok(false);
                }
                // Two distinct reifying topics: they denote one subject
                // now, so consolidate them - into the surviving topic when
                // it is one of them, otherwise into a brand-new topic
                // (which breaks any mutual-reification cycle).
                tracing::debug!(%left, %right, "unifying reifiers of duplicate statements");
                self.arena.get_mut(keep)?.set_reifier(None);
                self.topic_mut(left)?.reifies = None;
                let target = if left_mapped == survivor || right_mapped == survivor {
                    survivor
                } else {
                    self.insert_topic()
                };
                for side in [left_mapped, right_mapped] {
                    if side != target {
                        self.merge_into(target, side)?;
                    }
                }
                self.arena.get_mut(keep)?.set_reifier(Some(target));
                self.topic_mut(target)?.reifies = Some(keep);
                Ok(true)
            }
        }
    }

    /// Topic-level reifier move, after statement dedup has run.
    fn merge_topic_reifier(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        let Some(reified) = self.topic(absorbed)?.reifies else {
            return Ok(());
        };
        self.topic_mut(absorbed)?.reifies = None;
        if let Some(existing) = self.topic(survivor)?.reifies {
            // Pre-validation only lets this stand when both reified
            // statements consolidate; dedup has already collapsed them.
            debug_assert_eq!(existing, reified);
            if let Ok(c) = self.arena.get_mut(reified) {
                if c.reifier() == Some(absorbed) {
                    c.set_reifier(None);
                }
            }
            return Ok(());
        }
        self.topic_mut(survivor)?.reifies = Some(reified);
        self.arena.get_mut(reified)?.set_reifier(Some(survivor));
        Ok(())
    }

    // =========================================================================
    // Reference rewrite and plumbing
    // =========================================================================

    /// Rewrite every remaining reference to the absorbed topic: as a type,
    /// a supertype, a scope theme. Players and reifiers were handled by
    /// the content passes.
    fn rewrite_references(&mut self, survivor: ConstructId, absorbed: ConstructId) -> Result<()> {
        if let Some(typed) = self.typed_by.remove(&absorbed) {
            for construct in typed {
                if self.arena.contains(construct) {
                    self.retype_silent(construct, survivor)?;
                }
            }
        }
        if let Some(topics) = self.instances.remove(&absorbed) {
            for topic in topics {
                if !self.arena.contains(topic) {
                    continue;
                }
                self.topic_mut(topic)?.types.remove(&absorbed);
                self.topic_mut(topic)?.types.insert(survivor);
                self.instances.entry(survivor).or_default().insert(topic);
            }
        }
        if let Some(topics) = self.subtypes.remove(&absorbed) {
            for topic in topics {
                if !self.arena.contains(topic) {
                    continue;
                }
                self.topic_mut(topic)?.supertypes.remove(&absorbed);
                if topic == survivor || self.supertype_closure(survivor).contains(&topic) {
                    // Dropping the edge beats closing a cycle.
                    continue;
                }
                self.topic_mut(topic)?.supertypes.insert(survivor);
                self.subtypes.entry(survivor).or_default().insert(topic);
            }
        }
        for (_, new_scope, members) in self.scopes.rewrite_theme(absorbed, Some(survivor)) {
            for member in members {
                if let Ok(construct) = self.arena.get_mut(member) {
                    construct.set_scope(new_scope);
                }
            }
        }
        Ok(())
    }

    /// Retype without recording a change; the merge records once.
    fn retype_silent(&mut self, construct: ConstructId, typ: ConstructId) -> Result<()> {
        let Some(current) = self.arena.get(construct)?.typ() else {
            return Ok(());
        };
        if current == typ {
            return Ok(());
        }
        self.arena.get_mut(construct)?.set_typ(typ);
        if let Some(set) = self.typed_by.get_mut(&current) {
            set.remove(&construct);
            if set.is_empty() {
                self.typed_by.remove(&current);
            }
        }
        self.typed_by.entry(typ).or_default().insert(construct);
        Ok(())
    }

    /// Move item identifiers from a discarded duplicate onto the kept
    /// construct. Bindings are re-pointed, not re-validated: within one
    /// map each locator already has exactly one holder.
    fn move_item_identifiers(&mut self, from: ConstructId, to: ConstructId) -> Result<()> {
        let locators = std::mem::take(self.arena.get_mut(from)?.item_identifiers_mut());
        for locator in locators {
            self.identity.unbind(IdentityKind::ItemIdentifier, &locator);
            self.identity
                .bind(IdentityKind::ItemIdentifier, locator.clone(), to);
            self.arena.get_mut(to)?.item_identifiers_mut().insert(locator);
        }
        Ok(())
    }
}
