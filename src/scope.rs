//! Layer 6: Scope store
//!
//! Interns theme sets: one `ScopeId` per distinct set within a map, the
//! empty set pre-seeded as `ScopeId::UNCONSTRAINED`. Tracks which
//! constructs bear each scope and which scopes each theme appears in, so
//! merge/removal can rewrite affected scopes in time proportional to the
//! theme's degree.
//!
//! Interned scopes live for the map's lifetime; ids are never reused, so a
//! `ScopeId` held by an old revision stays resolvable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::id::{ConstructId, ScopeId};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ScopeData {
    themes: BTreeSet<ConstructId>,
    /// Constructs bearing exactly this scope.
    members: BTreeSet<ConstructId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopeStore {
    by_themes: BTreeMap<BTreeSet<ConstructId>, ScopeId>,
    scopes: BTreeMap<ScopeId, ScopeData>,
    /// Theme topic -> scopes it appears in.
    by_theme: BTreeMap<ConstructId, BTreeSet<ScopeId>>,
    next_id: u64,
}

impl ScopeStore {
    pub fn new() -> Self {
        let mut scopes = BTreeMap::new();
        scopes.insert(
            ScopeId::UNCONSTRAINED,
            ScopeData {
                themes: BTreeSet::new(),
                members: BTreeSet::new(),
            },
        );
        let mut by_themes = BTreeMap::new();
        by_themes.insert(BTreeSet::new(), ScopeId::UNCONSTRAINED);
        Self {
            by_themes,
            scopes,
            by_theme: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Canonical scope for a theme set. Idempotent: same set (order and
    /// duplicates irrelevant - it is a set) always yields the same id.
    pub fn get_scope<I>(&mut self, themes: I) -> ScopeId
    where
        I: IntoIterator<Item = ConstructId>,
    {
        let set: BTreeSet<ConstructId> = themes.into_iter().collect();
        if let Some(&id) = self.by_themes.get(&set) {
            return id;
        }
        let id = ScopeId::new(self.next_id);
        self.next_id += 1;
        for &theme in &set {
            self.by_theme.entry(theme).or_default().insert(id);
        }
        self.by_themes.insert(set.clone(), id);
        self.scopes.insert(
            id,
            ScopeData {
                themes: set,
                members: BTreeSet::new(),
            },
        );
        id
    }

    /// Look up without interning.
    pub fn find_scope(&self, themes: &BTreeSet<ConstructId>) -> Option<ScopeId> {
        self.by_themes.get(themes).copied()
    }

    pub fn themes(&self, scope: ScopeId) -> &BTreeSet<ConstructId> {
        static EMPTY: BTreeSet<ConstructId> = BTreeSet::new();
        self.scopes.get(&scope).map(|s| &s.themes).unwrap_or(&EMPTY)
    }

    /// Constructs bearing exactly this scope.
    pub fn get_scoped(&self, scope: ScopeId) -> &BTreeSet<ConstructId> {
        static EMPTY: BTreeSet<ConstructId> = BTreeSet::new();
        self.scopes
            .get(&scope)
            .map(|s| &s.members)
            .unwrap_or(&EMPTY)
    }

    /// Scopes a theme appears in.
    pub fn scopes_of_theme(&self, theme: ConstructId) -> BTreeSet<ScopeId> {
        self.by_theme.get(&theme).cloned().unwrap_or_default()
    }

    pub(crate) fn attach(&mut self, scope: ScopeId, construct: ConstructId) {
        if let Some(data) = self.scopes.get_mut(&scope) {
            data.members.insert(construct);
        }
    }

    pub(crate) fn detach(&mut self, scope: ScopeId, construct: ConstructId) {
        if let Some(data) = self.scopes.get_mut(&scope) {
            data.members.remove(&construct);
        }
    }

    /// Rewrite every scope containing `theme`: substitute `replacement`
    /// (or drop the theme when `None`), re-intern over the resulting set,
    /// and move members across.
    ///
    /// Returns `(old_scope, new_scope, members)` per rewritten scope so the
    /// caller can re-point the member records.
    pub(crate) fn rewrite_theme(
        &mut self,
        theme: ConstructId,
        replacement: Option<ConstructId>,
    ) -> Vec<(ScopeId, ScopeId, Vec<ConstructId>)> {
        let affected = self.by_theme.remove(&theme).unwrap_or_default();
        let mut moves = Vec::new();
        for old_id in affected {
            let Some(data) = self.scopes.get_mut(&old_id) else {
                continue;
            };
            let members: Vec<ConstructId> = std::mem::take(&mut data.members).into_iter().collect();
            let mut new_set = data.themes.clone();
            new_set.remove(&theme);
            if let Some(repl) = replacement {
                new_set.insert(repl);
            }
            let old_set = self.scopes.get(&old_id).map(|d| d.themes.clone());
            let new_id = self.get_scope(new_set);
            debug_assert_ne!(new_id, old_id);
            // The dead theme set stops resolving and leaves the reverse
            // index; old_id stays in `scopes` so ids held by history
            // changes remain meaningful.
            if let Some(old_set) = old_set {
                for other in &old_set {
                    if let Some(ids) = self.by_theme.get_mut(other) {
                        ids.remove(&old_id);
                        if ids.is_empty() {
                            self.by_theme.remove(other);
                        }
                    }
                }
                self.by_themes.remove(&old_set);
            }
            if let Some(data) = self.scopes.get_mut(&new_id) {
                data.members.extend(members.iter().copied());
            }
            moves.push((old_id, new_id, members));
        }
        moves
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for ScopeStore {
    fn default() -> Self {
        Self::new()
    }
}
