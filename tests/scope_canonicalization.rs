//! Scope store canonical behavior through the public surface.

use std::collections::BTreeSet;

use proptest::prelude::*;
use topicmap::{ScopeId, TopicMap};

#[test]
fn same_theme_set_same_scope_object() {
    let mut map = TopicMap::new();
    let t1 = map.create_topic();
    let t2 = map.create_topic();
    let s1 = map.get_scope(&[t1, t2]).unwrap();
    let s2 = map.get_scope(&[t1, t2]).unwrap();
    let s3 = map.get_scope(&[t2, t1]).unwrap();
    assert_eq!(s1, s2);
    assert_eq!(s1, s3);
}

#[test]
fn empty_scope_is_the_unconstrained_singleton() {
    let mut map = TopicMap::new();
    assert_eq!(map.get_scope(&[]).unwrap(), ScopeId::UNCONSTRAINED);
    assert_eq!(map.get_scope(&[]).unwrap(), ScopeId::UNCONSTRAINED);
    assert!(ScopeId::UNCONSTRAINED.is_unconstrained());
}

#[test]
fn duplicate_themes_collapse() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    let with_dup = map.get_scope(&[t, t]).unwrap();
    let without = map.get_scope(&[t]).unwrap();
    assert_eq!(with_dup, without);
}

#[test]
fn scoped_index_tracks_exact_scope_bearers() {
    let mut map = TopicMap::new();
    let nt = map.create_topic();
    let theme = map.create_topic();
    let t = map.create_topic();
    let scoped = map.create_name(t, nt, "scoped", &[theme]).unwrap();
    let unscoped = map.create_name(t, nt, "unscoped", &[]).unwrap();
    let scope = map.name(scoped).unwrap().scope;
    assert!(map.scoped_constructs(scope).contains(&scoped));
    assert!(!map.scoped_constructs(scope).contains(&unscoped));
    assert!(map.scoped_constructs(ScopeId::UNCONSTRAINED).contains(&unscoped));
}

#[test]
fn rescoping_moves_membership() {
    let mut map = TopicMap::new();
    let at = map.create_topic();
    let theme = map.create_topic();
    let assoc = map.create_association(at, &[]).unwrap();
    assert!(map.scoped_constructs(ScopeId::UNCONSTRAINED).contains(&assoc));
    map.set_scope(assoc, &[theme]).unwrap();
    let scope = map.association(assoc).unwrap().scope;
    assert!(!map.scoped_constructs(ScopeId::UNCONSTRAINED).contains(&assoc));
    assert!(map.scoped_constructs(scope).contains(&assoc));
    assert_eq!(
        map.scope_themes(scope).iter().copied().collect::<Vec<_>>(),
        vec![theme]
    );
}

#[test]
fn non_topic_theme_is_rejected() {
    let mut map = TopicMap::new();
    let at = map.create_topic();
    let assoc = map.create_association(at, &[]).unwrap();
    let err = map.get_scope(&[assoc]).unwrap_err();
    assert!(matches!(
        err,
        topicmap::TopicMapError::InvalidScope(topicmap::InvalidScope::ThemeNotATopic { .. })
    ));
    // Removed topics cannot serve as themes either.
    let dead = map.create_topic();
    map.remove_topic(dead).unwrap();
    assert!(map.get_scope(&[dead]).is_err());
}

proptest! {
    #[test]
    fn interning_ignores_order_and_multiplicity(
        indices in prop::collection::vec(0usize..6, 0..10),
    ) {
        let mut map = TopicMap::new();
        let topics: Vec<_> = (0..6).map(|_| map.create_topic()).collect();
        let themes: Vec<_> = indices.iter().map(|&i| topics[i]).collect();
        let mut reversed = themes.clone();
        reversed.reverse();
        let deduped: Vec<_> = themes
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let s1 = map.get_scope(&themes).unwrap();
        let s2 = map.get_scope(&reversed).unwrap();
        let s3 = map.get_scope(&deduped).unwrap();
        prop_assert_eq!(s1, s2);
        prop_assert_eq!(s1, s3);
        if themes.is_empty() {
            prop_assert_eq!(s1, ScopeId::UNCONSTRAINED);
        }
    }
}
