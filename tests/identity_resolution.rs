//! Identity store behavior through the public surface: stable resolution,
//! resolve-or-create, collision policy.

use topicmap::{Locator, TopicMap, TopicMapError};

fn loc(s: &str) -> Locator {
    Locator::new(s).expect("valid locator")
}

#[test]
fn repeated_resolution_without_mutation_is_stable() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    map.add_subject_identifier(t, loc("si:stable")).unwrap();
    let first = map.resolve_subject_identifier(&loc("si:stable"));
    for _ in 0..10 {
        assert_eq!(map.resolve_subject_identifier(&loc("si:stable")), first);
    }
    assert_eq!(first, Some(t));
}

#[test]
fn create_by_subject_identifier_resolves_before_creating() {
    let mut map = TopicMap::new();
    let a = map.create_topic_by_subject_identifier(loc("si:x")).unwrap();
    let b = map.create_topic_by_subject_identifier(loc("si:x")).unwrap();
    assert_eq!(a, b);
    assert_eq!(map.topic_count(), 1);
}

#[test]
fn create_by_item_identifier_reuses_topic_with_matching_subject_identifier() {
    let mut map = TopicMap::new();
    let t = map.create_topic_by_subject_identifier(loc("psi:person")).unwrap();
    let same = map.create_topic_by_item_identifier(loc("psi:person")).unwrap();
    assert_eq!(t, same);
    let record = map.topic(t).unwrap();
    assert!(record.subject_identifiers.contains(&loc("psi:person")));
    assert!(record.item_identifiers.contains(&loc("psi:person")));
}

#[test]
fn item_identifier_on_non_topic_blocks_topic_creation() {
    let mut map = TopicMap::new();
    let at = map.create_topic();
    let assoc = map.create_association(at, &[]).unwrap();
    map.add_item_identifier(assoc, loc("ii:taken")).unwrap();
    let err = map
        .create_topic_by_item_identifier(loc("ii:taken"))
        .unwrap_err();
    assert!(matches!(err, TopicMapError::IdentityConflict(_)));
}

#[test]
fn unregistering_frees_the_locator() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    map.add_subject_locator(t, loc("sl:thing")).unwrap();
    assert_eq!(map.resolve_subject_locator(&loc("sl:thing")), Some(t));
    map.remove_subject_locator(t, &loc("sl:thing")).unwrap();
    assert_eq!(map.resolve_subject_locator(&loc("sl:thing")), None);
    // Rebinding to a different topic is now fine.
    let u = map.create_topic();
    map.add_subject_locator(u, loc("sl:thing")).unwrap();
    assert_eq!(map.resolve_subject_locator(&loc("sl:thing")), Some(u));
}

#[test]
fn identifier_registration_is_idempotent_and_quiet() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    map.add_subject_identifier(t, loc("si:once")).unwrap();
    let revisions = map.history().revision_count();
    map.add_subject_identifier(t, loc("si:once")).unwrap();
    // The no-op registration leaves no empty revision behind.
    assert_eq!(map.history().revision_count(), revisions);
}

#[test]
fn removed_construct_is_reported_as_removed_not_unknown() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    map.remove_topic(t).unwrap();
    assert!(matches!(
        map.construct_by_id(t),
        Err(TopicMapError::ConstructRemoved(_))
    ));
}
