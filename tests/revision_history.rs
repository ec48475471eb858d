//! Revision history through the public surface: one revision per
//! operation, dependent changesets, tags, time-travel lookups.

use topicmap::{ChangeKind, ChangeValue, Locator, TopicMap, TopicMapConfig, WallClock};

fn loc(s: &str) -> Locator {
    Locator::new(s).expect("valid locator")
}

#[test]
fn every_mutation_leaves_a_nonempty_changeset() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    let checks: Vec<(&str, Box<dyn FnOnce(&mut TopicMap)>)> = vec![
        (
            "add_subject_identifier",
            Box::new(move |m: &mut TopicMap| {
                m.add_subject_identifier(t, loc("si:t")).unwrap();
            }),
        ),
        (
            "create_name",
            Box::new(move |m: &mut TopicMap| {
                let nt = m.create_topic();
                m.create_name(t, nt, "n", &[]).unwrap();
            }),
        ),
        (
            "create_occurrence",
            Box::new(move |m: &mut TopicMap| {
                let ot = m.create_topic();
                m.create_occurrence(t, ot, "v", loc("dt:string"), &[]).unwrap();
            }),
        ),
    ];
    for (label, op) in checks {
        let before = map.history().revision_count();
        op(&mut map);
        assert!(
            map.history().revision_count() > before,
            "{label} left no revision"
        );
        let last = map.history().last_revision().unwrap();
        assert!(!last.is_empty(), "{label} sealed an empty revision");
    }
}

#[test]
fn changes_are_reachable_from_operation_arguments() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    let typ = map.create_topic();
    map.add_topic_type(t, typ).unwrap();
    let last = map.history().last_revision().unwrap();
    let change = &last.changes()[0];
    assert_eq!(change.kind, ChangeKind::TypeAdded);
    assert_eq!(change.subject, t);
    assert_eq!(change.new_value, ChangeValue::Construct(typ));
    // Both argument topics appear in the dependent changesets.
    assert!(map.history().changes_for_topic(t).count() > 0);
    assert!(map.history().changes_for_topic(typ).count() > 0);
}

#[test]
fn association_type_index_captures_type_at_change_time() {
    let mut map = TopicMap::new();
    let at_old = map.create_topic();
    let at_new = map.create_topic();
    let rt = map.create_topic();
    let player = map.create_topic();
    let assoc = map.create_association(at_old, &[]).unwrap();
    map.create_role(assoc, rt, player).unwrap();
    let old_count = map.history().changes_for_association_type(at_old).count();
    assert!(old_count > 0);
    map.set_type(assoc, at_new).unwrap();
    // Later changes land under the new type; the earlier ones stay put.
    map.set_scope(assoc, &[player]).unwrap();
    assert_eq!(
        map.history().changes_for_association_type(at_old).count(),
        old_count + 1 // the retype itself was captured under the old type
    );
    assert!(map.history().changes_for_association_type(at_new).count() > 0);
}

#[test]
fn revision_lookup_by_id_tag_and_time() {
    let mut map = TopicMap::new();
    map.create_topic();
    let first = map.history().first_revision().unwrap().id();
    map.create_topic();
    let second = map.history().last_revision().unwrap().id();
    assert!(second > first);

    assert!(map.history_mut().tag_revision(first, "baseline"));
    assert_eq!(
        map.history().revision_by_tag("baseline").unwrap().id(),
        first
    );

    let at = map.history().revision(first).unwrap().timestamp();
    let found = map.history().revision_at_or_before(at).unwrap();
    assert!(found.id() >= first);
    assert!(map.history().revision_at_or_before(WallClock(0)).is_none());
}

#[test]
fn last_modified_tracks_concerned_topics() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    let u = map.create_topic();
    map.add_subject_identifier(t, loc("si:t")).unwrap();
    let t_stamp = map.history().last_modified_topic(t).expect("t touched");
    let u_stamp = map.history().last_modified_topic(u).expect("u touched");
    // u was not touched after its creation revision.
    assert!(t_stamp >= u_stamp);
    assert_eq!(map.history().last_modified(), Some(t_stamp));
}

#[test]
fn removal_history_survives_construct_deletion() {
    let mut map = TopicMap::new();
    let t = map.create_topic();
    map.add_subject_identifier(t, loc("si:gone")).unwrap();
    map.remove_topic(t).unwrap();
    // The topic is gone from the arena but its changeset remains, ending
    // in a removal change carrying the frozen copy.
    let changes: Vec<_> = map.history().changes_for_topic(t).collect();
    assert!(!changes.is_empty());
    let removal = changes
        .iter()
        .find(|c| c.kind == ChangeKind::ConstructRemoved)
        .expect("removal change");
    match &removal.old_value {
        ChangeValue::Snapshot(snap) => {
            assert_eq!(snap.id(), t);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[test]
fn disabled_history_records_nothing() {
    let mut map = TopicMap::with_config(TopicMapConfig { history: false });
    let t = map.create_topic();
    map.add_subject_identifier(t, loc("si:quiet")).unwrap();
    assert_eq!(map.history().revision_count(), 0);
    assert_eq!(map.history().last_modified(), None);
    // The store itself still works.
    assert_eq!(map.resolve_subject_identifier(&loc("si:quiet")), Some(t));
}
