//! Transaction isolation through the public surface.

use topicmap::{IdentityKind, Locator, SharedTopicMap, TopicMap, TopicMapError, TransactionError};

fn loc(s: &str) -> Locator {
    Locator::new(s).expect("valid locator")
}

#[test]
fn staged_work_is_invisible_then_atomic() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let nt = shared.write(|map| map.create_topic());
    let before_revisions = shared.read(|map| map.history().revision_count());

    let mut tx = shared.begin();
    let person = tx
        .create_topic_by_subject_identifier(loc("si:person"))
        .unwrap();
    tx.create_name(person, nt, "Person", &[]).unwrap();
    let employs = tx.create_topic().unwrap();
    let employer = tx.create_topic().unwrap();
    let assoc = tx.create_association(employs, &[]).unwrap();
    tx.create_role(assoc, employer, person).unwrap();

    // Nothing visible yet.
    shared.read(|map| {
        assert_eq!(map.topic_count(), 1);
        assert_eq!(map.association_count(), 0);
        assert!(map.resolve_subject_identifier(&loc("si:person")).is_none());
    });

    tx.commit().unwrap();

    shared.read(|map| {
        assert_eq!(map.topic_count(), 4);
        assert_eq!(map.association_count(), 1);
        let person = map
            .resolve_subject_identifier(&loc("si:person"))
            .expect("committed topic");
        assert_eq!(map.topic(person).unwrap().names.len(), 1);
        // One logical commit, one revision.
        assert_eq!(
            map.history().revision_count(),
            before_revisions + 1
        );
    });
}

#[test]
fn rollback_restores_exact_counts() {
    let shared = SharedTopicMap::new(TopicMap::new());
    shared.write(|map| {
        let t = map.create_topic();
        map.add_subject_identifier(t, loc("si:keep")).unwrap();
    });
    let (topics, assocs, revisions) = shared.read(|map| {
        (
            map.topic_count(),
            map.association_count(),
            map.history().revision_count(),
        )
    });

    let mut tx = shared.begin();
    let a = tx.create_topic().unwrap();
    let b = tx.create_topic().unwrap();
    let assoc = tx.create_association(a, &[]).unwrap();
    tx.create_role(assoc, a, b).unwrap();
    let keep = tx.resolve_subject_identifier(&loc("si:keep")).unwrap();
    tx.remove_construct(keep).unwrap();
    tx.rollback().unwrap();

    shared.read(|map| {
        assert_eq!(map.topic_count(), topics);
        assert_eq!(map.association_count(), assocs);
        assert_eq!(map.history().revision_count(), revisions);
        assert!(map.resolve_subject_identifier(&loc("si:keep")).is_some());
    });
}

#[test]
fn transaction_view_preserves_construct_identity() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let t = shared.write(|map| {
        let t = map.create_topic();
        map.add_subject_identifier(t, loc("si:same")).unwrap();
        t
    });
    let mut tx = shared.begin();
    // Reads resolve through the overlay to one per-transaction copy.
    let via_locator = tx.resolve_subject_identifier(&loc("si:same")).unwrap();
    assert_eq!(via_locator, t);
    tx.add_identifier(t, IdentityKind::SubjectIdentifier, loc("si:extra"))
        .unwrap();
    // The staged addition is visible to subsequent reads of the same view.
    let topic = tx.topic(t).unwrap();
    assert!(topic.subject_identifiers.contains(&loc("si:same")));
    assert!(topic.subject_identifiers.contains(&loc("si:extra")));
    tx.rollback().unwrap();
    shared.read(|map| {
        assert!(!map
            .topic(t)
            .unwrap()
            .subject_identifiers
            .contains(&loc("si:extra")));
    });
}

#[test]
fn removed_id_fails_before_reaching_committed_store() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let t = shared.write(|map| map.create_topic());
    let mut tx = shared.begin();
    tx.remove_construct(t).unwrap();
    let err = tx.topic(t).unwrap_err();
    assert!(matches!(err, TopicMapError::ConstructRemoved(_)));
    // Staged removal applies at commit.
    tx.commit().unwrap();
    shared.read(|map| {
        assert_eq!(map.topic_count(), 0);
        assert!(matches!(
            map.topic(t),
            Err(TopicMapError::ConstructRemoved(_))
        ));
    });
}

#[test]
fn closed_transaction_rejects_further_work() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let mut tx = shared.begin();
    tx.create_topic().unwrap();
    tx.rollback().unwrap();
    assert!(matches!(
        tx.create_topic(),
        Err(TopicMapError::Transaction(TransactionError::Closed))
    ));
    assert!(matches!(
        tx.commit(),
        Err(TopicMapError::Transaction(TransactionError::Closed))
    ));
}

#[test]
fn merge_inside_transaction_consolidates_at_commit() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let (a, b) = shared.write(|map| {
        let a = map.create_topic();
        map.add_subject_identifier(a, loc("si:a")).unwrap();
        let b = map.create_topic();
        map.add_subject_identifier(b, loc("si:b")).unwrap();
        (a, b)
    });
    let mut tx = shared.begin();
    tx.merge_topics(a, b).unwrap();
    // Committed store untouched while staged.
    assert_eq!(shared.read(|map| map.topic_count()), 2);
    tx.commit().unwrap();
    shared.read(|map| {
        assert_eq!(map.topic_count(), 1);
        let s1 = map.resolve_subject_identifier(&loc("si:a")).unwrap();
        let s2 = map.resolve_subject_identifier(&loc("si:b")).unwrap();
        assert_eq!(s1, s2);
    });
}

#[test]
fn sequential_transactions_build_on_each_other() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let mut tx1 = shared.begin();
    tx1.create_topic_by_subject_identifier(loc("si:seq"))
        .unwrap();
    tx1.commit().unwrap();

    let mut tx2 = shared.begin();
    let resolved = tx2
        .resolve_subject_identifier(&loc("si:seq"))
        .expect("visible after first commit");
    let nt = tx2.create_topic().unwrap();
    tx2.create_name(resolved, nt, "second round", &[]).unwrap();
    tx2.commit().unwrap();

    shared.read(|map| {
        let t = map.resolve_subject_identifier(&loc("si:seq")).unwrap();
        assert_eq!(map.topic(t).unwrap().names.len(), 1);
    });
}
