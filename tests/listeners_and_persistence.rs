//! Listener dispatch and the persistence adapter bridge.

use std::sync::{Arc, Mutex};

use topicmap::{
    Change, ChangeKind, ChangeListener, InMemoryAdapter, Locator, PersistenceBridge,
    SharedTopicMap, TopicMap,
};

fn loc(s: &str) -> Locator {
    Locator::new(s).expect("valid locator")
}

#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<ChangeKind>>,
}

impl Recorder {
    fn seen(&self) -> Vec<ChangeKind> {
        self.kinds.lock().unwrap().clone()
    }
}

impl ChangeListener for Recorder {
    fn notify(&self, change: &Change) {
        self.kinds.lock().unwrap().push(change.kind);
    }
}

#[test]
fn each_atomic_change_notifies_once_in_order() {
    let mut map = TopicMap::new();
    let recorder = Arc::new(Recorder::default());
    map.register_listener(recorder.clone());
    let t = map.create_topic();
    map.add_subject_identifier(t, loc("si:t")).unwrap();
    let nt = map.create_topic();
    map.create_name(t, nt, "n", &[]).unwrap();
    assert_eq!(
        recorder.seen(),
        vec![
            ChangeKind::ConstructAdded,
            ChangeKind::SubjectIdentifierAdded,
            ChangeKind::ConstructAdded,
            ChangeKind::ConstructAdded,
        ]
    );
}

#[test]
fn notification_follows_changeset_append() {
    struct HistoryProbe {
        shared_len: Arc<Mutex<usize>>,
    }
    // By contract the listener fires after the change is in the open
    // revision; the probe can only observe ordering indirectly, so it
    // counts deliveries and the test compares with the sealed changeset.
    impl ChangeListener for HistoryProbe {
        fn notify(&self, _change: &Change) {
            *self.shared_len.lock().unwrap() += 1;
        }
    }
    let mut map = TopicMap::new();
    let delivered = Arc::new(Mutex::new(0usize));
    map.register_listener(Arc::new(HistoryProbe {
        shared_len: delivered.clone(),
    }));
    let t = map.create_topic();
    let nt = map.create_topic();
    map.create_name(t, nt, "n", &[]).unwrap();
    let recorded: usize = (1..=map.history().revision_count())
        .map(|i| {
            map.history()
                .revision(topicmap::RevisionId::new(i as u64))
                .unwrap()
                .changes()
                .len()
        })
        .sum();
    assert_eq!(*delivered.lock().unwrap(), recorded);
}

#[test]
fn unregistered_listener_goes_quiet() {
    let mut map = TopicMap::new();
    let recorder = Arc::new(Recorder::default());
    let id = map.register_listener(recorder.clone());
    map.create_topic();
    assert_eq!(recorder.seen().len(), 1);
    assert!(map.unregister_listener(id));
    map.create_topic();
    assert_eq!(recorder.seen().len(), 1);
}

#[test]
fn transaction_commit_notifies_after_the_swap_only() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let recorder = Arc::new(Recorder::default());
    shared.register_listener(recorder.clone());
    let mut tx = shared.begin();
    tx.create_topic().unwrap();
    tx.create_topic().unwrap();
    assert!(recorder.seen().is_empty(), "staged work must not notify");
    tx.commit().unwrap();
    assert_eq!(recorder.seen().len(), 2);
}

#[test]
fn rolled_back_transaction_never_notifies() {
    let shared = SharedTopicMap::new(TopicMap::new());
    let recorder = Arc::new(Recorder::default());
    shared.register_listener(recorder.clone());
    let mut tx = shared.begin();
    tx.create_topic().unwrap();
    tx.rollback().unwrap();
    assert!(recorder.seen().is_empty());
}

#[test]
fn persistence_bridge_mirrors_lifecycle() {
    let mut map = TopicMap::new();
    let bridge = Arc::new(PersistenceBridge::new(InMemoryAdapter::new()));
    map.register_listener(bridge.clone());
    let t = map.create_topic();
    let nt = map.create_topic();
    map.create_name(t, nt, "persisted", &[]).unwrap();
    assert_eq!(bridge.adapter().row_count(), 3);
    map.remove_topic(t).unwrap();
    // The topic and its name row are gone; the name-type topic remains.
    assert_eq!(bridge.adapter().row_count(), 1);
}
