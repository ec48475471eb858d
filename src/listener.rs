//! Layer 10: Change listeners
//!
//! Store-owned subscriber list, registered at or after construction.
//! Dispatch is plain synchronous fan-out: once per atomic change, after
//! in-memory application (and after changeset append when history is on).
//! No ambient global state.

use std::fmt;
use std::sync::Arc;

use crate::change::Change;

/// Synchronous observer of atomic changes.
pub trait ChangeListener: Send + Sync {
    fn notify(&self, change: &Change);
}

/// Handle for unregistering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Default)]
pub(crate) struct ListenerSet {
    listeners: Vec<(ListenerId, Arc<dyn ChangeListener>)>,
    next_id: u64,
}

impl ListenerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub(crate) fn notify(&self, change: &Change) {
        for (_, listener) in &self.listeners {
            listener.notify(change);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeKind, ChangeValue};
    use crate::id::ConstructId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ChangeKind>>,
    }

    impl ChangeListener for Recorder {
        fn notify(&self, change: &Change) {
            self.seen.lock().unwrap().push(change.kind);
        }
    }

    fn change() -> Change {
        Change::new(
            ChangeKind::ConstructAdded,
            ConstructId::new(2),
            ChangeValue::Construct(ConstructId::new(2)),
            ChangeValue::None,
        )
    }

    #[test]
    fn fan_out_reaches_every_listener_once() {
        let mut set = ListenerSet::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        set.register(a.clone());
        set.register(b.clone());
        set.notify(&change());
        assert_eq!(a.seen.lock().unwrap().len(), 1);
        assert_eq!(b.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unregister_stops_delivery() {
        let mut set = ListenerSet::new();
        let a = Arc::new(Recorder::default());
        let id = set.register(a.clone());
        assert!(set.unregister(id));
        assert!(!set.unregister(id));
        set.notify(&change());
        assert!(a.seen.lock().unwrap().is_empty());
    }
}
