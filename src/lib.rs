//! In-process topic map store.
//!
//! Module hierarchy follows type dependency order:
//! - locator: Locator, IdentityKind (Layer 0)
//! - id: ConstructId, ScopeId, RevisionId, TopicMapId (Layer 1)
//! - time: WallClock (Layer 2)
//! - error: store errors (Layer 3)
//! - model: construct records and frozen snapshots (Layer 4)
//! - arena: id-keyed construct storage (Layer 5)
//! - scope: theme-set interning (Layer 6)
//! - identity: locator resolution (Layer 7)
//! - change: atomic change records (Layer 8)
//! - history: revisions and changesets (Layer 9)
//! - listener: synchronous change fan-out (Layer 10)
//! - persist: persistence adapter boundary (Layer 11)
//! - store: the TopicMap itself (Layer 12)
//! - merge: topic consolidation (Layer 13)
//! - tx: transactional lazy overlay (Layer 14)

#![forbid(unsafe_code)]

pub mod arena;
pub mod change;
pub mod error;
pub mod history;
pub mod id;
pub mod identity;
pub mod listener;
pub mod locator;
mod merge;
pub mod model;
pub mod persist;
pub mod scope;
pub mod store;
pub mod time;
pub mod tx;

pub use arena::ConstructArena;
pub use change::{Change, ChangeKind, ChangeValue};
pub use error::{
    ConstructRemoved, IdentityConflict, InvalidLocator, InvalidScope, InvalidType, Result,
    TopicMapError, TransactionError, UnresolvableIdentityConflict,
};
pub use history::{ChangeRef, Revision, RevisionStore};
pub use id::{ConstructId, ConstructKind, RevisionId, ScopeId, TopicMapId};
pub use identity::IdentityStore;
pub use listener::{ChangeListener, ListenerId};
pub use locator::{IdentityKind, Locator};
pub use model::{
    Association, Construct, ConstructSnapshot, MapRecord, Name, Occurrence, Role, Topic, Variant,
};
pub use persist::{
    InMemoryAdapter, ParamType, ParamValue, PersistError, PersistenceAdapter, PersistenceBridge,
};
pub use scope::ScopeStore;
pub use store::{TopicMap, TopicMapConfig};
pub use time::WallClock;
pub use tx::{SharedTopicMap, Transaction};
