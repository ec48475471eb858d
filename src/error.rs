//! Layer 3: Store errors
//!
//! Bounded and stable: these represent domain/refusal states, not
//! implementation details. All are raised synchronously to the caller that
//! triggered detection; none are retried.

use thiserror::Error;

use crate::id::{ConstructId, ConstructKind};
use crate::locator::{IdentityKind, Locator};

/// Invalid locator string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("locator `{raw}` is invalid: {reason}")]
pub struct InvalidLocator {
    pub raw: String,
    pub reason: String,
}

/// Registration would violate locator uniqueness against a different,
/// non-mergeable construct. Fatal to the triggering operation.
///
/// `candidate` is absent on resolve-or-create paths, where the construct
/// that would have taken the locator was never created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} `{locator}` already names a different construct ({holder})")]
pub struct IdentityConflict {
    pub locator: Locator,
    pub kind: IdentityKind,
    pub holder: ConstructId,
    pub candidate: Option<ConstructId>,
}

/// Identity conflict discovered during merge pre-validation.
///
/// The merge aborts before the first destructive step, leaving the map
/// untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnresolvableIdentityConflict {
    #[error("{kind} `{locator}` names {holder}, which is not part of the merge")]
    ForeignHolder {
        locator: Locator,
        kind: IdentityKind,
        holder: ConstructId,
    },
    #[error(
        "topics {left} and {right} reify distinct statements ({left_reifies} and {right_reifies})"
    )]
    DistinctReified {
        left: ConstructId,
        right: ConstructId,
        left_reifies: ConstructId,
        right_reifies: ConstructId,
    },
}

/// Operation addressed a known-removed id in the current view.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("construct {id} has been removed")]
pub struct ConstructRemoved {
    pub id: ConstructId,
}

/// Structural scope violation, detected at the introducing call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidScope {
    #[error("variant scope must properly contain the scope of name {name}")]
    VariantScopeNotSuperset {
        /// Absent when the violation is caught before the variant exists.
        variant: Option<ConstructId>,
        name: ConstructId,
    },
    #[error("theme {theme} is not a topic")]
    ThemeNotATopic { theme: ConstructId },
}

/// Structural type violation, detected at the introducing call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidType {
    #[error("expected a {expected}, {id} is a {actual}")]
    KindMismatch {
        id: ConstructId,
        expected: ConstructKind,
        actual: ConstructKind,
    },
    #[error("supertype edge {topic} -> {supertype} would close a cycle")]
    SupertypeCycle {
        topic: ConstructId,
        supertype: ConstructId,
    },
    #[error("topic {reifier} already reifies {reifies}")]
    ReifierTaken {
        reifier: ConstructId,
        reifies: ConstructId,
    },
    #[error("topic {id} is in use as a type, theme, player, or reifier")]
    TopicInUse { id: ConstructId },
}

/// Transaction lifecycle failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransactionError {
    #[error("transaction is already closed")]
    Closed,
    #[error("transaction-local id {local} has no committed counterpart")]
    Translation { local: ConstructId },
    #[error("commit replay failed; committed store unchanged")]
    Replay {
        #[source]
        source: Box<TopicMapError>,
    },
}

/// Canonical error enum for the store surface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TopicMapError {
    #[error(transparent)]
    InvalidLocator(#[from] InvalidLocator),
    #[error(transparent)]
    IdentityConflict(#[from] IdentityConflict),
    #[error(transparent)]
    UnresolvableIdentityConflict(#[from] UnresolvableIdentityConflict),
    #[error(transparent)]
    ConstructRemoved(#[from] ConstructRemoved),
    #[error(transparent)]
    InvalidScope(#[from] InvalidScope),
    #[error(transparent)]
    InvalidType(#[from] InvalidType),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("construct {id} does not exist in this map")]
    UnknownConstruct { id: ConstructId },
}

pub type Result<T, E = TopicMapError> = std::result::Result<T, E>;
