//! Layer 0: Locator atoms
//!
//! Locator: opaque string-backed identifier reference (IRI reference).
//! IdentityKind: which identity table a locator binds through.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidLocator;

/// Locator - non-empty IRI reference after trimming.
///
/// The store treats locators as opaque keys; syntax beyond "non-empty,
/// no embedded whitespace" is the producer's problem.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidLocator> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(InvalidLocator {
                raw: s,
                reason: "empty".into(),
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(InvalidLocator {
                raw: s,
                reason: "embedded whitespace".into(),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({:?})", self.0)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Locator {
    type Error = InvalidLocator;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Locator::new(s)
    }
}

impl TryFrom<&str> for Locator {
    type Error = InvalidLocator;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Locator::new(s)
    }
}

impl From<Locator> for String {
    fn from(l: Locator) -> String {
        l.0
    }
}

/// Which identity table a locator binds through.
///
/// Item identifiers address any construct; subject identifiers and subject
/// locators address topics only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    ItemIdentifier,
    SubjectIdentifier,
    SubjectLocator,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::ItemIdentifier => "item-identifier",
            IdentityKind::SubjectIdentifier => "subject-identifier",
            IdentityKind::SubjectLocator => "subject-locator",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(Locator::new("").is_err());
        assert!(Locator::new("   ").is_err());
        assert!(Locator::new("http://x.test/a b").is_err());
    }

    #[test]
    fn accepts_iri_references() {
        let l = Locator::new("http://x.test/topic#1").unwrap();
        assert_eq!(l.as_str(), "http://x.test/topic#1");
    }

    #[test]
    fn serde_round_trip_rejects_invalid() {
        let err = serde_json::from_str::<Locator>("\"  \"").unwrap_err();
        assert!(err.to_string().contains("invalid"));
    }
}
