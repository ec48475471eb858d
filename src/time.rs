//! Layer 2: Time primitive
//!
//! WallClock millisecond timestamp for revision stamping and
//! last-modification queries. Not an ordering primitive on its own:
//! the revision sequence orders, the clock annotates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wall clock in milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallClock(pub u64);

impl WallClock {
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Later of the two - used to keep revision timestamps non-decreasing
    /// even if the system clock steps backwards.
    pub fn max(self, other: WallClock) -> WallClock {
        if other.0 > self.0 { other } else { self }
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
