//! Integer package versions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A monotonically comparable package version. Greater means newer.
///
/// Descriptors and manifests carry plain integers on the wire; the newtype
/// exists so version ordering cannot be confused with other counters (ids,
/// file versions) in function signatures.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub i32);

impl Version {
    /// Returns the newer of two versions.
    pub fn max(self, other: Version) -> Version {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Version {
    fn from(raw: i32) -> Self {
        Version(raw)
    }
}
