//! Package integrity hooks.
//!
//! Disabled by default: the authorisation whitelist and checksum policy are
//! supplied from outside the runtime. When a [`VerifiedPackages`] table is
//! installed, downloads are gated on membership and on a SHA-256 match over
//! the raw archive bytes.

use std::collections::BTreeMap;

use plugify_core::Version;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Whitelist of authorised package versions and their expected checksums.
#[derive(Debug, Clone, Default)]
pub struct VerifiedPackages {
    /// name → version → expected hex SHA-256 (empty string = any content).
    entries: BTreeMap<String, BTreeMap<Version, String>>,
}

impl VerifiedPackages {
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        version: Version,
        checksum: impl Into<String>,
    ) {
        self.entries
            .entry(name.into())
            .or_default()
            .insert(version, checksum.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `name@version` is on the whitelist.
    pub fn is_authorized(&self, name: &str, version: Version) -> bool {
        self.entries
            .get(name)
            .is_some_and(|versions| versions.contains_key(&version))
    }

    /// Whether `bytes` hash to the expected checksum for `name@version`.
    pub fn is_legit(&self, name: &str, version: Version, bytes: &[u8]) -> bool {
        let Some(expected) = self.entries.get(name).and_then(|v| v.get(&version)) else {
            return false;
        };
        if expected.is_empty() {
            return true;
        }
        let computed = hex_sha256(bytes);
        debug!(package = %name, %expected, %computed, "Verifying archive checksum");
        expected.eq_ignore_ascii_case(&computed)
    }
}

/// Hex SHA-256 of a byte slice.
pub fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        // Well-known digest of the empty input.
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_authorization_and_checksum() {
        let mut verified = VerifiedPackages::default();
        verified.insert("libX", Version(1), hex_sha256(b"payload"));

        assert!(verified.is_authorized("libX", Version(1)));
        assert!(!verified.is_authorized("libX", Version(2)));
        assert!(!verified.is_authorized("libY", Version(1)));

        assert!(verified.is_legit("libX", Version(1), b"payload"));
        assert!(!verified.is_legit("libX", Version(1), b"tampered"));
    }

    #[test]
    fn test_empty_checksum_accepts_any_content() {
        let mut verified = VerifiedPackages::default();
        verified.insert("libX", Version(1), "");
        assert!(verified.is_legit("libX", Version(1), b"whatever"));
    }
}
