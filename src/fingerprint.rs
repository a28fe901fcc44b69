//! Content fingerprints for mixtures and checkpoints.
//!
//! Provides a 256-bit `HashValue` computed with domain separation and length
//! prefixing, so identical content hashes identically across runs and builds
//! while different kinds of content never collide by construction.
//!
//! # Citations
//! - SHA-256: NIST FIPS 180-4 (2015)
//! - Domain separation & length prefixing: Bernstein et al., "How to hash into elliptic curves" (2009)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 256-bit hash value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    /// Creates a zero hash (all zeros).
    #[inline]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns the raw byte array.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given data with domain separation.
    ///
    /// The hashed message is `b"SINK:<domain>:v1" || length_prefix(data) || data`,
    /// with a 64-bit little-endian length prefix.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"SINK:");
        hasher.update(domain);
        hasher.update(b":v1");
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Lowercase hex of all 32 bytes.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 4 bytes are enough to tell runs apart in logs.
        write!(
            f,
            "HashValue({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separates() {
        let a = HashValue::hash_with_domain(b"MIXTURE", b"A(a)");
        let b = HashValue::hash_with_domain(b"RULE", b"A(a)");
        assert_ne!(a, b);
        assert_eq!(a, HashValue::hash_with_domain(b"MIXTURE", b"A(a)"));
    }

    #[test]
    fn hex_and_display() {
        let h = HashValue::zero();
        assert_eq!(h.to_hex(), "0".repeat(64));
        assert_eq!(h.to_string(), "HashValue(00000000…)");
    }
}
