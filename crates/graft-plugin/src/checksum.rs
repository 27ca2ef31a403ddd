//! Content checksums for plugin artifacts
//!
//! Provides [`Checksum`], the 32-byte Blake3 digest the plugin cache is keyed
//! by. Re-publishing an artifact under the same name changes its checksum, so
//! stale cache entries are never hit.

use std::fmt::{self, Debug, Display, Formatter};

/// A 32-byte content checksum (Blake3)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Create checksum from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute Blake3 checksum of `data`
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(Checksum::compute(b"plugin"), Checksum::compute(b"plugin"));
        assert_ne!(Checksum::compute(b"plugin"), Checksum::compute(b"plugin2"));
    }

    #[test]
    fn checksum_display() {
        let checksum = Checksum::compute(b"plugin");
        assert_eq!(checksum.to_string().len(), 64);
        assert_eq!(checksum.short().len(), 16);
        assert!(checksum.to_string().starts_with(&checksum.short()));
    }
}
