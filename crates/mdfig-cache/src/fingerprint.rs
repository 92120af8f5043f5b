//! Fingerprint computation.
//!
//! Provides [`Fingerprint`], a fixed-length content hash, and
//! [`Fingerprinter`], a builder that feeds fields into SHA-256 in a canonical
//! form.

use std::fmt;

use sha2::{Digest, Sha256};

/// Fixed-length content fingerprint (SHA-256, 32 bytes).
///
/// Displayed as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex representation (64 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex prefix (12 characters), suitable for filenames.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Canonical fingerprint builder.
///
/// Every field is written as `[len: u64 LE][bytes]`, after a domain tag
/// written the same way. The length prefix makes the encoding injective: no
/// two different field sequences produce the same byte stream, so e.g.
/// `("ab", "c")` and `("a", "bc")` hash differently.
///
/// Callers are responsible for feeding fields in a fixed order.
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    /// Start a fingerprint in the given domain.
    ///
    /// The domain separates unrelated key spaces (and key format versions).
    #[must_use]
    pub fn new(domain: &str) -> Self {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, domain.as_bytes());
        Self { hasher }
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, value: impl AsRef<[u8]>) -> Self {
        write_field(&mut self.hasher, value.as_ref());
        self
    }

    /// Finish and return the fingerprint.
    #[must_use]
    pub fn finish(self) -> Fingerprint {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_fields_same_fingerprint() {
        let a = Fingerprinter::new("test").field("mermaid").field("A-->B").finish();
        let b = Fingerprinter::new("test").field("mermaid").field("A-->B").finish();

        assert_eq!(a, b);
        assert_eq!(a.to_hex(), b.to_hex());
    }

    #[test]
    fn test_field_boundaries_matter() {
        let a = Fingerprinter::new("test").field("ab").field("c").finish();
        let b = Fingerprinter::new("test").field("a").field("bc").finish();

        assert_ne!(a, b);
    }

    #[test]
    fn test_domain_matters() {
        let a = Fingerprinter::new("v1").field("x").finish();
        let b = Fingerprinter::new("v2").field("x").finish();

        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_format() {
        let fp = Fingerprinter::new("test").field("source").finish();
        let hex = fp.to_hex();

        assert_eq!(hex.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.to_string(), hex);
        assert_eq!(fp.short(), hex[..12]);
    }

    #[test]
    fn test_known_value_is_stable() {
        // Pinned so that fingerprints stay valid across releases.
        assert_eq!(
            Fingerprinter::new("").finish().to_hex(),
            "af5570f5a1810b7af78caf4bc70a660f0df51e42baf91d4de5b2328de0e83dfc"
        );
        assert_eq!(
            Fingerprinter::new("test")
                .field("mermaid")
                .field("A-->B")
                .finish()
                .to_hex(),
            "f98abaeee63887e4eb1e228a125c7f83420cbea2b642bd8247de575d71187abf"
        );
    }
}
