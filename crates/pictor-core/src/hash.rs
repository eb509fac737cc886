//! Content hashing for downloaded artifacts

use sha2::{Digest, Sha256};
use std::fmt::{self, Write};

const PREFIX: &str = "sha256:";

/// SHA-256 of an artifact's bytes, recorded next to every saved image
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Lowercase hex digest
    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        })
    }

    /// `sha256:<hex>`, the form stored in generation outcomes
    pub fn to_prefixed_hex(&self) -> String {
        format!("{}{}", PREFIX, self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

/// Short form: the first 16 hex digits
impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bytes_same_hash() {
        assert_eq!(
            ContentHash::from_bytes(b"png bytes"),
            ContentHash::from_bytes(b"png bytes")
        );
        assert_ne!(
            ContentHash::from_bytes(b"first image"),
            ContentHash::from_bytes(b"second image")
        );
    }

    #[test]
    fn test_known_digest() {
        let h = ContentHash::from_bytes(b"");
        assert_eq!(
            h.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(h.to_prefixed_hex().starts_with("sha256:e3b0c442"));
        assert_eq!(h.to_string(), "e3b0c44298fc1c14");
        assert_eq!(format!("{:?}", h), "ContentHash(e3b0c44298fc1c14)");
    }
}
