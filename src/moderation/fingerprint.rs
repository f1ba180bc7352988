//! Content fingerprinting
//!
//! A fingerprint is the SHA-256 digest of the raw media bytes. Identical
//! uploads share a fingerprint, which is what lets the score cache skip
//! a second remote scoring call.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{ModerationError, ModerationResult};

/// Content-addressable identity of a media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> ModerationResult<Self> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| ModerationError::InvalidContent(format!("bad fingerprint: {}", e)))?;

        let digest: [u8; 32] = bytes.try_into().map_err(|_| {
            ModerationError::InvalidContent("fingerprint must be 32 bytes".to_string())
        })?;

        Ok(Self(digest))
    }

    /// Short form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ModerationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fingerprint::from_hex(&value)
    }
}

/// Compute the fingerprint of raw media bytes
pub fn fingerprint(content: &[u8]) -> ModerationResult<Fingerprint> {
    if content.is_empty() {
        return Err(ModerationError::InvalidContent(
            "media content is empty".to_string(),
        ));
    }

    let mut hasher = Sha256::new();
    hasher.update(content);

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Ok(Fingerprint(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint(b"photo bytes").unwrap();
        let b = fingerprint(b"photo bytes").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, fingerprint(b"other photo").unwrap());
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(matches!(
            fingerprint(b""),
            Err(ModerationError::InvalidContent(_))
        ));
    }

    #[test]
    fn test_known_digest() {
        let fp = fingerprint(b"abc").unwrap();
        assert_eq!(
            fp.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hex_parsing() {
        let fp = fingerprint(b"abc").unwrap();
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()).unwrap(), fp);
        assert!(Fingerprint::from_hex("abcd").is_err());
        assert!(Fingerprint::from_hex("not hex").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let fp = fingerprint(b"abc").unwrap();
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
