//! Content checksums with self-describing algorithm prefixes.
//!
//! Digest strings look like `sha256:9f86d081...` so that a stored
//! checksum can always be re-verified with the algorithm that produced
//! it, even after the configured default changes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

/// Supported content-hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Get the string prefix for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse an algorithm name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Compute the prefixed digest string for a byte slice.
    pub fn digest(&self, data: &[u8]) -> String {
        let hex = match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            HashAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
        };
        format!("{}:{}", self.as_str(), hex)
    }
}

/// Split a prefixed digest string into its algorithm and hex parts.
///
/// Returns `None` for strings that don't carry a known algorithm prefix.
pub fn parse_digest(s: &str) -> Option<(HashAlgorithm, &str)> {
    let (name, hex) = s.split_once(':')?;
    let algorithm = HashAlgorithm::parse(name)?;
    if hex.is_empty() {
        return None;
    }
    Some((algorithm, hex))
}

/// Recompute a digest and compare it against an expected prefixed string.
///
/// Malformed expected strings verify as `false`.
pub fn verify(expected: &str, data: &[u8]) -> bool {
    match parse_digest(expected) {
        Some((algorithm, _)) => algorithm.digest(data) == expected,
        None => false,
    }
}
