//! Hash-based ID generation.
//!
//! IDs are two base36 segments joined by a dash (e.g. `k3f-9qa`), derived from
//! a SHA256 hash of the issue's title, body, the current time and a nonce.
//!
//! # Features
//!
//! - **Adaptive length**: segment length grows with store size (3-5 characters)
//! - **Collision resistant**: nonce retry against the IDs already in use
//! - **File-name safe**: lowercase alphanumerics and a single dash, so an ID
//!   can be embedded in a file name and its first character picks a bucket
//!
//! # Example
//!
//! ```
//! use quill::id_generation::{IdGenerator, IdGeneratorConfig};
//!
//! let generator = IdGenerator::new(IdGeneratorConfig { database_size: 10 });
//! let id = generator.generate("My Issue Title", "Body", |_| false).unwrap();
//! assert_eq!(id.len(), 7);
//! ```

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const MAX_NONCE: u32 = 100;
const MAX_SEGMENT_LEN: usize = 5;

/// Longest accepted caller-supplied ID
pub const MAX_ID_LEN: usize = 64;

/// Errors that can occur during ID generation
#[derive(Debug, Error)]
pub enum IdGenerationError {
    /// Unable to generate a unique ID after exhausting all nonces and length increases
    #[error("Unable to generate unique ID after {attempts} attempts")]
    CollisionExhausted {
        /// Number of nonces tried
        attempts: u32,
    },

    /// Invalid length parameter
    #[error("Length must be greater than 0")]
    InvalidLength,
}

/// Configuration for ID generation
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGeneratorConfig {
    /// Current size of the store (affects adaptive length)
    pub database_size: usize,
}

/// Hash-based ID generator.
///
/// The generator holds no record of issued IDs; the caller supplies an
/// `is_taken` predicate backed by the store's own index.
#[derive(Debug, Clone, Copy)]
pub struct IdGenerator {
    config: IdGeneratorConfig,
}

impl IdGenerator {
    /// Create a new ID generator with the given configuration
    pub fn new(config: IdGeneratorConfig) -> Self {
        Self { config }
    }

    /// Generate a new unique ID
    ///
    /// # Arguments
    ///
    /// * `title` - Issue title
    /// * `body` - Issue body
    /// * `is_taken` - Returns `true` for IDs already in use
    ///
    /// # Errors
    ///
    /// Returns an error if unable to generate a unique ID after trying all nonces.
    pub fn generate(
        &self,
        title: &str,
        body: &str,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<String, IdGenerationError> {
        let segment_len = self.adaptive_length();

        for nonce in 0..MAX_NONCE {
            let id = generate_hash_id(title, body, nonce, segment_len)?;
            if !is_taken(&id) {
                if nonce > 0 {
                    debug!(
                        nonce,
                        segment_len, "Generated unique ID after {} collision retries", nonce
                    );
                }
                return Ok(id);
            }
        }

        // If all nonces collide, try with increased length
        if segment_len < MAX_SEGMENT_LEN {
            warn!(
                segment_len,
                max_nonce = MAX_NONCE,
                "All nonces exhausted, increasing ID segment length to {}",
                segment_len + 1
            );
            for nonce in 0..MAX_NONCE {
                let id = generate_hash_id(title, body, nonce, segment_len + 1)?;
                if !is_taken(&id) {
                    return Ok(id);
                }
            }
        }

        Err(IdGenerationError::CollisionExhausted {
            attempts: MAX_NONCE,
        })
    }

    /// Determine segment length based on store size
    ///
    /// - 0-500 issues: 3 chars per segment
    /// - 500-1,500: 4 chars
    /// - 1,500+: 5 chars
    fn adaptive_length(&self) -> usize {
        match self.config.database_size {
            0..=500 => 3,
            501..=1500 => 4,
            _ => MAX_SEGMENT_LEN,
        }
    }
}

/// Generate a hash-based ID with the given parameters
fn generate_hash_id(
    title: &str,
    body: &str,
    nonce: u32,
    segment_len: usize,
) -> Result<String, IdGenerationError> {
    let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let content = format!("{title}|{body}|{timestamp}|{nonce}");

    let hash_bytes = Sha256::digest(content.as_bytes());

    let first = encode_base36(&hash_bytes[..8], segment_len)?;
    let second = encode_base36(&hash_bytes[8..16], segment_len)?;
    Ok(format!("{first}-{second}"))
}

/// Encode bytes as a base36 string of exactly `length` characters.
///
/// Uses the first 8 bytes at most; wrapping arithmetic keeps the conversion
/// deterministic.
fn encode_base36(bytes: &[u8], length: usize) -> Result<String, IdGenerationError> {
    if length == 0 {
        return Err(IdGenerationError::InvalidLength);
    }

    let mut num: u64 = 0;
    for &byte in bytes.iter().take(8) {
        num = num.wrapping_shl(8).wrapping_add(u64::from(byte));
    }

    let mut result = Vec::with_capacity(length);
    let mut n = num;
    while result.len() < length {
        let remainder = usize::try_from(n % 36).unwrap_or_default();
        result.push(BASE36_CHARS[remainder]);
        n /= 36;
    }
    result.reverse();

    Ok(result.into_iter().map(char::from).collect())
}

/// Validate a caller-supplied ID.
///
/// Valid IDs are 1-64 characters of ASCII alphanumerics, `-` or `_`, do not
/// start or end with `-`, and never contain `--` (the separator between ID and
/// slug in file names).
pub fn validate_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !id.starts_with('-')
        && !id.ends_with('-')
        && !id.contains("--")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn test_base36_encoding() {
        let result = encode_base36(&[0x12, 0x34, 0x56, 0x78], 4).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_base36_zero_length() {
        assert!(matches!(
            encode_base36(&[1], 0),
            Err(IdGenerationError::InvalidLength)
        ));
    }

    #[rstest]
    #[case(100, 3)]
    #[case(800, 4)]
    #[case(2000, 5)]
    fn test_adaptive_length(#[case] size: usize, #[case] expected: usize) {
        let generator = IdGenerator::new(IdGeneratorConfig {
            database_size: size,
        });
        assert_eq!(generator.adaptive_length(), expected);
    }

    #[test]
    fn test_id_shape() {
        let generator = IdGenerator::new(IdGeneratorConfig::default());
        let id = generator.generate("Title", "Body", |_| false).unwrap();

        let (first, second) = id.split_once('-').unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert!(validate_id(&id));
    }

    #[test]
    fn test_collision_handling() {
        let generator = IdGenerator::new(IdGeneratorConfig::default());
        let mut taken = HashSet::new();

        for _ in 0..50 {
            let id = generator
                .generate("Same Title", "Same Body", |candidate| taken.contains(candidate))
                .unwrap();
            assert!(taken.insert(id));
        }
    }

    #[test]
    fn test_everything_taken_is_exhausted() {
        let generator = IdGenerator::new(IdGeneratorConfig {
            database_size: 5000,
        });
        let err = generator.generate("t", "b", |_| true).unwrap_err();
        assert!(matches!(
            err,
            IdGenerationError::CollisionExhausted { attempts: MAX_NONCE }
        ));
    }

    #[rstest]
    #[case("abc-def", true)]
    #[case("task_01", true)]
    #[case("A1", true)]
    #[case("", false)]
    #[case("-abc", false)]
    #[case("abc-", false)]
    #[case("abc--def", false)]
    #[case("../etc", false)]
    #[case("a/b", false)]
    #[case("has space", false)]
    fn test_validate_id(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(validate_id(id), valid);
    }

    #[test]
    fn test_validate_id_length_limit() {
        assert!(validate_id(&"a".repeat(MAX_ID_LEN)));
        assert!(!validate_id(&"a".repeat(MAX_ID_LEN + 1)));
    }
}
