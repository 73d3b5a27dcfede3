//! Keyed multi-round password hashing and verification.
//!
//! A hash is `salt_digest`. The digest comes from re-stretching
//! `data ‖ pepper` with PBKDF2 once per outer round, alternating between two
//! unrelated digest families so a weakness in either one is not enough on its
//! own. The salt travels with the record; the pepper never does.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::digest::{constant_time_eq, AlgorithmPair};
use crate::crypto::pepper::{self, Pepper};
use crate::crypto::random::{RandomError, SecureRandom, SALT_LENGTH};

/// Recommended total work factor; divisible by three so both the outer round
/// count and the per-round PBKDF2 work are exact.
pub const DEFAULT_ITERATIONS: u32 = 96;

/// Field separator of hash and cipher records.
pub const SEPARATOR: char = '_';

#[derive(Debug, Error)]
pub enum HashError {
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("hash failed: the derivation did not transform its input")]
    HashFailure,
    #[error("invalid hash: {0}")]
    MalformedHash(String),
    #[error("invalid salt: salts must not contain the '_' separator")]
    InvalidSalt,
    #[error(transparent)]
    Random(#[from] RandomError),
}

/// A parsed `salt_digest` hash record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    salt: String,
    digest: String,
}

impl HashRecord {
    pub fn parse(record: &str) -> Result<Self, HashError> {
        let fields: Vec<&str> = record.split(SEPARATOR).collect();
        if fields.len() != 2 {
            return Err(HashError::MalformedHash(format!(
                "expected 2 fields, found {}",
                fields.len()
            )));
        }
        if fields[0].is_empty() || fields[1].is_empty() {
            return Err(HashError::MalformedHash("empty salt or digest".to_string()));
        }
        Ok(Self {
            salt: fields[0].to_string(),
            digest: fields[1].to_string(),
        })
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for HashRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.salt, SEPARATOR, self.digest)
    }
}

/// Outer rounds and per-round PBKDF2 work for a total work factor:
/// `ceil(iterations * 2 / 3)` and `ceil(iterations / 3)`.
pub fn round_counts(iterations: u32) -> (u32, u32) {
    let iterations = u64::from(iterations);
    let outer = (iterations * 2).div_ceil(3);
    let inner = iterations.div_ceil(3);
    (outer as u32, inner as u32)
}

/// Salted, peppered hasher alternating two digest families.
#[derive(Debug, Clone)]
pub struct KeyedHasher {
    pepper: Arc<Pepper>,
    iterations: u32,
    salt_length: usize,
    algorithms: AlgorithmPair,
}

impl Default for KeyedHasher {
    /// Hasher bound to the process-wide pepper with default parameters.
    fn default() -> Self {
        Self::new(pepper::global())
    }
}

impl KeyedHasher {
    pub fn new(pepper: Arc<Pepper>) -> Self {
        Self {
            pepper,
            iterations: DEFAULT_ITERATIONS,
            salt_length: SALT_LENGTH,
            algorithms: AlgorithmPair::default(),
        }
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_salt_length(mut self, salt_length: usize) -> Self {
        self.salt_length = salt_length;
        self
    }

    pub fn with_algorithms(mut self, algorithms: AlgorithmPair) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn salt_length(&self) -> usize {
        self.salt_length
    }

    pub fn pepper(&self) -> &Arc<Pepper> {
        &self.pepper
    }

    pub fn generate_salt(&self) -> Result<String, HashError> {
        Ok(SecureRandom::new().generate_salt_with_length(self.salt_length)?)
    }

    /// Hashes `data` into a `salt_digest` record. A missing or empty salt is
    /// replaced by a fresh one.
    pub fn hash(&self, data: &[u8], salt: Option<&str>) -> Result<String, HashError> {
        self.hash_with_iterations(data, salt, self.iterations)
    }

    pub fn hash_with_iterations(
        &self,
        data: &[u8],
        salt: Option<&str>,
        iterations: u32,
    ) -> Result<String, HashError> {
        Ok(self.hash_record(data, salt, iterations)?.to_string())
    }

    pub fn hash_record(
        &self,
        data: &[u8],
        salt: Option<&str>,
        iterations: u32,
    ) -> Result<HashRecord, HashError> {
        let salt = match salt {
            Some(salt) if !salt.is_empty() => {
                if salt.contains(SEPARATOR) {
                    return Err(HashError::InvalidSalt);
                }
                salt.to_string()
            }
            _ => self.generate_salt()?,
        };

        let (outer, inner) = round_counts(iterations);
        tracing::debug!(
            outer_rounds = outer,
            pbkdf2_rounds = inner,
            salt_len = salt.len(),
            "deriving keyed hash"
        );

        let pepper = self.pepper.get();
        let mut peppered = Zeroizing::new(Vec::with_capacity(data.len() + pepper.len()));
        peppered.extend_from_slice(data);
        peppered.extend_from_slice(pepper.as_bytes());

        let mut digest = None;
        for algorithm in self.algorithms.schedule(outer) {
            digest = Some(algorithm.stretch(&peppered, salt.as_bytes(), inner)?);
        }
        let digest = hex::encode(digest.ok_or(HashError::HashFailure)?);

        if digest.as_bytes() == data || peppered.as_slice() == data {
            return Err(HashError::HashFailure);
        }

        Ok(HashRecord { salt, digest })
    }

    /// Checks `candidate` against a stored record. The digests are compared
    /// in constant time.
    pub fn validate(&self, record: &str, candidate: &[u8]) -> Result<bool, HashError> {
        let stored = HashRecord::parse(record)?;
        let rehashed = self.hash_record(candidate, Some(stored.salt()), self.iterations)?;
        Ok(constant_time_eq(
            stored.digest().as_bytes(),
            rehashed.digest().as_bytes(),
        ))
    }
}

/// Hashes `data` under the process-wide pepper with default parameters.
pub fn hash(data: &[u8], salt: Option<&str>) -> Result<String, HashError> {
    KeyedHasher::default().hash(data, salt)
}

/// Validates `input` against a record produced by [`hash`].
pub fn validate_hash(record: &str, input: &[u8]) -> Result<bool, HashError> {
    KeyedHasher::default().validate(record, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest::DigestAlgorithm;

    fn private_hasher(pepper: &str) -> KeyedHasher {
        KeyedHasher::new(Arc::new(Pepper::new(pepper).expect("non-empty pepper")))
            .with_iterations(12)
    }

    #[test]
    fn default_record_layout() {
        let record = hash(b"test", None).expect("hashing should succeed");
        assert_eq!(record.len(), 256);

        let parsed = HashRecord::parse(&record).expect("well-formed record");
        assert_eq!(parsed.salt().len(), 127);
        assert_eq!(parsed.digest().len(), 128);
        assert!(parsed.digest().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn validates_matching_input_only() {
        let record = hash(b"test", None).expect("hashing should succeed");
        assert!(validate_hash(&record, b"test").expect("well-formed record"));
        assert!(!validate_hash(&record, b"TEST").expect("well-formed record"));
    }

    #[test]
    fn fresh_salt_per_call() {
        let hasher = private_hasher("pepper-a");
        let first = hasher.hash(b"same input", None).expect("hash");
        let second = hasher.hash(b"same input", None).expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn deterministic_for_fixed_salt() {
        let hasher = private_hasher("pepper-a");
        let first = hasher.hash(b"same input", Some("fixedSalt123")).expect("hash");
        let second = hasher.hash(b"same input", Some("fixedSalt123")).expect("hash");
        assert_eq!(first, second);
        assert!(first.starts_with("fixedSalt123_"));
    }

    #[test]
    fn empty_salt_is_replaced() {
        let hasher = private_hasher("pepper-a");
        let record = hasher.hash(b"data", Some("")).expect("hash");
        let parsed = HashRecord::parse(&record).expect("well-formed record");
        assert_eq!(parsed.salt().len(), SALT_LENGTH);
    }

    #[test]
    fn pepper_rotation_changes_hashes() {
        let hasher = private_hasher("pepper-a");
        let before = hasher.hash(b"test string", Some("salt")).expect("hash");
        assert!(hasher.validate(&before, b"test string").expect("record"));

        hasher.pepper().set("pepper-b").expect("rotation");
        let after = hasher.hash(b"test string", Some("salt")).expect("hash");
        assert_ne!(before, after);
        assert!(!hasher.validate(&before, b"test string").expect("record"));
    }

    #[test]
    fn final_digest_is_last_scheduled_round() {
        let hasher = private_hasher("pepper");
        let record = hasher
            .hash_record(b"data", Some("salt"), DEFAULT_ITERATIONS)
            .expect("hash");
        let expected = DigestAlgorithm::Sha512
            .stretch(b"datapepper", b"salt", 32)
            .expect("stretch");
        assert_eq!(record.digest(), hex::encode(expected));
    }

    #[test]
    fn algorithm_order_matters() {
        let forward = private_hasher("pepper").with_iterations(3);
        let reversed = private_hasher("pepper").with_iterations(3).with_algorithms(
            AlgorithmPair::new(DigestAlgorithm::Sha512, DigestAlgorithm::Whirlpool)
                .expect("distinct"),
        );
        assert_ne!(
            forward.hash(b"data", Some("salt")).expect("hash"),
            reversed.hash(b"data", Some("salt")).expect("hash")
        );
    }

    #[test]
    fn splits_iterations() {
        assert_eq!(round_counts(96), (64, 32));
        assert_eq!(round_counts(3), (2, 1));
        assert_eq!(round_counts(1), (1, 1));
        assert_eq!(round_counts(100), (67, 34));
        assert_eq!(round_counts(0), (0, 0));
    }

    #[test]
    fn zero_iterations_fail() {
        let hasher = private_hasher("pepper");
        assert!(matches!(
            hasher.hash_with_iterations(b"data", Some("salt"), 0),
            Err(HashError::HashFailure)
        ));
    }

    #[test]
    fn custom_salt_length() {
        let hasher = private_hasher("pepper").with_salt_length(16);
        let record = hasher.hash(b"data", None).expect("hash");
        assert_eq!(record.len(), 16 + 1 + 128);
        assert!(hasher.validate(&record, b"data").expect("record"));
    }

    #[test]
    fn rejects_separator_in_salt() {
        let hasher = private_hasher("pepper");
        assert!(matches!(
            hasher.hash(b"data", Some("bad_salt")),
            Err(HashError::InvalidSalt)
        ));
    }

    #[test]
    fn rejects_malformed_records() {
        let hasher = private_hasher("pepper");
        for record in ["no-separator", "a_b_c", "_digest", "salt_", ""] {
            assert!(
                matches!(
                    hasher.validate(record, b"data"),
                    Err(HashError::MalformedHash(_))
                ),
                "{record:?} should be malformed"
            );
        }
    }
}
