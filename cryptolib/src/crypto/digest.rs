//! Digest helpers shared by the keyed hasher and both ciphers: the two
//! alternating stretch algorithms, SHA-256 key reduction and constant-time
//! comparison. Kept apart from the record formats so the primitive choices are
//! visible in one place.

use hmac::Hmac;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;
use whirlpool::Whirlpool;

use crate::crypto::passwords::HashError;

/// Output length of both stretch algorithms, in bytes.
pub const DIGEST_LEN: usize = 64;

/// Digest families the keyed hasher alternates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Whirlpool,
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Whirlpool => "whirlpool",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, HashError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "whirlpool" => Ok(DigestAlgorithm::Whirlpool),
            "sha512" | "sha-512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(HashError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    /// Runs PBKDF2-HMAC with this digest and returns one full digest block.
    pub fn stretch(
        self,
        password: &[u8],
        salt: &[u8],
        rounds: u32,
    ) -> Result<[u8; DIGEST_LEN], HashError> {
        let mut out = [0u8; DIGEST_LEN];
        let result = match self {
            DigestAlgorithm::Whirlpool => {
                pbkdf2::pbkdf2::<Hmac<Whirlpool>>(password, salt, rounds, &mut out)
            }
            DigestAlgorithm::Sha512 => {
                pbkdf2::pbkdf2::<Hmac<Sha512>>(password, salt, rounds, &mut out)
            }
        };
        result.map_err(|_| HashError::HashFailure)?;
        Ok(out)
    }
}

/// The ordered pair of distinct digests used by the alternation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmPair {
    primary: DigestAlgorithm,
    secondary: DigestAlgorithm,
}

impl AlgorithmPair {
    pub fn new(primary: DigestAlgorithm, secondary: DigestAlgorithm) -> Result<Self, HashError> {
        if primary == secondary {
            return Err(HashError::UnsupportedAlgorithm(format!(
                "{} cannot alternate with itself",
                primary.name()
            )));
        }
        Ok(Self { primary, secondary })
    }

    pub fn from_names(primary: &str, secondary: &str) -> Result<Self, HashError> {
        Self::new(
            DigestAlgorithm::from_name(primary)?,
            DigestAlgorithm::from_name(secondary)?,
        )
    }

    pub fn primary(&self) -> DigestAlgorithm {
        self.primary
    }

    pub fn secondary(&self) -> DigestAlgorithm {
        self.secondary
    }

    /// Algorithm for each of `rounds` rounds: primary on even indexes,
    /// secondary on odd ones.
    pub fn schedule(&self, rounds: u32) -> Vec<DigestAlgorithm> {
        (0..rounds)
            .map(|round| {
                if round % 2 == 0 {
                    self.primary
                } else {
                    self.secondary
                }
            })
            .collect()
    }
}

impl Default for AlgorithmPair {
    fn default() -> Self {
        Self {
            primary: DigestAlgorithm::Whirlpool,
            secondary: DigestAlgorithm::Sha512,
        }
    }
}

/// Produces a raw SHA-256 digest of the provided bytes.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compares two byte strings without short-circuiting on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
