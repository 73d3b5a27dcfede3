//! Secure random values: raw bytes, unbiased integers and alphanumeric text.
//!
//! Everything here is fail-closed. If the platform CSPRNG reports an error the
//! caller gets [`RandomError::InsecureRandomness`]; there is no fallback to a
//! weaker generator.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Characters used by [`SecureRandom::random_string`], in drawing order.
const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of salts produced by [`SecureRandom::generate_salt`].
pub const SALT_LENGTH: usize = 127;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RandomError {
    #[error("insecure randomness: the platform CSPRNG failed to produce strong bytes")]
    InsecureRandomness,
    #[error("invalid range [{min}, {max}]: bounds must satisfy 0 <= min < max")]
    InvalidRange { min: i64, max: i64 },
    #[error("invalid length {0}: length must be a positive integer")]
    InvalidLength(usize),
}

/// A source of cryptographically strong bytes.
pub trait EntropySource {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomError>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|_| RandomError::InsecureRandomness)
    }
}

/// Random value generator over an [`EntropySource`].
#[derive(Debug, Default, Clone)]
pub struct SecureRandom<E = OsEntropy> {
    source: E,
}

impl SecureRandom<OsEntropy> {
    pub fn new() -> Self {
        Self { source: OsEntropy }
    }
}

impl<E: EntropySource> SecureRandom<E> {
    pub fn with_source(source: E) -> Self {
        Self { source }
    }

    /// Returns `n` bytes straight from the entropy source.
    pub fn bytes(&self, n: usize) -> Result<Vec<u8>, RandomError> {
        let mut out = vec![0u8; n];
        if n > 0 {
            self.source.fill(&mut out)?;
        }
        Ok(out)
    }

    /// Returns an integer uniformly distributed over `[min, max]`.
    ///
    /// Draws are `w/8` bytes wide where `w` is the smallest of 8, 16, 32 or 64
    /// bits with `2^w > max - min`. Draws above `max - min` are thrown away and
    /// redrawn, so no value is favoured the way a modulo reduction would.
    pub fn uniform_int(&self, min: i64, max: i64) -> Result<i64, RandomError> {
        if max <= min || min < 0 {
            return Err(RandomError::InvalidRange { min, max });
        }

        // Both bounds are non-negative here, so the subtraction cannot wrap.
        let difference = (max - min) as u64;

        let mut bits: u32 = 8;
        while bits < 64 && (1u128 << bits) <= u128::from(difference) {
            bits *= 2;
        }
        let width = (bits / 8) as usize;

        let mut draw = [0u8; 8];
        loop {
            self.source.fill(&mut draw[8 - width..])?;
            let value = u64::from_be_bytes(draw);
            if value <= difference {
                return Ok(min + value as i64);
            }
        }
    }

    /// Returns `length` characters drawn uniformly from `[a-zA-Z0-9]`.
    pub fn random_string(&self, length: usize) -> Result<String, RandomError> {
        if length < 1 {
            return Err(RandomError::InvalidLength(length));
        }

        let last = (ALPHABET.len() - 1) as i64;
        let mut out = String::with_capacity(length);
        for _ in 0..length {
            let index = self.uniform_int(0, last)? as usize;
            out.push(char::from(ALPHABET[index]));
        }
        Ok(out)
    }

    /// Returns exactly `length` lowercase hex characters.
    pub fn random_hex(&self, length: usize) -> Result<String, RandomError> {
        if length < 1 {
            return Err(RandomError::InvalidLength(length));
        }

        let bytes = self.bytes(length.div_ceil(2))?;
        let mut out = hex::encode(bytes);
        out.truncate(length);
        Ok(out)
    }

    pub fn generate_salt(&self) -> Result<String, RandomError> {
        self.random_string(SALT_LENGTH)
    }

    pub fn generate_salt_with_length(&self, length: usize) -> Result<String, RandomError> {
        self.random_string(length)
    }
}

pub fn random_bytes(n: usize) -> Result<Vec<u8>, RandomError> {
    SecureRandom::new().bytes(n)
}

pub fn uniform_int(min: i64, max: i64) -> Result<i64, RandomError> {
    SecureRandom::new().uniform_int(min, max)
}

pub fn random_string(length: usize) -> Result<String, RandomError> {
    SecureRandom::new().random_string(length)
}

pub fn random_hex(length: usize) -> Result<String, RandomError> {
    SecureRandom::new().random_hex(length)
}

pub fn generate_salt() -> Result<String, RandomError> {
    SecureRandom::new().generate_salt()
}
