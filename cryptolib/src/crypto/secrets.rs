//! Derived-key authenticated encryption built on ChaCha20-Poly1305.
//!
//! Each call hashes the passphrase with a fresh salt through the keyed hasher
//! and reduces that record to a 256-bit key. The output is a single text
//! record, `salt_iv_ciphertext_tag`, with the binary fields base64 encoded so
//! it can be stored anywhere a string fits.

use std::fmt;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::digest::sha256_digest;
use crate::crypto::passwords::{HashError, KeyedHasher, SEPARATOR};
use crate::crypto::random::{RandomError, SecureRandom};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
pub const DERIVED_KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("empty input: {0} must not be empty")]
    EmptyInput(&'static str),
    #[error("malformed cipher record: {0}")]
    MalformedCiphertext(String),
    #[error("decryption failed (likely incorrect key or tampered data)")]
    Decryption,
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Random(#[from] RandomError),
}

/// Key material scoped to a single encrypt or decrypt call.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; DERIVED_KEY_LEN],
}

impl DerivedKey {
    /// Avoid storing or logging this value; use it for the operation at hand.
    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// `SHA-256(hash(key, salt))`: the keyed-hash record reduced to a cipher key.
pub fn derive_key(
    hasher: &KeyedHasher,
    key: &[u8],
    salt: &str,
) -> Result<DerivedKey, CipherError> {
    let record = Zeroizing::new(hasher.hash(key, Some(salt))?);
    Ok(DerivedKey {
        key: sha256_digest(record.as_bytes()),
    })
}

/// A parsed `salt_iv_ciphertext_tag` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherRecord {
    salt: String,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl CipherRecord {
    pub fn parse(record: &str) -> Result<Self, CipherError> {
        let fields: Vec<&str> = record.split(SEPARATOR).collect();
        if fields.len() != 4 {
            return Err(CipherError::MalformedCiphertext(format!(
                "expected 4 fields, found {}",
                fields.len()
            )));
        }
        if fields[0].is_empty() {
            return Err(CipherError::MalformedCiphertext("empty salt".to_string()));
        }

        let nonce = decode_field("iv", fields[1])?;
        let ciphertext = decode_field("ciphertext", fields[2])?;
        let tag = decode_field("tag", fields[3])?;

        if nonce.len() != NONCE_SIZE {
            return Err(CipherError::MalformedCiphertext(format!(
                "iv must be {NONCE_SIZE} bytes, found {}",
                nonce.len()
            )));
        }
        if tag.len() != TAG_SIZE {
            return Err(CipherError::MalformedCiphertext(format!(
                "tag must be {TAG_SIZE} bytes, found {}",
                tag.len()
            )));
        }

        Ok(Self {
            salt: fields[0].to_string(),
            nonce,
            ciphertext,
            tag,
        })
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }
}

impl fmt::Display for CipherRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{salt}{sep}{iv}{sep}{ct}{sep}{tag}",
            salt = self.salt,
            sep = SEPARATOR,
            iv = STANDARD_NO_PAD.encode(&self.nonce),
            ct = STANDARD_NO_PAD.encode(&self.ciphertext),
            tag = STANDARD_NO_PAD.encode(&self.tag),
        )
    }
}

pub(crate) fn decode_field(name: &str, field: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD_NO_PAD.decode(field.as_bytes()).map_err(|e| {
        CipherError::MalformedCiphertext(format!("{name} is not valid base64: {e}"))
    })
}

/// Passphrase-based AEAD whose keys come from the keyed hasher.
#[derive(Debug, Clone, Default)]
pub struct AuthenticatedCipher {
    hasher: KeyedHasher,
    random: SecureRandom,
}

impl AuthenticatedCipher {
    pub fn new(hasher: KeyedHasher) -> Self {
        Self {
            hasher,
            random: SecureRandom::new(),
        }
    }

    pub fn hasher(&self) -> &KeyedHasher {
        &self.hasher
    }

    /// Encrypts `data` under a key derived from `key` and a fresh salt.
    pub fn encrypt(&self, data: &[u8], key: &[u8]) -> Result<String, CipherError> {
        if data.is_empty() {
            return Err(CipherError::EmptyInput("data"));
        }
        if key.is_empty() {
            return Err(CipherError::EmptyInput("key"));
        }

        let salt = self.hasher.generate_salt()?;
        let derived = derive_key(&self.hasher, key, &salt)?;
        let nonce = self.random.bytes(NONCE_SIZE)?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(derived.as_bytes()));
        let mut ciphertext_and_tag = cipher
            .encrypt(Nonce::from_slice(&nonce), data)
            .map_err(|e| CipherError::Encryption(format!("{e}")))?;
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(CipherError::Encryption(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let tag_start = ciphertext_and_tag.len() - TAG_SIZE;
        let tag = ciphertext_and_tag.split_off(tag_start);

        tracing::debug!(plaintext_len = data.len(), "encrypted payload");
        Ok(CipherRecord {
            salt,
            nonce,
            ciphertext: ciphertext_and_tag,
            tag,
        }
        .to_string())
    }

    /// Decrypts a record produced by [`AuthenticatedCipher::encrypt`].
    ///
    /// A failed tag check and an empty plaintext surface as the same
    /// [`CipherError::Decryption`].
    pub fn decrypt(&self, record: &str, key: &[u8]) -> Result<Vec<u8>, CipherError> {
        if record.is_empty() {
            return Err(CipherError::EmptyInput("cipher record"));
        }
        if key.is_empty() {
            return Err(CipherError::EmptyInput("key"));
        }

        let parsed = CipherRecord::parse(record)?;
        let derived = derive_key(&self.hasher, key, parsed.salt())?;

        let mut combined = Vec::with_capacity(parsed.ciphertext.len() + parsed.tag.len());
        combined.extend_from_slice(&parsed.ciphertext);
        combined.extend_from_slice(&parsed.tag);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(derived.as_bytes()));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&parsed.nonce), combined.as_ref())
            .map_err(|_| {
                tracing::warn!("authenticated decryption rejected the record");
                CipherError::Decryption
            })?;

        if plaintext.is_empty() {
            return Err(CipherError::Decryption);
        }
        Ok(plaintext)
    }
}

/// Encrypts under the process-wide pepper with default parameters.
pub fn encrypt_data(data: &[u8], key: &[u8]) -> Result<String, CipherError> {
    AuthenticatedCipher::default().encrypt(data, key)
}

/// Decrypts a record produced by [`encrypt_data`].
pub fn decrypt_data(record: &str, key: &[u8]) -> Result<Vec<u8>, CipherError> {
    AuthenticatedCipher::default().decrypt(record, key)
}
