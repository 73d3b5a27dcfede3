//! Legacy cascade encryption: several block ciphers applied in sequence.
//!
//! Kept for reading and writing records in the older layered format. Each
//! stage runs CBC with its own IV and its own key, and the stage keys form a
//! chain: the passphrase feeds the first derivation and every derived key
//! feeds the next one. There is no authentication tag, so new data should use
//! [`AuthenticatedCipher`](crate::crypto::secrets::AuthenticatedCipher).
//!
//! Record layout: `salt_iv_ciphertext`, where the ciphertext of stage `n`
//! decrypts to the `iv_ciphertext` text of stage `n - 1`.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit};
use serpent::Serpent;
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::crypto::passwords::{KeyedHasher, SEPARATOR};
use crate::crypto::random::SecureRandom;
use crate::crypto::secrets::{decode_field, derive_key, CipherError, DerivedKey};

/// Block size shared by every supported stage cipher.
const BLOCK_SIZE: usize = 16;

/// Block ciphers available as cascade stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCipher {
    Serpent,
    Twofish,
    Aes256,
}

impl LegacyCipher {
    /// Historical stage order.
    pub const DEFAULT_ORDER: [LegacyCipher; 3] = [
        LegacyCipher::Serpent,
        LegacyCipher::Twofish,
        LegacyCipher::Aes256,
    ];
}

/// One stage of a cascade.
pub trait CascadeStage {
    fn name(&self) -> &'static str;

    fn iv_len(&self) -> usize;

    /// Stage keys are `SHA-256(hash(previous, salt))`.
    fn derive_stage_key(
        &self,
        hasher: &KeyedHasher,
        previous: &[u8],
        salt: &str,
    ) -> Result<DerivedKey, CipherError> {
        derive_key(hasher, previous, salt)
    }

    fn encrypt_stage(
        &self,
        key: &DerivedKey,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CipherError>;

    fn decrypt_stage(
        &self,
        key: &DerivedKey,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CipherError>;
}

impl CascadeStage for LegacyCipher {
    fn name(&self) -> &'static str {
        match self {
            LegacyCipher::Serpent => "serpent",
            LegacyCipher::Twofish => "twofish",
            LegacyCipher::Aes256 => "aes-256",
        }
    }

    fn iv_len(&self) -> usize {
        BLOCK_SIZE
    }

    fn encrypt_stage(
        &self,
        key: &DerivedKey,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let key = key.as_bytes();
        match self {
            LegacyCipher::Serpent => cbc_encrypt::<Serpent>(key, iv, plaintext),
            LegacyCipher::Twofish => cbc_encrypt::<Twofish>(key, iv, plaintext),
            LegacyCipher::Aes256 => cbc_encrypt::<Aes256>(key, iv, plaintext),
        }
        .ok_or_else(|| CipherError::Encryption(format!("{} rejected the key or iv", self.name())))
    }

    fn decrypt_stage(
        &self,
        key: &DerivedKey,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let key = key.as_bytes();
        match self {
            LegacyCipher::Serpent => cbc_decrypt::<Serpent>(key, iv, ciphertext),
            LegacyCipher::Twofish => cbc_decrypt::<Twofish>(key, iv, ciphertext),
            LegacyCipher::Aes256 => cbc_decrypt::<Aes256>(key, iv, ciphertext),
        }
        .ok_or(CipherError::Decryption)
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Option<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let cipher = C::new_from_slice(key).ok()?;
    let encryptor = cbc::Encryptor::<C>::inner_iv_slice_init(cipher, iv).ok()?;
    Some(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let cipher = C::new_from_slice(key).ok()?;
    let decryptor = cbc::Decryptor::<C>::inner_iv_slice_init(cipher, iv).ok()?;
    decryptor.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()
}

/// Splits an inner `iv_ciphertext` layer. Anything unexpected here means the
/// outer stage produced garbage, which is a decryption failure.
fn split_layer(layer: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CipherError> {
    let text = std::str::from_utf8(layer).map_err(|_| CipherError::Decryption)?;
    let fields: Vec<&str> = text.split(SEPARATOR).collect();
    if fields.len() != 2 {
        return Err(CipherError::Decryption);
    }
    let iv = STANDARD_NO_PAD
        .decode(fields[0])
        .map_err(|_| CipherError::Decryption)?;
    let ciphertext = STANDARD_NO_PAD
        .decode(fields[1])
        .map_err(|_| CipherError::Decryption)?;
    Ok((iv, ciphertext))
}

/// Cascade over an ordered list of stage ciphers.
#[derive(Debug, Clone)]
pub struct LegacyCascade {
    hasher: KeyedHasher,
    ciphers: Vec<LegacyCipher>,
    random: SecureRandom,
}

impl Default for LegacyCascade {
    fn default() -> Self {
        Self::new(KeyedHasher::default())
    }
}

impl LegacyCascade {
    pub fn new(hasher: KeyedHasher) -> Self {
        Self {
            hasher,
            ciphers: LegacyCipher::DEFAULT_ORDER.to_vec(),
            random: SecureRandom::new(),
        }
    }

    pub fn with_ciphers(
        hasher: KeyedHasher,
        ciphers: Vec<LegacyCipher>,
    ) -> Result<Self, CipherError> {
        if ciphers.is_empty() {
            return Err(CipherError::EmptyInput("cascade cipher list"));
        }
        Ok(Self {
            hasher,
            ciphers,
            random: SecureRandom::new(),
        })
    }

    pub fn ciphers(&self) -> &[LegacyCipher] {
        &self.ciphers
    }

    /// Derives the key of every stage, in encryption order.
    pub fn stage_keys(&self, key: &[u8], salt: &str) -> Result<Vec<DerivedKey>, CipherError> {
        let mut keys: Vec<DerivedKey> = Vec::with_capacity(self.ciphers.len());
        for cipher in &self.ciphers {
            let previous = keys.last().map_or(key, |k| k.as_bytes().as_slice());
            let next = cipher.derive_stage_key(&self.hasher, previous, salt)?;
            keys.push(next);
        }
        Ok(keys)
    }

    pub fn encrypt(&self, data: &[u8], key: &[u8]) -> Result<String, CipherError> {
        if data.is_empty() {
            return Err(CipherError::EmptyInput("data"));
        }
        if key.is_empty() {
            return Err(CipherError::EmptyInput("key"));
        }

        let salt = self.hasher.generate_salt()?;
        let keys = self.stage_keys(key, &salt)?;

        let mut layer = Zeroizing::new(data.to_vec());
        let mut encoded = String::new();
        for (cipher, stage_key) in self.ciphers.iter().zip(&keys) {
            let iv = self.random.bytes(cipher.iv_len())?;
            let ciphertext = cipher.encrypt_stage(stage_key, &iv, &layer)?;
            encoded = format!(
                "{}{}{}",
                STANDARD_NO_PAD.encode(&iv),
                SEPARATOR,
                STANDARD_NO_PAD.encode(&ciphertext)
            );
            layer = Zeroizing::new(encoded.as_bytes().to_vec());
        }

        tracing::debug!(stages = self.ciphers.len(), "encrypted legacy cascade record");
        Ok(format!("{salt}{SEPARATOR}{encoded}"))
    }

    pub fn decrypt(&self, record: &str, key: &[u8]) -> Result<Vec<u8>, CipherError> {
        if record.is_empty() {
            return Err(CipherError::EmptyInput("cipher record"));
        }
        if key.is_empty() {
            return Err(CipherError::EmptyInput("key"));
        }

        let fields: Vec<&str> = record.split(SEPARATOR).collect();
        if fields.len() != 3 {
            return Err(CipherError::MalformedCiphertext(format!(
                "expected 3 fields, found {}",
                fields.len()
            )));
        }
        if fields[0].is_empty() {
            return Err(CipherError::MalformedCiphertext("empty salt".to_string()));
        }
        let salt = fields[0];
        let mut iv = decode_field("iv", fields[1])?;
        let mut ciphertext = decode_field("ciphertext", fields[2])?;
        if iv.len() != BLOCK_SIZE {
            return Err(CipherError::MalformedCiphertext(format!(
                "iv must be {BLOCK_SIZE} bytes, found {}",
                iv.len()
            )));
        }

        let keys = self.stage_keys(key, salt)?;

        let mut plaintext = Zeroizing::new(Vec::new());
        for (position, (cipher, stage_key)) in self.ciphers.iter().zip(&keys).rev().enumerate() {
            if position > 0 {
                (iv, ciphertext) = split_layer(&plaintext)?;
            }
            plaintext = Zeroizing::new(cipher.decrypt_stage(stage_key, &iv, &ciphertext)?);
        }

        if plaintext.is_empty() {
            tracing::warn!("legacy cascade produced an empty plaintext");
            return Err(CipherError::Decryption);
        }
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pepper::Pepper;
    use std::sync::Arc;

    fn private_hasher() -> KeyedHasher {
        let pepper = Arc::new(Pepper::new("cascade-pepper").expect("non-empty pepper"));
        KeyedHasher::new(pepper).with_iterations(6)
    }

    #[test]
    fn round_trips_through_every_stage() {
        let cascade = LegacyCascade::new(private_hasher());
        let record = cascade.encrypt(b"Test string.", b"passwd").expect("encrypt");
        assert_eq!(record.split(SEPARATOR).count(), 3);
        assert_eq!(
            cascade.decrypt(&record, b"passwd").expect("decrypt"),
            b"Test string."
        );
    }

    #[test]
    fn preserves_trailing_zero_bytes() {
        let cascade = LegacyCascade::new(private_hasher());
        let payload = b"ends with nulls\0\0\0";
        let record = cascade.encrypt(payload, b"passwd").expect("encrypt");
        assert_eq!(cascade.decrypt(&record, b"passwd").expect("decrypt"), payload);
    }

    #[test]
    fn each_stage_round_trips_alone() {
        let hasher = private_hasher();
        for cipher in LegacyCipher::DEFAULT_ORDER {
            let cascade =
                LegacyCascade::with_ciphers(hasher.clone(), vec![cipher]).expect("one stage");
            let record = cascade.encrypt(b"single stage", b"key").expect("encrypt");
            assert_eq!(
                cascade.decrypt(&record, b"key").expect("decrypt"),
                b"single stage",
                "{} stage",
                cipher.name()
            );
        }
    }

    #[test]
    fn stage_order_must_match() {
        let hasher = private_hasher();
        let forward = LegacyCascade::with_ciphers(
            hasher.clone(),
            vec![LegacyCipher::Aes256, LegacyCipher::Serpent],
        )
        .expect("two stages");
        let backward =
            LegacyCascade::with_ciphers(hasher, vec![LegacyCipher::Serpent, LegacyCipher::Aes256])
                .expect("two stages");

        let record = forward.encrypt(b"ordered payload", b"key").expect("encrypt");
        assert!(matches!(
            backward.decrypt(&record, b"key"),
            Err(CipherError::Decryption)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let cascade = LegacyCascade::new(private_hasher());
        let record = cascade.encrypt(b"payload", b"right").expect("encrypt");
        assert!(matches!(
            cascade.decrypt(&record, b"wrong"),
            Err(CipherError::Decryption)
        ));
    }

    #[test]
    fn tampered_outer_layer_fails() {
        let cascade = LegacyCascade::new(private_hasher());
        let record = cascade.encrypt(b"payload", b"key").expect("encrypt");

        let fields: Vec<&str> = record.split(SEPARATOR).collect();
        let mut ciphertext = STANDARD_NO_PAD.decode(fields[2]).expect("valid base64");
        ciphertext[0] ^= 0x80;
        let tampered = format!(
            "{}_{}_{}",
            fields[0],
            fields[1],
            STANDARD_NO_PAD.encode(ciphertext)
        );

        assert!(matches!(
            cascade.decrypt(&tampered, b"key"),
            Err(CipherError::Decryption)
        ));
    }

    #[test]
    fn stage_keys_chain_forward() {
        let cascade = LegacyCascade::new(private_hasher());
        let keys = cascade.stage_keys(b"passphrase", "salt").expect("keys");
        let again = cascade.stage_keys(b"passphrase", "salt").expect("keys");
        assert_eq!(keys.len(), 3);
        for (first, second) in keys.iter().zip(&again) {
            assert_eq!(first.as_bytes(), second.as_bytes());
        }
        assert_ne!(keys[0].as_bytes(), keys[1].as_bytes());

        let chained =
            derive_key(&private_hasher(), keys[0].as_bytes(), "salt").expect("derive");
        assert_eq!(chained.as_bytes(), keys[1].as_bytes());
    }

    #[test]
    fn rejects_malformed_records() {
        let cascade = LegacyCascade::new(private_hasher());
        let record = cascade.encrypt(b"payload", b"key").expect("encrypt");
        let (salt_and_iv, _) = record.rsplit_once(SEPARATOR).expect("separator");

        for malformed in [
            salt_and_iv.to_string(),
            format!("{record}_extra"),
            format!("{salt_and_iv}_not*base64"),
        ] {
            assert!(
                matches!(
                    cascade.decrypt(&malformed, b"key"),
                    Err(CipherError::MalformedCiphertext(_))
                ),
                "{malformed:?} should be malformed"
            );
        }
    }

    #[test]
    fn rejects_empty_inputs() {
        assert!(matches!(
            LegacyCascade::with_ciphers(private_hasher(), Vec::new()),
            Err(CipherError::EmptyInput("cascade cipher list"))
        ));

        let cascade = LegacyCascade::new(private_hasher());
        assert!(matches!(
            cascade.encrypt(b"", b"key"),
            Err(CipherError::EmptyInput("data"))
        ));
        assert!(matches!(
            cascade.decrypt("", b"key"),
            Err(CipherError::EmptyInput("cipher record"))
        ));
    }

    #[test]
    fn cbc_helpers_reject_bad_iv_lengths() {
        let key = [7u8; 32];
        assert!(cbc_encrypt::<Aes256>(&key, &[0u8; 8], b"data").is_none());
        assert!(cbc_decrypt::<Serpent>(&key, &[0u8; 8], &[0u8; 16]).is_none());
        let sealed = cbc_encrypt::<Twofish>(&key, &[1u8; 16], b"data").expect("valid iv");
        assert_eq!(sealed.len(), 16);
        assert_eq!(
            cbc_decrypt::<Twofish>(&key, &[1u8; 16], &sealed).expect("valid padding"),
            b"data"
        );
    }
}
