//! Peppered multi-round hashing and derived-key authenticated encryption.
//! Every primitive comes from a vetted crate; this crate only composes them
//! and owns the two text record formats that get persisted.

pub mod config;
pub mod crypto;

pub use crypto::cascade::{LegacyCascade, LegacyCipher};
pub use crypto::passwords::{hash, validate_hash, HashError, HashRecord, KeyedHasher};
pub use crypto::pepper::{get_pepper, set_pepper, Pepper, PepperError};
pub use crypto::random::{RandomError, SecureRandom};
pub use crypto::secrets::{decrypt_data, encrypt_data, AuthenticatedCipher, CipherError};
