//! Cryptography building blocks. Leaves first: the random source feeds salt
//! generation, the keyed hasher consumes salts and the pepper, and both
//! ciphers derive their keys through the keyed hasher.

pub mod cascade;
pub mod digest;
pub mod passwords;
pub mod pepper;
pub mod random;
pub mod secrets;
