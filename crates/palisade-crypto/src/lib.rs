//! # palisade-crypto
//!
//! Cryptographic building blocks for the palisade authorization server:
//!
//! - RSA signing credentials (RS256) with key-identifier derivation
//! - SHA digests and the left-half token hash behind `c_hash` / `at_hash`
//! - Secure randomness for cache keys and opaque authorization codes
//! - Symmetric data protection for opaque token serialization

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod credential;
pub mod error;
pub mod hash;
pub mod protect;
pub mod random;

#[cfg(test)]
pub(crate) mod test_keys;

pub use credential::SigningCredential;
pub use error::CryptoError;
pub use protect::{AeadDataProtector, DataProtector};
