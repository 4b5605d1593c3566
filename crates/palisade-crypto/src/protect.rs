//! Symmetric data protection.
//!
//! Opaque tokens (authorization codes, refresh tokens by default) are ticket
//! snapshots sealed by a [`DataProtector`]. The trait is the pluggable seam:
//! hosts that need tokens to survive process restarts or to be readable by a
//! farm of servers supply a protector with shared key material.

use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, NONCE_LEN, UnboundKey};

use crate::error::CryptoError;
use crate::random::random_bytes;

/// Seals and opens opaque payloads.
pub trait DataProtector: Send + Sync {
    /// Seals a plaintext payload.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing fails.
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Opens a sealed payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed, was sealed under a
    /// different key, or fails authentication.
    fn unprotect(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM data protector.
///
/// Output layout is `nonce || ciphertext || tag` with a fresh random 96-bit
/// nonce per seal.
pub struct AeadDataProtector {
    key: LessSafeKey,
}

impl AeadDataProtector {
    /// Creates a protector from a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key length is wrong.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| CryptoError::InvalidKey("AES-256-GCM key must be 32 bytes".to_owned()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    /// Creates a protector with a fresh random key.
    ///
    /// Payloads sealed with it are unreadable after the process exits; this
    /// is the default standalone-server behavior.
    #[must_use]
    pub fn random() -> Self {
        Self::new(&random_bytes(32)).expect("32-byte key")
    }
}

impl DataProtector for AeadDataProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce_bytes = random_bytes(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| CryptoError::Protection("nonce generation failed".to_owned()))?;

        let mut sealed = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut sealed)
            .map_err(|_| CryptoError::Protection("seal failed".to_owned()))?;

        let mut output = nonce_bytes;
        output.extend_from_slice(&sealed);
        Ok(output)
    }

    fn unprotect(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (nonce_bytes, ciphertext) = sealed
            .split_at_checked(NONCE_LEN)
            .ok_or_else(|| CryptoError::Protection("sealed payload too short".to_owned()))?;
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CryptoError::Protection("invalid nonce".to_owned()))?;

        let mut buffer = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| CryptoError::Protection("open failed".to_owned()))?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let protector = AeadDataProtector::random();
        let sealed = protector.protect(b"ticket bytes").unwrap();
        assert_ne!(sealed, b"ticket bytes");
        assert_eq!(protector.unprotect(&sealed).unwrap(), b"ticket bytes");
    }

    #[test]
    fn nonces_differ_per_seal() {
        let protector = AeadDataProtector::random();
        let a = protector.protect(b"same").unwrap();
        let b = protector.protect(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let protector = AeadDataProtector::random();
        let mut sealed = protector.protect(b"ticket bytes").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(protector.unprotect(&sealed).is_err());
    }

    #[test]
    fn foreign_key_is_rejected() {
        let sealed = AeadDataProtector::random().protect(b"ticket").unwrap();
        assert!(AeadDataProtector::random().unprotect(&sealed).is_err());
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        assert!(AeadDataProtector::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn short_payload_is_rejected() {
        let protector = AeadDataProtector::random();
        assert!(protector.unprotect(&[0u8; 4]).is_err());
    }
}
