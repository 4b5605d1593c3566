//! Cryptographically secure random generation.
//!
//! Sources the keys used for cached authorization requests and the opaque
//! authorization codes handed to clients.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Generates `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a 256-bit random key, base64url-encoded.
///
/// Used as the request-cache key for in-flight authorization requests and as
/// the client-visible handle for opaque authorization codes.
#[must_use]
pub fn request_key() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_bytes_produces_correct_length() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_eq!(random_bytes(32).len(), 32);
    }

    #[test]
    fn random_bytes_produces_different_values() {
        assert_ne!(random_bytes(32), random_bytes(32));
    }

    #[test]
    fn request_key_is_url_safe() {
        let key = request_key();
        // 32 bytes encode to 43 unpadded base64url characters.
        assert_eq!(key.len(), 43);
        assert!(
            key.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn request_key_uniqueness() {
        let keys: HashSet<String> = (0..1000).map(|_| request_key()).collect();
        assert_eq!(keys.len(), 1000);
    }
}
