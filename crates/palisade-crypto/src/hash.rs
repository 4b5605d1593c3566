//! Digest helpers.

use aws_lc_rs::digest;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Computes the SHA-256 digest of the input.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Computes the SHA-1 digest of the input.
///
/// Used only for X.509 thumbprints (`x5t`, certificate-derived key ids),
/// never for integrity.
#[must_use]
pub fn sha1(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data)
        .as_ref()
        .to_vec()
}

/// Computes the `c_hash` / `at_hash` value for a token:
/// base64url of the left half of the SHA-256 digest.
#[must_use]
pub fn token_hash(value: &str) -> String {
    let digest = sha256(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Uppercase hex SHA-1 thumbprint of a DER-encoded certificate.
#[must_use]
pub fn hex_thumbprint(der: &[u8]) -> String {
    sha1(der).iter().map(|byte| format!("{byte:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn sha256_matches_independent_implementation() {
        let data = b"palisade";
        let expected = Sha256::digest(data);
        assert_eq!(sha256(data), expected.as_slice());
    }

    #[test]
    fn token_hash_is_left_half_of_sha256() {
        let token = "SplxlOBeZQQYbYS6WxSbIA";
        let digest = Sha256::digest(token.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(&digest[..16]);
        assert_eq!(token_hash(token), expected);
        // 16 bytes base64url-encode to 22 characters.
        assert_eq!(token_hash(token).len(), 22);
    }

    #[test]
    fn thumbprint_is_uppercase_hex() {
        let thumbprint = hex_thumbprint(b"certificate");
        assert_eq!(thumbprint.len(), 40);
        assert!(thumbprint.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(thumbprint, thumbprint.to_uppercase());
    }
}
