//! Crypto error types.

use thiserror::Error;

/// Errors raised by credential parsing and data protection.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The supplied key material could not be parsed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The requested algorithm is not supported.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Sealing or opening a protected payload failed.
    #[error("data protection failed: {0}")]
    Protection(String),
}
