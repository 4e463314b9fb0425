//! Crypto error types.

use thiserror::Error;

/// Key handling errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Key text is malformed (prefix or hex)
    #[error("Invalid key encoding: {0}")]
    InvalidEncoding(String),
}
