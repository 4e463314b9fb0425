//! # Error Types
//!
//! Errors raised while parsing identifiers and reading typed flag values.

use thiserror::Error;

/// Errors parsing the textual form of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The identifier lacks its mandatory prefix.
    #[error("{kind} must start with {prefix:?}")]
    MissingPrefix {
        kind: &'static str,
        prefix: &'static str,
    },

    /// The body is not valid hex.
    #[error("{kind} is not valid hex: {reason}")]
    InvalidHex { kind: &'static str, reason: String },

    /// The decoded body has the wrong length.
    #[error("{kind} must be {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors reading a typed value out of a `FlagsMap`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// The flag holds a value of an unexpected JSON type.
    #[error("flag {key:?} expected {expected}, found {found}")]
    UnexpectedType {
        key: String,
        expected: &'static str,
        found: String,
    },
}
