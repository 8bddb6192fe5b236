//! Top-level error type shared across crates.

use thiserror::Error;

/// Common error type for braid value parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BraidError {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid peer address: {0}")]
    InvalidAddress(String),
}
