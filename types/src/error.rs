//! Parse errors for the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid voter address: {0}")]
    InvalidAddress(String),

    #[error("invalid hex value: {0}")]
    InvalidHex(String),

    #[error("content id must not be empty")]
    EmptyContentId,

    #[error("stream name must not be empty")]
    EmptyStreamName,
}
