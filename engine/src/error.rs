//! Error types for the verlog engine.

use crate::{FormatVersion, Timestamp, Version};
use thiserror::Error;

/// All possible errors from the verlog engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Query errors
    #[error("version {requested} is outside the log span {first}..={current}")]
    OutOfRange {
        requested: Version,
        first: Version,
        current: Version,
    },

    #[error("no version recorded at or before timestamp {0}")]
    NoVersionAtTime(Timestamp),

    // History errors
    #[error("no earlier version to return to")]
    NoHistory,

    // Integrity errors
    #[error("log format version mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        expected: FormatVersion,
        actual: FormatVersion,
    },

    #[error("log invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid log data: {0}")]
    InvalidLogData(String),

    // Configuration errors
    #[error("unknown policy `{value}` for {setting}, expected one of: {expected}")]
    UnknownPolicy {
        setting: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
