//! Decode errors
//!
//! Every variant is soft: the acquisition loop logs it and moves on.

use thiserror::Error;

/// Errors that can occur while decoding a protocol line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No `$` start marker
    #[error("Invalid line format, no sentence marker")]
    MalformedLine,

    #[error("Invalid column count: expected at least {expected}, got {found}")]
    /// Fewer fields than the sentence needs
    ColumnCountMismatch {
        /// Minimum field count
        expected: usize,
        /// Fields present
        found: usize,
    },

    /// Reply without `id:` prefix
    #[error("No command id in response")]
    MissingCommandId,

    #[error("Unexpected command id: expected '{expected}', got '{found}'")]
    /// Reply to a different command
    UnexpectedCommand {
        /// Id that was requested
        expected: String,
        /// Id that came back
        found: String,
    },

    #[error("Invalid nozzle state {found:?} at index {index}")]
    /// Nozzle state other than `0`/`1`
    InvalidNozzleChar {
        /// Position in the payload
        index: usize,
        /// Offending character
        found: char,
    },
}
