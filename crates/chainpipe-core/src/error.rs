//! Error types for ChainPipe stages and ledger primitives.

use thiserror::Error;

/// Errors surfaced by a pipeline stage.
///
/// `Misuse` covers contract violations by the caller (double start, double
/// stop, handing out a channel twice). They are reported, never recovered.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage '{stage}' misused: {reason}")]
    Misuse { stage: String, reason: String },

    #[error("Stage '{stage}' needs a Tokio runtime: {reason}")]
    Runtime { stage: String, reason: String },

    #[error("Worker of stage '{stage}' failed: {reason}")]
    Worker { stage: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn misuse(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Misuse {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error is a caller contract violation.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse { .. })
    }
}

/// Errors from hashing, hex and bech32 helpers.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Invalid bech32 prefix '{prefix}': {reason}")]
    Prefix { prefix: String, reason: String },

    #[error("Bech32 encode failed: {0}")]
    Encode(String),

    #[error("Bech32 decode failed: {0}")]
    Decode(String),

    #[error("Invalid length: expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    #[error("Address has no stake part (header 0x{header:02x})")]
    NoStakePart { header: u8 },
}
