//! # Loop Error Types
//!
//! Error taxonomy for clip decoding, packaging and loop streaming.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while preparing or serving a looped clip.
#[derive(Error, Debug)]
pub enum LoopError {
    // ========================================================================
    // Format/Codec Errors
    // ========================================================================
    /// No decodable audio track, or the track lacks sample rate/channel count.
    #[error("Unsupported or invalid audio format: {0}")]
    Format(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// Codec could not be created or hit an unrecoverable packet error.
    #[error("Decoding error: {0}")]
    Decode(String),

    /// The codec never signalled end-of-stream within the polling budget.
    #[error("Decoder did not finish after {elapsed:?} ({idle_polls} idle polls)")]
    DecodeTimeout {
        /// Wall-clock time spent in the feed/drain loop.
        elapsed: Duration,
        /// Consecutive polls that made no progress when the loop gave up.
        idle_polls: u32,
    },

    // ========================================================================
    // Stream Contract Errors
    // ========================================================================
    /// The stream cannot be opened (zero-length payload, zero loops, empty clip).
    #[error("Invalid loop stream: {0}")]
    InvalidStream(String),

    /// `read` was called on a stream that is not open.
    #[error("Loop stream is not open")]
    NotOpen,

    /// The clip request itself is malformed.
    #[error("Invalid clip request: {0}")]
    InvalidRequest(String),

    // ========================================================================
    // Packaging Errors
    // ========================================================================
    /// The payload does not fit the 32-bit size fields of the container header.
    #[error("Container payload of {data_bytes} bytes exceeds the 32-bit WAV size limit")]
    ContainerOverflow {
        /// Total PCM bytes that were requested for the data chunk.
        data_bytes: u64,
    },

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoopError {
    /// Returns `true` if the whole request may be retried once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoopError::DecodeTimeout { .. })
    }

    /// Returns `true` if this error is related to audio format/codec issues.
    pub fn is_format_error(&self) -> bool {
        matches!(self, LoopError::Format(_))
    }

    /// Returns `true` if the caller misused the stream or request contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            LoopError::InvalidStream(_) | LoopError::NotOpen | LoopError::InvalidRequest(_)
        )
    }
}

/// Result type for loop operations.
pub type Result<T> = std::result::Result<T, LoopError>;
