//! Frame error types.

use thiserror::Error;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// IO error during read/write operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame payload larger than the codec accepts.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header slice shorter than [`HEADER_LEN`](crate::HEADER_LEN).
    #[error("incomplete header: need {needed} more bytes")]
    IncompleteHeader {
        /// Bytes needed to complete the header.
        needed: usize,
    },

    /// Stream ended in the middle of a frame.
    #[error("connection closed mid-frame")]
    ConnectionClosed,
}
