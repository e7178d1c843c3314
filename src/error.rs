//! Error types for the window and match-finder engine.

use std::io;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, WindowError>;

#[derive(Debug, Error)]
pub enum WindowError {
    /// History size cannot be represented by the normalization scheme.
    #[error("history size {requested} out of range [{min}, {max}]")]
    HistorySize { requested: u32, min: u32, max: u32 },

    /// Unsupported number of hashed prefix bytes.
    #[error("unsupported hash width {0}: expected 2, 3 or 4 bytes")]
    HashBytes(u32),

    /// Match length bound outside what the encoder can represent.
    #[error("match length {requested} out of range [{min}, {max}]")]
    MatchLength { requested: u32, min: u32, max: u32 },

    /// Output window created with no room.
    #[error("output window size must be non-zero")]
    WindowSize,

    /// Operation on a window that was never created or is not bound.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// I/O error from the bound stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
