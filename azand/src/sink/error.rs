//! Playback sink error types

use thiserror::Error;

/// Errors reaching or commanding the speaker
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SOAP action {action} failed with HTTP {status}")]
    Soap { action: String, status: u16 },

    #[error("Unsupported track reference: {0}")]
    UnsupportedTrack(String),

    #[error("No speaker found: {0}")]
    NotFound(String),

    #[error("Invalid device response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
