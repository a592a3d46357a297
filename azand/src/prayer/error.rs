//! Prayer-time source error types

use thiserror::Error;

/// Errors fetching or decoding prayer times
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Whether the failure is on the wire rather than in the payload
    pub fn is_network(&self) -> bool {
        matches!(self, SourceError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = SourceError::Api {
            code: 404,
            message: "city not found".to_string(),
        };
        assert_eq!(err.to_string(), "API error 404: city not found");
        assert!(!err.is_network());
    }
}
