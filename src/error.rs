//! WolfBeacon Error Types

use thiserror::Error;

/// Result type alias for WolfBeacon operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfBeacon error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Validation errors
    #[error("Missing or empty browserId")]
    MissingCallerId,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error was caused by the caller's input
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::MissingCallerId | Error::MalformedPayload(_))
    }

    /// Short machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            Error::MissingCallerId => "MISSING_BROWSER_ID",
            Error::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Error::Network(_) => "NETWORK_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(Error::MissingCallerId.is_validation());
        assert!(Error::MalformedPayload("array".into()).is_validation());
        assert!(!Error::Internal("boom".into()).is_validation());
        assert_eq!(Error::MissingCallerId.code(), "MISSING_BROWSER_ID");
    }
}
