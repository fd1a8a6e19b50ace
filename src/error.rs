//! Error types for blockdistill

use thiserror::Error;

/// Result type alias for blockdistill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building, loading, modifying or training models
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid run configuration (mode flags, indices, unknown names)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed checkpoint or config file
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameter value outside its valid range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Tensor shape mismatch
    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Remote checkpoint could not be fetched
    #[error("Network error: {0}")]
    Network(String),

    /// Downloaded file does not match the hash in its name
    #[error("Integrity check failed: expected hash prefix {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Dataset missing or unreadable
    #[error("Data error: {0}")]
    Data(String),
}

impl Error {
    /// Whether the error stems from user input rather than the environment
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::InvalidParameter(_) | Self::ShapeMismatch { .. }
        )
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<safetensors::SafeTensorError> for Error {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Self::Data(e.to_string())
    }
}
