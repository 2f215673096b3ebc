use thiserror::Error;

/// Top-level error type for LondonWay.
///
/// Subsystem crates define their own error types and implement
/// `From<LondonWayError>` so the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LondonWayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for LondonWayError {
    fn from(err: toml::de::Error) -> Self {
        LondonWayError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LondonWayError {
    fn from(err: toml::ser::Error) -> Self {
        LondonWayError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LondonWayError {
    fn from(err: serde_json::Error) -> Self {
        LondonWayError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for LondonWay operations.
pub type Result<T> = std::result::Result<T, LondonWayError>;
