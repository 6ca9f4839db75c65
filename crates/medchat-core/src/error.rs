use thiserror::Error;

/// Top-level error type for medchat.
///
/// Subsystem crates either return this type directly (storage, embedding)
/// or wrap it in their own error (`ChatError`), so `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MedchatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A write referenced a row that does not exist (foreign key violation).
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Term corpus error: {0}")]
    Corpus(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for MedchatError {
    fn from(err: toml::de::Error) -> Self {
        MedchatError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MedchatError {
    fn from(err: toml::ser::Error) -> Self {
        MedchatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MedchatError {
    fn from(err: serde_json::Error) -> Self {
        MedchatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for medchat operations.
pub type Result<T> = std::result::Result<T, MedchatError>;
