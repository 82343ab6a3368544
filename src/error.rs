//! Custom error types for librarian

use thiserror::Error;

/// Main error type for librarian operations
#[derive(Error, Debug)]
pub enum Error {
    /// Metadata could not be decoded, parsed, or completed with defaults
    #[error("Decode error: {0}")]
    Decode(String),

    /// Metadata is well-formed but does not match the field specification
    #[error("Format error: {0}")]
    Format(String),

    #[error("Unknown metadata field: {0}")]
    UnknownField(String),

    /// The database is in a state that should be impossible
    #[error("Internal consistency error: {0}")]
    Consistency(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'librarian init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error must abort the process instead of being reported
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Consistency(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for librarian
pub type Result<T> = std::result::Result<T, Error>;
