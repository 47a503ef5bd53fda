//! Custom error types for stockroom

use thiserror::Error;

/// Main error type for stockroom operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Supplier not found: {0}")]
    SupplierNotFound(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(i64),

    #[error("{0}")]
    Other(String),
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Pattern(err.to_string())
    }
}

/// Result type alias for stockroom
pub type Result<T> = std::result::Result<T, Error>;
