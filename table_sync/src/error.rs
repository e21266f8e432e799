//! Error types for TableSync

use thiserror::Error;

/// Result type for TableSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for TableSync
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// An introspection query failed; the partially loaded schema is discarded.
    #[error("Schema load error: {0}")]
    SchemaLoadError(String),

    /// A task could not be rendered. Indicates a malformed task, not a user error.
    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Statement execution failed: {message} (statement: {statement})")]
    StatementExecutionError { statement: String, message: String },

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("Model registration error: {0}")]
    ModelRegistrationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

impl Error {
    /// Wrap a failed introspection query
    pub fn schema_load(context: &str, error: sqlx::Error) -> Self {
        Error::SchemaLoadError(format!("{}: {}", context, error))
    }
}

/// Convert Serde JSON errors to TableSync errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert YAML errors to TableSync errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to TableSync errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
