use thiserror::Error;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors raised while configuring the catalog readers.
///
/// Parsing itself never fails: malformed paragraphs are skipped.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Identifier pattern failed to compile
    #[error("Invalid identifier pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl CatalogError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
