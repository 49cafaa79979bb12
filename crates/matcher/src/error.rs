use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Request-level failures. Per-change problems never surface here; they are
/// recorded on the individual `MatchResult`.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No trace matrix supplied")]
    MissingCatalog,

    #[error("No operational-testing text supplied")]
    MissingChangeBlock,

    #[error("Operational-testing section not found between '{start}' and '{end}'")]
    SectionNotFound { start: String, end: String },

    #[error("The trace matrix yielded no records")]
    ParseEmptyResult,

    #[error("Requirement index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Invalid match policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid analyzer settings: {0}")]
    InvalidSettings(String),

    #[error("Vector store error: {0}")]
    Store(#[from] trace_vector_store::VectorStoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] trace_catalog::CatalogError),
}
