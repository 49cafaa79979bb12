use clap::ValueEnum;
use trace_vector_store::EmbeddingMode;

#[derive(Copy, Clone, ValueEnum)]
pub(crate) enum EmbedMode {
    Http,
    Stub,
}

impl EmbedMode {
    pub(crate) const fn as_domain(self) -> EmbeddingMode {
        match self {
            EmbedMode::Http => EmbeddingMode::Http,
            EmbedMode::Stub => EmbeddingMode::Stub,
        }
    }
}

#[derive(Copy, Clone, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}
