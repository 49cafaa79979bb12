//! # Trace Vector Store
//!
//! Semantic index over trace-matrix requirements.
//!
//! ## Features
//!
//! - **ANN search** via HNSW (Hierarchical Navigable Small World) over cosine distance
//! - **Pluggable embeddings** through the [`EmbeddingProvider`] capability
//!   (OpenAI-compatible HTTP or a deterministic hashing stub)
//! - **Corpus-scoped snapshots** keyed by a SHA-256 fingerprint, so re-ingesting the
//!   same catalog is a no-op and a different catalog forces a full rebuild
//! - **Atomic swap** of the active snapshot; queries never see a half-built index
//! - **Persistent storage** with JSON serialization
//!
//! ## Architecture
//!
//! ```text
//! Requirement[]
//!     │
//!     ├──> EmbeddingProvider (per-call timeout, failures skip one record)
//!     │      └─> Vector[dim]
//!     │
//!     ├──> IndexSnapshot { fingerprint, model_id, records, HNSW graph }
//!     │      └─> swapped into RequirementIndex under a write lock
//!     │
//!     └──> Persistent Storage
//!            └─> <index_dir>/<collection>.json
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use trace_catalog::RequirementParser;
//! use trace_vector_store::{CorpusFingerprint, HnswParams, RequirementIndex, StubEmbedder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let document = "BR 1.4\nSystem shall log all login attempts.\n";
//!     let requirements = RequirementParser::default().parse_text(document);
//!
//!     let embedder = StubEmbedder::new(256);
//!     let index = RequirementIndex::new("trace-matrix", HnswParams::default())?;
//!     index
//!         .build(&embedder, &requirements, &CorpusFingerprint::of_text(document))
//!         .await?;
//!
//!     let query = embedder.embed_sync("log login attempts");
//!     for hit in index.query(&query, 10)? {
//!         println!("{}: {:.3}", hit.id, hit.distance);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod corpus;
mod embeddings;
mod error;
mod hnsw_index;
mod paths;
mod store;
mod types;

pub use corpus::{CorpusFingerprint, PersistedIndex, INDEX_SNAPSHOT_SCHEMA_VERSION};
pub use embeddings::{
    cosine_distance, cosine_similarity, embed_with_timeout, embedder_from_config,
    EmbeddingConfig, EmbeddingMode, EmbeddingProvider, HttpEmbedder, StubEmbedder,
};
pub use error::{Result, VectorStoreError};
pub use hnsw_index::{HnswIndex, HnswParams};
pub use paths::{index_dir_for_root, snapshot_path, INDEX_DIR_NAME};
pub use store::{IndexSnapshot, RequirementIndex};
pub use types::{BuildOutcome, Candidate, RequirementRecord};

// Re-export catalog types for convenience
pub use trace_catalog::{Requirement, RequirementId};
