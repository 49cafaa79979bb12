use crate::corpus::{CorpusFingerprint, PersistedIndex, INDEX_SNAPSHOT_SCHEMA_VERSION};
use crate::embeddings::{embed_with_timeout, EmbeddingProvider};
use crate::error::{Result, VectorStoreError};
use crate::hnsw_index::{HnswIndex, HnswParams};
use crate::types::{BuildOutcome, Candidate, RequirementRecord};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use trace_catalog::Requirement;

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable, fully built view of one corpus.
#[derive(Debug)]
pub struct IndexSnapshot {
    collection: String,
    fingerprint: CorpusFingerprint,
    model_id: String,
    complete: bool,
    records: Vec<RequirementRecord>,
    graph: HnswIndex,
}

impl IndexSnapshot {
    fn assemble(
        collection: String,
        fingerprint: CorpusFingerprint,
        model_id: String,
        complete: bool,
        records: Vec<RequirementRecord>,
        params: HnswParams,
    ) -> Result<Self> {
        let dimension = records.first().map_or(0, |r| r.embedding.len());
        let mut graph = HnswIndex::new(dimension, params);
        for record in &records {
            graph.add(&record.embedding)?;
        }
        Ok(Self {
            collection,
            fingerprint,
            model_id,
            complete,
            records,
            graph,
        })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn fingerprint(&self) -> &CorpusFingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Vector length of the indexed records (0 when empty).
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.graph.dimension()
    }

    /// False when some requirements failed to embed during the build.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn records(&self) -> &[RequirementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Nearest records, ascending by cosine distance.
    pub fn query(&self, vector: &[f32], max_candidates: usize) -> Result<Vec<Candidate>> {
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        let neighbours = self.graph.search(vector, max_candidates)?;
        Ok(neighbours
            .into_iter()
            .filter_map(|(node, distance)| {
                self.records.get(node).map(|record| Candidate {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    distance,
                })
            })
            .collect())
    }

    fn serves(&self, fingerprint: &CorpusFingerprint, embedder: &dyn EmbeddingProvider) -> bool {
        self.complete
            && self.fingerprint == *fingerprint
            && self.model_id == embedder.model_id()
            && embedder
                .vector_dimension()
                .map_or(true, |dimension| dimension == self.dimension())
    }

    #[must_use]
    pub fn to_persisted(&self) -> PersistedIndex {
        PersistedIndex {
            schema_version: INDEX_SNAPSHOT_SCHEMA_VERSION,
            collection: self.collection.clone(),
            fingerprint: self.fingerprint.clone(),
            model_id: self.model_id.clone(),
            complete: self.complete,
            records: self.records.clone(),
        }
    }
}

/// Shared handle to the requirement index of one collection.
///
/// Holds at most one corpus at a time. A build prepares a complete snapshot
/// off to the side and swaps it in under the write lock, so a query sees
/// either the old corpus or the new one, never a mix.
pub struct RequirementIndex {
    collection: String,
    params: HnswParams,
    embed_timeout: Duration,
    active: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl RequirementIndex {
    pub fn new(collection: impl Into<String>, params: HnswParams) -> Result<Self> {
        params.validate().map_err(VectorStoreError::IndexError)?;
        Ok(Self {
            collection: collection.into(),
            params,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            active: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub const fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Replace the index content with `requirements`, unless the active snapshot
    /// already holds this corpus for this embedding model and vector length.
    ///
    /// Requirements whose embedding fails are skipped and counted. The build
    /// only fails when nothing could be embedded.
    pub async fn build(
        &self,
        embedder: &dyn EmbeddingProvider,
        requirements: &[Requirement],
        fingerprint: &CorpusFingerprint,
    ) -> Result<BuildOutcome> {
        let _guard = self.build_lock.lock().await;

        if let Some(active) = self.snapshot() {
            if active.serves(fingerprint, embedder) {
                log::debug!(
                    "Index '{}' already holds corpus {}; skipping rebuild",
                    self.collection,
                    fingerprint.short()
                );
                return Ok(BuildOutcome::Reused {
                    indexed: active.len(),
                });
            }
            log::info!(
                "Index '{}' holds corpus {} ({}, dim {}); rebuilding for {}",
                self.collection,
                active.fingerprint().short(),
                active.model_id(),
                active.dimension(),
                fingerprint.short()
            );
        }

        log::info!(
            "Embedding {} requirements into '{}'",
            requirements.len(),
            self.collection
        );

        let mut records = Vec::with_capacity(requirements.len());
        let mut skipped = 0usize;
        let mut dimension: Option<usize> = None;

        for requirement in requirements {
            match embed_with_timeout(embedder, &requirement.text, self.embed_timeout).await {
                Ok(vector) if vector.is_empty() => {
                    log::warn!("Skipped {}: provider returned an empty vector", requirement.id);
                    skipped += 1;
                }
                Ok(vector) => {
                    let expected = *dimension.get_or_insert(vector.len());
                    if vector.len() != expected {
                        log::warn!(
                            "Skipped {}: {}",
                            requirement.id,
                            VectorStoreError::InvalidDimension {
                                expected,
                                actual: vector.len(),
                            }
                        );
                        skipped += 1;
                        continue;
                    }
                    log::debug!("Embedded {}", requirement.id);
                    records.push(RequirementRecord::new(requirement.clone(), vector));
                }
                Err(err) => {
                    log::warn!("Skipped {} due to embedding error: {err}", requirement.id);
                    skipped += 1;
                }
            }
        }

        if records.is_empty() && !requirements.is_empty() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "all {skipped} requirements failed to embed"
            )));
        }

        let indexed = records.len();
        let snapshot = IndexSnapshot::assemble(
            self.collection.clone(),
            fingerprint.clone(),
            embedder.model_id().to_string(),
            skipped == 0,
            records,
            self.params,
        )?;
        self.install(snapshot);

        log::info!(
            "Index '{}' rebuilt for corpus {}: {indexed} indexed, {skipped} skipped",
            self.collection,
            fingerprint.short()
        );
        Ok(BuildOutcome::Rebuilt { indexed, skipped })
    }

    /// Query whatever corpus is active.
    pub fn query(&self, vector: &[f32], max_candidates: usize) -> Result<Vec<Candidate>> {
        let snapshot = self.snapshot().ok_or(VectorStoreError::NotBuilt)?;
        snapshot.query(vector, max_candidates)
    }

    /// Query, failing with `StaleCorpus` unless the active corpus is `expected`.
    pub fn query_corpus(
        &self,
        expected: &CorpusFingerprint,
        vector: &[f32],
        max_candidates: usize,
    ) -> Result<Vec<Candidate>> {
        let snapshot = self.snapshot().ok_or(VectorStoreError::NotBuilt)?;
        if snapshot.fingerprint() != expected {
            return Err(VectorStoreError::StaleCorpus {
                expected: expected.short().to_string(),
                active: snapshot.fingerprint().short().to_string(),
            });
        }
        snapshot.query(vector, max_candidates)
    }

    /// Drop the active corpus.
    pub fn reset(&self) {
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            log::info!("Index '{}' reset", self.collection);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<CorpusFingerprint> {
        self.snapshot().map(|s| s.fingerprint().clone())
    }

    pub fn len(&self) -> usize {
        self.snapshot().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist the active snapshot.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot().ok_or(VectorStoreError::NotBuilt)?;
        log::info!("Saving index '{}' to {:?}", self.collection, path.as_ref());
        snapshot.to_persisted().save(path).await
    }

    /// Load a persisted snapshot and make it active.
    pub async fn restore(&self, path: impl AsRef<Path>) -> Result<Arc<IndexSnapshot>> {
        let persisted = PersistedIndex::load(&path).await?;
        if persisted.collection != self.collection {
            return Err(VectorStoreError::IndexError(format!(
                "snapshot at {:?} belongs to collection '{}', not '{}'",
                path.as_ref(),
                persisted.collection,
                self.collection
            )));
        }
        if let Some(first) = persisted.records.first() {
            let expected = first.embedding.len();
            if let Some(bad) = persisted.records.iter().find(|r| r.embedding.len() != expected) {
                return Err(VectorStoreError::InvalidDimension {
                    expected,
                    actual: bad.embedding.len(),
                });
            }
        }

        let _guard = self.build_lock.lock().await;
        let snapshot = IndexSnapshot::assemble(
            persisted.collection,
            persisted.fingerprint,
            persisted.model_id,
            persisted.complete,
            persisted.records,
            self.params,
        )?;
        log::info!(
            "Loaded {} requirements for corpus {} from {:?}",
            snapshot.len(),
            snapshot.fingerprint().short(),
            path.as_ref()
        );
        Ok(self.install(snapshot))
    }

    fn install(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        snapshot
    }
}
