use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use trace_catalog::RequirementParser;
use trace_vector_store::{
    snapshot_path, BuildOutcome, CorpusFingerprint, EmbeddingProvider, HnswParams, Requirement,
    RequirementIndex, StubEmbedder, VectorStoreError,
};

const CATALOG_A: &str = "\
BR 1.4
System shall log all login attempts.
Test Script 12
BR 1.5
System shall lock account after 5 failed attempts.
FR 6.1.1
Audit logs are retained for seven years.
UR-REG-35
Records are signed electronically by the approver.
";

const CATALOG_B: &str = "\
FS-REG-2
Nightly backups are encrypted at rest.
FS-REG-3
Backups are restored quarterly in a test environment.
";

fn parse(document: &str) -> Vec<Requirement> {
    RequirementParser::default().parse_text(document)
}

/// Stub embedder that fails for texts containing a marker and counts calls.
struct FlakyEmbedder {
    inner: StubEmbedder,
    fail_on: Option<&'static str>,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    fn new(fail_on: Option<&'static str>) -> Self {
        Self {
            inner: StubEmbedder::new(64),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str) -> trace_vector_store::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.is_some_and(|marker| text.contains(marker)) {
            return Err(VectorStoreError::EmbeddingError("provider unavailable".to_string()));
        }
        self.inner.embed(text).await
    }
}

#[tokio::test]
async fn rebuilding_the_same_corpus_is_a_no_op() {
    let embedder = FlakyEmbedder::new(None);
    let index = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    let requirements = parse(CATALOG_A);
    let fingerprint = CorpusFingerprint::of_text(CATALOG_A);

    let first = index.build(&embedder, &requirements, &fingerprint).await.unwrap();
    assert_eq!(first, BuildOutcome::Rebuilt { indexed: 4, skipped: 0 });
    let calls_after_first = embedder.calls();

    let query = embedder.inner.embed_sync("lock the account after failed login attempts");
    let before = index.query(&query, 10).unwrap();

    let second = index.build(&embedder, &requirements, &fingerprint).await.unwrap();
    assert_eq!(second, BuildOutcome::Reused { indexed: 4 });
    assert_eq!(embedder.calls(), calls_after_first);

    let after = index.query(&query, 10).unwrap();
    assert_eq!(before, after);
    assert_eq!(index.len(), 4);
}

#[tokio::test]
async fn a_new_corpus_replaces_the_old_one_entirely() {
    let embedder = StubEmbedder::new(64);
    let index = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();

    index
        .build(&embedder, &parse(CATALOG_A), &CorpusFingerprint::of_text(CATALOG_A))
        .await
        .unwrap();
    let outcome = index
        .build(&embedder, &parse(CATALOG_B), &CorpusFingerprint::of_text(CATALOG_B))
        .await
        .unwrap();
    assert_eq!(outcome, BuildOutcome::Rebuilt { indexed: 2, skipped: 0 });

    let query = embedder.embed_sync("System shall log all login attempts.");
    let ids: HashSet<String> = index
        .query(&query, 10)
        .unwrap()
        .into_iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(
        ids,
        HashSet::from(["FS-REG-2".to_string(), "FS-REG-3".to_string()])
    );
    assert_eq!(index.fingerprint(), Some(CorpusFingerprint::of_text(CATALOG_B)));
}

#[tokio::test]
async fn a_different_model_forces_a_rebuild() {
    let index = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    let requirements = parse(CATALOG_A);
    let fingerprint = CorpusFingerprint::of_text(CATALOG_A);

    index
        .build(&StubEmbedder::new(64), &requirements, &fingerprint)
        .await
        .unwrap();
    let outcome = index
        .build(&StubEmbedder::new(32), &requirements, &fingerprint)
        .await
        .unwrap();
    assert!(matches!(outcome, BuildOutcome::Rebuilt { indexed: 4, .. }));
    assert_eq!(index.snapshot().unwrap().model_id(), "stub-32");
}

/// One model name served at different vector lengths, as two endpoints might.
struct SharedName(StubEmbedder);

#[async_trait]
impl EmbeddingProvider for SharedName {
    fn model_id(&self) -> &str {
        "shared-model"
    }

    fn vector_dimension(&self) -> Option<usize> {
        self.0.vector_dimension()
    }

    async fn embed(&self, text: &str) -> trace_vector_store::Result<Vec<f32>> {
        self.0.embed(text).await
    }
}

#[tokio::test]
async fn a_different_dimension_under_the_same_model_name_forces_a_rebuild() {
    let tmp = TempDir::new().unwrap();
    let path = snapshot_path(tmp.path(), "trace-matrix");
    let requirements = parse(CATALOG_A);
    let fingerprint = CorpusFingerprint::of_text(CATALOG_A);

    let original = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    original
        .build(&SharedName(StubEmbedder::new(32)), &requirements, &fingerprint)
        .await
        .unwrap();
    original.save(&path).await.unwrap();

    let restored = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    assert_eq!(restored.restore(&path).await.unwrap().dimension(), 32);

    let wider = SharedName(StubEmbedder::new(64));
    let outcome = restored.build(&wider, &requirements, &fingerprint).await.unwrap();
    assert_eq!(outcome, BuildOutcome::Rebuilt { indexed: 4, skipped: 0 });
    assert_eq!(restored.snapshot().unwrap().dimension(), 64);

    let query = wider.0.embed_sync("Audit logs are retained for seven years.");
    let hits = restored.query(&query, 1).unwrap();
    assert_eq!(hits[0].id.to_string(), "FR 6.1.1");
}

#[tokio::test]
async fn failed_embeddings_skip_one_record_and_retry_next_time() {
    let index = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    let requirements = parse(CATALOG_A);
    let fingerprint = CorpusFingerprint::of_text(CATALOG_A);

    let flaky = FlakyEmbedder::new(Some("Audit logs"));
    let outcome = index.build(&flaky, &requirements, &fingerprint).await.unwrap();
    assert_eq!(outcome, BuildOutcome::Rebuilt { indexed: 3, skipped: 1 });
    assert!(!index.snapshot().unwrap().is_complete());

    let healthy = FlakyEmbedder::new(None);
    let outcome = index.build(&healthy, &requirements, &fingerprint).await.unwrap();
    assert_eq!(outcome, BuildOutcome::Rebuilt { indexed: 4, skipped: 0 });
    assert!(index.snapshot().unwrap().is_complete());
}

#[tokio::test]
async fn total_embedding_failure_keeps_previous_snapshot() {
    let index = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    let good = StubEmbedder::new(64);
    index
        .build(&good, &parse(CATALOG_B), &CorpusFingerprint::of_text(CATALOG_B))
        .await
        .unwrap();

    let broken = FlakyEmbedder::new(Some(""));
    let err = index
        .build(&broken, &parse(CATALOG_A), &CorpusFingerprint::of_text(CATALOG_A))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::EmbeddingError(_)), "{err}");
    assert_eq!(index.fingerprint(), Some(CorpusFingerprint::of_text(CATALOG_B)));
}

struct SlowFor {
    inner: StubEmbedder,
    marker: &'static str,
}

#[async_trait]
impl EmbeddingProvider for SlowFor {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str) -> trace_vector_store::Result<Vec<f32>> {
        if text.contains(self.marker) {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        self.inner.embed(text).await
    }
}

#[tokio::test(start_paused = true)]
async fn a_hung_embedding_call_is_skipped_after_the_timeout() {
    let index = RequirementIndex::new("trace-matrix", HnswParams::default())
        .unwrap()
        .with_embed_timeout(Duration::from_millis(200));
    let embedder = SlowFor {
        inner: StubEmbedder::new(64),
        marker: "electronically",
    };
    let outcome = index
        .build(&embedder, &parse(CATALOG_A), &CorpusFingerprint::of_text(CATALOG_A))
        .await
        .unwrap();
    assert_eq!(outcome, BuildOutcome::Rebuilt { indexed: 3, skipped: 1 });
}

#[tokio::test]
async fn snapshots_survive_save_and_restore() {
    let tmp = TempDir::new().unwrap();
    let path = snapshot_path(tmp.path(), "trace-matrix");
    let embedder = StubEmbedder::new(64);
    let fingerprint = CorpusFingerprint::of_text(CATALOG_A);

    let original = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    original
        .build(&embedder, &parse(CATALOG_A), &fingerprint)
        .await
        .unwrap();
    original.save(&path).await.unwrap();

    let restored = RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap();
    let snapshot = restored.restore(&path).await.unwrap();
    assert_eq!(snapshot.fingerprint(), &fingerprint);
    assert_eq!(snapshot.len(), 4);
    assert_eq!(
        snapshot.records()[0].test_scripts,
        vec!["Test Script 12".to_string()]
    );

    let query = embedder.embed_sync("Audit logs are retained for seven years.");
    assert_eq!(
        original.query(&query, 3).unwrap(),
        restored.query(&query, 3).unwrap()
    );

    // Same corpus and model: the restored snapshot is reused.
    let outcome = restored
        .build(&embedder, &parse(CATALOG_A), &fingerprint)
        .await
        .unwrap();
    assert_eq!(outcome, BuildOutcome::Reused { indexed: 4 });

    let other = RequirementIndex::new("other-collection", HnswParams::default()).unwrap();
    assert!(other.restore(&path).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queries_during_rebuild_see_exactly_one_corpus() {
    let embedder = Arc::new(StubEmbedder::new(64));
    let index = Arc::new(RequirementIndex::new("trace-matrix", HnswParams::default()).unwrap());
    let a_ids: HashSet<String> = parse(CATALOG_A).iter().map(|r| r.id.to_string()).collect();
    let b_ids: HashSet<String> = parse(CATALOG_B).iter().map(|r| r.id.to_string()).collect();

    index
        .build(embedder.as_ref(), &parse(CATALOG_A), &CorpusFingerprint::of_text(CATALOG_A))
        .await
        .unwrap();

    let reader = {
        let index = index.clone();
        let embedder = embedder.clone();
        tokio::spawn(async move {
            let query = embedder.embed_sync("backups logs records");
            for _ in 0..200 {
                let ids: HashSet<String> = index
                    .query(&query, 10)
                    .unwrap()
                    .into_iter()
                    .map(|c| c.id.to_string())
                    .collect();
                assert!(
                    ids == a_ids || ids == b_ids,
                    "query mixed corpora: {ids:?}"
                );
                tokio::task::yield_now().await;
            }
        })
    };

    for round in 0..10 {
        let (doc, requirements) = if round % 2 == 0 {
            (CATALOG_B, parse(CATALOG_B))
        } else {
            (CATALOG_A, parse(CATALOG_A))
        };
        index
            .build(embedder.as_ref(), &requirements, &CorpusFingerprint::of_text(doc))
            .await
            .unwrap();
    }

    reader.await.unwrap();
}
