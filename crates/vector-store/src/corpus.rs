use crate::error::{Result, VectorStoreError};
use crate::types::RequirementRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

pub const INDEX_SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Identity of a trace-matrix corpus: SHA-256 over its non-blank paragraphs,
/// optionally prefixed by a scope naming how they were parsed.
///
/// Blank paragraphs and surrounding whitespace never change the parsed
/// records, so they do not change the fingerprint either.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusFingerprint(String);

impl CorpusFingerprint {
    pub fn of_paragraphs<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::digest(Sha256::new(), paragraphs)
    }

    /// Fingerprint of `paragraphs` as read under `scope`, e.g.
    /// `ParserConfig::corpus_scope`. Equal paragraphs under different scopes
    /// get different fingerprints.
    pub fn scoped<I, S>(scope: &str, paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        hasher.update(scope.as_bytes());
        hasher.update(b"\0");
        Self::digest(hasher, paragraphs)
    }

    fn digest<I, S>(mut hasher: Sha256, paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for paragraph in paragraphs {
            let paragraph = paragraph.as_ref().trim();
            if paragraph.is_empty() {
                continue;
            }
            hasher.update(paragraph.as_bytes());
            hasher.update(b"\n");
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    #[must_use]
    pub fn of_text(document: &str) -> Self {
        Self::of_paragraphs(document.lines())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for CorpusFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk form of an index snapshot. The ANN graph is not stored; it is
/// rebuilt from the vectors on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub schema_version: u32,
    pub collection: String,
    pub fingerprint: CorpusFingerprint,
    pub model_id: String,
    pub complete: bool,
    pub records: Vec<RequirementRecord>,
}

impl PersistedIndex {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let persisted: Self = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != INDEX_SNAPSHOT_SCHEMA_VERSION {
            return Err(VectorStoreError::IndexError(format!(
                "Unsupported index snapshot schema_version {} (expected {INDEX_SNAPSHOT_SCHEMA_VERSION})",
                persisted.schema_version
            )));
        }
        Ok(persisted)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trace_catalog::RequirementId;

    #[test]
    fn fingerprint_ignores_blank_paragraphs_and_padding() {
        let a = CorpusFingerprint::of_paragraphs(["BR 1.4", "Log logins."]);
        let b = CorpusFingerprint::of_text("\n  BR 1.4  \n\nLog logins.\n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn fingerprint_tracks_content_and_order() {
        let base = CorpusFingerprint::of_paragraphs(["BR 1.4", "Log logins."]);
        let edited = CorpusFingerprint::of_paragraphs(["BR 1.4", "Log all logins."]);
        let reordered = CorpusFingerprint::of_paragraphs(["Log logins.", "BR 1.4"]);
        let merged = CorpusFingerprint::of_paragraphs(["BR 1.4 Log logins."]);
        assert_ne!(base, edited);
        assert_ne!(base, reordered);
        assert_ne!(base, merged);
    }

    #[test]
    fn scope_separates_equal_paragraphs() {
        let paragraphs = ["BR 1.1", "Log logins.", "NFR 2.1", "Pages load fast."];
        let default = CorpusFingerprint::scoped("prefixes=BR,FR", paragraphs);
        let widened = CorpusFingerprint::scoped("prefixes=BR,NFR", paragraphs);
        assert_ne!(default, widened);
        assert_ne!(default, CorpusFingerprint::of_paragraphs(paragraphs));
        assert_eq!(default, CorpusFingerprint::scoped("prefixes=BR,FR", paragraphs));
    }

    #[tokio::test]
    async fn snapshot_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexes").join("trace-matrix.json");

        let persisted = PersistedIndex {
            schema_version: INDEX_SNAPSHOT_SCHEMA_VERSION,
            collection: "trace-matrix".to_string(),
            fingerprint: CorpusFingerprint::of_text("BR 1.4\nLog logins."),
            model_id: "stub".to_string(),
            complete: true,
            records: vec![RequirementRecord {
                id: RequirementId::new("BR", "1.4"),
                text: "Log logins.".to_string(),
                test_scripts: vec!["Test Script 12".to_string()],
                embedding: vec![0.6, 0.8],
            }],
        };
        persisted.save(&path).await.unwrap();

        let loaded = PersistedIndex::load(&path).await.unwrap();
        assert_eq!(loaded.collection, "trace-matrix");
        assert_eq!(loaded.fingerprint, persisted.fingerprint);
        assert_eq!(loaded.records, persisted.records);
    }

    #[tokio::test]
    async fn rejects_unknown_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old.json");
        let raw = serde_json::json!({
            "schema_version": 99,
            "collection": "c",
            "fingerprint": "ab",
            "model_id": "stub",
            "complete": true,
            "records": []
        });
        tokio::fs::write(&path, raw.to_string()).await.unwrap();
        let err = PersistedIndex::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("schema_version 99"), "{err}");
    }
}
