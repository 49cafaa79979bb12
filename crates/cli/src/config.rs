use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use trace_catalog::{ParserConfig, SectionAnchors};
use trace_matcher::{AnalyzerSettings, MatchPolicy};
use trace_vector_store::{index_dir_for_root, EmbeddingConfig, EmbeddingMode, HnswParams};

pub const DEFAULT_CONFIG_FILE: &str = "trace-impact.toml";
pub const DEFAULT_COLLECTION: &str = "trace-matrix";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Collection name; one persisted snapshot per collection
    pub collection: String,

    /// Snapshot directory (defaults to `.trace-impact/indexes` under the working directory)
    pub dir: Option<PathBuf>,

    pub hnsw: HnswParams,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            dir: None,
            hnsw: HnswParams::default(),
        }
    }
}

/// Resolved settings of one `trace-impact` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub embedding: EmbeddingConfig,
    pub index: IndexSettings,
    pub matching: MatchPolicy,
    pub parser: ParserConfig,
    pub section: SectionAnchors,

    /// Changes matched at once
    pub max_concurrency: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            index: IndexSettings::default(),
            matching: MatchPolicy::default(),
            parser: ParserConfig::default(),
            section: SectionAnchors::default(),
            max_concurrency: 1,
        }
    }
}

impl TraceConfig {
    /// Defaults, then the TOML file, then `TRACE_*` environment overrides.
    ///
    /// Without an explicit path, `trace-impact.toml` in the working directory
    /// is read when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("TRACE_EMBEDDING_MODE") {
            self.embedding.mode = raw.parse::<EmbeddingMode>()?;
        }
        if let Some(url) = lookup("TRACE_EMBEDDING_URL") {
            self.embedding.endpoint = url;
        }
        if let Some(model) = lookup("TRACE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dir) = lookup("TRACE_INDEX_DIR") {
            self.index.dir = Some(PathBuf::from(dir));
        }
        if let Some(collection) = lookup("TRACE_COLLECTION") {
            self.index.collection = collection;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.embedding.validate().map_err(anyhow::Error::msg)?;
        self.index.hnsw.validate().map_err(anyhow::Error::msg)?;
        self.matching.validate().map_err(anyhow::Error::msg)?;
        self.parser
            .validate()
            .map_err(|err| anyhow::anyhow!("parser: {err}"))?;
        self.section
            .validate()
            .map_err(|err| anyhow::anyhow!("section: {err}"))?;
        if self.index.collection.trim().is_empty() {
            bail!("index.collection must not be empty");
        }
        if self.max_concurrency == 0 {
            bail!("max_concurrency must be > 0");
        }
        Ok(())
    }

    pub fn index_dir(&self) -> Result<PathBuf> {
        match &self.index.dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let cwd = env::current_dir().context("Failed to resolve working directory")?;
                Ok(index_dir_for_root(&cwd))
            }
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            parser: self.parser.clone(),
            section: self.section.clone(),
            matching: self.matching,
            embed_timeout_ms: self.embedding.timeout_ms,
            max_concurrency: self.max_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = TraceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.index.collection, "trace-matrix");
        assert_eq!(config.matching, MatchPolicy::default());
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
    }

    #[test]
    fn toml_overrides_only_what_it_names() {
        let config = TraceConfig::from_toml(
            r#"
max_concurrency = 4

[embedding]
mode = "stub"
stub_dimension = 64

[index]
collection = "plan-2024"

[matching]
acceptance_threshold = 0.35

[parser]
prefixes = ["BR", "FR", "NFR"]
"#,
        )
        .unwrap();

        assert_eq!(config.embedding.mode, EmbeddingMode::Stub);
        assert_eq!(config.embedding.stub_dimension, 64);
        assert_eq!(config.index.collection, "plan-2024");
        assert_eq!(config.matching.acceptance_threshold, 0.35);
        assert_eq!(config.matching.top_k, 5);
        assert_eq!(config.parser.prefixes, vec!["BR", "FR", "NFR"]);
        assert_eq!(config.parser.test_script_marker, "test script");
        assert_eq!(config.max_concurrency, 4);
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = TraceConfig::from_toml("[index]\ncollection = \"from-file\"\n").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("TRACE_EMBEDDING_MODE", "STUB"),
            ("TRACE_EMBEDDING_URL", "http://localhost:8080/v1/embeddings"),
            ("TRACE_COLLECTION", "from-env"),
            ("TRACE_INDEX_DIR", "/tmp/trace-indexes"),
        ]);
        config
            .apply_env(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.embedding.mode, EmbeddingMode::Stub);
        assert_eq!(config.embedding.endpoint, "http://localhost:8080/v1/embeddings");
        assert_eq!(config.index.collection, "from-env");
        assert_eq!(config.index_dir().unwrap(), PathBuf::from("/tmp/trace-indexes"));
    }

    #[test]
    fn bad_env_mode_is_rejected() {
        let mut config = TraceConfig::default();
        let err = config
            .apply_env(|key| (key == "TRACE_EMBEDDING_MODE").then(|| "onnx".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("onnx"), "{err}");
    }

    #[test]
    fn validation_names_the_offending_key() {
        let mut config = TraceConfig::default();
        config.matching.top_k = 0;
        assert!(config.validate().unwrap_err().to_string().contains("matching.top_k"));

        let mut config = TraceConfig::default();
        config.index.collection = " ".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("index.collection"));

        assert!(TraceConfig::from_toml("[matching]\ntop_k = \"five\"\n").is_err());
    }

    #[test]
    fn analyzer_settings_share_the_embedding_budget() {
        let mut config = TraceConfig::default();
        config.embedding.timeout_ms = 1_500;
        let settings = config.analyzer_settings();
        assert_eq!(settings.embed_timeout_ms, 1_500);
        assert_eq!(settings.matching, config.matching);
    }
}
