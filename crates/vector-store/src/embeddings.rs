use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_STUB_DIMENSION: usize = 256;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Text to vector capability consumed by the index and the matcher.
///
/// Implementations must return vectors of one fixed length for the lifetime
/// of the provider. Failures are reported per call and never poison the
/// provider for later calls.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable id of the model; part of an index snapshot's identity.
    fn model_id(&self) -> &str;

    /// Vector length, when known without calling the model.
    fn vector_dimension(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    Http,
    Stub,
}

impl EmbeddingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Stub => "stub",
        }
    }

    /// Reads `TRACE_EMBEDDING_MODE`, if set.
    pub fn from_env() -> Result<Option<Self>> {
        match env::var("TRACE_EMBEDDING_MODE") {
            Ok(raw) => raw.parse().map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl FromStr for EmbeddingMode {
    type Err = VectorStoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported TRACE_EMBEDDING_MODE '{other}' (expected 'http' or 'stub')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,

    /// OpenAI-compatible embeddings endpoint
    pub endpoint: String,

    pub model: String,

    /// Environment variable holding the bearer token
    pub api_key_env: String,

    /// Per-call budget, applied both to the HTTP request and around every embed call
    pub timeout_ms: u64,

    /// Vector length produced by the stub embedder
    pub stub_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            stub_dimension: DEFAULT_STUB_DIMENSION,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("embedding.timeout_ms must be > 0".to_string());
        }
        match self.mode {
            EmbeddingMode::Stub if self.stub_dimension == 0 => {
                Err("embedding.stub_dimension must be > 0".to_string())
            }
            EmbeddingMode::Http if self.endpoint.trim().is_empty() => {
                Err("embedding.endpoint must not be empty".to_string())
            }
            EmbeddingMode::Http if self.model.trim().is_empty() => {
                Err("embedding.model must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Builds the provider selected by `config.mode`.
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate().map_err(VectorStoreError::EmbeddingError)?;
    match config.mode {
        EmbeddingMode::Stub => Ok(Arc::new(StubEmbedder::new(config.stub_dimension))),
        EmbeddingMode::Http => Ok(Arc::new(HttpEmbedder::from_config(config)?)),
    }
}

/// Runs one embed call under a hard time budget.
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    budget: Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(budget, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(VectorStoreError::Timeout(
            u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

/// Deterministic, network-free embedder.
///
/// Every lower-cased word is feature-hashed into two signed buckets and the
/// result is L2-normalised, so texts sharing vocabulary land close together
/// and identical texts have distance 0.
#[derive(Clone, Debug)]
pub struct StubEmbedder {
    dimension: usize,
    model_id: String,
}

impl StubEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("stub-{dimension}"),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        stub_embed(text, self.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn vector_dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    for token in text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        let token = token.to_lowercase();
        let mut state = fnv1a_64(token.as_bytes());
        for _ in 0..2 {
            let bits = splitmix64(&mut state);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (bits % dimension as u64) as usize;
            let sign = if bits >> 63 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

pub(crate) const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// OpenAI-compatible embeddings client.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    model_id: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            log::warn!(
                "{} is not set; embedding requests will be sent without credentials",
                config.api_key_env
            );
        }
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            model_id: format!("{}@{}", config.model, config.endpoint),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    /// `<model>@<endpoint>`: two endpoints serving one model name may differ.
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: [text],
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: EmbeddingResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))?;
        if vector.is_empty() {
            return Err(VectorStoreError::EmbeddingError(
                "Embedding endpoint returned a zero-length vector".to_string(),
            ));
        }
        Ok(vector)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// `1 - cosine_similarity`, clamped to `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec.iter_mut() {
            *value /= norm;
        }
    }
}
