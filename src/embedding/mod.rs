//! Text embedding backends.
//!
//! [`EmbeddingProvider`] is the seam between the pipeline and whatever turns
//! text into vectors. Three backends are available, selected by
//! `[embedding] provider`:
//!
//! | Provider | Backend |
//! |----------|---------|
//! | `local`  | [`LocalProvider`], sentence-transformer inference via fastembed |
//! | `openai` | [`HttpProvider`] against `POST {url}/embeddings` |
//! | `ollama` | [`HttpProvider`] against `POST {url}/api/embed` |
//!
//! Ingestion and queries must use the same provider. Vectors from different
//! models are not comparable, and the store rejects vectors whose length
//! differs from its own.
//!
//! During ingestion, remote calls back off exponentially (1s, 2s, 4s … capped
//! at 32s) on 429, 5xx and transport errors, and fail immediately on any other
//! status. Query embeddings go through [`EmbeddingProvider::embed_once`] and
//! are never retried.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Converts text into fixed-length vectors.
///
/// One instance is shared by every request the server handles.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Length of every vector this provider returns.
    fn dims(&self) -> usize;
    /// Embeds `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Like [`embed`](Self::embed), but a transient failure is returned
    /// instead of retried.
    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts).await
    }
}

/// Embeds a single query string in one attempt.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed_once(&[text.to_string()])
        .await?
        .pop()
        .context("Embedding provider returned no vector for the query")
}

/// Embeds `texts` in slices of `batch_size`, preserving order.
pub async fn embed_batched(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = provider.embed(batch).await?;
        if vectors.len() != batch.len() {
            bail!(
                "Embedding provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }
        out.extend(vectors);
        tracing::debug!(done = out.len(), total = texts.len(), "embedded batch");
    }
    Ok(out)
}

// ============ HTTP backends ============

/// Wire dialect spoken by an [`HttpProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAI,
    Ollama,
}

impl Dialect {
    fn label(self) -> &'static str {
        match self {
            Dialect::OpenAI => "OpenAI",
            Dialect::Ollama => "Ollama",
        }
    }

    fn default_url(self) -> &'static str {
        match self {
            Dialect::OpenAI => "https://api.openai.com/v1",
            Dialect::Ollama => "http://localhost:11434",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Dialect::OpenAI => "/embeddings",
            Dialect::Ollama => "/api/embed",
        }
    }
}

/// Both dialects accept the same request shape.
#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAIEmbedResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding provider backed by a remote HTTP API.
pub struct HttpProvider {
    dialect: Dialect,
    model: String,
    dims: usize,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpProvider {
    /// OpenAI-compatible provider; reads `OPENAI_API_KEY`.
    pub fn openai(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .context("OPENAI_API_KEY environment variable not set")?;
        Self::build(Dialect::OpenAI, config, Some(api_key))
    }

    /// OpenAI-compatible provider with an explicit key.
    pub fn openai_with_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::build(Dialect::OpenAI, config, Some(api_key.into()))
    }

    pub fn ollama(config: &EmbeddingConfig) -> Result<Self> {
        Self::build(Dialect::Ollama, config, None)
    }

    fn build(dialect: Dialect, config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let label = dialect.label();
        let model = config
            .model
            .clone()
            .with_context(|| format!("embedding.model is required for the {} provider", label))?;
        let dims = config
            .dims
            .with_context(|| format!("embedding.dims is required for the {} provider", label))?;
        let base = config.url.as_deref().unwrap_or(dialect.default_url());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            dialect,
            model,
            dims,
            endpoint: format!("{}{}", base.trim_end_matches('/'), dialect.path()),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    /// POSTs `body`, retrying transient failures up to `max_retries` times,
    /// and returns the response body of the first success.
    async fn post(&self, body: &EmbedRequest<'_>, max_retries: u32) -> Result<Vec<u8>> {
        let label = self.dialect.label();
        let mut attempt = 0;

        loop {
            let mut request = self.client.post(&self.endpoint).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let failure = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .with_context(|| format!("{} response body could not be read", label));
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    let err = anyhow::anyhow!("{} API error {}: {}", label, status, text);
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => anyhow::anyhow!("{} request to {} failed: {}", label, self.endpoint, e),
            };

            if attempt >= max_retries {
                return Err(failure);
            }
            let delay = backoff_delay(attempt);
            tracing::warn!(attempt, ?delay, "{:#}; retrying", failure);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn request(&self, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let raw = self.post(&body, max_retries).await?;
        match self.dialect {
            Dialect::OpenAI => decode_openai(&raw),
            Dialect::Ollama => decode_ollama(&raw),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, self.max_retries).await
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, 0).await
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before retry number `attempt + 1`: 1s doubling up to 32s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(5))
}

/// OpenAI may return items out of order; `index` restores input order.
fn decode_openai(raw: &[u8]) -> Result<Vec<Vec<f32>>> {
    let parsed: OpenAIEmbedResponse =
        serde_json::from_slice(raw).context("Invalid OpenAI embeddings response")?;
    let mut items: Vec<(usize, Vec<f32>)> = parsed
        .data
        .into_iter()
        .enumerate()
        .map(|(pos, item)| (item.index.unwrap_or(pos), item.embedding))
        .collect();
    items.sort_by_key(|(index, _)| *index);
    Ok(items.into_iter().map(|(_, v)| v).collect())
}

fn decode_ollama(raw: &[u8]) -> Result<Vec<Vec<f32>>> {
    let parsed: OllamaEmbedResponse =
        serde_json::from_slice(raw).context("Invalid Ollama embed response")?;
    Ok(parsed.embeddings)
}

// ============ Local backend (fastembed) ============

/// Supported local models and their output dimensionality.
#[cfg(feature = "local-embeddings-fastembed")]
const LOCAL_MODELS: &[(&str, usize)] = &[
    ("all-minilm-l6-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
    ("nomic-embed-text-v1.5", 768),
];

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    Ok(match name {
        "all-minilm-l6-v2" => M::AllMiniLML6V2,
        "bge-small-en-v1.5" => M::BGESmallENV15,
        "bge-base-en-v1.5" => M::BGEBaseENV15,
        "bge-large-en-v1.5" => M::BGELargeENV15,
        "nomic-embed-text-v1.5" => M::NomicEmbedTextV15,
        other => {
            let known: Vec<&str> = LOCAL_MODELS.iter().map(|(n, _)| *n).collect();
            bail!(
                "Unknown local embedding model '{}' (supported: {})",
                other,
                known.join(", ")
            )
        }
    })
}

/// Sentence-transformer inference on this machine.
///
/// Weights are fetched from Hugging Face on first use and cached. The model
/// is loaded once, lazily, and inference runs on tokio's blocking pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    name: String,
    dims: usize,
    model: fastembed::EmbeddingModel,
    batch_size: usize,
    loaded: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let name = config
            .model
            .clone()
            .unwrap_or_else(|| LOCAL_MODELS[0].0.to_string());
        let model = fastembed_model(&name)?;
        let native_dims = LOCAL_MODELS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, d)| *d)
            .unwrap_or(384);

        Ok(Self {
            name,
            dims: config.dims.unwrap_or(native_dims),
            model,
            batch_size: config.batch_size,
            loaded: Default::default(),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let loaded = self.loaded.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut slot = loaded
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if slot.is_none() {
                tracing::info!(?model, "loading local embedding model");
                let embedder = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to load local embedding model: {}", e))?;
                *slot = Some(embedder);
            }
            let embedder = slot
                .as_mut()
                .context("local embedding model not loaded")?;
            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await
        .context("Local embedding task failed")?
    }
}

/// Builds the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(HttpProvider::openai(config)?)),
        "ollama" => Ok(Box::new(HttpProvider::ollama(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("The local provider needs the local-embeddings-fastembed feature"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Vector helpers ============

/// Little-endian `f32` encoding used by the persisted index.
///
/// ```rust
/// use medical_rag::embedding::{bytes_to_vec, vec_to_bytes};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let bytes = vec_to_bytes(&v);
/// assert_eq!(bytes.len(), 12);
/// assert_eq!(bytes_to_vec(&bytes), v);
/// ```
pub fn vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_bytes`]. A trailing partial value is ignored.
pub fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine of the angle between `a` and `b`, in `[-1, 1]`.
///
/// Zero when the lengths differ, either vector is empty, or either has zero
/// magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norm = aa.sqrt() * bb.sqrt();
    if norm < f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}
