use crate::error::PipelineError;
use crate::llm::{endpoint_url, http_client, OpenAiConfig};
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_EMBEDDING_DIMENSIONS: usize = 1536;

pub const DEFAULT_HF_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_HF_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Local, deterministic trigram-hashing embedder. Needs no network access.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> String {
        format!("char-trigram-{}", self.dimensions.max(1))
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Rejects provider output whose count or width does not match the request.
pub fn check_vectors(
    provider: &str,
    expected_count: usize,
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, PipelineError> {
    if vectors.len() != expected_count {
        return Err(PipelineError::embedding(
            provider,
            format!("expected {expected_count} vectors, got {}", vectors.len()),
        ));
    }

    if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
        return Err(PipelineError::embedding(
            provider,
            format!("expected dimension {dimensions}, got {}", bad.len()),
        ));
    }

    Ok(vectors)
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

fn openai_vectors(body: &str) -> Result<Vec<Vec<f32>>, PipelineError> {
    let mut parsed: OpenAiEmbeddingResponse = serde_json::from_str(body)
        .map_err(|error| PipelineError::embedding("openai", format!("malformed response: {error}")))?;
    parsed.data.sort_by_key(|item| item.index);
    Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig) -> Result<Self, PipelineError> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::embedding("openai", "API key must not be empty"));
        }

        Ok(Self {
            client: http_client(config.timeout)
                .map_err(|error| PipelineError::embedding("openai", error.to_string()))?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_OPENAI_EMBEDDING_DIMENSIONS,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> String {
        format!("openai/{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "openai", model = %self.model, batch_size = texts.len(), "embedding batch");

        let response = self
            .client
            .post(endpoint_url(&self.base_url, "embeddings")?)
            .bearer_auth(&self.api_key)
            .json(&OpenAiEmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|error| {
                error!(provider = "openai", %error, "embedding request failed");
                PipelineError::embedding("openai", format!("request failed: {error}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| PipelineError::embedding("openai", error.to_string()))?;

        if !status.is_success() {
            error!(provider = "openai", %status, "embedding API error");
            return Err(PipelineError::embedding(
                "openai",
                format!("API returned {status}: {body}"),
            ));
        }

        check_vectors("openai", texts.len(), self.dimensions, openai_vectors(&body)?)
    }
}

#[derive(Serialize)]
struct HuggingFaceRequest<'a> {
    inputs: &'a [&'a str],
}

/// Embeddings from the Hugging Face inference feature-extraction pipeline.
pub struct HuggingFaceEmbedder {
    client: Client,
    api_token: Option<String>,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl std::fmt::Debug for HuggingFaceEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceEmbedder")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl HuggingFaceEmbedder {
    pub fn new(api_token: Option<String>, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(timeout)
                .map_err(|error| PipelineError::embedding("huggingface", error.to_string()))?,
            api_token: api_token.filter(|token| !token.trim().is_empty()),
            base_url: DEFAULT_HF_BASE_URL.to_string(),
            model: DEFAULT_HF_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_HF_EMBEDDING_DIMENSIONS,
        })
    }

    pub fn from_env(timeout: Duration) -> Result<Self, PipelineError> {
        Self::new(std::env::var("HUGGINGFACEHUB_API_TOKEN").ok(), timeout)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_id(&self) -> String {
        format!("huggingface/{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "huggingface", model = %self.model, batch_size = texts.len(), "embedding batch");

        let url = endpoint_url(
            &self.base_url,
            &format!("{}/pipeline/feature-extraction", self.model),
        )?;
        let mut request = self
            .client
            .post(url)
            .json(&HuggingFaceRequest { inputs: texts });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|error| {
            error!(provider = "huggingface", %error, "embedding request failed");
            PipelineError::embedding("huggingface", format!("request failed: {error}"))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| PipelineError::embedding("huggingface", error.to_string()))?;

        if !status.is_success() {
            error!(provider = "huggingface", %status, "embedding API error");
            return Err(PipelineError::embedding(
                "huggingface",
                format!("API returned {status}: {body}"),
            ));
        }

        let vectors: Vec<Vec<f32>> = serde_json::from_str(&body).map_err(|error| {
            PipelineError::embedding("huggingface", format!("malformed response: {error}"))
        })?;

        check_vectors("huggingface", texts.len(), self.dimensions, vectors)
    }
}
