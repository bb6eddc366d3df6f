//! Embedding service over an OpenAI-compatible `/embeddings` endpoint.
//!
//! Retrieval-tuned models distinguish passages from queries, so each request
//! carries an `input_type` unless the config turns it off (plain OpenAI
//! rejects the field).

use super::embedding::{Embedder, Embedding};
use crate::error::{self, Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Where and how to reach the embedding service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Windows per request
    pub batch_size: usize,
    /// Send `input_type: passage|query`
    pub input_type: bool,
    pub headers: HashMap<String, String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/v1".into(),
            model: "NV-Embed-QA".into(),
            api_key: None,
            timeout_secs: 60,
            batch_size: 64,
            input_type: true,
            headers: HashMap::new(),
        }
    }
}

/// Remote embedding service client
pub struct RemoteEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl RemoteEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::config_invalid("embedding batch_size must be positive")
                .with_operation("embedder::new"));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::config_invalid("failed to create HTTP client")
                    .with_operation("embedder::new")
                    .set_source(e)
            })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    async fn request(&self, input: &[String], input_type: &'static str) -> Result<Vec<Embedding>> {
        let body = EmbeddingRequest {
            input,
            model: &self.config.model,
            input_type: self.config.input_type.then_some(input_type),
            encoding_format: "float",
        };

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await.map_err(|e| {
            error::embedding_failed(format!("embedding service unreachable: {}", e))
                .with_context("url", self.endpoint())
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(error::embedding_failed(format!("embedding service error: {}", text))
                .with_context("url", self.endpoint())
                .with_context("status", status.to_string()));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error::embedding_failed(format!("malformed embedding response: {}", e))
        })?;

        if parsed.data.len() != input.len() {
            return Err(error::embedding_failed(format!(
                "expected {} embeddings, got {}",
                input.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl Embedder for RemoteEmbedder {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            debug!(batch = batch.len(), model = %self.config.model, "embedding passages");
            vectors.extend(self.request(batch, "passage").await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let input = [text.to_string()];
        let mut vectors = self.request(&input, "query").await?;
        vectors
            .pop()
            .ok_or_else(|| error::embedding_failed("embedding service returned no vector"))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
