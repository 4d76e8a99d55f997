//! Ollama embedding provider
//!
//! Talks to an Ollama-compatible `/api/embed` endpoint, which accepts a batch
//! of inputs per request.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::types::Embedding;

use super::embedding::{check_dimensions, l2_normalize, Embedder};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Embed already-prefixed inputs, one request per configured batch
    async fn embed_prefixed(&self, inputs: Vec<String>) -> Result<Vec<Embedding>> {
        let url = format!("{}/api/embed", self.config.base_url.trim_end_matches('/'));
        let mut embeddings = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(self.config.batch_size.max(1)) {
            let request = EmbedRequest {
                model: &self.config.model,
                input: batch.to_vec(),
            };

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::embedding(format!("Embedding request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = format!("Embedding failed ({}): {}", status, body);
                // 4xx means the request itself is wrong, e.g. an unknown model
                return Err(if status.is_server_error() || status.as_u16() == 429 {
                    Error::embedding(message)
                } else {
                    Error::config(message)
                });
            }

            let parsed: EmbedResponse = response.json().await.map_err(|e| {
                Error::embedding(format!("Failed to parse embedding response: {}", e))
            })?;

            if parsed.embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    parsed.embeddings.len()
                )));
            }
            check_dimensions(&parsed.embeddings, self.config.dimensions)?;

            tracing::debug!(
                "Embedded batch of {} texts with {}",
                batch.len(),
                self.config.model
            );
            embeddings.extend(parsed.embeddings);
        }

        if self.config.normalize {
            for embedding in &mut embeddings {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = texts
            .iter()
            .map(|t| format!("{}{}", self.config.document_prefix, t))
            .collect();
        self.embed_prefixed(inputs).await
    }

    async fn embed_query(&self, query: &str) -> Result<Embedding> {
        let inputs = vec![format!("{}{}", self.config.query_prefix, query)];
        self.embed_prefixed(inputs)
            .await?
            .pop()
            .ok_or_else(|| Error::embedding("Empty response for query embedding"))
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
