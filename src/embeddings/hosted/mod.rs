#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::http::{DEFAULT_TIMEOUT_SECONDS, RetryPolicy, build_agent, request_with_retry};
use super::{EmbeddingClient, validate_batch};
use crate::config::{ConfigError, HostedConfig};
use crate::{IndexError, Result};

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Clone)]
pub struct HostedClient {
    endpoint: Url,
    model: String,
    batch_size: u32,
    input_type: Option<String>,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

// Keeps the key out of logs
impl fmt::Debug for HostedClient {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .field("input_type", &self.input_type)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl HostedClient {
    /// Create a client; the API key is passed in explicitly and never read
    /// from the environment here.
    #[inline]
    pub fn new(config: &HostedConfig, api_key: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey.into());
        }

        Ok(Self {
            endpoint: config.embeddings_url()?,
            model: config.model.clone(),
            batch_size: config.batch_size,
            input_type: config.input_type.clone(),
            api_key,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry: RetryPolicy::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.attempts = attempts;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry.backoff = backoff;
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Requesting {} embeddings from {} in batches of {}",
            texts.len(),
            self.endpoint,
            self.batch_size
        );

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.generate_embeddings_single_batch(batch)?);
        }

        validate_batch(texts.len(), &results)?;
        Ok(results)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
            input_type: self.input_type.as_deref(),
        };
        let request_json = serde_json::to_string(&request)?;
        let authorization = format!("Bearer {}", self.api_key);

        let response_text = request_with_retry(self.endpoint.as_str(), self.retry, || {
            self.agent
                .post(self.endpoint.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", &authorization)
                .send(&request_json)
        })?;

        let response: EmbeddingsResponse = serde_json::from_str(&response_text).map_err(|e| {
            IndexError::embedding(None, format!("Failed to parse embeddings response: {}", e))
        })?;

        let vectors = order_by_index(response.data, texts.len())?;
        validate_batch(texts.len(), &vectors)?;
        Ok(vectors)
    }
}

/// Put response items back into request order, requiring each position
/// `0..expected` exactly once.
fn order_by_index(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(IndexError::embedding(
            None,
            format!(
                "Mismatch between request and response counts: {} vs {}",
                expected,
                data.len()
            ),
        ));
    }

    data.sort_by_key(|item| item.index);
    if data.iter().enumerate().any(|(position, item)| item.index != position) {
        return Err(IndexError::embedding(
            None,
            "Response indices do not cover the request",
        ));
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingClient for HostedClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || client.generate_embeddings_batch(&texts))
            .await
            .map_err(|e| IndexError::embedding(None, format!("Embedding task failed: {}", e)))?
    }

    fn model(&self) -> &str {
        &self.model
    }
}
