// Embeddings module
// Chunking plus the clients that turn chunk text into vectors

pub mod chunking;
pub mod hosted;
mod http;
pub mod ollama;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::{Config, ConfigError, EmbeddingProvider};
use crate::{IndexError, Result};

pub use chunking::{Chunk, ChunkingConfig, chunk_document, estimate_token_count, split};
pub use hosted::HostedClient;
pub use ollama::OllamaClient;

/// An endpoint that turns text into fixed-dimension vectors.
///
/// `embed` returns exactly one vector per input, in input order. Clients may
/// split a request into sub-batches internally, but the caller always sees a
/// single ordered result or an error; never a partial one.
#[async_trait]
pub trait EmbeddingClient: Send + Sync + fmt::Debug {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Name of the model producing the vectors
    fn model(&self) -> &str;
}

/// Build the client selected by `config.provider`.
///
/// `api_key` is only consulted for the hosted provider, which fails with
/// [`ConfigError::MissingApiKey`] without one.
#[inline]
pub fn client_from_config(
    config: &Config,
    api_key: Option<String>,
) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider {
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaClient::new(&config.ollama)?)),
        EmbeddingProvider::Hosted => {
            let api_key = api_key.ok_or(ConfigError::MissingApiKey)?;
            Ok(Arc::new(HostedClient::new(&config.hosted, api_key)?))
        }
    }
}

/// Check a response against its request: one vector per input, all finite
/// and of the same non-zero dimension.
pub(crate) fn validate_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(IndexError::embedding(
            None,
            format!(
                "Mismatch between request and response counts: {} vs {}",
                expected,
                vectors.len()
            ),
        ));
    }

    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err(IndexError::embedding(None, "Endpoint returned an empty vector"));
        }
        if vectors.iter().flatten().any(|value| !value.is_finite()) {
            return Err(IndexError::embedding(
                None,
                "Endpoint returned a vector with non-finite values",
            ));
        }
        if let Some(odd) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(IndexError::DimensionMismatch {
                expected: first.len(),
                actual: odd.len(),
            });
        }
    }

    Ok(())
}
