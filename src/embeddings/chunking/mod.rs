#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ConfigError;
use crate::sources::Document;

/// A bounded window of a document's text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text, a contiguous substring of the parent content
    pub text: String,
    /// Source identifier of the parent document
    pub source: String,
    /// Position of this chunk within the parent document
    pub chunk_index: usize,
    /// Copy of the parent document's metadata
    pub metadata: BTreeMap<String, String>,
}

/// Configuration for content chunking.
///
/// Sizes are measured in characters (Unicode scalar values), never bytes, so
/// a chunk boundary can't land inside a multi-byte character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_size: usize,
    /// Characters shared between the tail of one chunk and the head of the next
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_size: 1000,
            overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        let config = Self { max_size, overlap };
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidMaxChunkSize(self.max_size));
        }
        if self.overlap >= self.max_size {
            return Err(ConfigError::InvalidOverlapSize {
                overlap: self.overlap,
                max_size: self.max_size,
            });
        }
        Ok(())
    }

    /// Distance in characters between the starts of consecutive chunks, zero
    /// for a config that fails validation
    #[inline]
    pub const fn stride(&self) -> usize {
        self.max_size.saturating_sub(self.overlap)
    }
}

/// Split `text` into windows of at most `max_size` characters.
///
/// Each window starts `max_size - overlap` characters after the previous one.
/// Splitting stops at the first window that reaches the end of the text, so a
/// short remainder becomes the final chunk and nothing is padded.
#[inline]
pub fn split(text: &str, max_size: usize, overlap: usize) -> Result<Vec<String>, ConfigError> {
    split_with_config(text, &ChunkingConfig { max_size, overlap })
}

/// Same as [`split`] for a config value
#[inline]
pub fn split_with_config(
    text: &str,
    config: &ChunkingConfig,
) -> Result<Vec<String>, ConfigError> {
    config.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every character, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let stride = config.stride();

    let mut chunks = Vec::with_capacity(char_count.div_ceil(stride));
    let mut start = 0;
    loop {
        let end = (start + config.max_size).min(char_count);
        #[expect(
            clippy::string_slice,
            reason = "offsets come from char_indices so they sit on char boundaries"
        )]
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());

        if end == char_count {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

/// Chunk a document, copying its metadata onto every chunk
#[inline]
pub fn chunk_document(
    document: &Document,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ConfigError> {
    let chunks: Vec<Chunk> = split_with_config(&document.content, config)?
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text,
            source: document.source.clone(),
            chunk_index,
            metadata: document.metadata.clone(),
        })
        .collect();

    debug!(
        "Chunked '{}' into {} chunks (max {} chars, overlap {})",
        document.source,
        chunks.len(),
        config.max_size,
        config.overlap
    );

    Ok(chunks)
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
