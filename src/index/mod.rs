// Index module
// The in-memory similarity index and its on-disk form

#[cfg(test)]
mod tests;

pub mod storage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::embeddings::Chunk;
use crate::{IndexError, Result};

pub use storage::{exists, load, save};

/// Version written into every persisted index
pub const FORMAT_VERSION: u32 = 1;

/// Distance function an index is searched with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `1 - cosine similarity`
    #[default]
    Cosine,
    /// L2 distance
    Euclidean,
}

impl Metric {
    /// Distance between two vectors of equal length; smaller is nearer
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
                for (x, y) in a.iter().zip(b) {
                    dot = x.mul_add(*y, dot);
                    norm_a = x.mul_add(*x, norm_a);
                    norm_b = y.mul_add(*y, norm_b);
                }
                let denominator = norm_a.sqrt() * norm_b.sqrt();
                if denominator == 0.0 {
                    // A zero vector has no direction
                    1.0
                } else {
                    1.0 - dot / denominator
                }
            }
            Self::Euclidean => a
                .iter()
                .zip(b)
                .fold(0.0_f32, |acc, (x, y)| (x - y).mul_add(x - y, acc))
                .sqrt(),
        }
    }

    /// Map a distance onto a score where higher is better
    #[inline]
    pub fn score(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance),
        }
    }
}

impl fmt::Display for Metric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::Euclidean => f.write_str("euclidean"),
        }
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            _ => Err(ConfigError::UnknownMetric(s.to_string())),
        }
    }
}

/// One embedded chunk. Entries are never edited once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl IndexEntry {
    #[inline]
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            vector,
            text: chunk.text,
            source: chunk.source,
            chunk_index: chunk.chunk_index,
            metadata: chunk.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Nearest-neighbor hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry: IndexEntry,
    pub distance: f32,
    pub similarity_score: f32,
}

/// An ordered, append-only collection of entries searched by brute force
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    format_version: u32,
    dimension: Option<usize>,
    metric: Metric,
    #[serde(default)]
    model: Option<String>,
    entries: Vec<IndexEntry>,
}

impl Index {
    #[inline]
    pub const fn new(metric: Metric) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            dimension: None,
            metric,
            model: None,
            entries: Vec::new(),
        }
    }

    /// Vector dimension, fixed by the first entry ever added
    #[inline]
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub const fn metric(&self) -> Metric {
        self.metric
    }

    /// Model that produced the stored vectors, when known
    #[inline]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    #[inline]
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct entry sources in first-seen order
    #[inline]
    pub fn sources(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.entries
            .iter()
            .map(|entry| entry.source.as_str())
            .filter(|source| seen.insert(*source))
            .collect()
    }

    /// Fail with `DimensionMismatch` unless `dimension` fits this index
    #[inline]
    pub fn check_dimension(&self, dimension: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != dimension => Err(IndexError::DimensionMismatch {
                expected,
                actual: dimension,
            }),
            _ => Ok(()),
        }
    }

    /// Append entries after the existing ones.
    ///
    /// Either every entry is added or none is: all vectors must share the
    /// index dimension (or, for an empty index, the first new vector's).
    #[inline]
    pub fn append(&mut self, entries: Vec<IndexEntry>) -> Result<usize> {
        let Some(first) = entries.first() else {
            return Ok(0);
        };

        let dimension = self.dimension.unwrap_or(first.vector.len());
        if dimension == 0 {
            return Err(IndexError::InvalidArgument(
                "vectors must have at least one dimension".to_string(),
            ));
        }
        if let Some(odd) = entries.iter().find(|entry| entry.vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: odd.vector.len(),
            });
        }

        let added = entries.len();
        self.dimension = Some(dimension);
        self.entries.extend(entries);
        Ok(added)
    }

    /// The `k` entries nearest to `query`, nearest first.
    ///
    /// Equal distances keep insertion order. An index with fewer than `k`
    /// entries returns all of them.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".to_string()));
        }
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, self.metric.distance(query, &entry.vector)))
            .collect();
        // sort_by is stable, which gives the insertion-order tie break
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .filter_map(|(position, distance)| {
                self.entries.get(position).map(|entry| SearchResult {
                    entry: entry.clone(),
                    distance,
                    similarity_score: self.metric.score(distance),
                })
            })
            .collect())
    }

    /// Check a freshly deserialized index for internal consistency
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        match self.dimension {
            None if !self.entries.is_empty() => {
                Err("entries present but no dimension recorded".to_string())
            }
            Some(dimension) => self
                .entries
                .iter()
                .find(|entry| entry.vector.len() != dimension)
                .map_or(Ok(()), |entry| {
                    Err(format!(
                        "entry {} has {} dimensions, index has {}",
                        entry.id,
                        entry.vector.len(),
                        dimension
                    ))
                }),
            None => Ok(()),
        }
    }
}
