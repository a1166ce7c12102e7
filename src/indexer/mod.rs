// Indexer module
// Owns the load -> append -> persist lifecycle of persisted indexes

mod locks;


use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use self::locks::{PATH_LOCKS, lock_key};
use crate::config::IndexConfig;
use crate::embeddings::{
    Chunk, ChunkingConfig, EmbeddingClient, chunk_document, estimate_token_count, validate_batch,
};
use crate::index::storage::{self, CommitGate, DirLock, IndexStamp};
use crate::index::{Index, IndexEntry, Metric, SearchResult};
use crate::sources::{Document, SourceFetcher};
use crate::{IndexError, Result};

const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONCURRENCY: usize = 2;
/// Snapshots a manager keeps before evicting the least recently used
const MAX_SNAPSHOTS: usize = 8;

/// A source left out of an ingest, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub source: String,
    pub reason: String,
}

/// What one `ingest` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub entries_added: usize,
    pub documents_ingested: usize,
    pub skipped: Vec<SkippedDocument>,
    /// Entries in the index after the call
    pub index_size: usize,
    /// Whether this call created the index
    pub created: bool,
    pub estimated_tokens: usize,
}

/// Shape of a persisted index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub dimension: Option<usize>,
    pub metric: Metric,
    pub model: Option<String>,
    pub sources: Vec<String>,
}

#[derive(Debug)]
struct Snapshot {
    index: Arc<Index>,
    stamp: IndexStamp,
    last_used: Instant,
}

/// Authoritative owner of persisted indexes.
///
/// Writers to one index path are serialized, within the process by a keyed
/// lock and across processes by a lock file in the index directory. Queries
/// wait for an in-flight ingest on the same path to finish, then search an
/// immutable snapshot of the last persisted index; snapshots are reused while
/// the file is unchanged.
pub struct IndexManager {
    client: Arc<dyn EmbeddingClient>,
    metric: Metric,
    embedding_timeout: Duration,
    storage_timeout: Duration,
    concurrency: usize,
    snapshots: Mutex<HashMap<PathBuf, Snapshot>>,
    #[cfg(test)]
    save_delay: Duration,
}

impl fmt::Debug for IndexManager {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexManager")
            .field("client", &self.client)
            .field("metric", &self.metric)
            .field("embedding_timeout", &self.embedding_timeout)
            .field("storage_timeout", &self.storage_timeout)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl IndexManager {
    #[inline]
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            client,
            metric: Metric::default(),
            embedding_timeout: DEFAULT_EMBEDDING_TIMEOUT,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            snapshots: Mutex::new(HashMap::new()),
            #[cfg(test)]
            save_delay: Duration::ZERO,
        }
    }

    #[inline]
    pub fn from_config(client: Arc<dyn EmbeddingClient>, config: &IndexConfig) -> Self {
        Self::new(client)
            .with_metric(config.metric)
            .with_embedding_timeout(config.embedding_timeout())
            .with_storage_timeout(config.storage_timeout())
            .with_concurrency(config.concurrency)
    }

    /// Metric new indexes are built with and queries request
    #[inline]
    #[must_use]
    pub const fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// How many documents may be embedded at once during an ingest
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[inline]
    pub const fn metric(&self) -> Metric {
        self.metric
    }

    /// Chunk, embed and append `documents` to the index at `index_path`.
    ///
    /// Documents carrying a fetch failure are skipped and reported. Every
    /// vector is obtained before the index is touched, so any error leaves the
    /// persisted index exactly as it was. An index that does not exist yet is
    /// created, even when no entries are added.
    #[inline]
    pub async fn ingest(
        &self,
        documents: &[Document],
        chunking: &ChunkingConfig,
        index_path: &Path,
    ) -> Result<IngestReport> {
        chunking.validate()?;

        let mut skipped = Vec::new();
        let mut chunked = Vec::new();
        for document in documents {
            if let Some(reason) = &document.fetch_failure {
                warn!("Skipping {}: {}", document.source, reason);
                skipped.push(SkippedDocument {
                    source: document.source.clone(),
                    reason: reason.clone(),
                });
                continue;
            }
            let chunks = chunk_document(document, chunking)?;
            debug!("{} produced {} chunks", document.source, chunks.len());
            chunked.push(chunks);
        }
        let documents_ingested = chunked.len();
        let estimated_tokens = chunked
            .iter()
            .flatten()
            .map(|chunk| estimate_token_count(&chunk.text))
            .sum();

        let entries = self.embed_documents(chunked).await?;

        let lock = PATH_LOCKS.lock_for(index_path);
        let _guard = lock.write().await;
        let _dir_lock = self.lock_dir(index_path, DirLock::exclusive).await?;

        let created = !storage::exists(index_path);
        let mut index = if created {
            Index::new(self.metric)
        } else {
            self.load_blocking(index_path).await?
        };

        if index.metric() != self.metric {
            return Err(IndexError::MetricMismatch {
                index: index.metric(),
                requested: self.metric,
            });
        }
        match index.model() {
            Some(model) if model != self.client.model() => warn!(
                "Index at {} was built with model {}, ingesting with {}",
                index_path.display(),
                model,
                self.client.model()
            ),
            Some(_) => {}
            None => index.set_model(self.client.model()),
        }

        let entries_added = index.append(entries)?;

        let index = Arc::new(index);
        if entries_added > 0 || created {
            self.save_blocking(Arc::clone(&index), index_path).await?;
            self.remember(index_path, Arc::clone(&index));
        }

        info!(
            "Ingested {} documents into {}: {} entries added, {} total, {} skipped",
            documents_ingested,
            index_path.display(),
            entries_added,
            index.len(),
            skipped.len()
        );

        Ok(IngestReport {
            entries_added,
            documents_ingested,
            skipped,
            index_size: index.len(),
            created,
            estimated_tokens,
        })
    }

    /// Fetch `sources` and ingest whatever could be retrieved
    #[inline]
    pub async fn ingest_sources(
        &self,
        fetcher: &SourceFetcher,
        sources: &[String],
        chunking: &ChunkingConfig,
        index_path: &Path,
    ) -> Result<IngestReport> {
        let documents = fetcher.fetch_documents(sources).await;
        self.ingest(&documents, chunking, index_path).await
    }

    /// The `k` entries nearest to `query_text` under this manager's metric
    #[inline]
    pub async fn query(
        &self,
        index_path: &Path,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.query_with_metric(index_path, query_text, k, self.metric)
            .await
    }

    /// The `k` entries nearest to `query_text`.
    ///
    /// Fails with `MetricMismatch` when the index was built for a different
    /// metric. Returns every entry when the index holds fewer than `k`.
    #[inline]
    pub async fn query_with_metric(
        &self,
        index_path: &Path,
        query_text: &str,
        k: usize,
        metric: Metric,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".to_string()));
        }

        let index = self.read_snapshot(index_path).await?;
        if index.metric() != metric {
            return Err(IndexError::MetricMismatch {
                index: index.metric(),
                requested: metric,
            });
        }
        if index.is_empty() {
            debug!("Index at {} is empty", index_path.display());
            return Ok(Vec::new());
        }

        let texts = [query_text.to_string()];
        let vectors = with_timeout(
            "embedding request",
            self.embedding_timeout,
            self.client.embed(&texts),
        )
        .await??;
        validate_batch(1, &vectors)?;
        let query_vector = vectors.first().ok_or_else(|| {
            IndexError::embedding(None, "Endpoint returned no vector for the query")
        })?;

        let results = index.search(query_vector, k)?;
        info!(
            "Query against {} returned {} of {} entries",
            index_path.display(),
            results.len(),
            index.len()
        );
        Ok(results)
    }

    /// Summarize the persisted index at `index_path`
    #[inline]
    pub async fn describe(&self, index_path: &Path) -> Result<IndexSummary> {
        let index = self.read_snapshot(index_path).await?;
        Ok(IndexSummary {
            path: index_path.to_path_buf(),
            entries: index.len(),
            dimension: index.dimension(),
            metric: index.metric(),
            model: index.model().map(str::to_string),
            sources: index.sources().into_iter().map(str::to_string).collect(),
        })
    }

    /// Embed each document's chunks, a bounded number of documents at a time,
    /// returning entries in document then chunk order.
    async fn embed_documents(&self, chunked: Vec<Vec<Chunk>>) -> Result<Vec<IndexEntry>> {
        let per_document: Vec<Vec<IndexEntry>> = stream::iter(chunked)
            .map(|chunks| self.embed_chunks(chunks))
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        Ok(per_document.into_iter().flatten().collect())
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = with_timeout(
            "embedding request",
            self.embedding_timeout,
            self.client.embed(&texts),
        )
        .await??;
        validate_batch(texts.len(), &vectors)?;

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector))
            .collect())
    }

    /// Current snapshot, taken once any ingest in progress on the path is done
    async fn read_snapshot(&self, index_path: &Path) -> Result<Arc<Index>> {
        let lock = PATH_LOCKS.lock_for(index_path);
        let _guard = lock.read().await;
        let _dir_lock = match self.lock_dir(index_path, DirLock::shared).await {
            Ok(dir_lock) => dir_lock,
            Err(e) => {
                if matches!(e, IndexError::IndexNotFound { .. }) {
                    self.forget(index_path);
                }
                return Err(e);
            }
        };

        let Some(stamp) = storage::stamp(index_path) else {
            self.forget(index_path);
            return Err(IndexError::IndexNotFound {
                path: index_path.to_path_buf(),
            });
        };
        if let Some(index) = self.cached(index_path, stamp) {
            debug!("Reusing snapshot of {}", index_path.display());
            return Ok(index);
        }

        let index = Arc::new(self.load_blocking(index_path).await?);
        self.remember(index_path, Arc::clone(&index));
        Ok(index)
    }

    fn cached(&self, index_path: &Path, stamp: IndexStamp) -> Option<Arc<Index>> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = snapshots
            .get_mut(&lock_key(index_path))
            .filter(|snapshot| snapshot.stamp == stamp)?;
        snapshot.last_used = Instant::now();
        Some(Arc::clone(&snapshot.index))
    }

    /// Cache `index` as the snapshot for `index_path`, replacing any older one
    /// and evicting the least recently used path when the cache is full
    fn remember(&self, index_path: &Path, index: Arc<Index>) {
        let Some(stamp) = storage::stamp(index_path) else {
            return;
        };
        let key = lock_key(index_path);
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if !snapshots.contains_key(&key) && snapshots.len() >= MAX_SNAPSHOTS {
            let oldest = snapshots
                .iter()
                .min_by_key(|(_, snapshot)| snapshot.last_used)
                .map(|(path, _)| path.clone());
            if let Some(oldest) = oldest {
                debug!("Evicting snapshot of {}", oldest.display());
                snapshots.remove(&oldest);
            }
        }
        snapshots.insert(
            key,
            Snapshot {
                index,
                stamp,
                last_used: Instant::now(),
            },
        );
    }

    fn forget(&self, index_path: &Path) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.remove(&lock_key(index_path));
    }

    /// Take the lock file of `index_path` on a blocking thread
    async fn lock_dir(
        &self,
        index_path: &Path,
        acquire: fn(&Path) -> Result<DirLock>,
    ) -> Result<DirLock> {
        let dir = index_path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || acquire(&dir));
        with_timeout("index lock", self.storage_timeout, task)
            .await?
            .map_err(|e| IndexError::storage(index_path, format!("Lock task failed: {}", e)))?
    }

    async fn load_blocking(&self, index_path: &Path) -> Result<Index> {
        let dir = index_path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || storage::load(&dir));
        with_timeout("index load", self.storage_timeout, task)
            .await?
            .map_err(|e| IndexError::storage(index_path, format!("Load task failed: {}", e)))?
    }

    async fn save_blocking(&self, index: Arc<Index>, index_path: &Path) -> Result<()> {
        let dir = index_path.to_path_buf();
        let gate = Arc::new(CommitGate::default());
        #[cfg(test)]
        let save_delay = self.save_delay;
        let task = tokio::task::spawn_blocking({
            let gate = Arc::clone(&gate);
            move || {
                #[cfg(test)]
                std::thread::sleep(save_delay);
                storage::save_gated(&index, &dir, &gate)
            }
        });

        match tokio::time::timeout(self.storage_timeout, task).await {
            Ok(joined) => joined
                .map_err(|e| IndexError::storage(index_path, format!("Save task failed: {}", e)))?,
            Err(_) if gate.abandon() => {
                warn!(
                    "Saving {} timed out; the previous index is kept",
                    index_path.display()
                );
                Err(IndexError::Timeout {
                    operation: "index save",
                    after: self.storage_timeout,
                })
            }
            // The rename won the race, so the save did land
            Err(_) => Ok(()),
        }
    }
}

async fn with_timeout<T, F>(operation: &'static str, after: Duration, future: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, future).await.map_err(|_| {
        warn!("{} timed out after {:?}", operation, after);
        IndexError::Timeout { operation, after }
    })
}
