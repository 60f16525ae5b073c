use crate::embeddings::Embedder;
use crate::stores::{LocalCollection, QdrantStore};
use crate::traits::VectorIndex;
use crate::{Chunk, IndexEntry, IndexError, SearchHit, StoreBackend, StoreConfig};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to one named collection plus the embedder that defines its vector
/// space. Text goes in, ranked hits come out.
pub struct IndexHandle {
    collection: String,
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("collection", &self.collection)
            .field("backend", &self.backend.backend_name())
            .field("embedder", &self.embedder.model_name())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl IndexHandle {
    /// Opens the configured collection, creating it when absent.
    pub async fn initialize(
        config: &StoreConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        let backend: Arc<dyn VectorIndex> = match config.backend {
            StoreBackend::Local => Arc::new(
                LocalCollection::open(
                    &config.persist_dir,
                    &config.collection,
                    embedder.model_name(),
                )
                .await?,
            ),
            StoreBackend::Qdrant => {
                Arc::new(QdrantStore::open(&config.qdrant_url, config.collection.clone()).await?)
            }
        };

        info!(
            collection = %config.collection,
            backend = backend.backend_name(),
            embedder = embedder.model_name(),
            "collection initialized"
        );

        Ok(Self::with_backend(
            config.collection.clone(),
            embedder,
            backend,
            config.embed_batch_size,
        ))
    }

    pub fn with_backend(
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn VectorIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            collection: collection.into(),
            embedder,
            backend,
            batch_size: batch_size.max(1),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embeds and inserts `chunks` batch by batch, then flushes the backend
    /// once. Batches already inserted stay in the collection when a later
    /// batch fails; the error reports how many entries were committed.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        let total = chunks.len();
        let mut committed = 0usize;
        let mut position = self
            .backend
            .next_position()
            .await
            .map_err(|error| indexing_failed(committed, total, &error))?;

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|error| indexing_failed(committed, total, &error))?;

            if embeddings.len() != batch.len() {
                let error = IndexError::Request(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                ));
                return Err(indexing_failed(committed, total, &error));
            }

            let indexed_at = Utc::now();
            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    let entry = IndexEntry {
                        id: make_entry_id(chunk, position),
                        embedding,
                        text: chunk.text.clone(),
                        metadata: chunk.metadata.clone(),
                        position,
                        indexed_at,
                    };
                    position += 1;
                    entry
                })
                .collect();

            self.backend
                .insert(entries)
                .await
                .map_err(|error| indexing_failed(committed, total, &error))?;
            committed += batch.len();
            debug!(collection = %self.collection, committed, total, "indexed batch");
        }

        self.backend
            .flush()
            .await
            .map_err(|error| indexing_failed(committed, total, &error))?;
        Ok(committed)
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query).await?;
        self.backend.search_vector(&query_vector, k).await
    }

    pub async fn clear(&self) -> Result<(), IndexError> {
        self.backend.clear().await
    }

    pub async fn len(&self) -> Result<usize, IndexError> {
        self.backend.len().await
    }

    pub async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }
}

fn indexing_failed(committed: usize, total: usize, error: &dyn fmt::Display) -> IndexError {
    warn!(committed, total, %error, "indexing aborted");
    IndexError::IndexingFailed {
        committed,
        total,
        reason: error.to_string(),
    }
}

fn make_entry_id(chunk: &Chunk, position: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.metadata.source.as_bytes());
    hasher.update(chunk.metadata.page.to_le_bytes());
    hasher.update(position.to_le_bytes());
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}
