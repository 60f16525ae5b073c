use crate::traits::VectorIndex;
use crate::{IndexEntry, IndexError, SearchHit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    version: u32,
    collection: String,
    embedding_model: String,
    next_position: u64,
    updated_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl CollectionFile {
    fn empty(collection: &str, embedding_model: &str, next_position: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            collection: collection.to_string(),
            embedding_model: embedding_model.to_string(),
            next_position,
            updated_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

/// Collection persisted as a single JSON document under the persist directory.
/// Inserts only touch memory until `flush`; `clear` writes immediately.
/// Entries are kept in insertion order, which the stable sort in
/// `search_vector` relies on for tie-breaking.
#[derive(Debug)]
pub struct LocalCollection {
    path: PathBuf,
    state: RwLock<CollectionFile>,
}

impl LocalCollection {
    pub async fn open(
        persist_dir: &Path,
        collection: &str,
        embedding_model: &str,
    ) -> Result<Self, IndexError> {
        validate_collection_name(collection)?;

        tokio::fs::create_dir_all(persist_dir).await.map_err(|error| {
            IndexError::CollectionUnavailable(format!("{}: {error}", persist_dir.display()))
        })?;

        let path = persist_dir.join(format!("{collection}.json"));
        let state = if tokio::fs::try_exists(&path).await.map_err(|error| {
            IndexError::CollectionUnavailable(format!("{}: {error}", path.display()))
        })? {
            let raw = tokio::fs::read_to_string(&path).await.map_err(|error| {
                IndexError::CollectionUnavailable(format!("{}: {error}", path.display()))
            })?;
            let stored: CollectionFile = serde_json::from_str(&raw).map_err(|error| {
                IndexError::CollectionUnavailable(format!(
                    "{} is not a valid collection file: {error}",
                    path.display()
                ))
            })?;

            if stored.version != FORMAT_VERSION || stored.embedding_model != embedding_model {
                warn!(
                    collection,
                    stored_model = %stored.embedding_model,
                    configured_model = embedding_model,
                    stored_version = stored.version,
                    "discarding stored entries created with a different embedding model or format"
                );
                CollectionFile::empty(collection, embedding_model, stored.next_position)
            } else {
                info!(collection, entries = stored.entries.len(), "reusing persisted collection");
                stored
            }
        } else {
            info!(collection, path = %path.display(), "creating collection");
            CollectionFile::empty(collection, embedding_model, 0)
        };

        let store = Self {
            path,
            state: RwLock::new(state),
        };
        store.persist(&*store.state.read().await).await?;
        Ok(store)
    }

    async fn persist(&self, file: &CollectionFile) -> Result<(), IndexError> {
        let data = serde_json::to_vec(file)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        debug!(path = %self.path.display(), entries = file.entries.len(), "persisted collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LocalCollection {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn insert(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        for entry in entries {
            state.next_position = state.next_position.max(entry.position + 1);
            state.entries.push(entry);
        }
        state.updated_at = Utc::now();
        Ok(())
    }

    /// Writes the whole collection file once, after all batches of an add.
    async fn flush(&self) -> Result<(), IndexError> {
        let state = self.state.read().await;
        self.persist(&state).await
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let state = self.state.read().await;

        let mut scored: Vec<(f32, &IndexEntry)> = state
            .entries
            .iter()
            .filter(|entry| entry.embedding.len() == query_vector.len())
            .map(|entry| (cosine_similarity(query_vector, &entry.embedding), entry))
            .collect();

        // stable: equal scores stay in insertion order
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| SearchHit {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn clear(&self) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        let removed = std::mem::take(&mut state.entries);
        state.updated_at = Utc::now();

        if let Err(error) = self.persist(&state).await {
            state.entries = removed;
            return Err(error);
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, IndexError> {
        Ok(self.state.read().await.entries.len())
    }

    async fn next_position(&self) -> Result<u64, IndexError> {
        Ok(self.state.read().await.next_position)
    }
}

fn validate_collection_name(collection: &str) -> Result<(), IndexError> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !collection.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(IndexError::CollectionUnavailable(format!(
            "invalid collection name: {collection:?}"
        )))
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
