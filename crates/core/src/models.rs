use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "collection";
pub const DEFAULT_PERSIST_DIR: &str = "./vector-db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub text: String,
    pub page_number: u32,
    pub source_path: String,
}

impl Page {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source_path.clone(),
            page: self.page_number,
        }
    }
}

/// Attribution carried from a page onto every chunk cut from it, and returned
/// to clients as-is in `source_documents`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub position: u64,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub source_documents: Vec<ChunkMetadata>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Local,
    Qdrant,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub collection: String,
    pub persist_dir: PathBuf,
    pub qdrant_url: String,
    pub embed_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local,
            collection: DEFAULT_COLLECTION.to_string(),
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            qdrant_url: "http://localhost:6333".to_string(),
            embed_batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QaOptions {
    /// Number of chunks placed in the prompt. Larger values improve recall at
    /// the cost of prompt size and latency.
    pub top_k: usize,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for QaOptions {
    fn default() -> Self {
        Self {
            top_k: 1,
            retrieval_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub source: String,
    pub checksum: String,
    pub pages: usize,
    pub chunks: usize,
    pub indexed: usize,
}
