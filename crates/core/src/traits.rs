use crate::{IndexEntry, IndexError, SearchHit};
use async_trait::async_trait;

/// A persistent, similarity-searchable collection of embedded chunks.
///
/// Implementations rank by cosine similarity, highest first, and break ties by
/// ascending `IndexEntry::position`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn insert(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError>;

    /// Makes earlier inserts durable. Write-through backends have nothing to do.
    async fn flush(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;

    async fn clear(&self) -> Result<(), IndexError>;

    async fn len(&self) -> Result<usize, IndexError>;

    /// Next insertion position, so positions keep increasing across reopen.
    async fn next_position(&self) -> Result<u64, IndexError>;
}
