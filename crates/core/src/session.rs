use crate::store::IndexHandle;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Slot for the index currently answering queries.
///
/// Readers hold a [`SessionView`] for the whole query. An upload holds a
/// [`SessionSwap`] while it rebuilds the collection, and the lock is
/// write-preferring, so queries arriving meanwhile wait for the new index
/// instead of reading a half-built one.
#[derive(Debug, Default)]
pub struct Session {
    slot: RwLock<Option<Arc<IndexHandle>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> SessionView<'_> {
        SessionView {
            guard: self.slot.read().await,
        }
    }

    pub async fn swap(&self, handle: Arc<IndexHandle>) -> Option<Arc<IndexHandle>> {
        self.begin_swap().await.swap(handle)
    }

    pub async fn begin_swap(&self) -> SessionSwap<'_> {
        SessionSwap {
            guard: self.slot.write().await,
        }
    }

    pub async fn clear(&self) -> Option<Arc<IndexHandle>> {
        self.begin_swap().await.clear()
    }

    pub async fn is_indexed(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

pub struct SessionView<'a> {
    guard: RwLockReadGuard<'a, Option<Arc<IndexHandle>>>,
}

impl SessionView<'_> {
    pub fn handle(&self) -> Option<&IndexHandle> {
        self.guard.as_deref()
    }
}

impl Deref for SessionView<'_> {
    type Target = Option<Arc<IndexHandle>>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

pub struct SessionSwap<'a> {
    guard: RwLockWriteGuard<'a, Option<Arc<IndexHandle>>>,
}

impl SessionSwap<'_> {
    /// Empties the slot while the write lock is still held. Readers that
    /// get in after this guard drops find no index unless `swap` ran first.
    pub fn detach(&mut self) -> Option<Arc<IndexHandle>> {
        self.guard.take()
    }

    pub fn swap(mut self, handle: Arc<IndexHandle>) -> Option<Arc<IndexHandle>> {
        self.guard.replace(handle)
    }

    pub fn clear(mut self) -> Option<Arc<IndexHandle>> {
        self.guard.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::LocalCollection;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn handle(dir: &std::path::Path, name: &str) -> Arc<IndexHandle> {
        let store = LocalCollection::open(dir, name, "char-trigram").await.unwrap();
        Arc::new(IndexHandle::with_backend(
            name,
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(store),
            16,
        ))
    }

    #[tokio::test]
    async fn starts_empty_and_swap_returns_previous() {
        let dir = tempdir().unwrap();
        let session = Session::new();
        assert!(session.get().await.handle().is_none());

        assert!(session.swap(handle(dir.path(), "first").await).await.is_none());
        let previous = session.swap(handle(dir.path(), "second").await).await;

        assert_eq!(previous.map(|h| h.collection().to_string()).as_deref(), Some("first"));
        assert_eq!(
            session.get().await.handle().map(IndexHandle::collection),
            Some("second")
        );

        assert!(session.clear().await.is_some());
        assert!(!session.is_indexed().await);
    }

    #[tokio::test]
    async fn readers_wait_for_an_in_progress_swap() {
        let dir = tempdir().unwrap();
        let session = Arc::new(Session::new());
        let swap = session.begin_swap().await;

        let reader = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let view = session.get().await;
                view.handle().map(|h| h.collection().to_string())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        swap.swap(handle(dir.path(), "fresh").await);
        assert_eq!(reader.await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn dropping_a_detached_swap_leaves_the_session_empty() {
        let dir = tempdir().unwrap();
        let session = Session::new();
        session.swap(handle(dir.path(), "old").await).await;

        let mut swap = session.begin_swap().await;
        let previous = swap.detach();
        drop(swap);

        assert_eq!(previous.map(|h| h.collection().to_string()).as_deref(), Some("old"));
        assert!(!session.is_indexed().await);
    }
}
