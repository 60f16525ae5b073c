use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use pdf_qa_core::{
    ChunkingConfig, Embedder, IndexError, IndexHandle, QaOrchestrator, Session, StoreConfig,
};
use tokio::sync::OnceCell;

use crate::error::ServerError;
use crate::router::build_router;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    pub session: Arc<Session>,
    pub index: Arc<OnceCell<Arc<IndexHandle>>>,
    pub store_config: Arc<StoreConfig>,
    pub embedder: Arc<dyn Embedder>,
    pub orchestrator: Arc<QaOrchestrator>,
    pub chunking: ChunkingConfig,
    pub upload_dir: Arc<PathBuf>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store_config: StoreConfig,
        embedder: Arc<dyn Embedder>,
        orchestrator: QaOrchestrator,
        chunking: ChunkingConfig,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            session: Arc::new(Session::new()),
            index: Arc::new(OnceCell::new()),
            store_config: Arc::new(store_config),
            embedder,
            orchestrator: Arc::new(orchestrator),
            chunking,
            upload_dir: Arc::new(upload_dir),
            started_at: Instant::now(),
        }
    }

    /// Opens the configured collection on first use and shares it afterwards.
    pub async fn index(&self) -> Result<Arc<IndexHandle>, IndexError> {
        self.index
            .get_or_try_init(|| async {
                let handle =
                    IndexHandle::initialize(&self.store_config, Arc::clone(&self.embedder)).await?;
                Ok::<_, IndexError>(Arc::new(handle))
            })
            .await
            .cloned()
    }
}

pub struct QaServer {
    addr: SocketAddr,
    max_upload_bytes: usize,
    state: AppState,
}

impl QaServer {
    #[must_use]
    pub(crate) fn new(bind: &str, port: u16, state: AppState) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("server binding to 0.0.0.0, reachable from other hosts");
        }

        Self {
            addr,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            state,
        }
    }

    #[must_use]
    pub fn with_max_upload_bytes(mut self, size: usize) -> Self {
        self.max_upload_bytes = size;
        self
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server hits a
    /// fatal I/O error.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state, self.max_upload_bytes);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::Bind(self.addr.to_string(), e))?;
        tracing::info!("listening on http://{}", self.addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("shutting down");
            })
            .await
            .map_err(|e| ServerError::Server(format!("{e}")))?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pdf_qa_core::mock::MockChatModel;
    use pdf_qa_core::{CharacterNgramEmbedder, ChatModel, QaOptions};
    use std::path::Path;

    /// State backed by the offline embedder and a local collection in `dir`.
    pub(crate) fn test_state(dir: &Path, chat: Arc<dyn ChatModel>, top_k: usize) -> AppState {
        let upload_dir = dir.join("uploads");
        std::fs::create_dir_all(&upload_dir).unwrap();
        AppState::new(
            StoreConfig {
                persist_dir: dir.join("vector-db"),
                ..StoreConfig::default()
            },
            Arc::new(CharacterNgramEmbedder::default()),
            QaOrchestrator::new(
                chat,
                QaOptions {
                    top_k,
                    ..QaOptions::default()
                },
            ),
            ChunkingConfig::default(),
            upload_dir,
        )
    }

    #[test]
    fn invalid_bind_falls_back_to_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), Arc::new(MockChatModel::echo()), 4);
        let server = QaServer::new("not an address", 8000, state).with_max_upload_bytes(512);

        assert_eq!(server.addr, SocketAddr::from(([127, 0, 0, 1], 8000)));
        assert_eq!(server.max_upload_bytes, 512);
    }

    #[tokio::test]
    async fn index_is_opened_once_and_shared() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), Arc::new(MockChatModel::echo()), 4);
        assert!(state.index.get().is_none());

        let first = state.index().await.unwrap();
        let second = state.index().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.collection(), "collection");
    }
}
