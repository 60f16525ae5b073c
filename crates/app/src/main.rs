mod error;
mod handlers;
mod router;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_qa_core::ingest::source_name;
use pdf_qa_core::{
    ingest_pdf, CharacterNgramEmbedder, ChatModel, ChunkingConfig, Embedder, IndexHandle,
    OpenAiChat, OpenAiEmbedder, QaOptions, QaOrchestrator, Session, StoreBackend, StoreConfig,
    DEFAULT_CHAT_MODEL, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_PERSIST_DIR,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::server::{AppState, QaServer, DEFAULT_MAX_UPLOAD_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// OpenAI embeddings endpoint.
    Openai,
    /// Offline character trigram hashing.
    Ngram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// JSON collection file under the persist directory.
    Local,
    /// Qdrant over its REST API.
    Qdrant,
}

impl From<StoreKind> for StoreBackend {
    fn from(kind: StoreKind) -> Self {
        match kind {
            StoreKind::Local => StoreBackend::Local,
            StoreKind::Qdrant => StoreBackend::Qdrant,
        }
    }
}

#[derive(Parser)]
#[command(name = "pdf-qa", version, about = "Upload a PDF and ask questions about it")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI API key, required by the OpenAI embedder and chat model
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Chat completion model
    #[arg(long, global = true, env = "PDF_QA_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Embedding model used by the OpenAI embedder
    #[arg(
        long,
        global = true,
        env = "PDF_QA_EMBEDDING_MODEL",
        default_value = DEFAULT_EMBEDDING_MODEL
    )]
    embedding_model: String,

    /// Embedding provider
    #[arg(long, global = true, env = "PDF_QA_EMBEDDER", value_enum, default_value_t = EmbedderKind::Openai)]
    embedder: EmbedderKind,

    /// Vector store backend
    #[arg(long, global = true, env = "PDF_QA_STORE", value_enum, default_value_t = StoreKind::Local)]
    store: StoreKind,

    /// Qdrant base URL
    #[arg(long, global = true, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Directory holding local collections
    #[arg(long, global = true, env = "PDF_QA_PERSIST_DIR", default_value = DEFAULT_PERSIST_DIR)]
    persist_dir: PathBuf,

    /// Collection name
    #[arg(long, global = true, env = "PDF_QA_COLLECTION", default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Maximum chunk length in characters
    #[arg(long, global = true, env = "PDF_QA_CHUNK_SIZE", default_value = "800")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, global = true, env = "PDF_QA_CHUNK_OVERLAP", default_value = "80")]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, global = true, env = "PDF_QA_TOP_K", default_value = "1")]
    top_k: usize,

    /// Timeout for each embedding, store and chat request
    #[arg(long, global = true, env = "PDF_QA_REQUEST_TIMEOUT_SECS", default_value = "60")]
    request_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Address to bind.
        #[arg(long, env = "PDF_QA_BIND", default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on.
        #[arg(long, env = "PDF_QA_PORT", default_value = "8000")]
        port: u16,
        /// Directory for temporary uploads. Defaults to the system temp dir.
        #[arg(long, env = "PDF_QA_UPLOAD_DIR")]
        upload_dir: Option<PathBuf>,
        /// Maximum upload body size in bytes.
        #[arg(long, env = "PDF_QA_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },
    /// Index a PDF into the persistent collection, replacing its contents.
    Ingest {
        /// PDF file to index.
        #[arg(long)]
        file: PathBuf,
    },
    /// Answer a question against the persisted collection.
    Ask {
        /// Question text.
        #[arg(long)]
        query: String,
    },
}

impl Cli {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn api_key(&self, purpose: &str) -> anyhow::Result<&str> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| {
                format!("OPENAI_API_KEY (or --openai-api-key) is required for the {purpose}")
            })
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder::default()),
            EmbedderKind::Openai => Arc::new(OpenAiEmbedder::new(
                self.api_key("OpenAI embedder")?,
                self.openai_base_url.as_str(),
                self.embedding_model.as_str(),
                self.request_timeout(),
            )?),
        };
        Ok(embedder)
    }

    fn chat_model(&self) -> anyhow::Result<Arc<dyn ChatModel>> {
        let chat = OpenAiChat::new(
            self.api_key("chat model")?,
            self.openai_base_url.as_str(),
            self.chat_model.as_str(),
            self.request_timeout(),
        )?;
        Ok(Arc::new(chat))
    }

    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            backend: self.store.into(),
            collection: self.collection.clone(),
            persist_dir: self.persist_dir.clone(),
            qdrant_url: self.qdrant_url.clone(),
            ..StoreConfig::default()
        }
    }

    fn chunking(&self) -> anyhow::Result<ChunkingConfig> {
        Ok(ChunkingConfig::new(self.chunk_size, self.chunk_overlap)?)
    }

    fn qa_options(&self) -> QaOptions {
        QaOptions {
            top_k: self.top_k,
            retrieval_timeout: self.request_timeout(),
            generation_timeout: self.request_timeout(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-qa boot"
    );

    match &cli.command {
        Command::Serve {
            bind,
            port,
            upload_dir,
            max_upload_bytes,
        } => {
            let upload_dir = upload_dir.clone().unwrap_or_else(std::env::temp_dir);
            tokio::fs::create_dir_all(&upload_dir)
                .await
                .with_context(|| format!("creating upload dir {}", upload_dir.display()))?;

            let orchestrator = QaOrchestrator::new(cli.chat_model()?, cli.qa_options());
            let state = AppState::new(
                cli.store_config(),
                cli.embedder()?,
                orchestrator,
                cli.chunking()?,
                upload_dir,
            );

            QaServer::new(bind, *port, state)
                .with_max_upload_bytes(*max_upload_bytes)
                .serve(shutdown_signal())
                .await?;
        }
        Command::Ingest { file } => {
            let source = source_name(file)?;
            let chunking = cli.chunking()?;
            let index = Arc::new(IndexHandle::initialize(&cli.store_config(), cli.embedder()?).await?);

            let report = ingest_pdf(&Session::new(), index, file, &source, chunking).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Ask { query } => {
            let orchestrator = QaOrchestrator::new(cli.chat_model()?, cli.qa_options());
            let index = IndexHandle::initialize(&cli.store_config(), cli.embedder()?).await?;
            if index.is_empty().await? {
                anyhow::bail!(
                    "collection '{}' is empty; run `pdf-qa ingest --file <pdf>` first",
                    index.collection()
                );
            }

            let answer = orchestrator.answer_with(&index, query).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "ctrl-c handler unavailable, serving until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut cli = Cli::try_parse_from(args).unwrap();
        cli.openai_api_key = None;
        cli
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults() {
        let cli = parse(&["pdf-qa", "serve"]);
        let Command::Serve {
            bind,
            port,
            upload_dir,
            max_upload_bytes,
        } = &cli.command
        else {
            panic!("expected serve");
        };

        assert_eq!(bind, "127.0.0.1");
        assert_eq!(*port, 8000);
        assert!(upload_dir.is_none());
        assert_eq!(*max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(cli.chunking().unwrap(), ChunkingConfig::default());
        assert_eq!(cli.qa_options().top_k, 1);
        assert_eq!(cli.store_config().collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = parse(&[
            "pdf-qa",
            "ask",
            "--query",
            "total?",
            "--store",
            "qdrant",
            "--top-k",
            "2",
            "--embedder",
            "ngram",
        ]);

        assert_eq!(cli.store_config().backend, StoreBackend::Qdrant);
        assert_eq!(cli.qa_options().top_k, 2);
        assert_eq!(cli.embedder, EmbedderKind::Ngram);
    }

    #[test]
    fn openai_components_require_a_key() {
        let cli = parse(&["pdf-qa", "serve"]);

        let error = cli.chat_model().err().unwrap();
        assert!(error.to_string().contains("OPENAI_API_KEY"));
        assert!(cli.embedder().is_err());
    }

    #[test]
    fn ngram_embedder_needs_no_key() {
        let cli = parse(&["pdf-qa", "ingest", "--file", "a.pdf", "--embedder", "ngram"]);
        assert_eq!(cli.embedder().unwrap().model_name(), "char-trigram");
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        let cli = parse(&[
            "pdf-qa",
            "serve",
            "--chunk-size",
            "100",
            "--chunk-overlap",
            "100",
        ]);
        assert!(cli.chunking().is_err());
    }
}
