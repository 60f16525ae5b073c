pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod stores;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use chunking::{split_pages, split_text, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{IndexError, IngestError, LlmError, QaError};
pub use extractor::{extract_pages, LopdfExtractor, PdfExtractor};
pub use ingest::{digest_file, ingest_pdf, load_chunks, replace_index, LoadedDocument};
pub use llm::{ChatModel, Message, OpenAiChat, Role, DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL};
pub use models::{
    Answer, Chunk, ChunkMetadata, IndexEntry, IngestionReport, Page, QaOptions, SearchHit,
    StoreBackend, StoreConfig, DEFAULT_COLLECTION, DEFAULT_PERSIST_DIR,
};
pub use orchestrator::QaOrchestrator;
pub use session::Session;
pub use store::IndexHandle;
pub use stores::{LocalCollection, QdrantStore};
pub use traits::VectorIndex;
