use crate::chunking::{split_pages, ChunkingConfig};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::session::Session;
use crate::store::IndexHandle;
use crate::{Chunk, IngestError, IngestionReport};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Pages and chunks of one document, ready to be indexed.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub source: String,
    pub checksum: String,
    pub pages: usize,
    pub chunks: Vec<Chunk>,
}

/// Runs the loader and chunker on the blocking pool.
pub async fn load_chunks(
    path: &Path,
    source_name: &str,
    config: ChunkingConfig,
) -> Result<LoadedDocument, IngestError> {
    load_chunks_with(Arc::new(LopdfExtractor), path, source_name, config).await
}

pub async fn load_chunks_with(
    extractor: Arc<dyn PdfExtractor>,
    path: &Path,
    source_name: &str,
    config: ChunkingConfig,
) -> Result<LoadedDocument, IngestError> {
    config.validate()?;

    let path: PathBuf = path.to_path_buf();
    let source = source_name.to_string();
    tokio::task::spawn_blocking(move || {
        let checksum = digest_file(&path)?;
        let pages = extractor.extract_pages(&path, &source)?;
        let chunks = split_pages(&pages, config)?;

        info!(
            source = %source,
            checksum = %checksum,
            pages = pages.len(),
            chunks = chunks.len(),
            "document loaded"
        );

        Ok::<_, IngestError>(LoadedDocument {
            source,
            checksum,
            pages: pages.len(),
            chunks,
        })
    })
    .await?
}

/// Replaces the contents of `index` with `document` and makes it the
/// session's active index.
///
/// The session stays write-locked for the whole rebuild and is emptied
/// before the collection is touched. Only a completed rebuild installs the
/// handle again, so a failed or cancelled call leaves no index to query.
pub async fn replace_index(
    session: &Session,
    index: Arc<IndexHandle>,
    document: LoadedDocument,
) -> Result<IngestionReport, IngestError> {
    let mut swap = session.begin_swap().await;
    swap.detach();

    let rebuilt = async {
        index.clear().await?;
        index.add(&document.chunks).await
    }
    .await;

    match rebuilt {
        Ok(indexed) => {
            swap.swap(Arc::clone(&index));
            info!(
                source = %document.source,
                collection = index.collection(),
                indexed,
                "index replaced"
            );
            Ok(IngestionReport {
                source: document.source,
                checksum: document.checksum,
                pages: document.pages,
                chunks: document.chunks.len(),
                indexed,
            })
        }
        Err(error) => {
            warn!(source = %document.source, %error, "indexing failed, session cleared");
            swap.clear();
            Err(error.into())
        }
    }
}

/// Loads `path` and installs it as the session's index.
pub async fn ingest_pdf(
    session: &Session,
    index: Arc<IndexHandle>,
    path: &Path,
    source_name: &str,
    config: ChunkingConfig,
) -> Result<IngestionReport, IngestError> {
    let document = load_chunks(path, source_name, config).await?;
    replace_index(session, index, document).await
}

/// File name used as the `source` metadata of a path's chunks.
pub fn source_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}
