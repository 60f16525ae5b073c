use pdf_qa_core::mock::{text_pdf, MockChatModel};
use pdf_qa_core::{
    ingest_pdf, CharacterNgramEmbedder, ChunkingConfig, IndexHandle, QaError, QaOptions,
    QaOrchestrator, Session, StoreConfig,
};
use std::sync::Arc;
use tempfile::tempdir;

const PAGES: [&str; 3] = [
    "Quarterly summary for the northern region warehouse.",
    "invoice total: $42",
    "Shipping schedule and carrier contact list.",
];

async fn indexed_session(
    dir: &std::path::Path,
) -> Result<(Session, Arc<IndexHandle>), Box<dyn std::error::Error>> {
    let pdf_path = dir.join("upload.pdf");
    std::fs::write(&pdf_path, text_pdf(&PAGES))?;

    let config = StoreConfig {
        persist_dir: dir.join("vector-db"),
        ..StoreConfig::default()
    };
    let index = Arc::new(
        IndexHandle::initialize(&config, Arc::new(CharacterNgramEmbedder::default())).await?,
    );

    let session = Session::new();
    let report = ingest_pdf(
        &session,
        index.clone(),
        &pdf_path,
        "invoice.pdf",
        ChunkingConfig::default(),
    )
    .await?;
    assert_eq!(report.pages, 3);
    assert_eq!(report.indexed, 3);

    Ok((session, index))
}

#[tokio::test]
async fn answer_is_sourced_from_the_page_holding_the_fact() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempdir()?;
    let (session, _index) = indexed_session(dir.path()).await?;
    let orchestrator = QaOrchestrator::new(
        Arc::new(MockChatModel::echo()),
        QaOptions {
            top_k: 1,
            ..QaOptions::default()
        },
    );

    let answer = orchestrator
        .answer(&session, "what is the invoice total?")
        .await?;

    assert!(answer.answer.contains("$42"));
    assert_eq!(answer.source_documents.len(), 1);
    assert_eq!(answer.source_documents[0].page, 2);
    assert_eq!(answer.source_documents[0].source, "invoice.pdf");

    let json = serde_json::to_value(&answer)?;
    assert_eq!(json["source_documents"][0]["page"], 2);
    Ok(())
}

#[tokio::test]
async fn wider_retrieval_still_ranks_the_matching_page_first(
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let (session, _index) = indexed_session(dir.path()).await?;
    let orchestrator = QaOrchestrator::new(
        Arc::new(MockChatModel::echo()),
        QaOptions {
            top_k: 4,
            ..QaOptions::default()
        },
    );

    let answer = orchestrator
        .answer(&session, "what is the invoice total?")
        .await?;

    assert_eq!(answer.source_documents.len(), 3);
    assert_eq!(answer.source_documents[0].page, 2);
    Ok(())
}

#[tokio::test]
async fn default_options_return_the_single_best_chunk() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let (session, _index) = indexed_session(dir.path()).await?;
    let orchestrator = QaOrchestrator::new(Arc::new(MockChatModel::echo()), QaOptions::default());

    let answer = orchestrator
        .answer(&session, "what is the invoice total?")
        .await?;

    assert_eq!(answer.source_documents.len(), 1);
    assert_eq!(answer.source_documents[0].page, 2);
    Ok(())
}

#[tokio::test]
async fn querying_before_any_upload_reports_no_document() {
    let orchestrator = QaOrchestrator::new(Arc::new(MockChatModel::echo()), QaOptions::default());
    let result = orchestrator
        .answer(&Session::new(), "what is the invoice total?")
        .await;
    assert!(matches!(result, Err(QaError::NoDocumentIndexed)));
}

#[tokio::test]
async fn persisted_collection_answers_after_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let (_session, index) = indexed_session(dir.path()).await?;
    drop(index);

    let config = StoreConfig {
        persist_dir: dir.path().join("vector-db"),
        ..StoreConfig::default()
    };
    let reopened =
        IndexHandle::initialize(&config, Arc::new(CharacterNgramEmbedder::default())).await?;
    assert_eq!(reopened.len().await?, 3);

    let orchestrator = QaOrchestrator::new(Arc::new(MockChatModel::echo()), QaOptions::default());
    let answer = orchestrator
        .answer_with(&reopened, "what is the invoice total?")
        .await?;
    assert_eq!(answer.source_documents[0].page, 2);
    Ok(())
}
