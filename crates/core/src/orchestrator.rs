use crate::llm::{ChatModel, Message};
use crate::session::Session;
use crate::store::IndexHandle;
use crate::{Answer, IndexError, LlmError, QaError, QaOptions, SearchHit};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "Use the following pieces of context from the uploaded document to \
answer the user's question. If the answer is not contained in the context, say that you don't \
know instead of making one up.";

/// Answers questions from the retrieved chunks of the indexed document.
///
/// Every call is independent: no conversation history is kept between
/// questions.
pub struct QaOrchestrator {
    chat: Arc<dyn ChatModel>,
    options: QaOptions,
}

impl QaOrchestrator {
    pub fn new(chat: Arc<dyn ChatModel>, options: QaOptions) -> Self {
        Self { chat, options }
    }

    /// Answers against whatever index the session currently holds. The
    /// session stays read-locked until the answer is ready.
    pub async fn answer(&self, session: &Session, question: &str) -> Result<Answer, QaError> {
        if question.trim().is_empty() {
            return Err(QaError::EmptyQuestion);
        }

        let view = session.get().await;
        let Some(index) = view.handle() else {
            return Err(QaError::NoDocumentIndexed);
        };

        self.answer_with(index, question).await
    }

    pub async fn answer_with(&self, index: &IndexHandle, question: &str) -> Result<Answer, QaError> {
        if question.trim().is_empty() {
            return Err(QaError::EmptyQuestion);
        }

        let hits = self.retrieve(index, question).await?;
        let messages = build_prompt(&hits, question);
        let answer = self.generate(&messages).await?;

        info!(
            collection = index.collection(),
            sources = hits.len(),
            model = self.chat.model_name(),
            "question answered"
        );

        Ok(Answer {
            answer,
            source_documents: hits.into_iter().map(|hit| hit.metadata).collect(),
        })
    }

    async fn retrieve(&self, index: &IndexHandle, question: &str) -> Result<Vec<SearchHit>, QaError> {
        let search = index.search(question, self.options.top_k);
        let hits = match tokio::time::timeout(self.options.retrieval_timeout, search).await {
            Ok(result) => result.map_err(QaError::Retrieval)?,
            Err(_) => {
                warn!(timeout = ?self.options.retrieval_timeout, "retrieval timed out");
                return Err(QaError::Retrieval(IndexError::Request(format!(
                    "search timed out after {:?}",
                    self.options.retrieval_timeout
                ))));
            }
        };

        debug!(
            hits = hits.len(),
            pages = ?hits.iter().map(|hit| hit.metadata.page).collect::<Vec<_>>(),
            "retrieved context"
        );
        Ok(hits)
    }

    async fn generate(&self, messages: &[Message]) -> Result<String, QaError> {
        let completion = self.chat.complete(messages);
        match tokio::time::timeout(self.options.generation_timeout, completion).await {
            Ok(result) => result.map_err(QaError::Generation),
            Err(_) => {
                warn!(timeout = ?self.options.generation_timeout, "generation timed out");
                Err(QaError::Generation(LlmError::Timeout {
                    provider: self.chat.model_name().to_string(),
                }))
            }
        }
    }
}

pub fn build_prompt(hits: &[SearchHit], question: &str) -> Vec<Message> {
    let context = hits
        .iter()
        .map(|hit| hit.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        Message::system(format!("{SYSTEM_PROMPT}\n----------------\n{context}")),
        Message::user(question.trim()),
    ]
}
