use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunk parameters: overlap {overlap} must be smaller than size {size}")]
    InvalidChunkParameters { size: usize, overlap: usize },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("indexing failed after {committed} of {total} chunks: {reason}")]
    IndexingFailed {
        committed: usize,
        total: usize,
        reason: String,
    },

    #[error("collection unavailable: {0}")]
    CollectionUnavailable(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] LlmError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("request to {provider} timed out")]
    Timeout { provider: String },

    #[error("rate limited by provider")]
    RateLimited,

    #[error("{provider} request failed (status {status})")]
    Api { provider: String, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid provider config: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                provider: error
                    .url()
                    .and_then(|url| url.host_str().map(str::to_string))
                    .unwrap_or_else(|| "provider".to_string()),
            }
        } else {
            Self::Http(error)
        }
    }
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("no document has been indexed yet")]
    NoDocumentIndexed,

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] IndexError),

    #[error("generation failed: {0}")]
    Generation(#[source] LlmError),
}
