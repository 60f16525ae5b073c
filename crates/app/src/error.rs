use axum::extract::multipart::MultipartError;
use axum::extract::rejection::FormRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pdf_qa_core::{IngestError, QaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

/// Request failures, rendered as `{"detail": ...}` bodies.
#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("Invalid file type. Please upload a PDF.")]
    InvalidFileType,

    #[error("Field '{0}' is required.")]
    MissingField(&'static str),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{}", .0.body_text())]
    Form(#[from] FormRejection),

    #[error("No PDF uploaded. Please upload a PDF first.")]
    NoDocumentIndexed,

    #[error("Query must not be empty.")]
    EmptyQuery,

    #[error("An error occurred: {0}")]
    Upload(#[from] IngestError),

    #[error("An error occurred: {0}")]
    Query(QaError),

    #[error("An error occurred: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QaError> for ApiError {
    fn from(error: QaError) -> Self {
        match error {
            QaError::NoDocumentIndexed => Self::NoDocumentIndexed,
            QaError::EmptyQuestion => Self::EmptyQuery,
            other => Self::Query(other),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidFileType | Self::NoDocumentIndexed => StatusCode::BAD_REQUEST,
            Self::MissingField(_) | Self::EmptyQuery => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Multipart(error) => error.status(),
            Self::Form(rejection) => rejection.status(),
            Self::Upload(_) | Self::Query(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }

        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_qa_core::LlmError;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(ApiError::InvalidFileType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(QaError::NoDocumentIndexed).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(QaError::EmptyQuestion).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn backend_errors_map_to_500_with_prefixed_detail() {
        let error = ApiError::from(QaError::Generation(LlmError::RateLimited));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.to_string().starts_with("An error occurred: "));

        let error = ApiError::from(IngestError::UnreadableDocument("x.pdf".to_string()));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error.to_string(),
            "An error occurred: unreadable document: x.pdf"
        );
    }
}
