use std::path::Path;

use axum::body::Bytes;
use axum::extract::multipart::Multipart;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::{Form, Json};
use pdf_qa_core::{load_chunks, replace_index, Answer, IngestError};

use super::error::ApiError;
use super::server::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const UPLOAD_FIELD: &str = "file";

#[derive(serde::Deserialize)]
pub(crate) struct QueryForm {
    pub query: String,
}

#[derive(serde::Serialize)]
struct UploadResponse {
    message: &'static str,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    indexed: bool,
    uptime_secs: u64,
}

struct UploadedPdf {
    file_name: String,
    bytes: Bytes,
}

pub(crate) async fn home_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        indexed: state.session.is_indexed().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_pdf_field(&mut multipart).await?;

    // Removed from disk when dropped, whichever way this handler exits.
    let temp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".pdf")
        .tempfile_in(state.upload_dir.as_path())?;
    tokio::fs::write(temp.path(), &upload.bytes).await?;
    tracing::debug!(
        file = %upload.file_name,
        bytes = upload.bytes.len(),
        path = %temp.path().display(),
        "upload stored"
    );

    let document = load_chunks(temp.path(), &upload.file_name, state.chunking).await?;
    let index = state.index().await.map_err(IngestError::from)?;
    let report = replace_index(&state.session, index, document).await?;

    tracing::info!(
        source = %report.source,
        checksum = %report.checksum,
        pages = report.pages,
        chunks = report.indexed,
        "pdf uploaded"
    );

    Ok(Json(UploadResponse {
        message: "PDF uploaded and indexed successfully!",
    }))
}

pub(crate) async fn query_handler(
    State(state): State<AppState>,
    form: Result<Form<QueryForm>, FormRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Form(form) = form?;
    let answer = state
        .orchestrator
        .answer(&state.session, &form.query)
        .await?;
    Ok(Json(answer))
}

/// Takes the `file` field, rejecting non-PDF names before the body is read.
async fn read_pdf_field(multipart: &mut Multipart) -> Result<UploadedPdf, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(pdf_file_name)
            .ok_or(ApiError::InvalidFileType)?;
        let bytes = field.bytes().await?;
        return Ok(UploadedPdf { file_name, bytes });
    }

    Err(ApiError::MissingField(UPLOAD_FIELD))
}

/// Final path component of a client-supplied name, if it ends in `.pdf`.
fn pdf_file_name(raw: &str) -> Option<String> {
    let path = Path::new(raw);
    let is_pdf = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return None;
    }
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_names_are_matched_case_insensitively() {
        assert_eq!(pdf_file_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(pdf_file_name("REPORT.PDF").as_deref(), Some("REPORT.PDF"));
        assert_eq!(pdf_file_name("nested/dir/a.Pdf").as_deref(), Some("a.Pdf"));
    }

    #[test]
    fn other_names_are_rejected() {
        assert!(pdf_file_name("notes.txt").is_none());
        assert!(pdf_file_name("pdf").is_none());
        assert!(pdf_file_name("archive.pdf.zip").is_none());
        assert!(pdf_file_name("").is_none());
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            indexed: false,
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"status":"ok","indexed":false,"uptime_secs":42}"#);
    }
}
