use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, home_handler, query_handler, upload_handler};
use super::server::AppState;

pub(crate) fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let upload = Router::new()
        .route("/upload", post(upload_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes));

    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/query", post(query_handler))
        .merge(upload)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
