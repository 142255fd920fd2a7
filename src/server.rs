//! HTTP server for the question-answering service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness plus store status |
//! | `POST` | `/query` | Answer a question: `{"question": "..."}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "inappropriate_query", "message": "Inappropriate query" } }
//! ```
//!
//! Error codes: `no_question` (400), `inappropriate_query` (400),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends can
//! call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::service::{Answer, QueryError, RagService};

/// Builds the application router around a shared service.
pub fn router(service: Arc<RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/query", post(handle_query))
        .layer(cors)
        .with_state(service)
}

/// Binds `bind_addr` and serves until the process is terminated.
pub async fn run_server(bind_addr: &str, service: Arc<RagService>) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"no_question"`).
    code: &'static str,
    message: String,
}

/// Converts a [`QueryError`] into an HTTP response.
struct AppError(QueryError);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0 {
            QueryError::MissingQuestion | QueryError::Inappropriate => StatusCode::BAD_REQUEST,
            QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self.0 {
            QueryError::MissingQuestion => "no_question",
            QueryError::Inappropriate => "inappropriate_query",
            QueryError::Internal(_) => "internal",
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let QueryError::Internal(detail) = &self.0 {
            tracing::error!("query failed: {}", detail);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.0.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// The store is opened before the service exists, so this is always
    /// true once serving; an empty store still counts as loaded.
    loaded: bool,
    num_chunks: usize,
}

async fn handle_health(State(service): State<Arc<RagService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        loaded: true,
        num_chunks: service.stats().num_chunks,
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    question: Option<String>,
}

/// Handler for `POST /query`.
///
/// A body that is not a JSON object with a string `question` is treated as a
/// missing question. The pipeline runs in its own task so that a panic inside
/// it is reported as a 500 instead of dropping the connection.
async fn handle_query(
    State(service): State<Arc<RagService>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let question = body
        .ok()
        .and_then(|Json(req)| req.question)
        .ok_or(QueryError::MissingQuestion)?;

    let answer = tokio::spawn(async move { service.answer(&question).await })
        .await
        .map_err(|e| QueryError::Internal(e.to_string()))??;

    Ok(Json(answer))
}
