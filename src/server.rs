//! HTTP entry point.
//!
//! Exposes the pipeline behind a small JSON API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/generate` | Generate (or fetch from cache) the document for a repository |
//! | `GET` | `/health` | Health check |
//!
//! # Request
//!
//! ```json
//! {
//!   "repoName": "billing-service",
//!   "workspaceName": "acme",
//!   "orgAdminEmail": "admin@acme.io",
//!   "accessToken": "app-password",
//!   "previousHtmlContent": "<h2>Service Overview</h2>..."
//! }
//! ```
//!
//! # Responses
//!
//! A success is `200` with `{ "statusCode": 200, "htmlContent", "title",
//! "cached" }`. Failures never carry a partial document:
//!
//! | Status | Code | Cause |
//! |--------|------|-------|
//! | 400 | `bad_request` | malformed request body |
//! | 502 | `upstream_unavailable` | source host refused or unreachable |
//! | 500 | `cache_error`, `snapshot_error`, `no_source_files`, `generation_failed` | everything else |

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::models::{DocRequest, DocResponse};
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Routes with CORS, ready to serve or to drive from tests.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(handle_generate))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = pipeline.config().server.bind.clone();
    let app = build_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", bind_addr);
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
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match err {
            PipelineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /generate ============

async fn handle_generate(
    State(state): State<AppState>,
    body: Result<Json<DocRequest>, JsonRejection>,
) -> Result<Json<DocResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;

    let outcome = state.pipeline.run(&req).await.map_err(|e| {
        error!(repo = %req.repo_name, code = e.code(), "generation failed: {}", e);
        AppError::from(e)
    })?;

    Ok(Json(DocResponse {
        status_code: StatusCode::OK.as_u16(),
        html_content: outcome.html,
        title: outcome.title,
        cached: outcome.cached,
    }))
}
