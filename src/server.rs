//! Read-only HTTP API over the commit store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/commits/recent?since=YYYY-MM-DD` | Commits after `since`, newest first |
//! | `GET`  | `/stats` | Row counts per table |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid date 'x': ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! Ingestion is not exposed here; run `cfeed sync` for that.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use commitfeed_core::models::{RecentCommit, RowCounts};
use commitfeed_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::recent::{default_since, parse_since, recent_sorted};
use crate::sqlite_store::SqliteStore;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn Store>,
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let app = router(Arc::new(SqliteStore::new(pool)));

    let bind_addr = config.server.bind.clone();
    println!("commitfeed server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router over any store.
pub fn router(store: Arc<dyn Store>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/commits/recent", get(handle_recent))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(AppState { store })
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

fn internal(err: impl std::fmt::Display) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
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

// ============ GET /commits/recent ============

#[derive(Deserialize)]
struct RecentParams {
    since: Option<String>,
}

#[derive(Serialize)]
struct RecentResponse {
    since: String,
    commits: Vec<RecentCommit>,
}

async fn handle_recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<RecentResponse>, AppError> {
    let since = match params.since.as_deref() {
        Some(value) => parse_since(value).map_err(|e| bad_request(e.to_string()))?,
        None => default_since(),
    };

    let commits = recent_sorted(state.store.as_ref(), since)
        .await
        .map_err(internal)?;

    Ok(Json(RecentResponse {
        since: crate::sqlite_store::format_date(&since),
        commits,
    }))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<RowCounts>, AppError> {
    let counts = state.store.counts().await.map_err(internal)?;
    Ok(Json(counts))
}
