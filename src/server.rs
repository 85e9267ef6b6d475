use std::{path::Path, sync::Arc};

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    config::ScanOptions,
    error::ScanError,
    export,
    geoip::GeoLocator,
    scanner,
    store::ScanStore,
    types::{ScanRequest, ScanResult},
};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub options: ScanOptions,
    pub store: Arc<ScanStore>,
    pub geo: Arc<dyn GeoLocator>,
    /// Cancelled on shutdown; running scans return their partial results.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(options: ScanOptions, geo: Arc<dyn GeoLocator>) -> Self {
        Self {
            options,
            store: Arc::new(ScanStore::new()),
            geo,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Errors surfaced to HTTP clients as `{ "error": ..., "message": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ApiErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, key, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ApiErrorBody { error: key, message })).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}

/// API routes plus a static-file fallback rooted at `static_dir`.
pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/export/json", get(export_json))
        .route("/export/csv", get(export_csv))
        .with_state(state);

    let static_svc = ServeDir::new(static_dir.as_ref()).append_index_html_on_directories(true);

    api.fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

/// Bind `bind` and serve until `state.shutdown` is cancelled.
pub async fn spawn_server(bind: &str, state: AppState, static_dir: impl AsRef<Path>) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state, static_dir);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving UI");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn post_scan(
    State(app): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ScanResult>, ApiError> {
    // Reject before any lookup or dial happens.
    req.validate()?;

    let (scan, geoip) = tokio::join!(
        scanner::run_scan_with_cancel(&req, &app.options, app.shutdown.clone()),
        app.geo.lookup(req.target.trim()),
    );
    let result = scan?.with_geoip(geoip);

    app.store.replace(result.clone()).await;
    Ok(Json(result))
}

async fn export_json(State(app): State<AppState>) -> Result<Response, ApiError> {
    let last = latest(&app).await?;
    let body = export::to_json(&last)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, "attachment; filename=scan_result.json"),
        ],
        body,
    )
        .into_response())
}

async fn export_csv(State(app): State<AppState>) -> Result<Response, ApiError> {
    let last = latest(&app).await?;
    let body = export::to_csv(&last)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=scan_result.csv"),
        ],
        body,
    )
        .into_response())
}

async fn latest(app: &AppState) -> Result<Arc<ScanResult>, ApiError> {
    app.store
        .latest()
        .await
        .ok_or_else(|| ApiError::NotFound("no scan result available".into()))
}
