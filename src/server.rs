//! `axum` HTTP surface wrapping [`StorageManager`]. Every handler opens a
//! fresh [`CancellationToken`] tied to the request and maps [`LayerFsError`]
//! onto an HTTP status code.

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::LayerFsError;
use crate::manager::StorageManager;
use crate::metrics;

#[derive(Clone)]
struct AppState {
    manager: StorageManager,
}

pub async fn run_server(config: Config, manager: StorageManager) -> anyhow::Result<()> {
    metrics::init();

    let state = AppState { manager };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/files", get(list_files).post(insert_file))
        .route("/files/:name/size", get(size_of))
        .route("/files/:name/read", get(read_file))
        .route("/files/:name/write", axum::routing::post(write_file))
        .route("/files/:name/checkpoint", axum::routing::post(checkpoint_file))
        .route(
            "/files/:name/head",
            get(get_head).post(set_head).delete(delete_head),
        )
        .route("/files/:name/versions", get(list_versions))
        .route("/heads", get(list_heads))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Wraps every request with the same `layerfs_requests_total` /
/// `layerfs_request_errors_total` / `layerfs_request_duration_seconds`
/// bookkeeping the teacher's `experiment_handler` did inline, generalized
/// here into one layer so every route gets it instead of just one handler.
async fn metrics_middleware(req: Request, next: Next) -> Response {
    metrics::REQUEST_TOTAL.inc();
    let timer = metrics::REQUEST_DURATION.start_timer();

    let response = next.run(req).await;

    timer.observe_duration();
    if response.status().is_server_error() {
        metrics::REQUEST_ERRORS.inc();
    }

    response
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "layerfs",
    }))
}

#[derive(Deserialize)]
struct InsertFileRequest {
    name: String,
}

async fn insert_file(
    State(state): State<AppState>,
    Json(req): Json<InsertFileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = state.manager.insert_file(&req.name)?;
    Ok(Json(serde_json::json!({ "file_id": id, "name": req.name })))
}

async fn list_files(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    let files = state.manager.list_files(&token).await?;
    Ok(Json(
        files
            .into_iter()
            .map(|(id, name)| serde_json::json!({ "file_id": id, "name": name }))
            .collect::<Vec<_>>(),
    ))
}

async fn size_of(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    let size = state.manager.size_of(&token, &name).await?;
    Ok(Json(serde_json::json!({ "size": size })))
}

#[derive(Deserialize)]
struct ReadQuery {
    offset: u64,
    size: u64,
}

async fn read_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<ReadQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    let data = state.manager.read(&token, &name, q.offset, q.size).await?;
    metrics::BYTES_READ_TOTAL.inc_by(data.len() as u64);
    Ok(([("content-type", "application/octet-stream")], data))
}

#[derive(Deserialize)]
struct WriteQuery {
    offset: u64,
}

async fn write_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<WriteQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    state.manager.write(&token, &name, &body, q.offset).await?;
    metrics::BYTES_WRITTEN_TOTAL.inc_by(body.len() as u64);
    update_active_layers_gauge(&state, &token).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct TagRequest {
    tag: String,
}

async fn checkpoint_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<TagRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    match state.manager.checkpoint(&token, &name, &req.tag).await {
        Ok(()) => {
            metrics::CHECKPOINTS_TOTAL.inc();
            update_active_layers_gauge(&state, &token).await;
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            metrics::CHECKPOINT_ERRORS.inc();
            Err(e.into())
        }
    }
}

/// Refreshes `layerfs_active_layers` after an operation that can change how
/// many files hold an active layer. Best-effort: a failure here (e.g. the
/// token firing) just leaves the gauge at its previous value.
async fn update_active_layers_gauge(state: &AppState, token: &CancellationToken) {
    if let Ok(count) = state.manager.active_layer_count(token).await {
        metrics::ACTIVE_LAYERS.set(count as i64);
    }
}

async fn get_head(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    let tag = state.manager.get_head(&token, &name).await?;
    Ok(Json(serde_json::json!({ "tag": tag })))
}

async fn set_head(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<TagRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    state.manager.set_head(&token, &name, &req.tag).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_head(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    state.manager.delete_head(&token, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_versions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    let versions = state.manager.list_versions(&token, &name).await?;
    Ok(Json(versions))
}

async fn list_heads(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let token = CancellationToken::new();
    let heads = state.manager.list_heads(&token).await?;
    Ok(Json(
        heads
            .into_iter()
            .map(|(name, tag)| serde_json::json!({ "name": name, "tag": tag }))
            .collect::<Vec<_>>(),
    ))
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics::REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}

/// Not-found conditions map to 404, the read-only invariant to 409,
/// malformed catalog data to 422, cancellation to 499, everything else to
/// 500.
struct AppError(LayerFsError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LayerFsError::NotFound(_) | LayerFsError::VersionNotFound { .. } => StatusCode::NOT_FOUND,
            LayerFsError::ReadOnly(_) => StatusCode::CONFLICT,
            LayerFsError::InvalidRange(_) | LayerFsError::CorruptChunk { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LayerFsError::Cancelled(_) => StatusCode::from_u16(499).unwrap(),
            LayerFsError::CatalogError { .. }
            | LayerFsError::CatalogPoolError(_)
            | LayerFsError::ObjectStoreError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, "request rejected");
        }

        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<LayerFsError> for AppError {
    fn from(err: LayerFsError) -> Self {
        Self(err)
    }
}
