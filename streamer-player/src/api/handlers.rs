//! HTTP request handlers
//!
//! Commands are resolved through `TransportControls` for the coordinator's
//! session token, so a released session answers every command with an
//! error instead of silently queueing it.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AppContext;
use crate::error::Error;
use crate::playback::coordinator::{OpenRequest, SessionStatus, TransportControls};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct SkipToItemRequest {
    queue_id: u64,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::ChannelClosed | Error::InvalidSession(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Request failed ({}): {}", status, e);
    (status, Json(StatusResponse::error(e.to_string())))
}

fn controls(ctx: &AppContext) -> ApiResult<TransportControls> {
    ctx.handle.controls(&ctx.handle.token()).map_err(api_error)
}

// ============================================================================
// Health / Status
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "streamer-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
    })
}

/// GET /playback/state
pub async fn get_playback_state(State(ctx): State<AppContext>) -> ApiResult<Json<SessionStatus>> {
    let status = ctx.handle.status().await.map_err(api_error)?;
    Ok(Json(status))
}

// ============================================================================
// Transport Controls
// ============================================================================

pub async fn play(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    controls(&ctx)?.play().await.map_err(api_error)?;
    info!("Play command accepted");
    Ok(Json(StatusResponse::ok()))
}

pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    controls(&ctx)?.pause().await.map_err(api_error)?;
    info!("Pause command accepted");
    Ok(Json(StatusResponse::ok()))
}

pub async fn stop(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    controls(&ctx)?.stop().await.map_err(api_error)?;
    info!("Stop command accepted");
    Ok(Json(StatusResponse::ok()))
}

pub async fn skip_next(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    controls(&ctx)?.skip_to_next().await.map_err(api_error)?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn skip_previous(State(ctx): State<AppContext>) -> ApiResult<Json<StatusResponse>> {
    controls(&ctx)?.skip_to_previous().await.map_err(api_error)?;
    Ok(Json(StatusResponse::ok()))
}

/// POST /playback/seek `{ "position_ms": 12000 }`
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<Json<StatusResponse>> {
    controls(&ctx)?
        .seek_to(req.position_ms)
        .await
        .map_err(api_error)?;
    Ok(Json(StatusResponse::ok()))
}

// ============================================================================
// Queue
// ============================================================================

/// POST /playback/queue - load a track list and select a track
///
/// `{ "tracks": [...], "selected": 2, "command": "play" }`; omit `tracks`
/// to resume the loaded list.
pub async fn open_queue(
    State(ctx): State<AppContext>,
    Json(req): Json<OpenRequest>,
) -> ApiResult<Json<StatusResponse>> {
    if let (Some(tracks), Some(selected)) = (&req.tracks, req.selected) {
        if selected >= tracks.len() {
            return Err(api_error(Error::BadRequest(format!(
                "selected track {} out of range for {} tracks",
                selected,
                tracks.len()
            ))));
        }
    }

    info!(
        "Open queue: {} tracks, selected {:?}, command {:?}",
        req.tracks.as_ref().map_or(0, Vec::len),
        req.selected,
        req.command
    );
    controls(&ctx)?.open(req).await.map_err(api_error)?;
    Ok(Json(StatusResponse::ok()))
}

/// POST /playback/queue/skip `{ "queue_id": 3 }`
pub async fn skip_to_queue_item(
    State(ctx): State<AppContext>,
    Json(req): Json<SkipToItemRequest>,
) -> ApiResult<Json<StatusResponse>> {
    controls(&ctx)?
        .skip_to_queue_item(req.queue_id)
        .await
        .map_err(api_error)?;
    Ok(Json(StatusResponse::ok()))
}
