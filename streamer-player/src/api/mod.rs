//! HTTP control surface
//!
//! Transport commands and session status over REST, session changes over
//! SSE. Handlers never touch playback state directly: every request becomes
//! a message to the coordinator through its handle.

pub mod handlers;
pub mod sse;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use streamer_common::events::EventBus;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::playback::coordinator::CoordinatorHandle;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub handle: CoordinatorHandle,
    pub events: EventBus,
    pub port: u16,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))

        // Session status
        .route("/playback/state", get(handlers::get_playback_state))

        // Transport controls
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/stop", post(handlers::stop))
        .route("/playback/next", post(handlers::skip_next))
        .route("/playback/previous", post(handlers::skip_previous))
        .route("/playback/seek", post(handlers::seek))

        // Queue
        .route("/playback/queue", post(handlers::open_queue))
        .route("/playback/queue/skip", post(handlers::skip_to_queue_item))

        // SSE event stream
        .route("/events", get(sse::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run(
    ctx: AppContext,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.port));
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
