//! Streamer Player (streamer-player) - Main entry point
//!
//! Background playback service for catalog preview clips: loads the
//! configuration, starts the playback coordinator and serves the HTTP/SSE
//! control surface until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use streamer_common::config::{load_config, CONFIG_ENV_VAR};
use streamer_common::events::EventBus;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamer_player::api::{self, AppContext};
use streamer_player::notification::{
    forward_commands, HttpArtworkLoader, MediaControlsSink, NotificationPresenter,
    NotificationSink, TracingNotificationSink,
};
use streamer_player::playback::{CoordinatorSettings, PreviewRenderer};
use streamer_player::session::{EventBusListener, SessionToken};
use streamer_player::{CoordinatorHandle, PlaybackCoordinator};

/// Command-line arguments for streamer-player
#[derive(Parser, Debug)]
#[command(name = "streamer-player")]
#[command(about = "Preview playback service with transport controls")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "STREAMER_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamer_player=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = load_config(args.config.as_deref(), CONFIG_ENV_VAR)
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    info!("Starting Streamer Player on port {}", config.port);
    info!(
        "Preferences: notifications {}, country {}",
        if config.preferences.notifications_enabled { "on" } else { "off" },
        config.preferences.country
    );

    let events = EventBus::new(config.event_capacity);
    let token = SessionToken::new();

    let (renderer_tx, renderer_rx) = mpsc::unbounded_channel();
    let renderer = PreviewRenderer::new(renderer_tx)
        .context("Failed to create preview renderer")?;

    let mut coordinator = PlaybackCoordinator::new(
        CoordinatorSettings::from(&config),
        token,
        Box::new(renderer),
    )
    .context("Failed to create playback coordinator")?;

    let (handle, mailbox) = CoordinatorHandle::channel(token, config.event_capacity);

    coordinator.register_listener(Box::new(EventBusListener::new(events.clone())));
    if config.preferences.notifications_enabled {
        let loader = HttpArtworkLoader::new().context("Failed to create artwork loader")?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn NotificationSink> = match MediaControlsSink::spawn(command_tx) {
            Ok(sink) => {
                let controls = handle
                    .controls(&token)
                    .context("Failed to resolve transport controls")?;
                tokio::spawn(forward_commands(command_rx, controls));
                Arc::new(sink)
            }
            Err(e) => {
                warn!("Media controls unavailable ({}), logging notifications instead", e);
                Arc::new(TracingNotificationSink)
            }
        };
        coordinator.register_listener(Box::new(NotificationPresenter::new(sink, Arc::new(loader))));
    }
    let coordinator_task = tokio::spawn(coordinator.run(mailbox, renderer_rx));
    info!("Playback coordinator started (session {})", token);

    let ctx = AppContext {
        handle: handle.clone(),
        events,
        port: config.port,
    };
    api::run(ctx, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Err(e) = handle.shutdown().await {
        info!("Coordinator already stopped: {}", e);
    }
    match coordinator_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Playback coordinator aborted: {}", e),
        Err(e) => error!("Playback coordinator task failed: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
