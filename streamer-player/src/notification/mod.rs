//! Notification presenter
//!
//! Mirrors the published session into a persistent transport-control
//! notification. The presenter keeps no playback state of its own: it
//! rebuilds the notification from the last snapshot and metadata it was
//! handed, starts foreground execution on the first playing/paused
//! publication, and tears everything down on stopped/none.
//!
//! Artwork is fetched in the background. The notification is posted at once
//! with a placeholder and re-posted with the image when it arrives, unless
//! the metadata changed or the notification was stopped in the meantime.
//! Loaded images are kept in a small cache that is emptied on stop.
//!
//! Sinks: `MediaControlsSink` publishes to the platform media controls
//! (MPRIS, Now Playing) and feeds their buttons back as transport commands;
//! `TracingNotificationSink` only logs, for headless hosts.

pub mod media_controls;

pub use media_controls::{forward_commands, MediaControlsSink};

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use streamer_common::events::PlaybackState;
use streamer_common::time::format_position;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::playback::catalog::TrackMetadata;
use crate::session::{PlaybackSnapshot, SessionListener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Previous,
    Play,
    Pause,
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artwork {
    Placeholder,
    Image(Arc<Vec<u8>>),
}

/// Most artwork images kept in memory
pub const ARTWORK_CACHE_CAPACITY: usize = 8;

/// Content of the transport-control notification
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub actions: Vec<NotificationAction>,
    pub artwork: Artwork,
    pub artwork_url: Option<String>,
    pub duration_ms: u64,
    /// Position when the notification was built
    pub position_ms: Option<u64>,
    /// Playback start anchor for the elapsed-time display
    pub when: Option<DateTime<Utc>>,
    pub show_chronometer: bool,
    /// Ongoing (not dismissable) while playing
    pub ongoing: bool,
    pub state: PlaybackState,
}

/// Host seam that displays notifications
pub trait NotificationSink: Send + Sync {
    /// Post or replace the notification
    fn post(&self, notification: &Notification);

    /// Remove the notification
    fn cancel(&self);

    /// Enter foreground execution with `notification` attached
    fn start_foreground(&self, notification: &Notification);

    fn stop_foreground(&self);
}

/// Sink for headless hosts: logs what would be displayed
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn post(&self, notification: &Notification) {
        info!(
            "Notification: {} - {} [{}] actions={:?} artwork={}",
            notification.title,
            notification.artist,
            notification.state,
            notification.actions,
            matches!(notification.artwork, Artwork::Image(_))
        );
    }

    fn cancel(&self) {
        info!("Notification cancelled");
    }

    fn start_foreground(&self, notification: &Notification) {
        info!("Foreground started: {} - {}", notification.title, notification.artist);
    }

    fn stop_foreground(&self) {
        info!("Foreground stopped");
    }
}

/// Fetches artwork bytes
pub trait ArtworkLoader: Send + Sync {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Artwork loader over HTTP
pub struct HttpArtworkLoader {
    client: reqwest::Client,
}

impl HttpArtworkLoader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

impl ArtworkLoader for HttpArtworkLoader {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let request = self.client.get(url);
        let url = url.to_string();
        async move {
            let fetch = async {
                let bytes = request.send().await?.error_for_status()?.bytes().await?;
                Ok::<_, reqwest::Error>(bytes.to_vec())
            };
            fetch
                .await
                .map_err(|e| Error::Artwork(format!("{}: {}", url, e)))
        }
        .boxed()
    }
}

/// State shared with in-flight artwork loads
#[derive(Default)]
struct ArtworkState {
    /// Bumped on every metadata change and on stop
    generation: u64,
    /// Bumped on stop; loads started earlier are not cached
    epoch: u64,
    /// Oldest first, at most `ARTWORK_CACHE_CAPACITY` entries
    cache: VecDeque<(String, Arc<Vec<u8>>)>,
    in_flight: HashSet<String>,
}

impl ArtworkState {
    fn cached(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.cache
            .iter()
            .find(|(cached, _)| cached == url)
            .map(|(_, image)| Arc::clone(image))
    }

    fn remember(&mut self, url: String, image: Arc<Vec<u8>>) {
        self.cache.retain(|(cached, _)| *cached != url);
        while self.cache.len() >= ARTWORK_CACHE_CAPACITY {
            self.cache.pop_front();
        }
        self.cache.push_back((url, image));
    }

    fn clear(&mut self) {
        self.generation += 1;
        self.epoch += 1;
        self.cache.clear();
    }
}

/// Session listener that drives a `NotificationSink`
pub struct NotificationPresenter {
    sink: Arc<dyn NotificationSink>,
    loader: Arc<dyn ArtworkLoader>,
    artwork: Arc<Mutex<ArtworkState>>,
    metadata: Option<TrackMetadata>,
    playback: Option<PlaybackSnapshot>,
    /// Duration reported by progress updates for the current track
    reported_duration_ms: Option<u64>,
    started: bool,
}

impl NotificationPresenter {
    pub fn new(sink: Arc<dyn NotificationSink>, loader: Arc<dyn ArtworkLoader>) -> Self {
        Self {
            sink,
            loader,
            artwork: Arc::new(Mutex::new(ArtworkState::default())),
            metadata: None,
            playback: None,
            reported_duration_ms: None,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Number of artwork images currently cached
    pub fn cached_artwork_count(&self) -> usize {
        self.artwork_state().cache.len()
    }

    fn artwork_state(&self) -> MutexGuard<'_, ArtworkState> {
        self.artwork.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the notification, or `None` until both metadata and a playback
    /// state have been published
    fn build(&self) -> Option<Notification> {
        let metadata = self.metadata.as_ref()?;
        let playback = self.playback.as_ref()?;
        let playing = playback.state == PlaybackState::Playing;

        let play_pause = if playing {
            NotificationAction::Pause
        } else {
            NotificationAction::Play
        };

        let position = playback.position_at(Instant::now());
        let when = match position {
            Some(position_ms) if playing => {
                Some(Utc::now() - chrono::Duration::milliseconds(position_ms as i64))
            }
            _ => None,
        };

        let artwork = metadata
            .artwork_url
            .as_ref()
            .and_then(|url| self.artwork_state().cached(url))
            .map_or(Artwork::Placeholder, Artwork::Image);

        Some(Notification {
            title: metadata.title.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            actions: vec![NotificationAction::Previous, play_pause, NotificationAction::Next],
            artwork,
            artwork_url: metadata.artwork_url.clone(),
            duration_ms: self.reported_duration_ms.unwrap_or(metadata.duration_ms),
            position_ms: position,
            when,
            show_chronometer: when.is_some(),
            ongoing: playing,
            state: playback.state,
        })
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        let Some(notification) = self.build() else {
            debug!("Notification not started: no metadata yet");
            return;
        };
        self.sink.start_foreground(&notification);
        self.started = true;
        self.fetch_artwork(notification);
    }

    fn stop(&mut self) {
        self.artwork_state().clear();
        if self.started {
            self.started = false;
            self.sink.stop_foreground();
        }
        self.sink.cancel();
    }

    fn refresh(&mut self) {
        if !self.started {
            return;
        }
        if let Some(notification) = self.build() {
            self.sink.post(&notification);
            self.fetch_artwork(notification);
        }
    }

    /// Load artwork for a placeholder notification and re-post it when done
    fn fetch_artwork(&self, notification: Notification) {
        if notification.artwork != Artwork::Placeholder {
            return;
        }
        let Some(url) = self.metadata.as_ref().and_then(|m| m.artwork_url.clone()) else {
            return;
        };

        let (generation, epoch) = {
            let mut state = self.artwork_state();
            if !state.in_flight.insert(url.clone()) {
                return;
            }
            (state.generation, state.epoch)
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available to load artwork {}", url);
            self.artwork_state().in_flight.remove(&url);
            return;
        };

        let load = self.loader.load(&url);
        let shared = Arc::clone(&self.artwork);
        let sink = Arc::clone(&self.sink);
        runtime.spawn(async move {
            let result = load.await;
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight.remove(&url);
            match result {
                Ok(bytes) => {
                    debug!("Loaded artwork {} ({} bytes)", url, bytes.len());
                    let image = Arc::new(bytes);
                    if state.epoch == epoch {
                        state.remember(url, Arc::clone(&image));
                    }
                    if state.generation == generation {
                        let mut notification = notification;
                        notification.artwork = Artwork::Image(image);
                        sink.post(&notification);
                    }
                }
                Err(e) => warn!("Failed to load artwork {}: {}", url, e),
            }
        });
    }
}

impl SessionListener for NotificationPresenter {
    fn on_playback_state(&mut self, snapshot: &PlaybackSnapshot, _previous: PlaybackState) {
        self.playback = Some(snapshot.clone());
        match snapshot.state {
            PlaybackState::Stopped | PlaybackState::None => self.stop(),
            PlaybackState::Playing | PlaybackState::Paused if !self.started => self.start(),
            _ => self.refresh(),
        }
    }

    fn on_metadata(&mut self, metadata: Option<&TrackMetadata>) {
        if self.metadata.as_ref() == metadata {
            return;
        }
        self.metadata = metadata.cloned();
        self.reported_duration_ms = None;
        self.artwork_state().generation += 1;
        self.refresh();
    }

    fn on_progress(&mut self, _index: Option<usize>, position_ms: u64, duration_ms: u64) {
        self.reported_duration_ms = Some(duration_ms);
        debug!(
            "Notification progress {} / {}",
            format_position(position_ms),
            format_position(duration_ms)
        );
    }

    fn on_session_released(&mut self) {
        self.stop();
    }
}
