//! Playback coordinator
//!
//! The coordinator is the single owner of the queue, the current index and
//! the published session state. Transport commands, renderer callbacks and
//! timer fires all reach it as messages on one task, so no two transitions
//! ever run concurrently and a callback from an abandoned source cannot race
//! a newer command.
//!
//! **State machine:**
//! ```text
//! NONE → STOPPED ⇄ PLAYING ⇄ PAUSED
//!           │    ↖    ↑
//!           └→ BUFFERING (engine preparing)
//! ERROR reachable from any state on engine failure
//! ```
//!
//! **Timers:**
//! - Inactivity: armed by Pause and by every Open; when it fires and the
//!   engine is not rendering, the coordinator stops itself.
//! - Progress: runs only while playing or buffering, publishing the
//!   extrapolated position at a fixed rate.
//!
//! Both are cancelled on Stop and on shutdown. Each arm bumps a generation so
//! a fire that was already in flight when the timer was cancelled is dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamer_common::config::{PlayerConfig, Preferences};
use streamer_common::events::PlaybackState;
use streamer_common::time::millis_to_duration;
use streamer_common::track::{same_track_list, Track};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::catalog::{MediaCatalog, TrackMetadata};
use super::engine::PlaybackEngine;
use super::events::{EngineEvent, EngineState};
use super::queue::{self, Queue, QueueItem};
use super::renderer::{Renderer, RendererEvent};
use super::timer::ScheduledTask;
use crate::error::{Error, Result};
use crate::session::{Actions, ListenerId, MediaSession, PlaybackSnapshot, SessionListener, SessionToken};

/// Error attached to the published state when a skip lands nowhere
pub const CANNOT_SKIP: &str = "Cannot skip";

/// What to do after an Open request has loaded its tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartIntent {
    Play,
    Pause,
}

/// Load (or re-select within) a track list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    /// New track list; absent means "resume whatever is loaded"
    #[serde(default)]
    pub tracks: Option<Vec<Track>>,
    /// Position of the selected track within `tracks`
    #[serde(default)]
    pub selected: Option<usize>,
    #[serde(default)]
    pub command: Option<StartIntent>,
}

/// Transport commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(OpenRequest),
    Play,
    Pause,
    Stop,
    SkipNext,
    SkipPrevious,
    /// Jump to the item with this stored queue position
    SkipToQueueItem(u64),
    SeekTo(u64),
}

/// Read-only view of the coordinator for external callers
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: PlaybackState,
    /// Extrapolated position at the time of the query
    pub position_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub actions: u32,
    pub current_index: Option<usize>,
    pub queue: Vec<QueueItem>,
    pub metadata: Option<TrackMetadata>,
    pub service_started: bool,
    pub session_active: bool,
    pub preferences: Preferences,
}

/// Coordinator tuning, taken from `PlayerConfig`
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub inactivity_timeout: Duration,
    pub progress_interval: Duration,
    pub preview_duration_ms: u64,
    pub preferences: Preferences,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&PlayerConfig::default())
    }
}

impl From<&PlayerConfig> for CoordinatorSettings {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            inactivity_timeout: millis_to_duration(config.inactivity_timeout_ms),
            progress_interval: millis_to_duration(config.progress_interval_ms),
            preview_duration_ms: config.preview_duration_ms,
            preferences: config.preferences.clone(),
        }
    }
}

enum CoordinatorMessage {
    Command(Command),
    Query(oneshot::Sender<SessionStatus>),
    Register(Box<dyn SessionListener>, oneshot::Sender<ListenerId>),
    Unregister(ListenerId),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy)]
enum TimerEvent {
    InactivityTimeout { generation: u64 },
    ProgressTick { generation: u64 },
}

#[derive(Debug, Clone, Copy)]
enum SkipDirection {
    Next,
    Previous,
}

/// Receiving end of a coordinator channel, consumed by `run`
pub struct CoordinatorMailbox {
    rx: mpsc::Receiver<CoordinatorMessage>,
}

/// Single owner of playback state
pub struct PlaybackCoordinator {
    settings: CoordinatorSettings,
    session: MediaSession,
    engine: PlaybackEngine,

    catalog: Option<MediaCatalog>,
    tracks: Vec<Track>,
    queue: Option<Queue>,
    current_index: Option<usize>,

    state: PlaybackState,
    service_started: bool,

    inactivity: ScheduledTask,
    inactivity_generation: u64,
    progress: ScheduledTask,
    progress_generation: u64,

    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: Option<mpsc::UnboundedReceiver<TimerEvent>>,
}

impl PlaybackCoordinator {
    /// Create the coordinator and its session
    ///
    /// Fails if `token` cannot identify a session.
    pub fn new(
        settings: CoordinatorSettings,
        token: SessionToken,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self> {
        let session = MediaSession::new(token)?;
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        info!(
            "Playback coordinator created (inactivity {:?}, progress every {:?})",
            settings.inactivity_timeout, settings.progress_interval
        );

        Ok(Self {
            settings,
            session,
            engine: PlaybackEngine::new(renderer),
            catalog: None,
            tracks: Vec::new(),
            queue: None,
            current_index: None,
            state: PlaybackState::None,
            service_started: false,
            inactivity: ScheduledTask::new("inactivity"),
            inactivity_generation: 0,
            progress: ScheduledTask::new("progress"),
            progress_generation: 0,
            timer_tx,
            timer_rx: Some(timer_rx),
        })
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn queue(&self) -> Option<&[QueueItem]> {
        self.queue.as_deref()
    }

    pub fn is_service_started(&self) -> bool {
        self.service_started
    }

    pub fn session(&self) -> &MediaSession {
        &self.session
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn is_inactivity_timer_armed(&self) -> bool {
        self.inactivity.is_scheduled()
    }

    pub fn is_progress_timer_running(&self) -> bool {
        self.progress.is_scheduled()
    }

    pub fn register_listener(&mut self, listener: Box<dyn SessionListener>) -> ListenerId {
        self.session.register(listener)
    }

    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.session.unregister(id)
    }

    /// Snapshot for external readers
    pub fn status(&self) -> SessionStatus {
        let snapshot = self.session.playback();
        SessionStatus {
            state: self.state,
            position_ms: snapshot.position_at(Instant::now()),
            error_message: snapshot.error_message.clone(),
            actions: snapshot.actions.bits(),
            current_index: self.current_index,
            queue: self.queue.clone().unwrap_or_default(),
            metadata: self.session.metadata().cloned(),
            service_started: self.service_started,
            session_active: self.session.is_active(),
            preferences: self.settings.preferences.clone(),
        }
    }

    // ========================================
    // Event loop
    // ========================================

    /// Run until shutdown or until every handle is dropped
    ///
    /// Renderer callbacks are served first, then timer fires, then the
    /// mailbox. Returns the error that aborted the loop if an internal
    /// consistency fault occurred.
    pub async fn run(
        mut self,
        mailbox: CoordinatorMailbox,
        mut renderer_events: mpsc::UnboundedReceiver<RendererEvent>,
    ) -> Result<()> {
        let Some(mut timer_events) = self.timer_rx.take() else {
            return Err(Error::Playback("coordinator loop already started".to_string()));
        };
        let mut mailbox = mailbox.rx;
        info!("Playback coordinator running (session {})", self.session.token());

        loop {
            let outcome = tokio::select! {
                biased;

                Some(event) = renderer_events.recv() => self.handle_renderer_event(event),

                Some(event) = timer_events.recv() => self.handle_timer(event),

                message = mailbox.recv() => match message {
                    Some(CoordinatorMessage::Shutdown(reply)) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(message) => self.handle_message(message),
                    None => {
                        info!("All coordinator handles dropped");
                        self.shutdown();
                        break;
                    }
                },
            };

            if let Err(e) = outcome {
                if e.is_fatal() {
                    error!("Playback coordinator aborting: {}", e);
                    self.shutdown();
                    return Err(e);
                }
                warn!("Playback coordinator: {}", e);
            }
        }

        info!("Playback coordinator stopped");
        Ok(())
    }

    fn handle_message(&mut self, message: CoordinatorMessage) -> Result<()> {
        match message {
            CoordinatorMessage::Command(command) => self.handle_command(command),
            CoordinatorMessage::Query(reply) => {
                let _ = reply.send(self.status());
                Ok(())
            }
            CoordinatorMessage::Register(listener, reply) => {
                let id = self.register_listener(listener);
                let _ = reply.send(id);
                Ok(())
            }
            CoordinatorMessage::Unregister(id) => {
                self.unregister_listener(id);
                Ok(())
            }
            CoordinatorMessage::Shutdown(reply) => {
                self.shutdown();
                let _ = reply.send(());
                Ok(())
            }
        }
    }

    /// Apply one transport command
    pub fn handle_command(&mut self, command: Command) -> Result<()> {
        debug!("Command: {:?}", command);
        match command {
            Command::Open(request) => self.open(request),
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Stop => self.stop(None),
            Command::SkipNext => self.skip(SkipDirection::Next),
            Command::SkipPrevious => self.skip(SkipDirection::Previous),
            Command::SkipToQueueItem(queue_id) => self.skip_to_queue_item(queue_id),
            Command::SeekTo(position_ms) => self.seek_to(position_ms),
        }
    }

    /// Apply an asynchronous renderer callback
    pub fn handle_renderer_event(&mut self, event: RendererEvent) -> Result<()> {
        if self.engine.handle_renderer_event(event) {
            self.pump_engine_events()?;
        }
        Ok(())
    }

    fn handle_timer(&mut self, event: TimerEvent) -> Result<()> {
        match event {
            TimerEvent::InactivityTimeout { generation } => {
                if generation != self.inactivity_generation {
                    debug!("Dropping stale inactivity timeout");
                    return Ok(());
                }
                self.on_inactivity_timeout()
            }
            TimerEvent::ProgressTick { generation } => {
                if generation == self.progress_generation {
                    self.publish_progress();
                }
                Ok(())
            }
        }
    }

    // ========================================
    // Transitions
    // ========================================

    fn open(&mut self, request: OpenRequest) -> Result<()> {
        let mut resume_current = false;

        match request.tracks {
            Some(tracks) => {
                let selected = request.selected.unwrap_or(0);
                let selected_id = tracks.get(selected).map(|track| track.id.clone());

                if same_track_list(&tracks, &self.tracks) && self.current_index.is_some() {
                    let index = match (&self.queue, &selected_id) {
                        (Some(queue), Some(id)) => queue::index_of_media_id(queue, id),
                        _ => None,
                    };
                    if index == self.current_index {
                        debug!("Resuming current track {:?}", self.current_index);
                        resume_current = true;
                    } else {
                        self.current_index = index;
                        self.session.notify_track_change(self.current_index);
                    }
                } else {
                    self.load_tracks(tracks, selected_id.as_deref())?;
                }
            }
            None => {
                debug!("Open without tracks: resuming current track");
                resume_current = true;
            }
        }

        match request.command {
            Some(StartIntent::Play) if !resume_current => self.play()?,
            Some(StartIntent::Pause) if self.engine.is_playing() => self.pause()?,
            _ => {}
        }

        self.arm_inactivity();
        Ok(())
    }

    /// Replace the catalog and queue with a new track list
    fn load_tracks(&mut self, tracks: Vec<Track>, selected_id: Option<&str>) -> Result<()> {
        let catalog = MediaCatalog::new(self.settings.preview_duration_ms);
        catalog.populate(&tracks);

        let Some(queue) = queue::build_queue(Some(&catalog)) else {
            return Err(Error::Queue("cannot build queue".to_string()));
        };

        self.current_index = selected_id.and_then(|id| queue::index_of_media_id(&queue, id));
        info!(
            "Loaded {} tracks, current index {:?}",
            queue.len(),
            self.current_index
        );

        self.catalog = Some(catalog);
        self.tracks = tracks;
        self.session.notify_queue_changed(&queue);
        self.queue = Some(queue);
        self.session.notify_track_change(self.current_index);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let Some(item) = self.current_item() else {
            debug!("Play ignored: index {:?} is not playable", self.current_index);
            return Ok(());
        };
        info!("Play {} at index {:?}", item.media_id(), self.current_index);

        self.prepare_to_play(&item)?;
        self.engine.play(&item);
        self.pump_engine_events()
    }

    fn pause(&mut self) -> Result<()> {
        info!("Pause in state {}", self.state);
        self.engine.pause();
        self.pump_engine_events()?;
        self.arm_inactivity();
        Ok(())
    }

    /// Hard stop, optionally caused by `error`
    ///
    /// Stopping an already stopped coordinator without an error is a no-op.
    fn stop(&mut self, error: Option<String>) -> Result<()> {
        if error.is_none() && self.state.is_stopped() && !self.service_started {
            debug!("Stop ignored: already stopped");
            return Ok(());
        }
        info!("Stop in state {} (error: {:?})", self.state, error);

        self.engine.stop(true);
        self.cancel_inactivity();
        self.cancel_progress();
        self.pump_engine_events()?;

        self.publish_state(PlaybackState::Stopped, error);
        self.session.set_active(false);
        if self.service_started {
            self.service_started = false;
            info!("Playback service stopped");
            self.session.notify_service_state(false);
        }
        Ok(())
    }

    fn skip(&mut self, direction: SkipDirection) -> Result<()> {
        let len = self.queue.as_ref().map_or(0, Vec::len);
        let target = match direction {
            SkipDirection::Next => queue::wrap_next(self.current_index, len),
            SkipDirection::Previous => queue::wrap_previous(self.current_index, len),
        };
        if target.is_some() {
            self.current_index = target;
        }
        info!("Skip {:?} to index {:?}", direction, self.current_index);
        self.session.notify_track_change(self.current_index);

        let Some(item) = self.current_item() else {
            warn!("Skip landed on unplayable index {:?}", self.current_index);
            return self.stop(Some(CANNOT_SKIP.to_string()));
        };

        self.prepare_to_play(&item)?;
        match direction {
            SkipDirection::Next => self.engine.skip_to_next(&item),
            SkipDirection::Previous => self.engine.skip_to_prev(&item),
        }
        self.pump_engine_events()
    }

    fn skip_to_queue_item(&mut self, queue_id: u64) -> Result<()> {
        let index = match self.queue.as_deref() {
            Some(queue) if !queue.is_empty() => queue::index_of_queue_id(queue, queue_id),
            _ => {
                debug!("Skip to queue item {} ignored: queue is empty", queue_id);
                return Ok(());
            }
        };
        let Some(index) = index else {
            warn!("Skip to queue item {} ignored: no such item", queue_id);
            return Ok(());
        };

        self.current_index = Some(index);
        self.session.notify_track_change(self.current_index);
        self.play()
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        if self.engine.current_media_id().is_none() {
            debug!("Seek ignored: nothing loaded");
            return Ok(());
        }
        debug!("Seek to {}ms", position_ms);
        self.engine.seek_to(position_ms);
        let error = self.session.playback().error_message.clone();
        self.publish_state(self.state, error);
        Ok(())
    }

    fn on_completion(&mut self) -> Result<()> {
        let len = self.queue.as_ref().map_or(0, Vec::len);
        let Some(next) = queue::wrap_next(self.current_index, len) else {
            info!("Completed with an empty queue");
            return self.stop(None);
        };
        info!("Completed index {:?}, advancing to {}", self.current_index, next);
        self.current_index = Some(next);
        self.session.notify_track_change(self.current_index);
        self.play()
    }

    fn on_inactivity_timeout(&mut self) -> Result<()> {
        if self.engine.is_playing() {
            debug!("Inactivity timeout ignored: still rendering");
            return Ok(());
        }
        info!("Stopping after {:?} of inactivity", self.settings.inactivity_timeout);
        self.stop(None)
    }

    /// Stop, cancel every timer, release the renderer and the session
    ///
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.session.is_released() {
            return;
        }
        info!("Playback coordinator shutting down");
        if let Err(e) = self.stop(None) {
            warn!("Stop during shutdown failed: {}", e);
        }
        self.cancel_inactivity();
        self.cancel_progress();
        self.engine.stop(true);
        self.session.release();
    }

    // ========================================
    // Helpers
    // ========================================

    /// Clone of the item at the current index, if playable
    fn current_item(&self) -> Option<QueueItem> {
        if !queue::is_playable(self.current_index, self.queue.as_deref()) {
            return None;
        }
        let index = self.current_index?;
        self.queue.as_ref()?.get(index).cloned()
    }

    /// Common preamble of every transition that hands an item to the engine
    fn prepare_to_play(&mut self, item: &QueueItem) -> Result<()> {
        self.cancel_inactivity();
        if !self.service_started {
            self.service_started = true;
            info!("Playback service started");
            self.session.notify_service_state(true);
        }
        self.update_metadata(item)?;
        self.session.set_active(true);
        Ok(())
    }

    /// Publish the catalog entry of `item`
    ///
    /// A queue item without a matching catalog entry means the queue and the
    /// catalog diverged; that is an internal fault, never a reason to play
    /// something else.
    fn update_metadata(&mut self, item: &QueueItem) -> Result<()> {
        let media_id = item.media_id();
        let metadata = self
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.lookup(media_id))
            .ok_or_else(|| {
                Error::ConsistencyFault(format!("no catalog entry for queue item {}", media_id))
            })?;
        if metadata.media_id != media_id {
            return Err(Error::ConsistencyFault(format!(
                "catalog entry {} does not match queue item {}",
                metadata.media_id, media_id
            )));
        }
        let metadata = metadata.clone();
        self.session.set_metadata(Some(metadata));
        Ok(())
    }

    fn pump_engine_events(&mut self) -> Result<()> {
        while let Some(event) = self.engine.next_event() {
            match event {
                EngineEvent::StateChanged(EngineState::Preparing) => {
                    self.publish_state(PlaybackState::Buffering, None)
                }
                EngineEvent::StateChanged(EngineState::Playing) => {
                    self.publish_state(PlaybackState::Playing, None)
                }
                EngineEvent::StateChanged(EngineState::Paused) => {
                    self.publish_state(PlaybackState::Paused, None)
                }
                // Stop and completion publish their own outcome
                EngineEvent::StateChanged(EngineState::Idle | EngineState::Error) => {}
                EngineEvent::Ready => debug!("Engine ready"),
                EngineEvent::Completed => self.on_completion()?,
                EngineEvent::Error(message) => {
                    warn!("Engine error: {}", message);
                    self.publish_state(PlaybackState::Error, Some(message));
                }
            }
        }
        Ok(())
    }

    /// Re-derive actions and publish `state`; an error forces the error state
    fn publish_state(&mut self, state: PlaybackState, error: Option<String>) {
        let state = if error.is_some() {
            PlaybackState::Error
        } else {
            state
        };
        let queue_len = self.queue.as_ref().map_or(0, Vec::len);
        let snapshot = PlaybackSnapshot {
            state,
            position_ms: Some(self.engine.position_ms()),
            updated_at: Instant::now(),
            error_message: error,
            actions: Actions::derive(queue_len, self.current_index, self.engine.is_playing()),
            active_index: self.current_index,
        };

        if self.state != state {
            debug!("Playback state {} -> {}", self.state, state);
        }
        self.state = state;
        self.session.set_playback_state(snapshot);
        self.sync_progress_timer();
    }

    fn publish_progress(&mut self) {
        if !self.state.wants_progress_updates() {
            return;
        }
        let duration_ms = self.engine.duration_ms().unwrap_or_else(|| {
            self.session
                .metadata()
                .map_or(self.settings.preview_duration_ms, |m| m.duration_ms)
        });
        let position_ms = self
            .session
            .playback()
            .position_at(Instant::now())
            .unwrap_or(0)
            .min(duration_ms);
        self.session
            .notify_progress(self.current_index, position_ms, duration_ms);
    }

    fn arm_inactivity(&mut self) {
        self.inactivity_generation += 1;
        let generation = self.inactivity_generation;
        let tx = self.timer_tx.clone();
        self.inactivity
            .schedule_once(self.settings.inactivity_timeout, move || {
                let _ = tx.send(TimerEvent::InactivityTimeout { generation });
            });
    }

    fn cancel_inactivity(&mut self) {
        self.inactivity_generation += 1;
        self.inactivity.cancel();
    }

    fn sync_progress_timer(&mut self) {
        if !self.state.wants_progress_updates() {
            self.cancel_progress();
            return;
        }
        if self.progress.is_scheduled() {
            return;
        }
        self.progress_generation += 1;
        let generation = self.progress_generation;
        let tx = self.timer_tx.clone();
        self.progress
            .schedule_repeating(self.settings.progress_interval, move || {
                tx.send(TimerEvent::ProgressTick { generation }).is_ok()
            });
    }

    fn cancel_progress(&mut self) {
        if self.progress.cancel() {
            self.progress_generation += 1;
        }
    }
}

// ========================================
// Handle
// ========================================

/// Cloneable sender side of the coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorMessage>,
    token: SessionToken,
}

impl CoordinatorHandle {
    /// Create a handle and the mailbox the coordinator loop will drain
    pub fn channel(token: SessionToken, capacity: usize) -> (Self, CoordinatorMailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, token }, CoordinatorMailbox { rx })
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolve transport controls for a session token
    ///
    /// Refuses tokens of other sessions and tokens of a session that has
    /// been released.
    pub fn controls(&self, token: &SessionToken) -> Result<TransportControls> {
        if *token != self.token {
            return Err(Error::InvalidSession(format!("unknown session {}", token)));
        }
        if self.is_closed() {
            return Err(Error::InvalidSession(format!("session {} was released", token)));
        }
        Ok(TransportControls {
            handle: self.clone(),
        })
    }

    pub async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(CoordinatorMessage::Command(command))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMessage::Query(reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn register_listener(&self, listener: Box<dyn SessionListener>) -> Result<ListenerId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMessage::Register(listener, reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn unregister_listener(&self, id: ListenerId) -> Result<()> {
        self.tx
            .send(CoordinatorMessage::Unregister(id))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Ask the loop to stop and wait until it has released everything
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMessage::Shutdown(reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }
}

/// Transport controls resolved from a session token
#[derive(Clone)]
pub struct TransportControls {
    handle: CoordinatorHandle,
}

impl TransportControls {
    pub async fn open(&self, request: OpenRequest) -> Result<()> {
        self.handle.send(Command::Open(request)).await
    }

    pub async fn play(&self) -> Result<()> {
        self.handle.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.handle.send(Command::Pause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.handle.send(Command::Stop).await
    }

    pub async fn skip_to_next(&self) -> Result<()> {
        self.handle.send(Command::SkipNext).await
    }

    pub async fn skip_to_previous(&self) -> Result<()> {
        self.handle.send(Command::SkipPrevious).await
    }

    pub async fn skip_to_queue_item(&self, queue_id: u64) -> Result<()> {
        self.handle.send(Command::SkipToQueueItem(queue_id)).await
    }

    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.handle.send(Command::SeekTo(position_ms)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::renderer::RendererEventKind;
    use std::sync::{Arc, Mutex};

    /// Renderer that records calls and never reports anything by itself
    #[derive(Default)]
    struct SilentRenderer {
        calls: Arc<Mutex<Vec<String>>>,
        rendering: bool,
    }

    impl Renderer for SilentRenderer {
        fn prepare(&mut self, source: &str, _generation: u64) {
            self.rendering = false;
            self.calls.lock().unwrap().push(format!("prepare {source}"));
        }
        fn start(&mut self) {
            self.rendering = true;
        }
        fn pause(&mut self) {
            self.rendering = false;
        }
        fn seek_to(&mut self, _position_ms: u64) {}
        fn reset(&mut self) {
            self.rendering = false;
        }
        fn release(&mut self) {
            self.calls.lock().unwrap().push("release".into());
        }
        fn is_rendering(&self) -> bool {
            self.rendering
        }
        fn position_ms(&self) -> u64 {
            0
        }
    }

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter()
            .map(|id| {
                Track::new(*id, format!("Song {id}"), "Artist", "Album")
                    .with_preview_url(format!("https://p.example/{id}"))
            })
            .collect()
    }

    fn coordinator() -> (PlaybackCoordinator, Arc<Mutex<Vec<String>>>) {
        let renderer = SilentRenderer::default();
        let calls = renderer.calls.clone();
        let coordinator = PlaybackCoordinator::new(
            CoordinatorSettings::default(),
            SessionToken::new(),
            Box::new(renderer),
        )
        .unwrap();
        (coordinator, calls)
    }

    fn open(coordinator: &mut PlaybackCoordinator, ids: &[&str], selected: usize, play: bool) {
        coordinator
            .handle_command(Command::Open(OpenRequest {
                tracks: Some(tracks(ids)),
                selected: Some(selected),
                command: play.then_some(StartIntent::Play),
            }))
            .unwrap();
    }

    fn ready(coordinator: &mut PlaybackCoordinator) {
        let generation = coordinator.engine().generation();
        coordinator
            .handle_renderer_event(RendererEvent {
                generation,
                kind: RendererEventKind::Ready,
            })
            .unwrap();
    }

    #[test]
    fn test_nil_token_fails_construction() {
        let result = PlaybackCoordinator::new(
            CoordinatorSettings::default(),
            SessionToken::from_uuid(uuid::Uuid::nil()),
            Box::new(SilentRenderer::default()),
        );
        assert!(matches!(result, Err(Error::InvalidSession(_))));
    }

    #[tokio::test]
    async fn test_open_with_play_buffers_then_plays() {
        let (mut coordinator, calls) = coordinator();
        open(&mut coordinator, &["a", "b", "c"], 1, true);

        assert_eq!(coordinator.current_index(), Some(1));
        assert_eq!(coordinator.state(), PlaybackState::Buffering);
        assert!(coordinator.is_service_started());
        assert_eq!(*calls.lock().unwrap(), vec!["prepare https://p.example/b"]);

        ready(&mut coordinator);
        assert_eq!(coordinator.state(), PlaybackState::Playing);
        assert!(coordinator.session().is_active());
    }

    #[tokio::test]
    async fn test_play_without_queue_is_ignored() {
        let (mut coordinator, calls) = coordinator();
        coordinator.handle_command(Command::Play).unwrap();

        assert_eq!(coordinator.state(), PlaybackState::None);
        assert!(!coordinator.is_service_started());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_same_list_same_selection_resumes() {
        let (mut coordinator, calls) = coordinator();
        open(&mut coordinator, &["a", "b"], 0, true);
        ready(&mut coordinator);

        open(&mut coordinator, &["a", "b"], 0, true);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(coordinator.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_open_same_list_other_selection_moves_index() {
        let (mut coordinator, calls) = coordinator();
        open(&mut coordinator, &["a", "b"], 0, true);
        ready(&mut coordinator);

        open(&mut coordinator, &["a", "b"], 1, true);
        assert_eq!(coordinator.current_index(), Some(1));
        assert_eq!(calls.lock().unwrap().last().unwrap(), "prepare https://p.example/b");
    }

    #[tokio::test]
    async fn test_open_new_list_replaces_queue() {
        let (mut coordinator, _) = coordinator();
        open(&mut coordinator, &["a", "b"], 0, false);
        open(&mut coordinator, &["x", "y", "z"], 2, false);

        let ids: Vec<&str> = coordinator.queue().unwrap().iter().map(|i| i.media_id()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
        assert_eq!(coordinator.current_index(), Some(2));
        assert!(coordinator.is_inactivity_timer_armed());
    }

    #[tokio::test]
    async fn test_status_reports_queue_and_preferences() {
        let (mut coordinator, _) = coordinator();
        open(&mut coordinator, &["a", "b"], 1, true);
        ready(&mut coordinator);

        let status = coordinator.status();
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.current_index, Some(1));
        assert_eq!(status.queue.len(), 2);
        assert_eq!(status.metadata.unwrap().media_id, "b");
        assert_eq!(status.preferences.country, "US");
        assert!(Actions::from_bits(status.actions).contains(Actions::PAUSE | Actions::SKIP_TO_PREVIOUS));
    }

    #[tokio::test]
    async fn test_shutdown_releases_session_and_renderer() {
        let (mut coordinator, calls) = coordinator();
        open(&mut coordinator, &["a"], 0, true);
        ready(&mut coordinator);

        coordinator.shutdown();
        coordinator.shutdown();

        assert!(coordinator.session().is_released());
        assert_eq!(coordinator.state(), PlaybackState::Stopped);
        assert!(!coordinator.is_inactivity_timer_armed());
        assert!(!coordinator.is_progress_timer_running());
        assert_eq!(
            calls.lock().unwrap().iter().filter(|c| *c == "release").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_queue_catalog_divergence_is_fatal() {
        let (mut coordinator, calls) = coordinator();
        open(&mut coordinator, &["a", "b"], 0, false);
        coordinator.catalog = Some(MediaCatalog::new(30_000));

        let err = coordinator.handle_command(Command::Play).unwrap_err();
        assert!(matches!(err, Error::ConsistencyFault(_)));
        assert!(err.is_fatal());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loop_aborts_on_consistency_fault() {
        let (mut coordinator, _) = coordinator();
        open(&mut coordinator, &["a"], 0, false);
        coordinator.catalog = Some(MediaCatalog::new(30_000));

        let token = coordinator.session().token();
        let (handle, mailbox) = CoordinatorHandle::channel(token, 8);
        let (_renderer_tx, renderer_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(coordinator.run(mailbox, renderer_rx));

        handle.send(Command::Play).await.unwrap();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::ConsistencyFault(_))));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_handle_controls_refuse_foreign_token() {
        let token = SessionToken::new();
        let (handle, _mailbox) = CoordinatorHandle::channel(token, 8);

        assert!(handle.controls(&token).is_ok());
        assert!(matches!(
            handle.controls(&SessionToken::new()),
            Err(Error::InvalidSession(_))
        ));
    }

    #[tokio::test]
    async fn test_handle_reports_closed_coordinator() {
        let token = SessionToken::new();
        let (handle, mailbox) = CoordinatorHandle::channel(token, 8);
        drop(mailbox);

        assert!(matches!(handle.send(Command::Play).await, Err(Error::ChannelClosed)));
        assert!(matches!(handle.status().await, Err(Error::ChannelClosed)));
        assert!(matches!(handle.controls(&token), Err(Error::InvalidSession(_))));
    }
}
