//! Playback session
//!
//! The session is what the outside world sees of the coordinator: an opaque
//! token, the last published playback snapshot and metadata, and the set of
//! listeners that receive every publication. It holds no playback logic.
//!
//! **Lifecycle:** created once per coordinator with a valid token,
//! `release`d on teardown. A released session ignores further publications
//! and its token no longer grants transport controls.

mod listener;

pub use listener::{EventBusListener, ListenerId, ListenerRegistry, SessionListener};

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use streamer_common::events::PlaybackState;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::playback::catalog::TrackMetadata;
use crate::playback::queue::QueueItem;

/// Opaque identifier of one playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    /// Fresh random token
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport actions currently available, as a bitmask
///
/// Bit values match the platform media-session action flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Actions(u32);

impl Actions {
    pub const NONE: Actions = Actions(0);
    pub const PAUSE: Actions = Actions(1 << 1);
    pub const PLAY: Actions = Actions(1 << 2);
    pub const SKIP_TO_PREVIOUS: Actions = Actions(1 << 4);
    pub const SKIP_TO_NEXT: Actions = Actions(1 << 5);

    /// Derive the available actions from queue shape and renderer activity
    ///
    /// Play is always offered. The others need a non-empty queue: pause
    /// while rendering, previous when not on the first item, next when not
    /// on the last item.
    pub fn derive(queue_len: usize, index: Option<usize>, rendering: bool) -> Actions {
        let mut actions = Actions::PLAY;
        if queue_len == 0 {
            return actions;
        }
        if rendering {
            actions = actions | Actions::PAUSE;
        }
        if let Some(index) = index {
            if index > 0 {
                actions = actions | Actions::SKIP_TO_PREVIOUS;
            }
            if index + 1 < queue_len {
                actions = actions | Actions::SKIP_TO_NEXT;
            }
        }
        actions
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Actions {
        Actions(bits)
    }

    pub fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Actions) -> Actions {
        Actions(self.0 | rhs.0)
    }
}

/// Last published playback state
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// Position at `updated_at`; `None` when unknown
    pub position_ms: Option<u64>,
    pub updated_at: Instant,
    pub error_message: Option<String>,
    pub actions: Actions,
    pub active_index: Option<usize>,
}

impl PlaybackSnapshot {
    pub fn new(state: PlaybackState) -> Self {
        Self {
            state,
            position_ms: None,
            updated_at: Instant::now(),
            error_message: None,
            actions: Actions::PLAY,
            active_index: None,
        }
    }

    /// Position extrapolated to `now` without asking the renderer
    ///
    /// Advances only while playing; other states hold the recorded position.
    pub fn position_at(&self, now: Instant) -> Option<u64> {
        let position = self.position_ms?;
        if !self.state.is_advancing() {
            return Some(position);
        }
        let elapsed = now.saturating_duration_since(self.updated_at).as_millis() as u64;
        Some(position + elapsed)
    }
}

/// Published session state plus its listeners
pub struct MediaSession {
    token: SessionToken,
    active: bool,
    released: bool,
    playback: PlaybackSnapshot,
    metadata: Option<TrackMetadata>,
    listeners: ListenerRegistry,
}

impl MediaSession {
    /// Create the session for `token`
    ///
    /// A nil token cannot identify a session and is rejected.
    pub fn new(token: SessionToken) -> Result<Self> {
        if token.is_nil() {
            return Err(Error::InvalidSession("session token is nil".to_string()));
        }
        info!("Media session {} created", token);
        Ok(Self {
            token,
            active: false,
            released: false,
            playback: PlaybackSnapshot::new(PlaybackState::None),
            metadata: None,
            listeners: ListenerRegistry::new(),
        })
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        if self.released || self.active == active {
            return;
        }
        debug!("Media session active: {}", active);
        self.active = active;
    }

    pub fn playback(&self) -> &PlaybackSnapshot {
        &self.playback
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        self.metadata.as_ref()
    }

    pub fn register(&mut self, listener: Box<dyn SessionListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn unregister(&mut self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_playback_state(&mut self, snapshot: PlaybackSnapshot) {
        if self.released {
            return;
        }
        let previous = self.playback.state;
        self.playback = snapshot;
        let snapshot = &self.playback;
        self.listeners
            .for_each(|l| l.on_playback_state(snapshot, previous));
    }

    pub fn set_metadata(&mut self, metadata: Option<TrackMetadata>) {
        if self.released {
            return;
        }
        self.metadata = metadata;
        let metadata = self.metadata.as_ref();
        self.listeners.for_each(|l| l.on_metadata(metadata));
    }

    pub fn notify_progress(&mut self, index: Option<usize>, position_ms: u64, duration_ms: u64) {
        if self.released {
            return;
        }
        self.listeners
            .for_each(|l| l.on_progress(index, position_ms, duration_ms));
    }

    pub fn notify_track_change(&mut self, index: Option<usize>) {
        if self.released {
            return;
        }
        self.listeners.for_each(|l| l.on_track_change(index));
    }

    pub fn notify_queue_changed(&mut self, queue: &[QueueItem]) {
        if self.released {
            return;
        }
        self.listeners.for_each(|l| l.on_queue_changed(queue));
    }

    pub fn notify_service_state(&mut self, started: bool) {
        if self.released {
            return;
        }
        self.listeners.for_each(|l| l.on_service_state(started));
    }

    /// Invalidate the token; idempotent
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.active = false;
        self.released = true;
        self.listeners.for_each(|l| l.on_session_released());
        info!("Media session {} released", self.token);
    }
}
