//! Session listeners
//!
//! Observers register with the `MediaSession` and receive every publication
//! in registration order. Handles are small generated integers; removal is
//! by handle.

use std::collections::BTreeMap;

use chrono::Utc;
use streamer_common::events::{EventBus, PlaybackState, StreamerEvent};
use tracing::debug;

use super::PlaybackSnapshot;
use crate::playback::catalog::TrackMetadata;
use crate::playback::queue::QueueItem;

/// Observer of published session changes
///
/// Every method has an empty default so listeners implement only what they
/// display.
pub trait SessionListener: Send {
    /// Playback state, actions or position changed
    fn on_playback_state(&mut self, _snapshot: &PlaybackSnapshot, _previous: PlaybackState) {}

    /// Current item metadata changed (`None` when cleared)
    fn on_metadata(&mut self, _metadata: Option<&TrackMetadata>) {}

    /// Periodic extrapolated position while playing
    fn on_progress(&mut self, _index: Option<usize>, _position_ms: u64, _duration_ms: u64) {}

    /// Current queue index changed
    fn on_track_change(&mut self, _index: Option<usize>) {}

    /// Queue replaced by a new track list
    fn on_queue_changed(&mut self, _queue: &[QueueItem]) {}

    /// Background service started or stopped
    fn on_service_state(&mut self, _started: bool) {}

    /// Session token invalidated; no further publications follow
    fn on_session_released(&mut self) {}
}

/// Handle returned by listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Registered listeners keyed by handle
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Box<dyn SessionListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn SessionListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, listener);
        debug!("Registered session listener {}", id.0);
        id
    }

    /// Remove a listener; returns false for unknown handles
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            debug!("Unregistered session listener {}", id.0);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Call `f` on every listener in handle order
    pub fn for_each(&mut self, mut f: impl FnMut(&mut dyn SessionListener)) {
        for listener in self.listeners.values_mut() {
            f(listener.as_mut());
        }
    }
}

/// Forwards session publications onto the `EventBus` for SSE clients
pub struct EventBusListener {
    bus: EventBus,
}

impl EventBusListener {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

fn wire_index(index: Option<usize>) -> i64 {
    index.map_or(-1, |i| i as i64)
}

impl SessionListener for EventBusListener {
    fn on_playback_state(&mut self, snapshot: &PlaybackSnapshot, previous: PlaybackState) {
        self.bus.emit_lossy(StreamerEvent::PlaybackStateChanged {
            old_state: previous,
            new_state: snapshot.state,
            error_message: snapshot.error_message.clone(),
            actions: snapshot.actions.bits(),
            timestamp: Utc::now(),
        });
    }

    fn on_metadata(&mut self, metadata: Option<&TrackMetadata>) {
        self.bus.emit_lossy(StreamerEvent::MetadataChanged {
            track_id: metadata.map(|m| m.media_id.clone()),
            title: metadata.map(|m| m.title.clone()),
            artist: metadata.map(|m| m.artist.clone()),
            timestamp: Utc::now(),
        });
    }

    fn on_progress(&mut self, index: Option<usize>, position_ms: u64, duration_ms: u64) {
        self.bus.emit_lossy(StreamerEvent::PlaybackProgress {
            index: wire_index(index),
            position_ms,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    fn on_track_change(&mut self, index: Option<usize>) {
        self.bus.emit_lossy(StreamerEvent::TrackChanged {
            index: wire_index(index),
            timestamp: Utc::now(),
        });
    }

    fn on_queue_changed(&mut self, queue: &[QueueItem]) {
        self.bus.emit_lossy(StreamerEvent::QueueChanged {
            track_ids: queue.iter().map(|item| item.media_id().to_string()).collect(),
            timestamp: Utc::now(),
        });
    }

    fn on_service_state(&mut self, started: bool) {
        self.bus.emit_lossy(StreamerEvent::ServiceStateChanged {
            started,
            timestamp: Utc::now(),
        });
    }
}
