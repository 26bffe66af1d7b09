//! Event types for the streamer event system
//!
//! Provides the shared event definitions and the EventBus used to fan
//! playback session changes out to SSE clients.

mod playback_types;

pub use playback_types::PlaybackState;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Streamer event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamerEvent {
    /// Playback state changed
    ///
    /// Triggers:
    /// - SSE: Update transport controls
    /// - Notification: Rebuild or tear down
    PlaybackStateChanged {
        /// Playback state before change
        old_state: PlaybackState,
        /// Playback state after change
        new_state: PlaybackState,
        /// Error message when the new state is `error`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        /// Available transport actions bitmask
        actions: u32,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback progress update
    ///
    /// Emitted at a fixed rate while playing or buffering, using the
    /// extrapolated position rather than a query of the renderer.
    PlaybackProgress {
        /// Queue index of the current item
        index: i64,
        /// Current playback position (milliseconds)
        position_ms: u64,
        /// Total clip duration (milliseconds)
        duration_ms: u64,
        /// Progress update timestamp
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current item metadata changed
    MetadataChanged {
        /// Track identifier (None when metadata was cleared)
        track_id: Option<String>,
        /// Display title
        title: Option<String>,
        /// Artist name
        artist: Option<String>,
        /// When metadata changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current queue index changed (skip, completion or selection)
    TrackChanged {
        /// New queue index (-1 when unset)
        index: i64,
        /// When the index changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue replaced by a new track list
    QueueChanged {
        /// Track identifiers in queue order
        track_ids: Vec<String>,
        /// When queue changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Background service started or stopped
    ServiceStateChanged {
        /// Whether the service is started
        started: bool,
        /// When the service state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl StreamerEvent {
    /// SSE event name for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            StreamerEvent::PlaybackProgress { .. } => "PlaybackProgress",
            StreamerEvent::MetadataChanged { .. } => "MetadataChanged",
            StreamerEvent::TrackChanged { .. } => "TrackChanged",
            StreamerEvent::QueueChanged { .. } => "QueueChanged",
            StreamerEvent::ServiceStateChanged { .. } => "ServiceStateChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, so slow subscribers never block the
/// publisher and lagging subscribers observe a `Lagged` error instead.
///
/// # Examples
///
/// ```
/// use streamer_common::events::{EventBus, StreamerEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(StreamerEvent::ServiceStateChanged {
///     started: true,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: StreamerEvent,
    ) -> Result<usize, broadcast::error::SendError<StreamerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StreamerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
