//! Session listener that records publications

use std::sync::{Arc, Mutex};

use streamer_common::events::PlaybackState;
use streamer_player::playback::catalog::TrackMetadata;
use streamer_player::playback::queue::QueueItem;
use streamer_player::session::{PlaybackSnapshot, SessionListener};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRecord {
    State {
        previous: PlaybackState,
        state: PlaybackState,
        error: Option<String>,
        actions: u32,
    },
    Metadata(Option<String>),
    Progress {
        index: Option<usize>,
        position_ms: u64,
    },
    TrackChange(Option<usize>),
    Queue(Vec<String>),
    Service(bool),
    Released,
}

#[derive(Clone, Default)]
pub struct RecordingListener {
    records: Arc<Mutex<Vec<SessionRecord>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    /// Published playback states, in order
    pub fn states(&self) -> Vec<PlaybackState> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                SessionRecord::State { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn progress_count(&self) -> usize {
        self.records()
            .iter()
            .filter(|record| matches!(record, SessionRecord::Progress { .. }))
            .count()
    }

    fn push(&self, record: SessionRecord) {
        self.records.lock().unwrap().push(record);
    }
}

impl SessionListener for RecordingListener {
    fn on_playback_state(&mut self, snapshot: &PlaybackSnapshot, previous: PlaybackState) {
        self.push(SessionRecord::State {
            previous,
            state: snapshot.state,
            error: snapshot.error_message.clone(),
            actions: snapshot.actions.bits(),
        });
    }

    fn on_metadata(&mut self, metadata: Option<&TrackMetadata>) {
        self.push(SessionRecord::Metadata(metadata.map(|m| m.media_id.clone())));
    }

    fn on_progress(&mut self, index: Option<usize>, position_ms: u64, _duration_ms: u64) {
        self.push(SessionRecord::Progress { index, position_ms });
    }

    fn on_track_change(&mut self, index: Option<usize>) {
        self.push(SessionRecord::TrackChange(index));
    }

    fn on_queue_changed(&mut self, queue: &[QueueItem]) {
        self.push(SessionRecord::Queue(
            queue.iter().map(|item| item.media_id().to_string()).collect(),
        ));
    }

    fn on_service_state(&mut self, started: bool) {
        self.push(SessionRecord::Service(started));
    }

    fn on_session_released(&mut self) {
        self.push(SessionRecord::Released);
    }
}
