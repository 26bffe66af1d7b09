//! Renderer fake that records calls
//!
//! With `auto_ready` it reports `Ready` for every prepare on the event
//! channel, standing in for a renderer whose fetch succeeds at once.

use std::sync::{Arc, Mutex};

use streamer_player::playback::{Renderer, RendererEvent, RendererEventKind};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererCall {
    Prepare { source: String, generation: u64 },
    Start,
    Pause,
    SeekTo(u64),
    Reset,
    Release,
}

pub struct RecordingRenderer {
    calls: Arc<Mutex<Vec<RendererCall>>>,
    events: Option<mpsc::UnboundedSender<RendererEvent>>,
    rendering: bool,
    position_ms: u64,
}

impl RecordingRenderer {
    /// Renderer that never reports by itself
    pub fn silent() -> (Self, Arc<Mutex<Vec<RendererCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let renderer = Self {
            calls: calls.clone(),
            events: None,
            rendering: false,
            position_ms: 0,
        };
        (renderer, calls)
    }

    /// Renderer that reports ready for every prepare
    pub fn auto_ready(
        events: mpsc::UnboundedSender<RendererEvent>,
    ) -> (Self, Arc<Mutex<Vec<RendererCall>>>) {
        let (mut renderer, calls) = Self::silent();
        renderer.events = Some(events);
        (renderer, calls)
    }

    fn record(&self, call: RendererCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Sources passed to prepare, in order
pub fn prepared_sources(calls: &Arc<Mutex<Vec<RendererCall>>>) -> Vec<String> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|call| match call {
            RendererCall::Prepare { source, .. } => Some(source.clone()),
            _ => None,
        })
        .collect()
}

impl Renderer for RecordingRenderer {
    fn prepare(&mut self, source: &str, generation: u64) {
        self.rendering = false;
        self.record(RendererCall::Prepare {
            source: source.to_string(),
            generation,
        });
        if let Some(events) = &self.events {
            let _ = events.send(RendererEvent {
                generation,
                kind: RendererEventKind::Ready,
            });
        }
    }

    fn start(&mut self) {
        self.rendering = true;
        self.record(RendererCall::Start);
    }

    fn pause(&mut self) {
        self.rendering = false;
        self.record(RendererCall::Pause);
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.position_ms = position_ms;
        self.record(RendererCall::SeekTo(position_ms));
    }

    fn reset(&mut self) {
        self.rendering = false;
        self.position_ms = 0;
        self.record(RendererCall::Reset);
    }

    fn release(&mut self) {
        self.record(RendererCall::Release);
    }

    fn is_rendering(&self) -> bool {
        self.rendering
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }
}
