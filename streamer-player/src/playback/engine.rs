//! Playback engine
//!
//! Wraps one `Renderer` and exposes play/pause/seek/skip to the coordinator.
//!
//! **Responsibilities:**
//! - Drive the renderer through idle → preparing → playing/paused
//! - Start rendering automatically when the renderer reports ready, unless
//!   a pause arrived while the source was still preparing
//! - Drop renderer callbacks from abandoned sources (generation check)
//! - Report `EngineEvent`s upward through an outbox the coordinator drains
//!
//! Skips never reuse the current stream: they reset the renderer and prepare
//! the new source from scratch.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::events::{EngineEvent, EngineState};
use super::queue::QueueItem;
use super::renderer::{Renderer, RendererEvent, RendererEventKind};

/// Single-source playback engine
pub struct PlaybackEngine {
    renderer: Box<dyn Renderer>,
    state: EngineState,
    /// Generation of the source currently held by the renderer
    generation: u64,
    current_media_id: Option<String>,
    /// Set once the renderer reported ready for the current generation
    prepared: bool,
    released: bool,
    outbox: VecDeque<EngineEvent>,
}

impl PlaybackEngine {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            renderer,
            state: EngineState::Idle,
            generation: 0,
            current_media_id: None,
            prepared: false,
            released: false,
            outbox: VecDeque::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// True while the renderer is advancing
    pub fn is_playing(&self) -> bool {
        self.renderer.is_rendering()
    }

    pub fn position_ms(&self) -> u64 {
        self.renderer.position_ms()
    }

    /// Length of the prepared source, when the renderer knows it
    pub fn duration_ms(&self) -> Option<u64> {
        self.renderer.duration_ms()
    }

    pub fn current_media_id(&self) -> Option<&str> {
        self.current_media_id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Play `item`
    ///
    /// Resumes in place when `item` is the source currently held paused;
    /// any other item is prepared from scratch. A source paused before it was
    /// ready goes back to preparing and starts once the renderer reports.
    pub fn play(&mut self, item: &QueueItem) {
        let holds_item = self.current_media_id.as_deref() == Some(item.media_id());
        if holds_item && self.state == EngineState::Paused {
            if self.prepared {
                debug!("Resuming {}", item.media_id());
                self.renderer.start();
                self.set_state(EngineState::Playing);
            } else {
                debug!("{} still preparing, will start when ready", item.media_id());
                self.set_state(EngineState::Preparing);
            }
            return;
        }
        if holds_item && matches!(self.state, EngineState::Playing | EngineState::Preparing) {
            debug!("{} already {}", item.media_id(), self.state);
            return;
        }
        self.load(item);
    }

    /// Pause rendering
    ///
    /// Pausing a source that is still preparing cancels the automatic start;
    /// the source stays loaded and a later `play` resumes it.
    pub fn pause(&mut self) {
        match self.state {
            EngineState::Playing => {
                self.renderer.pause();
                self.set_state(EngineState::Paused);
            }
            EngineState::Preparing => {
                debug!("Pause while preparing generation {}", self.generation);
                self.set_state(EngineState::Paused);
            }
            _ => {}
        }
    }

    pub fn seek_to(&mut self, position_ms: u64) {
        if self.current_media_id.is_none() {
            debug!("Seek to {}ms ignored: no source", position_ms);
            return;
        }
        self.renderer.seek_to(position_ms);
    }

    pub fn skip_to_next(&mut self, item: &QueueItem) {
        debug!("Skip forward to {}", item.media_id());
        self.load(item);
    }

    pub fn skip_to_prev(&mut self, item: &QueueItem) {
        debug!("Skip back to {}", item.media_id());
        self.load(item);
    }

    /// Hard stop
    ///
    /// Resets the renderer and, with `release`, frees its resources. Bumps
    /// the generation so in-flight callbacks are dropped. Repeated stops are
    /// no-ops.
    pub fn stop(&mut self, release: bool) {
        let idle = self.current_media_id.is_none()
            && matches!(self.state, EngineState::Idle | EngineState::Error);
        if idle && (!release || self.released) {
            return;
        }

        self.generation += 1;
        self.prepared = false;
        self.renderer.reset();
        if release {
            self.renderer.release();
            self.released = true;
        }
        self.current_media_id = None;
        self.set_state(EngineState::Idle);
    }

    /// Apply an asynchronous renderer callback
    ///
    /// Returns `false` when the callback belonged to an abandoned source and
    /// was dropped.
    pub fn handle_renderer_event(&mut self, event: RendererEvent) -> bool {
        if event.generation != self.generation {
            debug!(
                "Dropping {:?} from stale generation {} (current {})",
                event.kind, event.generation, self.generation
            );
            return false;
        }

        match event.kind {
            RendererEventKind::Ready => match self.state {
                EngineState::Preparing => {
                    self.prepared = true;
                    self.renderer.start();
                    self.set_state(EngineState::Playing);
                    self.outbox.push_back(EngineEvent::Ready);
                }
                EngineState::Paused if !self.prepared => {
                    debug!("Ready while paused, holding generation {}", self.generation);
                    self.prepared = true;
                    self.outbox.push_back(EngineEvent::Ready);
                }
                _ => {
                    debug!("Ready ignored in state {}", self.state);
                    return false;
                }
            },
            RendererEventKind::Completed => {
                info!("Completed {:?}", self.current_media_id);
                self.prepared = false;
                self.current_media_id = None;
                self.set_state(EngineState::Idle);
                self.outbox.push_back(EngineEvent::Completed);
            }
            RendererEventKind::Failed(message) => self.fail(message),
        }
        true
    }

    /// Next pending event for the coordinator
    pub fn next_event(&mut self) -> Option<EngineEvent> {
        self.outbox.pop_front()
    }

    fn load(&mut self, item: &QueueItem) {
        self.generation += 1;
        self.prepared = false;
        self.renderer.reset();
        self.released = false;

        let Some(source) = item.source_url() else {
            self.fail(format!("No preview available for {}", item.description.title));
            return;
        };

        info!("Preparing {} (generation {})", item.media_id(), self.generation);
        self.current_media_id = Some(item.media_id().to_string());
        self.renderer.prepare(source, self.generation);
        self.set_state(EngineState::Preparing);
    }

    fn fail(&mut self, message: String) {
        warn!("Playback failed: {}", message);
        self.prepared = false;
        self.renderer.reset();
        self.current_media_id = None;
        self.set_state(EngineState::Error);
        self.outbox.push_back(EngineEvent::Error(message));
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!("Engine {} -> {}", self.state, state);
            self.state = state;
            self.outbox.push_back(EngineEvent::StateChanged(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::queue::ItemDescription;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeRenderer {
        calls: Arc<Mutex<Vec<String>>>,
        rendering: bool,
    }

    impl Renderer for FakeRenderer {
        fn prepare(&mut self, source: &str, generation: u64) {
            self.rendering = false;
            self.calls.lock().unwrap().push(format!("prepare {source} {generation}"));
        }
        fn start(&mut self) {
            self.rendering = true;
            self.calls.lock().unwrap().push("start".into());
        }
        fn pause(&mut self) {
            self.rendering = false;
            self.calls.lock().unwrap().push("pause".into());
        }
        fn seek_to(&mut self, position_ms: u64) {
            self.calls.lock().unwrap().push(format!("seek {position_ms}"));
        }
        fn reset(&mut self) {
            self.rendering = false;
            self.calls.lock().unwrap().push("reset".into());
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

    fn item(id: &str, url: Option<&str>) -> QueueItem {
        QueueItem {
            description: ItemDescription {
                media_id: id.to_string(),
                title: format!("Song {id}"),
                subtitle: "Artist".to_string(),
                source_url: url.map(str::to_string),
                artwork_url: None,
            },
            queue_id: 0,
        }
    }

    fn engine() -> (PlaybackEngine, Arc<Mutex<Vec<String>>>) {
        let renderer = FakeRenderer::default();
        let calls = renderer.calls.clone();
        (PlaybackEngine::new(Box::new(renderer)), calls)
    }

    fn drain(engine: &mut PlaybackEngine) -> Vec<EngineEvent> {
        std::iter::from_fn(|| engine.next_event()).collect()
    }

    fn ready(generation: u64) -> RendererEvent {
        RendererEvent {
            generation,
            kind: RendererEventKind::Ready,
        }
    }

    #[test]
    fn test_play_prepares_then_starts_on_ready() {
        let (mut engine, calls) = engine();
        engine.play(&item("a", Some("http://x/a")));
        assert_eq!(engine.state(), EngineState::Preparing);
        assert_eq!(drain(&mut engine), vec![EngineEvent::StateChanged(EngineState::Preparing)]);

        assert!(engine.handle_renderer_event(ready(engine.generation())));
        assert_eq!(engine.state(), EngineState::Playing);
        assert!(engine.is_playing());
        assert_eq!(
            drain(&mut engine),
            vec![EngineEvent::StateChanged(EngineState::Playing), EngineEvent::Ready]
        );
        assert_eq!(calls.lock().unwrap().last().unwrap(), "start");
    }

    #[test]
    fn test_stale_ready_is_dropped_after_skip() {
        let (mut engine, calls) = engine();
        engine.play(&item("a", Some("http://x/a")));
        let first_generation = engine.generation();
        engine.skip_to_next(&item("b", Some("http://x/b")));

        assert!(!engine.handle_renderer_event(ready(first_generation)));
        assert_eq!(engine.state(), EngineState::Preparing);
        assert!(!calls.lock().unwrap().contains(&"start".to_string()));

        assert!(engine.handle_renderer_event(ready(engine.generation())));
        assert_eq!(engine.current_media_id(), Some("b"));
    }

    #[test]
    fn test_play_resumes_paused_item_in_place() {
        let (mut engine, calls) = engine();
        let a = item("a", Some("http://x/a"));
        engine.play(&a);
        engine.handle_renderer_event(ready(engine.generation()));
        engine.pause();
        assert_eq!(engine.state(), EngineState::Paused);

        calls.lock().unwrap().clear();
        engine.play(&a);
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(*calls.lock().unwrap(), vec!["start".to_string()]);
    }

    #[test]
    fn test_pause_while_preparing_holds_after_ready() {
        let (mut engine, calls) = engine();
        let a = item("a", Some("http://x/a"));
        engine.play(&a);
        engine.pause();
        assert_eq!(engine.state(), EngineState::Paused);
        drain(&mut engine);

        assert!(engine.handle_renderer_event(ready(engine.generation())));
        assert_eq!(engine.state(), EngineState::Paused);
        assert!(!engine.is_playing());
        assert_eq!(drain(&mut engine), vec![EngineEvent::Ready]);
        assert!(!calls.lock().unwrap().contains(&"start".to_string()));

        engine.play(&a);
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(calls.lock().unwrap().last().unwrap(), "start");
    }

    #[test]
    fn test_play_after_early_pause_waits_for_ready() {
        let (mut engine, calls) = engine();
        let a = item("a", Some("http://x/a"));
        engine.play(&a);
        engine.pause();
        engine.play(&a);
        assert_eq!(engine.state(), EngineState::Preparing);
        assert!(!calls.lock().unwrap().contains(&"start".to_string()));

        engine.handle_renderer_event(ready(engine.generation()));
        assert_eq!(engine.state(), EngineState::Playing);
        assert!(engine.is_playing());
    }

    #[test]
    fn test_skip_always_reprepares() {
        let (mut engine, calls) = engine();
        let a = item("a", Some("http://x/a"));
        engine.play(&a);
        engine.handle_renderer_event(ready(engine.generation()));

        calls.lock().unwrap().clear();
        engine.skip_to_prev(&a);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], "reset");
        assert!(calls[1].starts_with("prepare http://x/a"));
    }

    #[test]
    fn test_renderer_failure_reports_error_and_engine_stays_usable() {
        let (mut engine, _) = engine();
        engine.play(&item("a", Some("http://x/a")));
        drain(&mut engine);

        engine.handle_renderer_event(RendererEvent {
            generation: engine.generation(),
            kind: RendererEventKind::Failed("404".into()),
        });
        assert_eq!(engine.state(), EngineState::Error);
        assert!(drain(&mut engine).contains(&EngineEvent::Error("404".into())));

        engine.play(&item("b", Some("http://x/b")));
        assert_eq!(engine.state(), EngineState::Preparing);
    }

    #[test]
    fn test_item_without_source_fails() {
        let (mut engine, calls) = engine();
        engine.play(&item("a", None));

        assert_eq!(engine.state(), EngineState::Error);
        let events = drain(&mut engine);
        assert!(matches!(events.last(), Some(EngineEvent::Error(msg)) if msg.contains("Song a")));
        assert!(!calls.lock().unwrap().iter().any(|c| c.starts_with("prepare")));
    }

    #[test]
    fn test_completion_returns_to_idle() {
        let (mut engine, _) = engine();
        engine.play(&item("a", Some("http://x/a")));
        engine.handle_renderer_event(ready(engine.generation()));
        drain(&mut engine);

        engine.handle_renderer_event(RendererEvent {
            generation: engine.generation(),
            kind: RendererEventKind::Completed,
        });
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(
            drain(&mut engine),
            vec![EngineEvent::StateChanged(EngineState::Idle), EngineEvent::Completed]
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut engine, calls) = engine();
        engine.play(&item("a", Some("http://x/a")));
        let generation = engine.generation();

        engine.stop(true);
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.generation() > generation);
        let after_first = calls.lock().unwrap().len();

        engine.stop(true);
        engine.stop(false);
        assert_eq!(calls.lock().unwrap().len(), after_first);

        // Callback from before the stop must not restart anything
        assert!(!engine.handle_renderer_event(ready(generation)));
    }

    #[test]
    fn test_seek_without_source_is_ignored() {
        let (mut engine, calls) = engine();
        engine.seek_to(1_000);
        assert!(calls.lock().unwrap().is_empty());

        engine.play(&item("a", Some("http://x/a")));
        engine.seek_to(1_000);
        assert_eq!(calls.lock().unwrap().last().unwrap(), "seek 1000");
    }
}
