//! Clip player shared between the renderer and the audio callback
//!
//! The renderer loads decoded clips and moves the cursor; the output
//! callback calls `fill` to pull the next samples. When the cursor reaches
//! the end of a playing clip, `fill` reports `Completed` once, tagged with
//! the generation the clip was loaded for.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::decode::DecodedClip;
use super::output::OutputFormat;
use crate::playback::renderer::{RendererEvent, RendererEventKind};

struct LoadedClip {
    samples: Vec<f32>,
    frames: usize,
    generation: u64,
    completed: bool,
}

#[derive(Default)]
struct PlayerState {
    /// Generation the next `load` must carry to be accepted
    expected: Option<u64>,
    clip: Option<LoadedClip>,
    playing: bool,
    /// Position in frames
    cursor: usize,
}

struct PlayerShared {
    format: OutputFormat,
    state: Mutex<PlayerState>,
    events: mpsc::UnboundedSender<RendererEvent>,
}

/// Cheaply cloneable handle to one playback cursor
#[derive(Clone)]
pub struct ClipPlayer {
    shared: Arc<PlayerShared>,
}

impl ClipPlayer {
    pub fn new(format: OutputFormat, events: mpsc::UnboundedSender<RendererEvent>) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                format,
                state: Mutex::new(PlayerState::default()),
                events,
            }),
        }
    }

    /// Format `fill` writes and loaded clips must be conformed to
    pub fn format(&self) -> OutputFormat {
        self.shared.format
    }

    fn state(&self) -> MutexGuard<'_, PlayerState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the current clip and accept only a clip for `generation` next
    pub fn begin(&self, generation: u64) {
        let mut state = self.state();
        *state = PlayerState {
            expected: Some(generation),
            ..PlayerState::default()
        };
    }

    /// Install a decoded clip
    ///
    /// Returns `false` when `generation` is no longer the expected one; the
    /// clip is discarded. A seek made while the clip was loading is kept.
    pub fn load(&self, clip: DecodedClip, generation: u64) -> bool {
        let mut state = self.state();
        if state.expected != Some(generation) {
            debug!("Discarding clip for superseded generation {}", generation);
            return false;
        }
        let frames = clip.frames();
        state.cursor = state.cursor.min(frames);
        state.clip = Some(LoadedClip {
            samples: clip.samples,
            frames,
            generation,
            completed: false,
        });
        true
    }

    /// Drop the clip and refuse late loads
    pub fn clear(&self) {
        *self.state() = PlayerState::default();
    }

    pub fn play(&self) {
        let mut state = self.state();
        let playable = state.clip.as_ref().is_some_and(|clip| !clip.completed);
        state.playing = playable;
    }

    pub fn pause(&self) {
        self.state().playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    pub fn seek(&self, position_ms: u64) {
        let frame = (position_ms * self.shared.format.sample_rate as u64 / 1000) as usize;
        let mut state = self.state();
        let frame = match state.clip.as_mut() {
            Some(clip) => {
                let frame = frame.min(clip.frames);
                clip.completed = clip.completed && frame >= clip.frames;
                frame
            }
            None => frame,
        };
        state.cursor = frame;
    }

    pub fn position_ms(&self) -> u64 {
        let state = self.state();
        let cursor = match state.clip.as_ref() {
            Some(clip) => state.cursor.min(clip.frames),
            None => state.cursor,
        };
        self.frames_to_ms(cursor as u64)
    }

    /// Length of the loaded clip
    pub fn duration_ms(&self) -> Option<u64> {
        let frames = self.state().clip.as_ref().map(|clip| clip.frames as u64)?;
        Some(self.frames_to_ms(frames))
    }

    fn frames_to_ms(&self, frames: u64) -> u64 {
        match self.shared.format.sample_rate {
            0 => 0,
            rate => frames * 1000 / rate as u64,
        }
    }

    /// Write the next interleaved samples into `out`
    ///
    /// Called from the audio callback. Writes silence while paused, while
    /// nothing is loaded, past the end of the clip, and when the state is
    /// briefly held by another thread.
    pub fn fill(&self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = self.shared.format.channels.max(1) as usize;

        let Ok(mut state) = self.shared.state.try_lock() else {
            return;
        };
        let state = &mut *state;
        if !state.playing {
            return;
        }
        let Some(clip) = state.clip.as_mut() else {
            return;
        };

        let wanted = out.len() / channels;
        let count = wanted.min(clip.frames.saturating_sub(state.cursor));
        let start = state.cursor * channels;
        let end = start + count * channels;
        out[..count * channels].copy_from_slice(&clip.samples[start..end]);
        state.cursor += count;

        if state.cursor >= clip.frames && !clip.completed {
            clip.completed = true;
            state.playing = false;
            debug!("Clip drained (generation {})", clip.generation);
            let _ = self.shared.events.send(RendererEvent {
                generation: clip.generation,
                kind: RendererEventKind::Completed,
            });
        }
    }
}
