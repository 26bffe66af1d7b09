//! Internal playback engine events (not exposed via SSE)
//!
//! The engine reports upward to the coordinator through this closed set of
//! variants. The coordinator converts the ones listeners care about into
//! session publications; `StreamerEvent` is the external form.

use std::fmt;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No source loaded, or the last source completed or failed
    #[default]
    Idle,
    /// Waiting for the renderer to report ready
    Preparing,
    /// Renderer started
    Playing,
    /// Renderer holds a source but is not advancing
    Paused,
    /// Last prepare or render failed
    Error,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Preparing => "preparing",
            EngineState::Playing => "playing",
            EngineState::Paused => "paused",
            EngineState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Events emitted by the playback engine for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Renderer finished preparing and playback started
    Ready,

    /// Current source played to the end
    Completed,

    /// Prepare or render failed; engine is back to idle
    ///
    /// Non-fatal: the next play request can use the engine again.
    Error(String),

    /// Engine moved to a new lifecycle state
    StateChanged(EngineState),
}
