//! Playback-related type definitions

use serde::{Deserialize, Serialize};

/// Playback state published by the playback session
///
/// `None` is the initial state before anything was loaded. `Buffering` is the
/// transient state while a new source prepares. `Error` carries its message
/// alongside the state in the published snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    None,
    Stopped,
    Playing,
    Paused,
    Buffering,
    Error,
}

impl PlaybackState {
    /// Position advances with wall-clock time only while playing
    pub fn is_advancing(self) -> bool {
        self == PlaybackState::Playing
    }

    /// The progress publisher runs only in these states
    pub fn wants_progress_updates(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Buffering)
    }

    /// Terminal states tear down foreground presentation
    pub fn is_stopped(self) -> bool {
        matches!(self, PlaybackState::None | PlaybackState::Stopped)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::None => write!(f, "none"),
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_none() {
        assert_eq!(PlaybackState::default(), PlaybackState::None);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&PlaybackState::Buffering).unwrap();
        assert_eq!(json, "\"buffering\"");
        let state: PlaybackState = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(state, PlaybackState::Paused);
    }

    #[test]
    fn test_state_classification() {
        assert!(PlaybackState::Playing.is_advancing());
        assert!(!PlaybackState::Buffering.is_advancing());
        assert!(PlaybackState::Buffering.wants_progress_updates());
        assert!(!PlaybackState::Paused.wants_progress_updates());
        assert!(!PlaybackState::Error.wants_progress_updates());
        assert!(PlaybackState::Stopped.is_stopped());
        assert!(PlaybackState::None.is_stopped());
        assert!(!PlaybackState::Error.is_stopped());
    }
}
