//! Error types for streamer-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for streamer-player
#[derive(Error, Debug)]
pub enum Error {
    /// Shared configuration or input errors
    #[error(transparent)]
    Common(#[from] streamer_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Preview or artwork fetch errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Artwork could not be loaded
    #[error("Artwork error: {0}")]
    Artwork(String),

    /// Compressed audio could not be decoded or converted
    #[error("Decode error: {0}")]
    Decode(String),

    /// Audio device could not be opened or driven
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Media-control backend errors
    #[error("Media controls error: {0}")]
    MediaControls(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Queue construction errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Missing or invalid session token
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Queue item and catalog entry disagree about the track being played
    #[error("Internal consistency fault: {0}")]
    ConsistencyFault(String),

    /// The coordinator loop is no longer running
    #[error("Playback coordinator is not running")]
    ChannelClosed,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// Fatal errors terminate the coordinator loop instead of being logged
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConsistencyFault(_))
    }
}

/// Convenience Result type using streamer-player Error
pub type Result<T> = std::result::Result<T, Error>;
