//! # Streamer Player Library (streamer-player)
//!
//! Background playback service for catalog preview clips.
//!
//! **Purpose:** Own the playback queue, drive a single renderer through
//! play/pause/seek/skip, publish session state to listeners (notification
//! presenter, SSE clients) and stop itself when idle.
//!
//! **Architecture:** One coordinator task owns all playback state. Commands,
//! renderer callbacks and timer fires are all delivered to it as messages.

pub mod api;
pub mod audio;
pub mod error;
pub mod notification;
pub mod playback;
pub mod session;

pub use error::{Error, Result};
pub use playback::coordinator::{CoordinatorHandle, PlaybackCoordinator};
