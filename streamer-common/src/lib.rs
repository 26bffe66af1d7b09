//! # Streamer Common Library
//!
//! Shared code for the streamer workspace including:
//! - Track model with explicit value equality
//! - Event types (StreamerEvent enum) and the EventBus
//! - Configuration and persisted preference loading
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod track;

pub use error::{Error, Result};
pub use track::Track;
