//! Test helper modules for streamer-player integration tests
//!
//! Provides reusable fakes:
//! - RecordingRenderer: records renderer calls, optionally reports ready
//! - RecordingListener: records every session publication in order
//! - track fixtures

#![allow(dead_code)]

pub mod recording_listener;
pub mod recording_renderer;

pub use recording_listener::{RecordingListener, SessionRecord};
pub use recording_renderer::{RecordingRenderer, RendererCall};

use streamer_common::Track;
use streamer_player::playback::coordinator::{Command, OpenRequest, StartIntent};

/// Tracks with ids `ids`, each with a preview URL `https://p.example/<id>`
pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .map(|id| {
            Track::new(*id, format!("Song {id}"), format!("Artist {id}"), "Album")
                .with_preview_url(preview_url(id))
                .with_artwork_url(format!("https://img.example/{id}.jpg"))
        })
        .collect()
}

pub fn preview_url(id: &str) -> String {
    format!("https://p.example/{id}")
}

/// Open command loading `ids` with `selected` chosen
pub fn open(ids: &[&str], selected: usize, intent: Option<StartIntent>) -> Command {
    Command::Open(OpenRequest {
        tracks: Some(tracks(ids)),
        selected: Some(selected),
        command: intent,
    })
}

/// Let spawned tasks and the coordinator loop run
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
