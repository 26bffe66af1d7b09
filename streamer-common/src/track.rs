//! Track model
//!
//! A track is the catalog's unit of playback: immutable once fetched, held for
//! the lifetime of a queue and discarded when the queue is replaced.

use serde::{Deserialize, Serialize};

/// Preview clips served by the catalog are 30 seconds long
pub const PREVIEW_DURATION_MS: u64 = 30_000;

/// Track metadata as delivered by the catalog client
///
/// Equality is value equality over every field. Two track lists are the same
/// list when they have the same length and are pairwise equal in order; this
/// is what decides whether a start request resumes the current queue or
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    /// Catalog identifier, unique within one fetch
    pub id: String,
    /// Display title
    pub title: String,
    /// Primary artist name
    pub artist: String,
    /// Album name
    pub album: String,
    /// Preview clip URL (absent for tracks without a preview)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Album artwork URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    /// Link to the track page in the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

impl Track {
    /// Create a track with only the required display fields set
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            preview_url: None,
            artwork_url: None,
            external_url: None,
        }
    }

    pub fn with_preview_url(mut self, url: impl Into<String>) -> Self {
        self.preview_url = Some(url.into());
        self
    }

    pub fn with_artwork_url(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }

    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }
}

/// Returns true when both lists hold equal tracks in the same order
pub fn same_track_list(a: &[Track], b: &[Track]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}
