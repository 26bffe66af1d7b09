//! Media catalog cache
//!
//! Write-once mapping from track identifier to track metadata. The first
//! `populate` call wins; later calls are no-ops, so a refresh means building
//! a new `MediaCatalog`. Once populated the cache is read without locking.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use serde::Serialize;
use streamer_common::Track;
use tracing::{debug, warn};

use super::queue::ItemDescription;

/// Metadata of a cached track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackMetadata {
    pub media_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub source_url: Option<String>,
    pub artwork_url: Option<String>,
    pub external_url: Option<String>,
    /// Clip duration (previews are fixed length)
    pub duration_ms: u64,
}

impl TrackMetadata {
    fn from_track(track: &Track, duration_ms: u64) -> Self {
        Self {
            media_id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            source_url: track.preview_url.clone(),
            artwork_url: track.artwork_url.clone(),
            external_url: track.external_url.clone(),
            duration_ms,
        }
    }

    /// Queue item description for this track
    pub fn description(&self) -> ItemDescription {
        ItemDescription {
            media_id: self.media_id.clone(),
            title: self.title.clone(),
            subtitle: self.artist.clone(),
            source_url: self.source_url.clone(),
            artwork_url: self.artwork_url.clone(),
        }
    }
}

#[derive(Debug)]
struct CatalogIndex {
    /// Entries in the order the track list supplied them
    entries: Vec<TrackMetadata>,
    by_id: HashMap<String, usize>,
}

/// Write-once track metadata cache
#[derive(Debug)]
pub struct MediaCatalog {
    index: OnceCell<CatalogIndex>,
    duration_ms: u64,
}

impl MediaCatalog {
    /// Create an empty cache whose entries report `duration_ms` as their length
    pub fn new(duration_ms: u64) -> Self {
        Self {
            index: OnceCell::new(),
            duration_ms,
        }
    }

    /// Populate the cache from a track list
    ///
    /// Returns `true` if this call initialized the cache, `false` if it was
    /// already initialized and the call was ignored. Duplicate identifiers
    /// keep their first occurrence.
    pub fn populate(&self, tracks: &[Track]) -> bool {
        let mut initialized_here = false;
        self.index.get_or_init(|| {
            initialized_here = true;
            let mut entries = Vec::with_capacity(tracks.len());
            let mut by_id = HashMap::with_capacity(tracks.len());
            for track in tracks {
                if by_id.contains_key(&track.id) {
                    warn!("Duplicate track id {} ignored by catalog", track.id);
                    continue;
                }
                by_id.insert(track.id.clone(), entries.len());
                entries.push(TrackMetadata::from_track(track, self.duration_ms));
            }
            debug!("Catalog populated with {} tracks", entries.len());
            CatalogIndex { entries, by_id }
        });

        if !initialized_here {
            debug!("Catalog already initialized; populate ignored");
        }
        initialized_here
    }

    pub fn is_initialized(&self) -> bool {
        self.index.get().is_some()
    }

    /// Metadata for a track id, if cached
    pub fn lookup(&self, media_id: &str) -> Option<&TrackMetadata> {
        let index = self.index.get()?;
        index.by_id.get(media_id).map(|&i| &index.entries[i])
    }

    /// Snapshot of all cached metadata (empty before initialization)
    pub fn list(&self) -> Vec<TrackMetadata> {
        self.tracks().cloned().collect()
    }

    /// Iterate cached metadata in insertion order without cloning
    pub fn tracks(&self) -> impl Iterator<Item = &TrackMetadata> {
        self.index
            .get()
            .map(|index| index.entries.as_slice())
            .unwrap_or_default()
            .iter()
    }

    pub fn len(&self) -> usize {
        self.index.get().map_or(0, |index| index.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, title: &str) -> Track {
        Track::new(id, title, "Artist", "Album").with_preview_url(format!("https://p.example/{id}"))
    }

    #[test]
    fn test_populate_is_write_once() {
        let catalog = MediaCatalog::new(30_000);
        assert!(catalog.populate(&[track("a", "First A"), track("b", "B")]));
        assert!(!catalog.populate(&[track("a", "Second A"), track("c", "C")]));

        assert_eq!(catalog.lookup("a").unwrap().title, "First A");
        assert!(catalog.lookup("b").is_some());
        assert!(catalog.lookup("c").is_none());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_uninitialized_catalog_is_empty() {
        let catalog = MediaCatalog::new(30_000);
        assert!(!catalog.is_initialized());
        assert!(catalog.list().is_empty());
        assert!(catalog.lookup("a").is_none());
    }

    #[test]
    fn test_populate_with_empty_list_still_initializes() {
        let catalog = MediaCatalog::new(30_000);
        assert!(catalog.populate(&[]));
        assert!(catalog.is_initialized());
        assert!(!catalog.populate(&[track("a", "A")]));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_list_preserves_insertion_order_and_first_duplicate() {
        let catalog = MediaCatalog::new(30_000);
        catalog.populate(&[
            track("z", "Z"),
            track("m", "M first"),
            track("a", "A"),
            track("m", "M second"),
        ]);

        let ids: Vec<String> = catalog.list().into_iter().map(|m| m.media_id).collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
        assert_eq!(catalog.lookup("m").unwrap().title, "M first");
    }

    #[test]
    fn test_metadata_carries_track_fields() {
        let catalog = MediaCatalog::new(12_345);
        let t = track("a", "Title")
            .with_artwork_url("https://img.example/a.jpg")
            .with_external_url("https://catalog.example/a");
        catalog.populate(&[t]);

        let meta = catalog.lookup("a").unwrap();
        assert_eq!(meta.duration_ms, 12_345);
        assert_eq!(meta.artwork_url.as_deref(), Some("https://img.example/a.jpg"));
        assert_eq!(meta.external_url.as_deref(), Some("https://catalog.example/a"));

        let description = meta.description();
        assert_eq!(description.subtitle, "Artist");
        assert_eq!(description.source_url.as_deref(), Some("https://p.example/a"));
    }
}
