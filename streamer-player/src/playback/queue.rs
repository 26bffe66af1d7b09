//! Queue helper
//!
//! Pure functions that turn a catalog snapshot into an ordered, indexable
//! playback queue and resolve identifiers to queue indices. A queue is built
//! once and never renumbered: `queue_id` is the list index at construction
//! time, and a new track list replaces the whole queue.

use serde::Serialize;
use tracing::{debug, error};

use super::catalog::MediaCatalog;

/// Display description carried by a queue item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDescription {
    /// Track identifier
    pub media_id: String,
    /// Display title
    pub title: String,
    /// Secondary line (artist name)
    pub subtitle: String,
    /// Preview clip URL the renderer prepares
    pub source_url: Option<String>,
    /// Artwork URL
    pub artwork_url: Option<String>,
}

/// One playable entry of the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub description: ItemDescription,
    /// Position assigned at construction, stable for the queue's lifetime
    pub queue_id: u64,
}

impl QueueItem {
    pub fn media_id(&self) -> &str {
        &self.description.media_id
    }

    pub fn source_url(&self) -> Option<&str> {
        self.description.source_url.as_deref()
    }
}

/// Ordered playback queue
pub type Queue = Vec<QueueItem>;

/// Build a queue from the catalog's tracks in catalog order
///
/// Returns `None` when no catalog is available; callers treat that as
/// "cannot build queue" and decline to start playback. An empty catalog
/// yields an empty queue.
pub fn build_queue(catalog: Option<&MediaCatalog>) -> Option<Queue> {
    let Some(catalog) = catalog else {
        error!("Unable to get playing queue: no catalog");
        return None;
    };

    let queue: Queue = catalog
        .tracks()
        .enumerate()
        .map(|(position, track)| QueueItem {
            description: track.description(),
            queue_id: position as u64,
        })
        .collect();

    debug!("Built playing queue with {} items", queue.len());
    Some(queue)
}

/// Index of the first item whose track identifier matches `media_id`
pub fn index_of_media_id(queue: &[QueueItem], media_id: &str) -> Option<usize> {
    queue.iter().position(|item| item.media_id() == media_id)
}

/// Index of the first item whose stored queue position matches `queue_id`
///
/// Under the stable-ordering rule this equals `queue_id` itself; a mismatch
/// means the queue was built incorrectly.
pub fn index_of_queue_id(queue: &[QueueItem], queue_id: u64) -> Option<usize> {
    queue.iter().position(|item| item.queue_id == queue_id)
}

/// True iff a queue exists and `index` points inside it
pub fn is_playable(index: Option<usize>, queue: Option<&[QueueItem]>) -> bool {
    match (index, queue) {
        (Some(index), Some(queue)) => index < queue.len(),
        _ => false,
    }
}

/// Next index with wraparound past the end; `None` for an empty queue
pub fn wrap_next(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match current {
        Some(index) if index + 1 < len => Some(index + 1),
        Some(_) => Some(0),
        None => Some(0),
    }
}

/// Previous index with wraparound before the start; `None` for an empty queue
pub fn wrap_previous(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match current {
        Some(index) if index > 0 && index <= len => Some(index - 1),
        _ => Some(len - 1),
    }
}
