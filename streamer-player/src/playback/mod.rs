//! Playback queue, engine and coordinator

pub mod catalog;
pub mod coordinator;
pub mod engine;
pub mod events;
pub mod queue;
pub mod renderer;
pub mod timer;

pub use catalog::{MediaCatalog, TrackMetadata};
pub use coordinator::{Command, CoordinatorSettings, OpenRequest, PlaybackCoordinator, StartIntent};
pub use engine::PlaybackEngine;
pub use events::{EngineEvent, EngineState};
pub use queue::{Queue, QueueItem};
pub use renderer::{PreviewRenderer, Renderer, RendererEvent, RendererEventKind};
