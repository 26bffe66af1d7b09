//! Renderer seam
//!
//! A renderer is the single decode/render primitive the playback engine
//! drives. Preparing a source is asynchronous: the renderer reports
//! `Ready`, `Completed` or `Failed` later on an mpsc channel, tagged with the
//! generation it was given at prepare time so the engine can drop callbacks
//! that belong to a source it has already abandoned.
//!
//! **Responsibilities:**
//! - `Renderer` trait (engine-facing capability set)
//! - `RendererEvent` (asynchronous callbacks)
//! - `PreviewRenderer`, the default renderer for catalog preview clips

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{decode_clip, AudioOutput, ClipPlayer, DecodedClip, OutputFormat};
use crate::error::{Error, Result};

/// Asynchronous renderer callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererEvent {
    /// Generation passed to the `prepare` call this event belongs to
    pub generation: u64,
    pub kind: RendererEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEventKind {
    /// Source prepared; the renderer can start
    Ready,
    /// Source rendered to the end
    Completed,
    /// Prepare or render failed
    Failed(String),
}

/// Capability set of a decode/render primitive
///
/// All methods are synchronous and must not block; long work (fetching,
/// decoding) happens in the background and is reported as a `RendererEvent`.
pub trait Renderer: Send {
    /// Discard any current source and begin preparing `source`
    fn prepare(&mut self, source: &str, generation: u64);

    /// Start or resume rendering the prepared source
    fn start(&mut self);

    /// Stop advancing, keeping the source and position
    fn pause(&mut self);

    /// Move the render position
    fn seek_to(&mut self, position_ms: u64);

    /// Drop the current source and return to idle
    fn reset(&mut self);

    /// Free underlying resources; a later `prepare` may reacquire them
    fn release(&mut self);

    /// True while the source is advancing
    fn is_rendering(&self) -> bool;

    /// Current render position
    fn position_ms(&self) -> u64;

    /// Length of the prepared source, once known
    fn duration_ms(&self) -> Option<u64> {
        None
    }
}

/// Default renderer: fetches a preview clip over HTTP, decodes it and plays
/// it through the audio output
///
/// Position, duration and completion all come from the decoded stream.
pub struct PreviewRenderer {
    client: reqwest::Client,
    player: ClipPlayer,
    events: mpsc::UnboundedSender<RendererEvent>,
    /// Keeps the device stream alive; `None` when the player is driven
    /// externally
    _output: Option<AudioOutput>,
    generation: u64,
    prepare_task: Option<JoinHandle<()>>,
}

impl PreviewRenderer {
    /// Render to the default audio device, or to a null sink when the host
    /// has none
    pub fn new(events: mpsc::UnboundedSender<RendererEvent>) -> Result<Self> {
        let (output, player) = match AudioOutput::open(events.clone()) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("No usable audio device ({}), rendering to null sink", e);
                AudioOutput::null(OutputFormat::default(), events.clone())?
            }
        };
        Self::build(player, Some(output), events)
    }

    /// Render into `player`, whose `fill` is driven by the caller
    pub fn with_player(
        player: ClipPlayer,
        events: mpsc::UnboundedSender<RendererEvent>,
    ) -> Result<Self> {
        Self::build(player, None, events)
    }

    fn build(
        player: ClipPlayer,
        output: Option<AudioOutput>,
        events: mpsc::UnboundedSender<RendererEvent>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            player,
            events,
            _output: output,
            generation: 0,
            prepare_task: None,
        })
    }

    pub fn player(&self) -> &ClipPlayer {
        &self.player
    }

    fn abort_prepare(&mut self) {
        if let Some(task) = self.prepare_task.take() {
            task.abort();
        }
    }

    fn send_failure(&self, message: String) {
        let _ = self.events.send(RendererEvent {
            generation: self.generation,
            kind: RendererEventKind::Failed(message),
        });
    }
}

impl Renderer for PreviewRenderer {
    fn prepare(&mut self, source: &str, generation: u64) {
        self.reset();
        self.generation = generation;
        self.player.begin(generation);
        debug!("Preparing preview {} (generation {})", source, generation);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.send_failure("No runtime available to fetch preview".to_string());
            return;
        };

        let client = self.client.clone();
        let player = self.player.clone();
        let events = self.events.clone();
        let url = source.to_string();
        self.prepare_task = Some(runtime.spawn(async move {
            let kind = match load_clip(&client, &url, player.format()).await {
                Ok(clip) => {
                    let duration_ms = clip.duration_ms();
                    if !player.load(clip, generation) {
                        return;
                    }
                    debug!("Preview {} ready ({}ms)", url, duration_ms);
                    RendererEventKind::Ready
                }
                Err(e) => {
                    warn!("Failed to load preview {}: {}", url, e);
                    RendererEventKind::Failed(e.to_string())
                }
            };
            let _ = events.send(RendererEvent { generation, kind });
        }));
    }

    fn start(&mut self) {
        self.prepare_task = None;
        self.player.play();
    }

    fn pause(&mut self) {
        self.player.pause();
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.player.seek(position_ms);
    }

    fn reset(&mut self) {
        self.abort_prepare();
        self.player.clear();
    }

    fn release(&mut self) {
        self.reset();
        info!("Preview renderer released (generation {})", self.generation);
    }

    fn is_rendering(&self) -> bool {
        self.player.is_playing()
    }

    fn position_ms(&self) -> u64 {
        self.player.position_ms()
    }

    fn duration_ms(&self) -> Option<u64> {
        self.player.duration_ms()
    }
}

impl Drop for PreviewRenderer {
    fn drop(&mut self) {
        self.abort_prepare();
    }
}

/// Fetch, decode and conform one clip
async fn load_clip(
    client: &reqwest::Client,
    url: &str,
    format: OutputFormat,
) -> Result<DecodedClip> {
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    let extension = extension_of(url);

    tokio::task::spawn_blocking(move || {
        decode_clip(bytes.to_vec(), extension.as_deref())?.conform(format)
    })
    .await
    .map_err(|e| Error::Decode(format!("Decode task failed: {}", e)))?
}

/// File extension of the URL path, used as a format hint
fn extension_of(url: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).ok()?;
    Path::new(url.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}
