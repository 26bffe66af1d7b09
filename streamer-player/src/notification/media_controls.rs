//! Platform media controls sink
//!
//! Publishes the notification to the OS media controls through souvlaki
//! (MPRIS on Linux, Now Playing on macOS) and turns their button presses
//! into transport commands. `MediaControls` is not `Send` on every platform,
//! so it is created and driven on a dedicated thread fed by a channel.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition,
    PlatformConfig, SeekDirection,
};
use streamer_common::events::PlaybackState;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Notification, NotificationSink};
use crate::error::{Error, Result};
use crate::playback::coordinator::{Command, TransportControls};

const DISPLAY_NAME: &str = "Streamer";
const DBUS_NAME: &str = "streamer_player";
const SEEK_STEP_MS: u64 = 10_000;

/// Playback view that control events are mapped against
#[derive(Debug, Clone, Copy, Default)]
struct ControlState {
    is_playing: bool,
    position_ms: u64,
    duration_ms: u64,
    /// When `position_ms` was taken
    updated_at: Option<Instant>,
}

impl ControlState {
    fn from_notification(notification: &Notification) -> Self {
        Self {
            is_playing: notification.state == PlaybackState::Playing,
            position_ms: notification.position_ms.unwrap_or(0),
            duration_ms: notification.duration_ms,
            updated_at: Some(Instant::now()),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        let running = match (self.is_playing, self.updated_at) {
            (true, Some(at)) => at.elapsed().as_millis() as u64,
            _ => 0,
        };
        self.clamp(self.position_ms.saturating_add(running))
    }

    fn clamp(&self, position_ms: u64) -> u64 {
        if self.duration_ms == 0 {
            position_ms
        } else {
            position_ms.min(self.duration_ms)
        }
    }
}

fn lock(state: &Mutex<ControlState>) -> MutexGuard<'_, ControlState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map a media-control event to a transport command
fn command_for_event(event: MediaControlEvent, state: ControlState) -> Option<Command> {
    match event {
        MediaControlEvent::Play => Some(Command::Play),
        MediaControlEvent::Pause => Some(Command::Pause),
        MediaControlEvent::Toggle => {
            if state.is_playing {
                Some(Command::Pause)
            } else {
                Some(Command::Play)
            }
        }
        MediaControlEvent::Next => Some(Command::SkipNext),
        MediaControlEvent::Previous => Some(Command::SkipPrevious),
        MediaControlEvent::Stop => Some(Command::Stop),
        MediaControlEvent::SetPosition(MediaPosition(position)) => {
            Some(Command::SeekTo(state.clamp(position.as_millis() as u64)))
        }
        MediaControlEvent::SeekBy(direction, delta) => {
            Some(seek_from(state, direction, delta.as_millis() as u64))
        }
        MediaControlEvent::Seek(direction) => Some(seek_from(state, direction, SEEK_STEP_MS)),
        MediaControlEvent::SetVolume(_)
        | MediaControlEvent::OpenUri(_)
        | MediaControlEvent::Raise
        | MediaControlEvent::Quit => None,
    }
}

fn seek_from(state: ControlState, direction: SeekDirection, delta_ms: u64) -> Command {
    let elapsed = state.elapsed_ms();
    let target = match direction {
        SeekDirection::Forward => elapsed.saturating_add(delta_ms),
        SeekDirection::Backward => elapsed.saturating_sub(delta_ms),
    };
    Command::SeekTo(state.clamp(target))
}

enum ControlsMessage {
    Publish(Notification),
    Clear,
}

/// Notification sink backed by the platform media controls
pub struct MediaControlsSink {
    tx: Mutex<std_mpsc::Sender<ControlsMessage>>,
    state: Arc<Mutex<ControlState>>,
}

impl MediaControlsSink {
    /// Attach to the platform media controls
    ///
    /// Button presses are sent as commands on `commands`; pair this with
    /// `forward_commands` to apply them.
    pub fn spawn(commands: mpsc::UnboundedSender<Command>) -> Result<Self> {
        let state = Arc::new(Mutex::new(ControlState::default()));
        let (tx, rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let handler_state = Arc::clone(&state);
        thread::Builder::new()
            .name("media-controls".to_string())
            .spawn(move || {
                let controls = match create_controls(commands, handler_state) {
                    Ok(controls) => {
                        let _ = ready_tx.send(Ok(()));
                        controls
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run(controls, rx);
            })?;

        ready_rx.recv().map_err(|_| {
            Error::MediaControls("media controls thread exited during setup".to_string())
        })??;
        info!("Media controls attached as {}", DBUS_NAME);

        Ok(Self {
            tx: Mutex::new(tx),
            state,
        })
    }

    fn send(&self, message: ControlsMessage) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.send(message).is_err() {
            warn!("Media controls thread has exited");
        }
    }
}

impl NotificationSink for MediaControlsSink {
    fn post(&self, notification: &Notification) {
        *lock(&self.state) = ControlState::from_notification(notification);
        self.send(ControlsMessage::Publish(notification.clone()));
    }

    fn cancel(&self) {
        *lock(&self.state) = ControlState::default();
        self.send(ControlsMessage::Clear);
    }

    fn start_foreground(&self, notification: &Notification) {
        self.post(notification);
    }

    fn stop_foreground(&self) {
        debug!("Media controls left foreground");
    }
}

#[cfg(not(target_os = "windows"))]
fn create_controls(
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<Mutex<ControlState>>,
) -> Result<MediaControls> {
    let mut controls = MediaControls::new(PlatformConfig {
        display_name: DISPLAY_NAME,
        dbus_name: DBUS_NAME,
        hwnd: None,
    })
    .map_err(|e| Error::MediaControls(format!("failed to create backend: {:?}", e)))?;

    controls
        .attach(move |event| {
            let snapshot = *lock(&state);
            if let Some(command) = command_for_event(event, snapshot) {
                debug!("Media control event mapped to {:?}", command);
                let _ = commands.send(command);
            }
        })
        .map_err(|e| Error::MediaControls(format!("failed to attach handler: {:?}", e)))?;

    Ok(controls)
}

#[cfg(target_os = "windows")]
fn create_controls(
    _commands: mpsc::UnboundedSender<Command>,
    _state: Arc<Mutex<ControlState>>,
) -> Result<MediaControls> {
    // souvlaki needs an HWND on Windows and this service has no window
    Err(Error::MediaControls(
        "Windows media controls need a window handle".to_string(),
    ))
}

fn run(mut controls: MediaControls, rx: std_mpsc::Receiver<ControlsMessage>) {
    while let Ok(message) = rx.recv() {
        let result = match message {
            ControlsMessage::Publish(notification) => publish(&mut controls, &notification),
            ControlsMessage::Clear => controls
                .set_playback(MediaPlayback::Stopped)
                .and_then(|()| controls.set_metadata(MediaMetadata::default())),
        };
        if let Err(e) = result {
            warn!("Failed to update media controls: {:?}", e);
        }
    }
    debug!("Media controls thread exiting");
}

fn publish(
    controls: &mut MediaControls,
    notification: &Notification,
) -> std::result::Result<(), souvlaki::Error> {
    let duration =
        (notification.duration_ms > 0).then(|| Duration::from_millis(notification.duration_ms));
    controls.set_metadata(MediaMetadata {
        title: Some(&notification.title),
        artist: Some(&notification.artist),
        album: Some(&notification.album),
        cover_url: notification.artwork_url.as_deref(),
        duration,
    })?;
    controls.set_playback(playback_of(notification))
}

fn playback_of(notification: &Notification) -> MediaPlayback {
    let progress = notification
        .position_ms
        .map(|ms| MediaPosition(Duration::from_millis(ms)));
    match notification.state {
        PlaybackState::Playing | PlaybackState::Buffering => MediaPlayback::Playing { progress },
        PlaybackState::Paused => MediaPlayback::Paused { progress },
        PlaybackState::None | PlaybackState::Stopped | PlaybackState::Error => {
            MediaPlayback::Stopped
        }
    }
}

/// Apply media-control commands through `controls`
///
/// Runs until the command channel closes or the coordinator goes away.
pub async fn forward_commands(
    mut commands: mpsc::UnboundedReceiver<Command>,
    controls: TransportControls,
) {
    while let Some(command) = commands.recv().await {
        let result = match command {
            Command::Play => controls.play().await,
            Command::Pause => controls.pause().await,
            Command::Stop => controls.stop().await,
            Command::SkipNext => controls.skip_to_next().await,
            Command::SkipPrevious => controls.skip_to_previous().await,
            Command::SeekTo(position_ms) => controls.seek_to(position_ms).await,
            Command::SkipToQueueItem(queue_id) => controls.skip_to_queue_item(queue_id).await,
            Command::Open(request) => controls.open(request).await,
        };
        match result {
            Ok(()) => {}
            Err(Error::ChannelClosed) => {
                debug!("Coordinator closed, media control forwarding ends");
                break;
            }
            Err(e) => warn!("Media control command failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Artwork, NotificationAction};

    fn state(is_playing: bool, position_ms: u64, duration_ms: u64) -> ControlState {
        ControlState {
            is_playing,
            position_ms,
            duration_ms,
            updated_at: Some(Instant::now()),
        }
    }

    fn notification(state: PlaybackState, position_ms: Option<u64>) -> Notification {
        Notification {
            title: "Song a".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            actions: vec![
                NotificationAction::Previous,
                NotificationAction::Pause,
                NotificationAction::Next,
            ],
            artwork: Artwork::Placeholder,
            artwork_url: Some("https://img.example/a.jpg".to_string()),
            duration_ms: 30_000,
            position_ms,
            when: None,
            show_chronometer: false,
            ongoing: state == PlaybackState::Playing,
            state,
        }
    }

    #[test]
    fn test_buttons_map_to_transport_commands() {
        let idle = ControlState::default();
        assert_eq!(command_for_event(MediaControlEvent::Play, idle), Some(Command::Play));
        assert_eq!(command_for_event(MediaControlEvent::Pause, idle), Some(Command::Pause));
        assert_eq!(command_for_event(MediaControlEvent::Next, idle), Some(Command::SkipNext));
        assert_eq!(
            command_for_event(MediaControlEvent::Previous, idle),
            Some(Command::SkipPrevious)
        );
        assert_eq!(command_for_event(MediaControlEvent::Stop, idle), Some(Command::Stop));
        assert_eq!(command_for_event(MediaControlEvent::Raise, idle), None);
        assert_eq!(command_for_event(MediaControlEvent::SetVolume(0.5), idle), None);
    }

    #[test]
    fn test_toggle_follows_playing_state() {
        assert_eq!(
            command_for_event(MediaControlEvent::Toggle, state(true, 0, 30_000)),
            Some(Command::Pause)
        );
        assert_eq!(
            command_for_event(MediaControlEvent::Toggle, state(false, 0, 30_000)),
            Some(Command::Play)
        );
    }

    #[test]
    fn test_set_position_is_clamped_to_duration() {
        let event = |ms| MediaControlEvent::SetPosition(MediaPosition(Duration::from_millis(ms)));
        assert_eq!(
            command_for_event(event(12_000), state(true, 0, 30_000)),
            Some(Command::SeekTo(12_000))
        );
        assert_eq!(
            command_for_event(event(90_000), state(true, 0, 30_000)),
            Some(Command::SeekTo(30_000))
        );
        // Unknown duration leaves the target alone
        assert_eq!(
            command_for_event(event(90_000), ControlState::default()),
            Some(Command::SeekTo(90_000))
        );
    }

    #[test]
    fn test_relative_seeks_start_from_current_position() {
        let paused = state(false, 8_000, 30_000);
        assert_eq!(
            command_for_event(MediaControlEvent::Seek(SeekDirection::Forward), paused),
            Some(Command::SeekTo(18_000))
        );
        assert_eq!(
            command_for_event(MediaControlEvent::Seek(SeekDirection::Backward), paused),
            Some(Command::SeekTo(0))
        );
        assert_eq!(
            command_for_event(
                MediaControlEvent::SeekBy(SeekDirection::Forward, Duration::from_secs(60)),
                paused
            ),
            Some(Command::SeekTo(30_000))
        );
    }

    #[test]
    fn test_elapsed_extrapolates_only_while_playing() {
        let earlier = Instant::now() - Duration::from_millis(2_000);
        let playing = ControlState {
            updated_at: Some(earlier),
            ..state(true, 1_000, 30_000)
        };
        assert!(playing.elapsed_ms() >= 3_000);

        let paused = ControlState {
            updated_at: Some(earlier),
            ..state(false, 1_000, 30_000)
        };
        assert_eq!(paused.elapsed_ms(), 1_000);
    }

    #[test]
    fn test_control_state_tracks_posted_notification() {
        let state = ControlState::from_notification(&notification(PlaybackState::Playing, Some(4_000)));
        assert!(state.is_playing);
        assert_eq!(state.position_ms, 4_000);
        assert_eq!(state.duration_ms, 30_000);

        let state = ControlState::from_notification(&notification(PlaybackState::Buffering, None));
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 0);
    }

    #[test]
    fn test_playback_reported_to_platform() {
        assert!(matches!(
            playback_of(&notification(PlaybackState::Playing, Some(1_500))),
            MediaPlayback::Playing { progress: Some(MediaPosition(p)) } if p == Duration::from_millis(1_500)
        ));
        assert!(matches!(
            playback_of(&notification(PlaybackState::Paused, None)),
            MediaPlayback::Paused { progress: None }
        ));
        assert!(matches!(
            playback_of(&notification(PlaybackState::Stopped, None)),
            MediaPlayback::Stopped
        ));
    }
}
