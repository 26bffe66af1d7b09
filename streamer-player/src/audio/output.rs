//! Audio output using cpal
//!
//! A cpal `Stream` is not `Send`, so the stream is built, played and owned
//! by a dedicated thread that lives until the `AudioOutput` is dropped.
//! Hosts without an output device get a null sink: a thread that drains the
//! player at the real-time rate and discards the samples, so clips still
//! advance and complete.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::player::ClipPlayer;
use crate::error::{Error, Result};
use crate::playback::renderer::RendererEvent;

/// Preferred device rate
pub const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Null sink pull interval
const NULL_SINK_TICK: Duration = Duration::from_millis(20);

/// Sample layout the output consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: PREFERRED_SAMPLE_RATE,
            channels: 2,
        }
    }
}

/// Running output; dropping it stops the stream and ends its thread
pub struct AudioOutput {
    format: OutputFormat,
    device_name: String,
    shutdown: Option<std_mpsc::Sender<()>>,
}

impl AudioOutput {
    /// Open the default output device and start pulling from a new player
    pub fn open(events: mpsc::UnboundedSender<RendererEvent>) -> Result<(Self, ClipPlayer)> {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match start_device_stream(events) {
                    Ok((stream, player, name)) => {
                        let _ = ready_tx.send(Ok((player, name)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Keep the stream alive until the owner goes away
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio output thread exiting");
            })?;

        let (player, device_name) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during setup".to_string()))??;
        let output = Self {
            format: player.format(),
            device_name,
            shutdown: Some(shutdown_tx),
        };
        info!(
            "Audio output on {} ({}Hz, {} channels)",
            output.device_name, output.format.sample_rate, output.format.channels
        );
        Ok((output, player))
    }

    /// Discard samples at the real-time rate of `format`
    pub fn null(
        format: OutputFormat,
        events: mpsc::UnboundedSender<RendererEvent>,
    ) -> Result<(Self, ClipPlayer)> {
        let player = ClipPlayer::new(format, events);
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let frames_per_tick =
            (format.sample_rate as u128 * NULL_SINK_TICK.as_millis() / 1000) as usize;
        let mut buffer = vec![0.0f32; frames_per_tick * format.channels.max(1) as usize];
        let sink_player = player.clone();
        thread::Builder::new()
            .name("audio-null-sink".to_string())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(NULL_SINK_TICK) {
                    Err(std_mpsc::RecvTimeoutError::Timeout) => sink_player.fill(&mut buffer),
                    _ => break,
                }
            })?;

        info!(
            "Audio output on null sink ({}Hz, {} channels)",
            format.sample_rate, format.channels
        );
        Ok((
            Self {
                format,
                device_name: "null".to_string(),
                shutdown: Some(shutdown_tx),
            },
            player,
        ))
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the output thread
        self.shutdown.take();
    }
}

fn start_device_stream(
    events: mpsc::UnboundedSender<RendererEvent>,
) -> Result<(Stream, ClipPlayer, String)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let (config, sample_format) = best_config(&device)?;
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let player = ClipPlayer::new(
        OutputFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        },
        events,
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, player.clone())?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, player.clone())?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, player.clone())?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };
    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((stream, player, name))
}

/// Prefer 44.1kHz stereo f32, else the device default
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
            && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
            && config.sample_format() == SampleFormat::F32
    });
    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        let config = config
            .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
            .config();
        return Ok((config, sample_format));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    Ok((default.config(), default.sample_format()))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, player: ClipPlayer) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                player.fill(&mut scratch);
                for (out, sample) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
