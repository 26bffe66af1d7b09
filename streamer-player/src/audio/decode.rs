//! Clip decoder using symphonia
//!
//! Preview clips are short, so a clip is decoded whole into memory.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::output::OutputFormat;
use super::resample::resample;
use crate::error::{Error, Result};

/// Decoded clip as interleaved f32 samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    /// Convert to the channel count and sample rate of `format`
    pub fn conform(self, format: OutputFormat) -> Result<DecodedClip> {
        if self.sample_rate == format.sample_rate && self.channels == format.channels {
            return Ok(self);
        }
        debug!(
            "Conforming clip {}Hz/{}ch to {}Hz/{}ch",
            self.sample_rate, self.channels, format.sample_rate, format.channels
        );

        let remixed = remix(&self.samples, self.channels, format.channels);
        let samples = resample(&remixed, self.sample_rate, format.sample_rate, format.channels)?;
        Ok(DecodedClip {
            samples,
            sample_rate: format.sample_rate,
            channels: format.channels,
        })
    }
}

/// Map interleaved samples from `from` channels to `to` channels
///
/// Mono output averages the source channels; otherwise output channel `c`
/// takes source channel `c`, or the last source channel when there are fewer.
fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let (from, to) = (from as usize, to as usize);
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c.min(from - 1)]));
        }
    }
    out
}

/// Decode a whole clip held in memory
///
/// `extension` (e.g. `"mp3"`) helps format detection.
pub fn decode_clip(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedClip> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("Unrecognized format: {}", e)))?;
    let mut format = detected.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count() as u16);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = Some(spec.rate);
                channels = Some(spec.channels.count() as u16);

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
    let channels = channels
        .filter(|&c| c > 0)
        .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;
    if samples.is_empty() {
        return Err(Error::Decode("Clip contains no audio".to_string()));
    }

    let clip = DecodedClip {
        samples,
        sample_rate,
        channels,
    };
    debug!(
        "Decoded {} frames at {}Hz/{}ch ({}ms)",
        clip.frames(),
        clip.sample_rate,
        clip.channels,
        clip.duration_ms()
    );
    Ok(clip)
}
