//! Sample-rate conversion using rubato

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::error::{Error, Result};

/// Resample interleaved `input` from `input_rate` to `output_rate`
///
/// The whole clip is processed as one chunk.
pub fn resample(
    input: &[f32],
    input_rate: u32,
    output_rate: u32,
    channels: u16,
) -> Result<Vec<f32>> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if channels == 0 || input_rate == 0 || output_rate == 0 {
        return Err(Error::Decode(format!(
            "Cannot resample {}Hz/{}ch to {}Hz",
            input_rate, channels, output_rate
        )));
    }

    let planar = deinterleave(input, channels);
    let input_frames = planar[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        channels as usize,
    )
    .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

    let output = resampler
        .process(&planar, None)
        .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
    let interleaved = interleave(output);

    debug!(
        "Resampled {} frames at {}Hz to {} frames at {}Hz",
        input_frames,
        input_rate,
        interleaved.len() / channels as usize,
        output_rate
    );
    Ok(interleaved)
}

fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let channels = channels as usize;
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, sample) in planar.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    planar
}

fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    let Some(frames) = planar.first().map(Vec::len) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        out.extend(planar.iter().map(|channel| channel[frame]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_and_interleave() {
        let planar = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(interleave(planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_same_rate_is_copied() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample(&input, 44_100, 44_100, 2).unwrap(), input);
    }

    #[test]
    fn test_upsample_scales_frame_count() {
        let input: Vec<f32> = (0..8_000).map(|n| (n as f32 * 0.01).sin()).collect();
        let output = resample(&input, 8_000, 44_100, 1).unwrap();

        let expected = 44_100i64;
        let actual = output.len() as i64;
        assert!((actual - expected).abs() < expected / 20, "got {actual} frames");
    }

    #[test]
    fn test_stereo_output_stays_interleaved() {
        let input: Vec<f32> = (0..4_000).flat_map(|_| [0.25, -0.25]).collect();
        let output = resample(&input, 48_000, 44_100, 2).unwrap();
        assert_eq!(output.len() % 2, 0);
        assert!(!output.is_empty());
    }
}
