//! Audio pipeline for preview clips
//!
//! Fetched clip bytes are decoded to interleaved f32 PCM, conformed to the
//! output device's rate and channel count, and handed to a `ClipPlayer`
//! that the output callback pulls from.
//!
//! **Responsibilities:**
//! - Decode compressed clips with symphonia (`decode`)
//! - Sample-rate conversion with rubato (`resample`)
//! - Shared playback cursor read by the audio callback (`player`)
//! - cpal device output on a dedicated thread, or a null sink when no
//!   device is available (`output`)

pub mod decode;
pub mod output;
pub mod player;
pub mod resample;

pub use decode::{decode_clip, DecodedClip};
pub use output::{AudioOutput, OutputFormat};
pub use player::ClipPlayer;
