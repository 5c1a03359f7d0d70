use std::collections::HashMap;
use std::path::PathBuf;

use crate::sfx::{SampleFormat, SfxBlob};
use crate::util::AssetError;

/// Filter quality used when the caller does not pick one.
pub const DEFAULT_FILTER_QUALITY: u8 = if cfg!(windows) { 5 } else { 1 };

/// Decoded PCM ready for the mixer: already at the device rate.
#[derive(Debug, Clone)]
pub struct SoundCache {
    pub samples: Vec<f32>, // interleaved f32
    pub channels: u16,
    pub sample_rate: u32,
    /// Bytes per sample in the authored file.
    pub width: u8,
    /// Length in frames at `sample_rate`.
    pub length: u64,
    /// Loop start frame, -1 if the sound does not loop.
    pub loop_start: i64,
}

impl SoundCache {
    pub fn is_looped(&self) -> bool {
        self.loop_start >= 0
    }

    /// Approximate memory footprint of the authored data.
    pub fn size_bytes(&self) -> u64 {
        self.length * self.width as u64 * self.channels as u64
    }
}

/// Resolves a sound name to its raw file bytes.
pub trait SoundLoader: Send {
    fn load_bytes(&self, name: &str) -> Result<Vec<u8>, AssetError>;
}

/// Loads sounds from files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SoundLoader for DirectoryLoader {
    fn load_bytes(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.root.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory sound table, for embedded sounds and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(name.into(), bytes);
    }
}

impl SoundLoader for MemoryLoader {
    fn load_bytes(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(name.to_string()))
    }
}

/// Decode SFX1 bytes and bring them to `target_rate`.
pub fn decode_sound(bytes: &[u8], target_rate: u32, filter_quality: u8) -> Result<SoundCache, AssetError> {
    let blob = SfxBlob::from_sfx_bytes(bytes)?;
    let channels = blob.channels as usize;
    let width = match blob.format {
        SampleFormat::U8 => 1,
        SampleFormat::S16 | SampleFormat::F32 => 2,
    };

    if blob.sample_rate == target_rate {
        return Ok(SoundCache {
            length: blob.frames,
            samples: blob.samples,
            channels: blob.channels,
            sample_rate: target_rate,
            width,
            loop_start: blob.loop_start.map_or(-1, |s| s as i64),
        });
    }

    let samples = if filter_quality <= 1 {
        resample_interleaved(&blob.samples, blob.sample_rate, target_rate, channels)
    } else {
        resample_sinc(&blob.samples, blob.sample_rate, target_rate, channels, filter_quality)?
    };
    let ratio = target_rate as f64 / blob.sample_rate as f64;
    let length = (samples.len() / channels) as u64;
    let loop_start = blob
        .loop_start
        .map_or(-1, |s| ((s as f64 * ratio) as i64).min(length.saturating_sub(1) as i64));

    Ok(SoundCache { samples, channels: blob.channels, sample_rate: target_rate, width, length, loop_start })
}

/// Simple linear resampler for interleaved samples. Conservative, single-threaded.
pub fn resample_interleaved(samples: &[f32], from_rate: u32, to_rate: u32, channels: usize) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let frames = samples.len() / channels;
    let out_frames = ((frames as f64) * ratio).ceil() as usize;
    let mut out = vec![0.0f32; out_frames * channels];

    for ch in 0..channels {
        for t in 0..out_frames {
            let src_pos = (t as f64) / ratio;
            let i0 = src_pos.floor() as usize;
            let w = (src_pos - i0 as f64) as f32;
            let s0 = samples.get(i0 * channels + ch).copied().unwrap_or(0.0);
            // hold the last frame instead of fading to zero past the end
            let s1 = if i0 + 1 < frames { samples[(i0 + 1) * channels + ch] } else { s0 };
            out[t * channels + ch] = (1.0 - w) * s0 + w * s1;
        }
    }

    out
}

/// Band-limited resampling; the kernel grows with `quality` (2..=5).
pub fn resample_sinc(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    quality: u8,
) -> Result<Vec<f32>, AssetError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let frames = samples.len() / channels;
    if from_rate == to_rate || frames == 0 {
        return Ok(samples.to_vec());
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 32 * quality.clamp(2, 5) as usize,
        f_cutoff: 0.95,
        interpolation: if quality >= 4 { SincInterpolationType::Cubic } else { SincInterpolationType::Linear },
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for f in 0..frames {
        for (ch, plane) in planar.iter_mut().enumerate() {
            plane.push(samples[f * channels + ch]);
        }
    }

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, frames, channels)
        .map_err(|e| AssetError::Decode(format!("resampler: {}", e)))?;
    let expected = (frames as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();

    let mut planes = resampler
        .process(&planar, None)
        .map_err(|e| AssetError::Decode(format!("resample failed: {}", e)))?;
    // push zeros through until the delayed tail is out
    while planes.first().map_or(0, |p| p.len()) < delay + expected {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AssetError::Decode(format!("resample flush failed: {}", e)))?;
        if tail.first().map_or(true, |t| t.is_empty()) {
            break;
        }
        for (plane, t) in planes.iter_mut().zip(tail) {
            plane.extend(t);
        }
    }

    let out_frames = planes.first().map_or(0, |p| p.len().saturating_sub(delay)).min(expected);
    let mut out = vec![0.0f32; out_frames * channels];
    for f in 0..out_frames {
        for (ch, plane) in planes.iter().enumerate() {
            out[f * channels + ch] = plane[delay + f];
        }
    }
    Ok(out)
}
