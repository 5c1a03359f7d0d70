use crate::util::{AssetError, MAX_SFX_FRAMES};

/// Fixed part of an SFX1 header.
pub const SFX_HEADER_LEN: usize = 20;
/// Header flag: a `u64` loop start follows the fixed header.
pub const SFX_FLAG_LOOPED: u16 = 1;

const SFX_MAGIC: &[u8; 4] = b"SFX1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    S16,
    U8,
}

impl SampleFormat {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SampleFormat::F32),
            1 => Some(SampleFormat::S16),
            2 => Some(SampleFormat::U8),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            SampleFormat::F32 => 0,
            SampleFormat::S16 => 1,
            SampleFormat::U8 => 2,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::F32 => 4,
            SampleFormat::S16 => 2,
            SampleFormat::U8 => 1,
        }
    }
}

/// A decoded sound effect, still at its authored rate.
#[derive(Debug, Clone)]
pub struct SfxBlob {
    pub samples: Vec<f32>, // interleaved f32
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u64,
    pub format: SampleFormat,
    /// First frame of the loop region, `None` for one-shot sounds.
    pub loop_start: Option<u64>,
}

impl SfxBlob {
    /// Layout: `"SFX1"`, format code, channels, flags (u16 LE), rate (u32 LE),
    /// frames (u64 LE), optional loop start (u64 LE), interleaved samples.
    pub fn from_sfx_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        if bytes.len() < SFX_HEADER_LEN {
            return Err(AssetError::Decode("sfx too small".into()));
        }
        if &bytes[0..4] != SFX_MAGIC {
            return Err(AssetError::Decode("bad sfx magic".into()));
        }
        let format = SampleFormat::from_code(bytes[4])
            .ok_or_else(|| AssetError::Decode("unknown sample format".into()))?;
        let channels = bytes[5] as u16;
        if channels == 0 || channels > 2 {
            return Err(AssetError::Decode(format!("unsupported channel count {}", channels)));
        }
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        let sample_rate = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if sample_rate == 0 {
            return Err(AssetError::Decode("zero sample rate".into()));
        }
        let mut frame_bytes = [0u8; 8];
        frame_bytes.copy_from_slice(&bytes[12..20]);
        let frames = u64::from_le_bytes(frame_bytes);
        if frames == 0 || frames > MAX_SFX_FRAMES {
            return Err(AssetError::ResourceLimit("sfx frame count unreasonable".into()));
        }

        let mut idx = SFX_HEADER_LEN;
        let loop_start = if flags & SFX_FLAG_LOOPED != 0 {
            if bytes.len() < idx + 8 {
                return Err(AssetError::Decode("file truncated".into()));
            }
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[idx..idx + 8]);
            idx += 8;
            let start = u64::from_le_bytes(b);
            if start >= frames {
                return Err(AssetError::Decode("loop start past end of sound".into()));
            }
            Some(start)
        } else {
            None
        };

        let expected = (frames as usize)
            .checked_mul(channels as usize)
            .and_then(|n| n.checked_mul(format.bytes_per_sample()))
            .ok_or_else(|| AssetError::ResourceLimit("overflow computing sfx size".into()))?;
        let end = idx + expected;
        if bytes.len() < end {
            return Err(AssetError::Decode("file truncated".into()));
        }

        let data = &bytes[idx..end];
        let samples: Vec<f32> = match format {
            SampleFormat::F32 => data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            SampleFormat::S16 => data
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
                .collect(),
            SampleFormat::U8 => data.iter().map(|&v| (v as f32 - 128.0) / 128.0).collect(),
        };

        Ok(SfxBlob { samples, sample_rate, channels, frames, format, loop_start })
    }
}

/// Serialize interleaved samples into the SFX1 layout.
pub fn write_sfx_bytes(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
    loop_start: Option<u64>,
) -> Vec<u8> {
    let frames = (samples.len() / channels.max(1) as usize) as u64;
    let mut v = Vec::with_capacity(SFX_HEADER_LEN + 8 + samples.len() * format.bytes_per_sample());
    v.extend_from_slice(SFX_MAGIC);
    v.push(format.code());
    v.push(channels as u8);
    let flags = if loop_start.is_some() { SFX_FLAG_LOOPED } else { 0 };
    v.extend_from_slice(&flags.to_le_bytes());
    v.extend_from_slice(&sample_rate.to_le_bytes());
    v.extend_from_slice(&frames.to_le_bytes());
    if let Some(start) = loop_start {
        v.extend_from_slice(&start.to_le_bytes());
    }
    for &s in samples {
        match format {
            SampleFormat::F32 => v.extend_from_slice(&s.to_le_bytes()),
            SampleFormat::S16 => {
                let q = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                v.extend_from_slice(&q.to_le_bytes());
            }
            SampleFormat::U8 => v.push((s.clamp(-1.0, 1.0) * 127.0 + 128.0) as u8),
        }
    }
    v
}
