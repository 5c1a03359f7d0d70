//! Shared fixtures for the cross-crate scenario tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asset_manager::raw_pcm::write_raw_pcm;
use asset_manager::sfx::{write_sfx_bytes, SampleFormat};
use asset_manager::SoundLoader;
use audio_backend::mock_backend::{MockAudioDevice, MockDeviceHandle};
use audio_backend::DeviceFormat;
use audio_system::{AmbientRegions, AudioConfig, AudioEngine, NUM_AMBIENTS};
use glam::Vec3;

/// Engine on a stereo 16-bit mock device with a fixed RNG seed.
pub fn mock_engine(
    config: AudioConfig,
    rate: u32,
    buffer_frames: usize,
    loader: Box<dyn SoundLoader>,
) -> (AudioEngine, MockDeviceHandle) {
    let device = MockAudioDevice::new(DeviceFormat::stereo16(rate, buffer_frames));
    let handle = device.handle();
    let mut engine = AudioEngine::new(config, Arc::new(device), loader);
    engine.seed_rng(0x5eed);
    (engine, handle)
}

/// Mono 16-bit SFX of constant amplitude.
pub fn tone_sfx(frames: usize, rate: u32, loop_start: Option<u64>) -> Vec<u8> {
    write_sfx_bytes(&vec![0.25; frames], rate, 1, SampleFormat::S16, loop_start)
}

/// Stereo 16-bit frames where frame `i` is `(i, -i)`.
pub fn ramp_s16_stereo(frames: usize) -> Vec<u8> {
    (0..frames as i16)
        .flat_map(|i| {
            let mut f = [0u8; 4];
            f[..2].copy_from_slice(&i.to_le_bytes());
            f[2..].copy_from_slice(&(-i).to_le_bytes());
            f
        })
        .collect()
}

/// Write `dir/trackNN.raw` with a raw PCM header.
pub fn write_track(dir: &Path, track: u8, channels: u16, width: u16, rate: u32, data: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(format!("track{:02}.raw", track));
    fs::write(&path, write_raw_pcm(channels, width, rate, data))?;
    Ok(path)
}

/// Same ambient weights everywhere, switchable between ticks.
#[derive(Debug, Clone, Copy)]
pub struct UniformRegions(pub Option<[u8; NUM_AMBIENTS]>);

impl AmbientRegions for UniformRegions {
    fn ambient_levels(&self, _point: Vec3) -> Option<[u8; NUM_AMBIENTS]> {
        self.0
    }
}

pub fn sample_s16(bytes: &[u8], index: usize) -> i16 {
    i16::from_le_bytes([bytes[index * 2], bytes[index * 2 + 1]])
}
