//! Tunables for the mixing core, loadable from RON.

use std::path::Path;

use asset_manager::util::DEFAULT_MAX_SOUNDS;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AudioError;

pub const FILTER_QUALITY_DEFAULT: u8 = if cfg!(windows) { 5 } else { 1 };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Master effects volume.
    pub sfx_volume: f32,
    /// Music volume. Zero pauses the music player.
    pub bgm_volume: f32,
    pub ambient_level: f32,
    /// Ambient volume change per second.
    pub ambient_fade: f32,
    /// Seconds mixed ahead of the playback cursor.
    pub mix_ahead: f32,
    /// 1 = linear resampling, 2..=5 = sinc with growing kernel.
    pub filter_quality: u8,
    pub nosound: bool,
    /// Decode sounds when they are precached instead of on first play.
    pub precache: bool,
    /// Log the number of audible channels every tick.
    pub snd_show: bool,
    pub no_extra_update: bool,
    pub music_dir: String,
    pub sound_dir: String,
    pub dynamic_channels: usize,
    pub max_channels: usize,
    pub raw_samples: usize,
    pub max_sounds: usize,
    pub time_reset_threshold: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sfx_volume: 0.7,
            bgm_volume: 1.0,
            ambient_level: 0.3,
            ambient_fade: 100.0,
            mix_ahead: 0.1,
            filter_quality: FILTER_QUALITY_DEFAULT,
            nosound: false,
            precache: true,
            snd_show: false,
            no_extra_update: false,
            music_dir: "music".into(),
            sound_dir: "sound".into(),
            dynamic_channels: 128,
            max_channels: 1024,
            raw_samples: 8192,
            max_sounds: DEFAULT_MAX_SOUNDS,
            time_reset_threshold: 0x4000_0000,
        }
    }
}

impl AudioConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, AudioError> {
        let mut cfg: AudioConfig = ron::from_str(text).map_err(|e| AudioError::Config(e.to_string()))?;
        cfg.validate();
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AudioError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_ron_str(&text)
    }

    pub fn to_ron_string(&self) -> Result<String, AudioError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| AudioError::Config(e.to_string()))
    }

    /// Pull out-of-range values back to something usable. Returns whether anything changed.
    pub fn validate(&mut self) -> bool {
        let mut changed = false;
        if !(1..=5).contains(&self.filter_quality) {
            warn!("filter_quality must be between 1 and 5");
            self.filter_quality = FILTER_QUALITY_DEFAULT;
            changed = true;
        }
        if self.max_channels < 4 + self.dynamic_channels {
            warn!(
                "max_channels {} cannot hold {} dynamic channels",
                self.max_channels, self.dynamic_channels
            );
            self.max_channels = 4 + self.dynamic_channels;
            changed = true;
        }
        if !self.raw_samples.is_power_of_two() {
            self.raw_samples = self.raw_samples.max(1).next_power_of_two();
            changed = true;
        }
        if self.mix_ahead < 0.0 {
            self.mix_ahead = 0.0;
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_keeps_defaults() {
        let cfg = AudioConfig::from_ron_str("(sfx_volume: 0.5, music_dir: \"tracks\")").unwrap();
        assert_eq!(cfg.sfx_volume, 0.5);
        assert_eq!(cfg.music_dir, "tracks");
        assert_eq!(cfg.ambient_fade, 100.0);
        assert_eq!(cfg.raw_samples, 8192);
    }

    #[test]
    fn bad_filter_quality_is_reset() {
        let cfg = AudioConfig::from_ron_str("(filter_quality: 9)").unwrap();
        assert_eq!(cfg.filter_quality, FILTER_QUALITY_DEFAULT);
    }

    #[test]
    fn raw_samples_rounded_to_power_of_two() {
        let mut cfg = AudioConfig { raw_samples: 5000, ..Default::default() };
        assert!(cfg.validate());
        assert_eq!(cfg.raw_samples, 8192);
    }

    #[test]
    fn malformed_ron_is_an_error() {
        assert!(matches!(AudioConfig::from_ron_str("(sfx_volume: )"), Err(AudioError::Config(_))));
    }

    #[test]
    fn ron_text_reloads_identically() {
        let cfg = AudioConfig { bgm_volume: 0.25, nosound: true, ..Default::default() };
        let text = cfg.to_ron_string().unwrap();
        assert_eq!(AudioConfig::from_ron_str(&text).unwrap(), cfg);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.ron");
        std::fs::write(&path, "(mix_ahead: 0.2, max_sounds: 64)").unwrap();
        let cfg = AudioConfig::load(&path).unwrap();
        assert_eq!(cfg.mix_ahead, 0.2);
        assert_eq!(cfg.max_sounds, 64);
        assert!(AudioConfig::load(dir.path().join("none.ron")).is_err());
    }
}
