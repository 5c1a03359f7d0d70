//! Region-driven ambient loops with smoothed volume.

use asset_manager::SoundId;
use glam::Vec3;

use crate::channel::{Channel, NUM_AMBIENTS};

/// Ambient slot categories, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientKind {
    Water = 0,
    Sky = 1,
    Slime = 2,
    Lava = 3,
}

/// Targets under this are treated as silence.
pub const AMBIENT_NOISE_FLOOR: f32 = 8.0;

/// World lookup of per-slot ambient weights (0..=255) at a point.
pub trait AmbientRegions {
    /// `None` when the point is outside every region.
    fn ambient_levels(&self, point: Vec3) -> Option<[u8; NUM_AMBIENTS]>;
}

#[derive(Debug, Clone, Default)]
pub struct AmbientManager {
    sounds: [Option<SoundId>; NUM_AMBIENTS],
    volumes: [f32; NUM_AMBIENTS],
}

impl AmbientManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sound(&mut self, kind: AmbientKind, sound: Option<SoundId>) {
        self.sounds[kind as usize] = sound;
    }

    pub fn sound(&self, kind: AmbientKind) -> Option<SoundId> {
        self.sounds[kind as usize]
    }

    pub fn volume(&self, kind: AmbientKind) -> f32 {
        self.volumes[kind as usize]
    }

    /// Advance one tick. `regions == None` means no world is loaded and
    /// leaves the slots untouched. A `frame_time <= 0` holds volumes still.
    pub fn update(
        &mut self,
        slots: &mut [Channel],
        regions: Option<&dyn AmbientRegions>,
        listener: Vec3,
        ambient_level: f32,
        fade_rate: f32,
        frame_time: f32,
    ) {
        let Some(regions) = regions else {
            return;
        };
        let levels = match regions.ambient_levels(listener) {
            Some(levels) if ambient_level != 0.0 => levels,
            _ => {
                self.silence(slots);
                return;
            }
        };

        let step = if frame_time > 0.0 { frame_time * fade_rate } else { 0.0 };
        for (i, ch) in slots.iter_mut().take(NUM_AMBIENTS).enumerate() {
            ch.sound = self.sounds[i];

            let mut target = ambient_level * levels[i] as f32;
            if target < AMBIENT_NOISE_FLOOR {
                target = 0.0;
            }

            let vol = &mut self.volumes[i];
            if *vol < target {
                *vol = (*vol + step).min(target);
            } else if *vol > target {
                *vol = (*vol - step).max(target);
            }

            ch.master_vol = *vol as i32;
            ch.left = ch.master_vol;
            ch.right = ch.master_vol;
        }
    }

    fn silence(&mut self, slots: &mut [Channel]) {
        for (ch, vol) in slots.iter_mut().zip(self.volumes.iter_mut()) {
            ch.sound = None;
            ch.master_vol = 0;
            ch.left = 0;
            ch.right = 0;
            *vol = 0.0;
        }
    }
}
