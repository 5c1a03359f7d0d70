//! Maps the device's wrapping playback cursor onto a monotonic sample clock.

use audio_backend::DeviceFormat;
use tracing::info;

pub const DEFAULT_RESET_THRESHOLD: u64 = 0x4000_0000;

#[derive(Debug, Clone)]
pub struct DeviceTimeTracker {
    buffers: u64,
    old_pos: usize,
    sound_time: u64,
    painted_time: u64,
    reset_threshold: u64,
}

impl Default for DeviceTimeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RESET_THRESHOLD)
    }
}

impl DeviceTimeTracker {
    pub fn new(reset_threshold: u64) -> Self {
        Self { buffers: 0, old_pos: 0, sound_time: 0, painted_time: 0, reset_threshold }
    }

    /// Frame the device is currently playing.
    pub fn sound_time(&self) -> u64 {
        self.sound_time
    }

    /// Frame up to which the mixer has written.
    pub fn painted_time(&self) -> u64 {
        self.painted_time
    }

    pub fn set_painted_time(&mut self, t: u64) {
        self.painted_time = t;
    }

    /// Fold a new cursor reading in. Returns `true` when the clock was rebased
    /// and every sound must be stopped.
    ///
    /// Two wraps between calls count as one; callers must tick faster than a
    /// full buffer plays.
    pub fn update(&mut self, cursor: usize, format: &DeviceFormat) -> bool {
        let channels = format.channels.max(1) as usize;
        let full_frames = format.buffer_frames() as u64;
        let mut reset = false;

        if cursor < self.old_pos {
            self.buffers += 1;
            if self.painted_time > self.reset_threshold {
                info!(painted = self.painted_time, "sample clock rebased");
                self.buffers = 0;
                self.painted_time = full_frames;
                reset = true;
            }
        }
        self.old_pos = cursor;

        self.sound_time = self.buffers * full_frames + (cursor / channels) as u64;
        if self.painted_time < self.sound_time {
            self.painted_time = self.sound_time;
        }
        reset
    }

    /// Start the clock at the device's current position.
    pub fn start(&mut self, cursor: usize, format: &DeviceFormat) {
        *self = Self::new(self.reset_threshold);
        self.update(cursor, format);
    }
}
