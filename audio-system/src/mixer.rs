//! The paint stage: turns channel gains and queued raw samples into device bytes.

use asset_manager::SoundRegistry;
use audio_backend::DmaBuffer;

use crate::channel::Channel;
use crate::raw_queue::RawSampleQueue;

/// Everything a mixer may read or advance for one paint window.
pub struct MixFrame<'a> {
    /// Slots in use. Mixers advance `pos` and `end_time` and clear finished sounds.
    pub channels: &'a mut [Channel],
    pub raw: &'a RawSampleQueue,
    pub sounds: &'a SoundRegistry,
    /// First frame to paint.
    pub painted_time: u64,
    /// One past the last frame to paint.
    pub end_time: u64,
    pub sfx_volume: f32,
}

pub trait ChannelMixer: Send {
    fn paint(&mut self, buffer: &mut DmaBuffer, frame: MixFrame<'_>);
}

/// Leaves the device buffer untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentMixer;

impl ChannelMixer for SilentMixer {
    fn paint(&mut self, _buffer: &mut DmaBuffer, _frame: MixFrame<'_>) {}
}

/// Additive software mixer for 8 and 16 bit devices.
///
/// Accumulates in 16-bit-times-256 units, the scale raw samples are queued in.
#[derive(Debug, Default, Clone)]
pub struct SoftwareMixer {
    paint: Vec<(i32, i32)>,
}

impl SoftwareMixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn paint_channel(paint: &mut [(i32, i32)], ch: &mut Channel, sounds: &SoundRegistry, start: u64, end: u64, vol: f32) {
        let Some(cache) = ch.sound.and_then(|id| sounds.cached(id)) else {
            return;
        };
        let channels = cache.channels.max(1) as usize;
        let lgain = ch.left as f32 * vol * i16::MAX as f32;
        let rgain = ch.right as f32 * vol * i16::MAX as f32;

        let mut t = start;
        while t < end {
            let stop = ch.end_time.min(end);
            if stop > t {
                for i in t..stop {
                    let frame = ch.pos as usize + (i - t) as usize;
                    let at = frame * channels;
                    let (l, r) = match (cache.samples.get(at), cache.samples.get(at + channels - 1)) {
                        (Some(&l), Some(&r)) => (l, r),
                        _ => (0.0, 0.0),
                    };
                    let slot = &mut paint[(i - start) as usize];
                    slot.0 = slot.0.saturating_add((l * lgain) as i32);
                    slot.1 = slot.1.saturating_add((r * rgain) as i32);
                }
                ch.pos += (stop - t) as i64;
                t = stop;
            }
            if t >= ch.end_time {
                if cache.loop_start >= 0 && cache.length > cache.loop_start as u64 {
                    ch.pos = cache.loop_start;
                    ch.end_time = t + cache.length - cache.loop_start as u64;
                } else {
                    ch.sound = None;
                    break;
                }
            }
        }
    }
}

impl ChannelMixer for SoftwareMixer {
    fn paint(&mut self, buffer: &mut DmaBuffer, frame: MixFrame<'_>) {
        if frame.end_time <= frame.painted_time {
            return;
        }
        let count = (frame.end_time - frame.painted_time) as usize;
        self.paint.clear();
        self.paint.resize(count, (0, 0));

        for (i, slot) in self.paint.iter_mut().enumerate() {
            if let Some(s) = frame.raw.sample_at(frame.painted_time + i as u64) {
                *slot = (s.left, s.right);
            }
        }
        for ch in frame.channels.iter_mut() {
            if ch.is_audible() {
                Self::paint_channel(&mut self.paint, ch, frame.sounds, frame.painted_time, frame.end_time, frame.sfx_volume);
            }
        }

        let fmt = buffer.format;
        let ring_frames = fmt.buffer_frames() as u64;
        if ring_frames == 0 {
            return;
        }
        let out_channels = fmt.channels.max(1) as usize;
        let bytes_per_sample = (fmt.sample_bits / 8).max(1) as usize;
        for (i, &(l, r)) in self.paint.iter().enumerate() {
            let pos = ((frame.painted_time + i as u64) % ring_frames) as usize * out_channels;
            let values = [l, r];
            for c in 0..out_channels {
                let v = if out_channels == 1 { (l + r) / 2 } else { values[c.min(1)] };
                let v = (v >> 8).clamp(i16::MIN as i32, i16::MAX as i32);
                let at = (pos + c) * bytes_per_sample;
                if bytes_per_sample == 2 {
                    buffer.bytes[at..at + 2].copy_from_slice(&(v as i16).to_le_bytes());
                } else if fmt.signed8 {
                    buffer.bytes[at] = ((v >> 8) as i8) as u8;
                } else {
                    buffer.bytes[at] = ((v >> 8) + 128) as u8;
                }
            }
        }
    }
}
