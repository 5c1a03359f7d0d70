//! Ring of pre-mixed stereo samples fed by streams such as music.

/// One resampled frame, already scaled by the stream volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplePair {
    pub left: i32,
    pub right: i32,
}

/// Layout of the bytes handed to [`RawSampleQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFormat {
    pub rate: u32,
    /// 1 = unsigned 8-bit, 2 = signed 16-bit little-endian.
    pub width: u8,
    pub channels: u8,
}

#[derive(Debug, Clone)]
pub struct RawSampleQueue {
    samples: Vec<SamplePair>,
    /// First frame written since the last clear or catch-up.
    start: u64,
    end: u64,
}

impl RawSampleQueue {
    /// `capacity` is rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self { samples: vec![SamplePair::default(); capacity], start: 0, end: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Write cursor, in device frames.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Forget queued data. The next push starts at the painted time.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Move a lagging write cursor up to `painted`.
    pub fn catch_up(&mut self, painted: u64) {
        if self.end < painted {
            self.start = painted;
            self.end = painted;
        }
    }

    /// Device frames that can still be queued before the ring is full.
    pub fn free(&self, painted: u64) -> usize {
        let queued = self.end.saturating_sub(painted) as usize;
        self.capacity().saturating_sub(queued)
    }

    /// Resample `frames` source frames from `data` to `device_rate` and queue
    /// them. Returns the number of device frames written.
    pub fn push(
        &mut self,
        painted: u64,
        device_rate: u32,
        format: RawFormat,
        frames: usize,
        data: &[u8],
        volume: f32,
    ) -> usize {
        if device_rate == 0 || !(1..=2).contains(&format.width) || !(1..=2).contains(&format.channels) {
            return 0;
        }
        self.catch_up(painted);

        let frame_bytes = format.width as usize * format.channels as usize;
        let frames = frames.min(data.len() / frame_bytes);
        let mut gain = (256.0 * volume) as i32;
        if format.width == 1 {
            gain *= 256;
        }

        let mask = self.capacity() as u64 - 1;
        let mut written = 0;
        loop {
            let src = (written as u64 * format.rate as u64 / device_rate as u64) as usize;
            if src >= frames || self.free(painted) == 0 {
                break;
            }
            let at = src * frame_bytes;
            let sample = |i: usize| -> i32 {
                let off = at + i * format.width as usize;
                if format.width == 2 {
                    i16::from_le_bytes([data[off], data[off + 1]]) as i32
                } else {
                    data[off] as i32 - 128
                }
            };
            let (l, r) = if format.channels == 2 { (sample(0), sample(1)) } else { (sample(0), sample(0)) };

            let dst = (self.end & mask) as usize;
            self.samples[dst] = SamplePair { left: l * gain, right: r * gain };
            self.end += 1;
            written += 1;
        }
        written
    }

    /// Frame queued for device time `t`, if `t` is inside the live window.
    pub fn sample_at(&self, t: u64) -> Option<SamplePair> {
        let cap = self.capacity() as u64;
        if t < self.start || t >= self.end || self.end - t > cap {
            return None;
        }
        Some(self.samples[(t & (cap - 1)) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    const STEREO16_22K: RawFormat = RawFormat { rate: 22050, width: 2, channels: 2 };

    #[test]
    fn upsampling_doubles_frames() {
        let mut q = RawSampleQueue::new(1024);
        let data = s16(&vec![100; 200]);
        let n = q.push(0, 44100, STEREO16_22K, 100, &data, 1.0);
        assert_eq!(n, 200);
        assert_eq!(q.end(), 200);
        assert_eq!(q.sample_at(0), Some(SamplePair { left: 25600, right: 25600 }));
    }

    #[test]
    fn each_output_repeats_source_frame() {
        let mut q = RawSampleQueue::new(64);
        let data = s16(&[1, -1, 2, -2, 3, -3]);
        q.push(0, 44100, STEREO16_22K, 3, &data, 1.0);
        let lefts: Vec<i32> = (0..6).map(|t| q.sample_at(t).unwrap().left / 256).collect();
        assert_eq!(lefts, vec![1, 1, 2, 2, 3, 3]);
        assert_eq!(q.sample_at(1).unwrap().right, -256);
    }

    #[test]
    fn mono_16bit_upsamples_to_both_sides() {
        let mut q = RawSampleQueue::new(1024);
        let fmt = RawFormat { rate: 22050, width: 2, channels: 1 };
        let source: Vec<i16> = (0..100).map(|i| i * 7 - 300).collect();
        assert_eq!(q.push(0, 44100, fmt, 100, &s16(&source), 1.0), 200);
        for t in 0..200u64 {
            let s = q.sample_at(t).unwrap();
            assert_eq!(s.left, s.right);
            assert_eq!(s.left, source[t as usize / 2] as i32 * 256);
        }
        assert!(q.sample_at(200).is_none());
    }

    #[test]
    fn mono_8bit_is_centered_and_boosted() {
        let mut q = RawSampleQueue::new(64);
        let fmt = RawFormat { rate: 11025, width: 1, channels: 1 };
        q.push(0, 11025, fmt, 2, &[0x80, 0x90], 0.5);
        assert_eq!(q.sample_at(0), Some(SamplePair { left: 0, right: 0 }));
        // (0x90 - 128) * 128 * 256
        assert_eq!(q.sample_at(1).unwrap().left, 16 * 128 * 256);
        assert_eq!(q.sample_at(1).unwrap().right, 16 * 128 * 256);
    }

    #[test]
    fn lagging_cursor_catches_up() {
        let mut q = RawSampleQueue::new(64);
        let fmt = RawFormat { rate: 44100, width: 2, channels: 1 };
        q.push(500, 44100, fmt, 4, &s16(&[1, 2, 3, 4]), 1.0);
        assert_eq!(q.end(), 504);
        assert_eq!(q.sample_at(500).unwrap().left, 256);
        assert!(q.sample_at(499).is_none());
        assert!(q.sample_at(460).is_none());
    }

    #[test]
    fn cleared_frames_are_not_replayed() {
        let mut q = RawSampleQueue::new(64);
        let fmt = RawFormat { rate: 44100, width: 2, channels: 1 };
        q.push(0, 44100, fmt, 8, &s16(&[9; 8]), 1.0);
        q.clear();
        q.push(4, 44100, fmt, 2, &s16(&[3, 3]), 1.0);
        assert!(q.sample_at(2).is_none());
        assert_eq!(q.sample_at(4).unwrap().left, 3 * 256);
    }

    #[test]
    fn stops_when_ring_full() {
        let mut q = RawSampleQueue::new(16);
        let fmt = RawFormat { rate: 44100, width: 2, channels: 1 };
        let written = q.push(0, 44100, fmt, 40, &s16(&[7; 40]), 1.0);
        assert_eq!(written, 16);
        assert_eq!(q.free(0), 0);
        assert_eq!(q.push(0, 44100, fmt, 40, &s16(&[7; 40]), 1.0), 0);
        // space opens as painted time advances
        assert_eq!(q.push(4, 44100, fmt, 40, &s16(&[7; 40]), 1.0), 4);
    }

    #[test]
    fn frame_count_clamped_to_data() {
        let mut q = RawSampleQueue::new(64);
        let fmt = RawFormat { rate: 44100, width: 2, channels: 2 };
        assert_eq!(q.push(0, 44100, fmt, 10, &s16(&[1, 1, 2, 2]), 1.0), 2);
    }

    #[test]
    fn write_cursor_is_monotonic_until_cleared() {
        let mut q = RawSampleQueue::new(256);
        let fmt = RawFormat { rate: 22050, width: 2, channels: 1 };
        let mut last = 0;
        for painted in [0u64, 10, 10, 50, 120] {
            q.push(painted, 44100, fmt, 8, &s16(&[5; 8]), 1.0);
            assert!(q.end() >= last);
            last = q.end();
        }
        q.clear();
        assert_eq!(q.end(), 0);
    }
}
