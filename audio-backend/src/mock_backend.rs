use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::{AudioDevice, BackendError, BufferGuard, DeviceFormat, SharedBuffer};

/// A headless device whose playback cursor is driven by the test.
pub struct MockAudioDevice {
    state: Arc<MockState>,
    device_name: Option<String>,
}

struct MockState {
    format: DeviceFormat,
    buffer: SharedBuffer,
    cursor: AtomicUsize,
    submits: AtomicU64,
    available: AtomicBool,
}

/// Clonable control handle for a [`MockAudioDevice`].
#[derive(Clone)]
pub struct MockDeviceHandle {
    state: Arc<MockState>,
}

impl MockAudioDevice {
    pub fn new(format: DeviceFormat) -> Self {
        Self {
            state: Arc::new(MockState {
                format,
                buffer: SharedBuffer::new(format),
                cursor: AtomicUsize::new(0),
                submits: AtomicU64::new(0),
                available: AtomicBool::new(true),
            }),
            device_name: Some("mock-device".to_string()),
        }
    }

    pub fn handle(&self) -> MockDeviceHandle {
        MockDeviceHandle { state: self.state.clone() }
    }
}

impl Default for MockAudioDevice {
    fn default() -> Self {
        Self::new(DeviceFormat::stereo16(44100, 16384))
    }
}

impl MockDeviceHandle {
    pub fn cursor(&self) -> usize {
        self.state.cursor.load(Ordering::Relaxed)
    }

    /// Place the hardware cursor (mono samples, wrapped into the ring).
    pub fn set_cursor(&self, pos: usize) {
        let len = self.state.format.buffer_samples.max(1);
        self.state.cursor.store(pos % len, Ordering::Relaxed);
    }

    /// Simulate playback of `frames` sample frames.
    pub fn advance_frames(&self, frames: usize) {
        let step = frames * self.state.format.channels as usize;
        self.set_cursor(self.cursor() + step);
    }

    pub fn submits(&self) -> u64 {
        self.state.submits.load(Ordering::Relaxed)
    }

    /// Make `lock` fail, as a driver does after losing its buffer.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::Relaxed);
    }

    /// Copy of the ring contents. Takes the lock briefly.
    pub fn snapshot(&self) -> Vec<u8> {
        self.state.buffer.lock().bytes.clone()
    }

    /// Scribble over the ring so tests can observe a clear.
    pub fn fill(&self, byte: u8) {
        self.state.buffer.lock().bytes.iter_mut().for_each(|b| *b = byte);
    }
}

impl AudioDevice for MockAudioDevice {
    fn format(&self) -> DeviceFormat {
        self.state.format
    }

    fn lock(&self) -> Result<BufferGuard<'_>, BackendError> {
        if !self.state.available.load(Ordering::Relaxed) {
            return Err(BackendError::BufferUnavailable);
        }
        Ok(self.state.buffer.lock())
    }

    fn submit(&self, buffer: BufferGuard<'_>) {
        drop(buffer);
        self.state.submits.fetch_add(1, Ordering::Relaxed);
    }

    fn playback_cursor(&self) -> usize {
        self.state.cursor.load(Ordering::Relaxed)
    }

    fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}
