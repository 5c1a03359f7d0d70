//! Device abstraction consumed by the mixing core.
//!
//! The driver owns the hardware ring buffer. Callers lock it, write into it
//! through the returned guard and hand it back with [`AudioDevice::submit`].

use std::fmt;

use parking_lot::{Mutex, MutexGuard};

// The mock device lives in `src/mock_backend.rs`.
#[cfg(feature = "mock-audio")]
pub mod mock_backend;

/// A specialized error type for audio device failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    DeviceNotFound,
    UnsupportedFormat(String),
    /// The driver has no mapped buffer right now (e.g. device lost).
    BufferUnavailable,
    Other(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::DeviceNotFound => write!(f, "audio device not found"),
            BackendError::UnsupportedFormat(s) => write!(f, "unsupported device format: {}", s),
            BackendError::BufferUnavailable => write!(f, "device buffer unavailable"),
            BackendError::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for BackendError {}

/// Effective format of the device ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    /// Playback rate in sample frames per second.
    pub sample_rate: u32,
    pub channels: u16,
    /// 8 or 16.
    pub sample_bits: u16,
    /// Mono samples in the whole ring (frames * channels).
    pub buffer_samples: usize,
    /// Whether 8-bit data is signed. Unsigned 8-bit silence is 0x80.
    pub signed8: bool,
}

impl DeviceFormat {
    pub fn stereo16(sample_rate: u32, buffer_frames: usize) -> Self {
        Self {
            sample_rate,
            channels: 2,
            sample_bits: 16,
            buffer_samples: buffer_frames * 2,
            signed8: false,
        }
    }

    /// Sample frames (pairs for stereo) in the ring.
    pub fn buffer_frames(&self) -> usize {
        self.buffer_samples / self.channels.max(1) as usize
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_samples * self.sample_bits as usize / 8
    }

    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    /// Byte value representing silence for this format.
    pub fn silence_byte(&self) -> u8 {
        if self.sample_bits == 8 && !self.signed8 { 0x80 } else { 0 }
    }
}

impl fmt::Display for DeviceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bit, {}, {} Hz",
            self.sample_bits,
            if self.channels == 2 { "stereo" } else { "mono" },
            self.sample_rate
        )
    }
}

/// The shared sample memory of a device.
#[derive(Debug)]
pub struct DmaBuffer {
    pub format: DeviceFormat,
    pub bytes: Vec<u8>,
}

impl DmaBuffer {
    pub fn new(format: DeviceFormat) -> Self {
        Self { format, bytes: vec![format.silence_byte(); format.buffer_bytes()] }
    }

    /// Overwrite the whole ring with silence.
    pub fn silence(&mut self) {
        let clear = self.format.silence_byte();
        self.bytes.iter_mut().for_each(|b| *b = clear);
    }
}

/// Scoped access to the device buffer. Dropping it releases the lock.
pub type BufferGuard<'a> = MutexGuard<'a, DmaBuffer>;

/// Lockable ring buffer shared between a device and the mixing core.
#[derive(Debug)]
pub struct SharedBuffer {
    inner: Mutex<DmaBuffer>,
}

impl SharedBuffer {
    pub fn new(format: DeviceFormat) -> Self {
        Self { inner: Mutex::new(DmaBuffer::new(format)) }
    }

    pub fn lock(&self) -> BufferGuard<'_> {
        self.inner.lock()
    }
}

/// The core trait defining the audio device contract.
pub trait AudioDevice: Send + Sync {
    fn format(&self) -> DeviceFormat;

    /// Acquire the device buffer. The guard must be handed back with [`submit`](Self::submit).
    fn lock(&self) -> Result<BufferGuard<'_>, BackendError>;

    /// Hand a locked buffer back to the hardware.
    fn submit(&self, buffer: BufferGuard<'_>);

    /// Current hardware read position, in mono samples within the ring.
    fn playback_cursor(&self) -> usize;

    fn device_name(&self) -> Option<&str> {
        None
    }

    fn shutdown(&self) {}
}

/// Runtime helper to determine if the `mock-audio` feature was enabled at
/// compile time for this crate.
pub fn is_mock_backend_enabled() -> bool {
    cfg!(feature = "mock-audio")
}
