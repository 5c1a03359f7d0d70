//! Stream codec capability and registry.
//!
//! A [`Codec`] knows how to open a file of one container type and hand back a
//! [`StreamDecoder`]. The [`CodecRegistry`] is keyed by [`CodecType`] bit tags
//! and is queried for availability before a stream is opened.

use std::fmt;
use std::fs::File;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::util::AssetError;

/// Bit tag identifying a codec kind. Tags combine into masks with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CodecType(u32);

impl CodecType {
    pub const NONE: CodecType = CodecType(0);
    pub const WAV: CodecType = CodecType(1 << 0);
    pub const FLAC: CodecType = CodecType(1 << 1);
    pub const MP3: CodecType = CodecType(1 << 2);
    pub const VORBIS: CodecType = CodecType(1 << 3);
    pub const OPUS: CodecType = CodecType(1 << 4);
    pub const MOD: CodecType = CodecType(1 << 5);
    pub const UMX: CodecType = CodecType(1 << 6);
    pub const RAW: CodecType = CodecType(1 << 7);
    pub const ALL: CodecType = CodecType(0xff);
    /// Formats a ripped audio CD track may come in.
    pub const CDRIP: CodecType = CodecType(
        Self::VORBIS.0 | Self::OPUS.0 | Self::MP3.0 | Self::FLAC.0 | Self::WAV.0 | Self::RAW.0,
    );

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn intersects(self, other: CodecType) -> bool {
        self.0 & other.0 != 0
    }

    /// A single known tag, as opposed to an empty or multi-bit mask.
    pub fn is_single(self) -> bool {
        self.0 != 0 && self.0 & (self.0 - 1) == 0 && self.intersects(Self::ALL)
    }
}

impl BitOr for CodecType {
    type Output = CodecType;

    fn bitor(self, rhs: CodecType) -> CodecType {
        CodecType(self.0 | rhs.0)
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            CodecType::NONE => "none",
            CodecType::WAV => "wav",
            CodecType::FLAC => "flac",
            CodecType::MP3 => "mp3",
            CodecType::VORBIS => "vorbis",
            CodecType::OPUS => "opus",
            CodecType::MOD => "mod",
            CodecType::UMX => "umx",
            CodecType::RAW => "raw",
            other => return write!(f, "{:#x}", other.0),
        };
        f.write_str(name)
    }
}

/// PCM layout produced by a decoder: little-endian interleaved samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub rate: u32,
    /// Bytes per sample, 1 (unsigned) or 2 (signed).
    pub width: u8,
    pub channels: u8,
}

impl StreamInfo {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.channels as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    #[default]
    None,
    Playing,
    Paused,
}

/// An open, positioned stream of PCM bytes.
pub trait StreamDecoder: Send {
    fn info(&self) -> StreamInfo;

    /// Fill `buf` with PCM bytes. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AssetError>;

    fn rewind(&mut self) -> Result<(), AssetError>;

    /// Jump to a pattern order. Only tracker module formats support it.
    fn jump_to_order(&mut self, _order: i32) -> Result<(), AssetError> {
        Err(AssetError::Unsupported("jump to order"))
    }

    fn close(&mut self) {}
}

/// File handed to [`Codec::open`].
#[derive(Debug)]
pub struct StreamSource {
    pub path: PathBuf,
    pub file: File,
    pub length: u64,
}

impl StreamSource {
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound(path.display().to_string())
            } else {
                AssetError::Io(e)
            }
        })?;
        let length = file.metadata()?.len();
        Ok(Self { path: path.to_path_buf(), file, length })
    }
}

pub trait Codec: Send {
    fn codec_type(&self) -> CodecType;
    fn name(&self) -> &str;

    /// Called once by [`CodecRegistry::init`]. A `false` leaves the codec unavailable.
    fn initialize(&mut self) -> bool {
        true
    }

    fn shutdown(&mut self) {}

    fn open(&mut self, source: StreamSource) -> Result<Box<dyn StreamDecoder>, AssetError>;
}

/// An open music or sound stream, owned by its player.
pub struct StreamHandle {
    name: String,
    codec_type: CodecType,
    pub looping: bool,
    status: StreamStatus,
    info: StreamInfo,
    decoder: Box<dyn StreamDecoder>,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("name", &self.name)
            .field("codec_type", &self.codec_type)
            .field("looping", &self.looping)
            .field("status", &self.status)
            .field("info", &self.info)
            .finish()
    }
}

impl StreamHandle {
    /// Wrap an already-open decoder. The handle starts out playing.
    pub fn with_decoder(
        name: impl Into<String>,
        codec_type: CodecType,
        looping: bool,
        decoder: Box<dyn StreamDecoder>,
    ) -> Self {
        let info = decoder.info();
        Self { name: name.into(), codec_type, looping, status: StreamStatus::Playing, info, decoder }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn set_status(&mut self, status: StreamStatus) {
        self.status = status;
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, AssetError> {
        self.decoder.read(buf)
    }

    pub fn rewind(&mut self) -> Result<(), AssetError> {
        self.decoder.rewind()
    }

    pub fn jump_to_order(&mut self, order: i32) -> Result<(), AssetError> {
        self.decoder.jump_to_order(order)
    }

    pub fn close(mut self) {
        self.decoder.close();
        self.status = StreamStatus::None;
        debug!(name = %self.name, "stream closed");
    }
}

struct CodecEntry {
    codec: Box<dyn Codec>,
    initialized: bool,
}

/// Codecs known to the engine, most recently registered first.
#[derive(Default)]
pub struct CodecRegistry {
    entries: Vec<CodecEntry>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.entries.insert(0, CodecEntry { codec, initialized: false });
    }

    pub fn init(&mut self) {
        for entry in &mut self.entries {
            if entry.initialized {
                continue;
            }
            entry.initialized = entry.codec.initialize();
            if entry.initialized {
                info!("codec {} initialized", entry.codec.name());
            } else {
                warn!("codec {} failed to initialize", entry.codec.name());
            }
        }
    }

    pub fn shutdown(&mut self) {
        for entry in &mut self.entries {
            if entry.initialized {
                entry.codec.shutdown();
                entry.initialized = false;
            }
        }
    }

    /// `None` if no codec of that type is registered, else whether it initialized.
    pub fn is_available(&self, ty: CodecType) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.codec.codec_type() == ty)
            .map(|e| e.initialized)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Open `path` with the codec registered for `ty`.
    pub fn open_stream(&mut self, path: &Path, ty: CodecType, looping: bool) -> Result<StreamHandle, AssetError> {
        let display = path.display().to_string();
        if !ty.is_single() {
            return Err(AssetError::BadCodecType(display));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.codec.codec_type() == ty)
            .ok_or_else(|| AssetError::UnknownCodec { ty, path: display.clone() })?;
        if !entry.initialized {
            return Err(AssetError::CodecUnavailable(ty));
        }

        let source = StreamSource::open(path)?;
        let decoder = entry.codec.open(source)?;
        let handle = StreamHandle::with_decoder(display, ty, looping, decoder);
        debug!(name = %handle.name(), codec = %ty, info = ?handle.info(), "stream opened");
        Ok(handle)
    }
}
