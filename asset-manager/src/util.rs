use thiserror::Error;

use crate::codec::CodecType;

/// Longest sound or stream name accepted by the registries.
pub const MAX_QPATH: usize = 64;

// safety caps
pub const MAX_SFX_FRAMES: u64 = 100_000_000; // sanity cap (100M frames)
pub const DEFAULT_MAX_SOUNDS: usize = 512;
pub const DEFAULT_ENGINE_SR: u32 = 44_100;

/// Default extension appended to sound names that carry none.
pub const SFX_EXTENSION: &str = "sfx";

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("resource limits exceeded: {0}")]
    ResourceLimit(String),
    #[error("name too long: {0}")]
    NameTooLong(String),
    #[error("bad codec type for {0}")]
    BadCodecType(String),
    #[error("unknown codec type {ty} for {path}")]
    UnknownCodec { ty: CodecType, path: String },
    #[error("codec {0} is not initialized")]
    CodecUnavailable(CodecType),
    #[error("codec rejected stream {path}: {reason}")]
    OpenRejected { path: String, reason: String },
    #[error("stream seek failed: {0}")]
    Seek(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
