use asset_manager::AssetError;
use audio_backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("device error: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("sound system not started")]
    NotStarted,
    #[error("total_channels == MAX_CHANNELS")]
    StaticCapacity,
    #[error("sound {0} not looped")]
    NotLooped(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("bad track number {0}")]
    BadTrack(u8),
    #[error("couldn't find a cdrip for track {0}")]
    TrackNotFound(u8),
    #[error("stream keeps returning EOF")]
    RepeatedEof,
    #[error("stream seek error, stopping: {0}")]
    Seek(AssetError),
    #[error("stream read error, stopping: {0}")]
    Read(AssetError),
}
