//! Sound assets and stream codecs for the mixing core.
pub mod codec;
pub mod raw_pcm;
pub mod registry;
pub mod sfx;
pub mod sfx_loader;
#[cfg(feature = "streaming")]
pub mod streaming_loader;
pub mod util;

pub use codec::{Codec, CodecRegistry, CodecType, StreamDecoder, StreamHandle, StreamInfo, StreamSource, StreamStatus};
pub use raw_pcm::RawPcmCodec;
pub use registry::{SoundId, SoundRegistry};
pub use sfx_loader::{DirectoryLoader, MemoryLoader, SoundCache, SoundLoader};
pub use util::AssetError;

#[cfg(feature = "streaming")]
pub use streaming_loader::SymphoniaCodec;
