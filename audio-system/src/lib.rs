//! Real-time sound mixing core.
//!
//! An [`AudioEngine`] owns a fixed pool of playback channels (ambient loops,
//! dynamic one-shots and static world loops), a raw sample queue fed by the
//! streaming music player, and the clock that maps the device's playback
//! cursor onto monotonic sample time. A host drives it once per frame with
//! [`AudioEngine::update`].

pub mod ambient;
pub mod channel;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod music;
pub mod raw_queue;
pub mod spatializer;
pub mod time;

pub use ambient::{AmbientKind, AmbientManager, AmbientRegions};
pub use channel::{Channel, ChannelId, ChannelPool, EntityId, LogicalChannel, NUM_AMBIENTS};
pub use config::AudioConfig;
pub use engine::AudioEngine;
pub use error::AudioError;
pub use mixer::{ChannelMixer, MixFrame, SilentMixer, SoftwareMixer};
pub use music::{MusicPlayer, MusicState};
pub use raw_queue::{RawFormat, RawSampleQueue, SamplePair};
pub use spatializer::{Listener, SpatialContext};
pub use time::DeviceTimeTracker;
