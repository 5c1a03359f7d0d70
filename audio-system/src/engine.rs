//! The per-tick driver tying the channel pool, music and the device together.

use std::fmt::Write as _;
use std::sync::Arc;

use asset_manager::{Codec, CodecRegistry, RawPcmCodec, SoundId, SoundLoader, SoundRegistry};
use audio_backend::{AudioDevice, DeviceFormat};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::ambient::{AmbientKind, AmbientManager, AmbientRegions};
use crate::channel::{Channel, ChannelId, ChannelPool, EntityId, LogicalChannel};
use crate::config::AudioConfig;
use crate::console;
use crate::error::AudioError;
use crate::mixer::{ChannelMixer, MixFrame, SilentMixer};
use crate::music::{MusicPlayer, MusicState};
use crate::raw_queue::RawSampleQueue;
use crate::spatializer::{self, Listener, SpatialContext};
use crate::time::DeviceTimeTracker;

/// Loops started at init for the water and sky ambient slots.
pub const AMBIENT_WATER_SOUND: &str = "ambience/water1.sfx";
pub const AMBIENT_SKY_SOUND: &str = "ambience/wind2.sfx";

/// First console `play` entity; `playvol` counts from its own base.
const PLAY_HASH_BASE: i32 = 345;
const PLAYVOL_HASH_BASE: i32 = 543;

pub struct AudioEngine {
    config: AudioConfig,
    device: Arc<dyn AudioDevice>,
    format: DeviceFormat,
    started: bool,
    sounds: SoundRegistry,
    codecs: CodecRegistry,
    pool: ChannelPool,
    time: DeviceTimeTracker,
    raw: RawSampleQueue,
    music: MusicPlayer,
    ambient: AmbientManager,
    listener: Listener,
    view_entity: EntityId,
    voice_volume_scale: f32,
    rng: Box<dyn RngCore + Send>,
    mixer: Box<dyn ChannelMixer>,
    filter_quality: u8,
    pub(crate) play_hash: i32,
    pub(crate) playvol_hash: i32,
}

impl AudioEngine {
    /// Bring the mixer up on an already opened device.
    ///
    /// With `config.nosound` the engine stays stopped and every call is a no-op.
    pub fn new(mut config: AudioConfig, device: Arc<dyn AudioDevice>, loader: Box<dyn SoundLoader>) -> Self {
        config.validate();
        let format = device.format();

        let mut sounds = SoundRegistry::new(loader, config.max_sounds);
        sounds.set_target_rate(format.sample_rate);
        sounds.set_filter_quality(config.filter_quality);

        let mut codecs = CodecRegistry::new();
        codecs.register(Box::new(RawPcmCodec::new()));
        #[cfg(feature = "streaming")]
        asset_manager::SymphoniaCodec::register_all(&mut codecs);
        codecs.init();

        let mut music = MusicPlayer::new(config.music_dir.clone());
        music.init(&codecs, config.bgm_volume);

        let mut time = DeviceTimeTracker::new(config.time_reset_threshold);
        if !config.nosound {
            time.start(device.playback_cursor(), &format);
        }

        let mut engine = Self {
            pool: ChannelPool::new(config.dynamic_channels, config.max_channels),
            raw: RawSampleQueue::new(config.raw_samples),
            started: !config.nosound,
            filter_quality: config.filter_quality,
            config,
            device,
            format,
            sounds,
            codecs,
            time,
            music,
            ambient: AmbientManager::new(),
            listener: Listener::default(),
            // entity 0 is the world, 1 the first client
            view_entity: EntityId(1),
            voice_volume_scale: 1.0,
            rng: Box::new(StdRng::from_rng(&mut rand::rng())),
            mixer: Box::new(SilentMixer),
            play_hash: PLAY_HASH_BASE,
            playvol_hash: PLAYVOL_HASH_BASE,
        };

        if engine.started {
            info!(format = %engine.format, device = engine.device.device_name().unwrap_or("unnamed"), "sound started");
            let water = engine.precache_sound(AMBIENT_WATER_SOUND);
            let sky = engine.precache_sound(AMBIENT_SKY_SOUND);
            engine.ambient.set_sound(AmbientKind::Water, water);
            engine.ambient.set_sound(AmbientKind::Sky, sky);
            engine.stop_all_sounds(true);
        } else {
            info!("sound disabled");
        }
        engine
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Changes are picked up on the next [`update`](Self::update).
    pub fn config_mut(&mut self) -> &mut AudioConfig {
        &mut self.config
    }

    pub fn format(&self) -> DeviceFormat {
        self.format
    }

    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    pub fn raw(&self) -> &RawSampleQueue {
        &self.raw
    }

    pub fn time(&self) -> &DeviceTimeTracker {
        &self.time
    }

    pub fn sounds(&self) -> &SoundRegistry {
        &self.sounds
    }

    pub fn music(&self) -> &MusicPlayer {
        &self.music
    }

    pub fn ambient(&self) -> &AmbientManager {
        &self.ambient
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn view_entity(&self) -> EntityId {
        self.view_entity
    }

    pub fn set_mixer(&mut self, mixer: Box<dyn ChannelMixer>) {
        self.mixer = mixer;
    }

    pub fn set_rng(&mut self, rng: Box<dyn RngCore + Send>) {
        self.rng = rng;
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = Box::new(StdRng::seed_from_u64(seed));
    }

    /// Add a streaming codec. It is initialized right away and picked up by the music player.
    pub fn register_codec(&mut self, codec: Box<dyn Codec>) {
        self.codecs.register(codec);
        self.codecs.init();
        self.music.refresh_handlers(&self.codecs);
    }

    fn spatial_context(&self) -> SpatialContext {
        SpatialContext {
            view_entity: self.view_entity,
            mono: self.format.is_mono(),
            voice_volume_scale: self.voice_volume_scale,
        }
    }

    /// Register `name` and, with `config.precache`, decode it now.
    pub fn precache_sound(&mut self, name: &str) -> Option<SoundId> {
        if !self.started {
            return None;
        }
        let id = match self.sounds.find_or_insert(name) {
            Ok(id) => id,
            Err(e) => {
                warn!("precache {}: {}", name, e);
                return None;
            }
        };
        if self.config.precache {
            // the registry already logged the failure; the entry stays for a later retry
            let _ = self.sounds.load(id);
        }
        Some(id)
    }

    /// Register `name` without loading it.
    pub fn touch_sound(&mut self, name: &str) -> Option<SoundId> {
        if !self.started {
            return None;
        }
        self.sounds
            .find_or_insert(name)
            .map_err(|e| warn!("touch {}: {}", name, e))
            .ok()
    }

    pub fn set_ambient_sound(&mut self, kind: AmbientKind, sound: Option<SoundId>) {
        self.ambient.set_sound(kind, sound);
    }

    pub fn set_view_entity(&mut self, entity: EntityId) {
        self.view_entity = entity;
    }

    pub fn set_voice_volume_scale(&mut self, scale: f32) {
        self.voice_volume_scale = scale;
    }

    /// Start `sound` for `emitter`. `volume` is 0..=1, `attenuation` scales
    /// distance falloff (0 = heard everywhere).
    ///
    /// Returns the slot used, or `None` when the sound is inaudible here,
    /// fails to load or no slot could be taken.
    pub fn start_sound(
        &mut self,
        emitter: EntityId,
        logical: LogicalChannel,
        sound: SoundId,
        origin: Vec3,
        volume: f32,
        attenuation: f32,
    ) -> Option<ChannelId> {
        if !self.started || self.config.nosound {
            return None;
        }
        let ctx = self.spatial_context();
        let painted = self.time.painted_time();
        let id = self.pool.pick(emitter, logical, self.view_entity, painted)?;

        let ch = self.pool.get_mut(id)?;
        *ch = Channel {
            emitter,
            logical,
            origin,
            dist_mult: attenuation / spatializer::NOMINAL_CLIP_DIST,
            master_vol: (volume * 255.0) as i32,
            ..Default::default()
        };
        spatializer::apply(ch, &self.listener, &ctx);
        if ch.left == 0 && ch.right == 0 {
            return None;
        }

        let cache = self.sounds.load(sound).ok()?;
        let tick = self.pool.tick();
        let ch = self.pool.get_mut(id)?;
        ch.sound = Some(sound);
        ch.pos = 0;
        ch.end_time = painted + cache.length;
        ch.looping = cache.is_looped();
        ch.start_tick = tick;

        let skip = self.pool.offset_duplicate(id, cache.length, self.format.sample_rate, &mut *self.rng);
        if skip > 0 {
            debug!(slot = id.0, skip, "offset duplicate start");
        }
        Some(id)
    }

    pub fn stop_sound(&mut self, emitter: EntityId, logical: LogicalChannel) {
        self.pool.stop(emitter, logical);
    }

    /// Reset every slot and drop statics. `clear` also silences the device
    /// buffer and the raw queue.
    pub fn stop_all_sounds(&mut self, clear: bool) {
        if !self.started {
            return;
        }
        self.pool.stop_all();
        if clear {
            self.clear_buffer();
        }
    }

    /// Fill the device buffer with silence and forget queued raw samples.
    pub fn clear_buffer(&mut self) {
        if !self.started {
            return;
        }
        self.raw.clear();
        let device = Arc::clone(&self.device);
        match device.lock() {
            Ok(mut guard) => {
                guard.silence();
                device.submit(guard);
            }
            Err(e) => warn!("clear buffer: {}", e),
        };
    }

    /// Add a looping world sound at a fixed position.
    pub fn static_sound(
        &mut self,
        sound: SoundId,
        origin: Vec3,
        volume: f32,
        attenuation: f32,
    ) -> Result<ChannelId, AudioError> {
        if !self.started {
            return Err(AudioError::NotStarted);
        }
        if self.pool.total() == self.pool.capacity() {
            warn!("total_channels == MAX_CHANNELS");
            return Err(AudioError::StaticCapacity);
        }
        let cache = self.sounds.load(sound)?;
        if !cache.is_looped() {
            let name = self.sounds.name(sound).unwrap_or_default().to_string();
            warn!("sound {} not looped", name);
            return Err(AudioError::NotLooped(name));
        }

        let mut ch = Channel {
            emitter: EntityId::WORLD,
            sound: Some(sound),
            origin,
            master_vol: volume as i32,
            dist_mult: (attenuation / 64.0) / spatializer::NOMINAL_CLIP_DIST,
            end_time: self.time.painted_time() + cache.length,
            looping: true,
            ..Default::default()
        };
        spatializer::apply(&mut ch, &self.listener, &self.spatial_context());
        self.pool.add_static(ch)
    }

    /// Play a menu or interface sound on the view entity.
    pub fn local_sound(&mut self, name: &str) -> Option<ChannelId> {
        if !self.started || self.config.nosound {
            return None;
        }
        let Some(sound) = self.precache_sound(name) else {
            warn!("local sound: can't cache {}", name);
            return None;
        };
        self.start_sound(self.view_entity, LogicalChannel::ANY, sound, Vec3::ZERO, 1.0, 1.0)
    }

    /// Per-frame update: move the listener, fade ambients, respatialize and mix ahead.
    pub fn update(&mut self, listener: Listener, frame_time: f32, regions: Option<&dyn AmbientRegions>) {
        if !self.started {
            return;
        }
        self.apply_config_changes();
        self.listener = listener;
        self.mix(Some((frame_time, regions)));
        self.pool.advance_tick();
    }

    /// Top the mix up between frames without respatializing.
    pub fn extra_update(&mut self) {
        if !self.started || self.config.no_extra_update {
            return;
        }
        self.mix(None);
    }

    fn apply_config_changes(&mut self) {
        if self.config.validate() {
            debug!("config values adjusted");
        }
        if self.config.filter_quality != self.filter_quality {
            self.filter_quality = self.config.filter_quality;
            self.sounds.set_filter_quality(self.filter_quality);
        }
        if self.music.music_dir() != std::path::Path::new(&self.config.music_dir) {
            self.music.set_music_dir(self.config.music_dir.clone());
        }
    }

    fn mix(&mut self, spatial: Option<(f32, Option<&dyn AmbientRegions>)>) {
        let device = Arc::clone(&self.device);
        let mut guard = match device.lock() {
            Ok(guard) => guard,
            Err(e) => {
                debug!("device busy: {}", e);
                return;
            }
        };

        if self.time.update(device.playback_cursor(), &self.format) {
            self.pool.stop_all();
            self.raw.clear();
            guard.silence();
        }

        if let Some((frame_time, regions)) = spatial {
            let ambient_level = self.config.ambient_level;
            let fade = self.config.ambient_fade;
            let origin = self.listener.origin;
            self.ambient
                .update(self.pool.ambients_mut(), regions, origin, ambient_level, fade, frame_time);
            let ctx = self.spatial_context();
            self.pool.spatialize_all(&self.listener, &ctx);
            if self.config.snd_show {
                info!("----({})----", self.pool.audible_count());
            }
        }

        let painted = self.time.painted_time();
        if let Err(e) = self.music.update(painted, self.format.sample_rate, &mut self.raw, self.config.bgm_volume) {
            debug!("music: {}", e);
        }

        let sound_time = self.time.sound_time();
        let ahead = (self.config.mix_ahead * self.format.sample_rate as f32) as u64;
        let end = sound_time + ahead.min(self.format.buffer_frames() as u64);
        if end > painted {
            self.mixer.paint(
                &mut guard,
                MixFrame {
                    channels: self.pool.channels_mut(),
                    raw: &self.raw,
                    sounds: &self.sounds,
                    painted_time: painted,
                    end_time: end,
                    sfx_volume: self.config.sfx_volume,
                },
            );
            self.time.set_painted_time(end);
        }
        self.pool.retire_expired(self.time.painted_time());
        device.submit(guard);
    }

    pub fn music_play(&mut self, track: u8, looping: bool) -> Result<(), AudioError> {
        self.music.play(&mut self.codecs, &mut self.raw, track, looping)
    }

    pub fn music_stop(&mut self) {
        self.music.stop(&mut self.raw);
    }

    pub fn music_pause(&mut self) {
        self.music.pause();
    }

    pub fn music_resume(&mut self) {
        self.music.resume();
    }

    pub fn music_state(&self) -> MusicState {
        self.music.state()
    }

    pub fn music_info(&self) -> String {
        self.music.info()
    }

    pub fn music_enable(&mut self) {
        self.music.enable();
    }

    pub fn music_disable(&mut self) {
        self.music.disable(&mut self.raw);
    }

    pub fn music_reset(&mut self) {
        self.music.reset(&mut self.raw);
    }

    pub fn music_remap(&mut self, targets: &[u8]) {
        self.music.set_remap(targets);
    }

    pub fn music_jump_to_order(&mut self, order: i32) -> Result<(), AudioError> {
        self.music.jump_to_order(order)
    }

    /// Device and mixer state, one value per line.
    pub fn sound_info(&self) -> String {
        if !self.started {
            return "sound system not started".to_string();
        }
        let fmt = &self.format;
        let mut s = String::new();
        let _ = writeln!(s, "{}", fmt);
        let _ = writeln!(s, "{:5} samples", fmt.buffer_samples);
        let _ = writeln!(s, "{:5} samplepos", self.device.playback_cursor());
        let _ = writeln!(s, "{:5} paintedtime", self.time.painted_time());
        let _ = write!(s, "{:5} total_channels", self.pool.total());
        s
    }

    /// Every resident sound with its size, then the total.
    pub fn sound_list(&self) -> String {
        let mut s = String::new();
        let mut total = 0u64;
        for (_, name, cache) in self.sounds.iter() {
            let Some(cache) = cache else {
                continue;
            };
            let size = cache.size_bytes();
            total += size;
            let looped = if cache.is_looped() { 'L' } else { ' ' };
            let _ = writeln!(s, "{}({:2}b) {:6} : {}", looped, cache.width as u32 * 8, size, name);
        }
        let _ = write!(s, "Total resident: {}", total);
        s
    }

    /// Run one console command line.
    pub fn execute(&mut self, line: &str) -> String {
        console::execute(self, line)
    }

    pub fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        self.music.shutdown(&mut self.raw);
        self.codecs.shutdown();
        self.pool.stop_all();
        self.device.shutdown();
        self.started = false;
        info!("sound shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_manager::sfx::{write_sfx_bytes, SampleFormat};
    use asset_manager::MemoryLoader;
    use audio_backend::mock_backend::MockAudioDevice;

    fn engine_with(loader: MemoryLoader) -> (AudioEngine, audio_backend::mock_backend::MockDeviceHandle) {
        let device = MockAudioDevice::new(DeviceFormat::stereo16(11025, 4096));
        let handle = device.handle();
        let mut engine = AudioEngine::new(AudioConfig::default(), Arc::new(device), Box::new(loader));
        engine.seed_rng(7);
        (engine, handle)
    }

    fn tone(loop_start: Option<u64>) -> Vec<u8> {
        write_sfx_bytes(&[0.25; 2205], 11025, 1, SampleFormat::S16, loop_start)
    }

    #[test]
    fn start_sound_fills_a_dynamic_slot() {
        let mut loader = MemoryLoader::new();
        loader.insert("weapons/shot.sfx", tone(None));
        let (mut engine, _) = engine_with(loader);
        let id = engine.precache_sound("weapons/shot.sfx").unwrap();

        let slot = engine
            .start_sound(EntityId(5), LogicalChannel(1), id, Vec3::new(100.0, 0.0, 0.0), 1.0, 1.0)
            .unwrap();
        assert!(engine.pool().dynamic_range().contains(&slot.0));
        let ch = engine.pool().get(slot).unwrap();
        assert_eq!(ch.sound, Some(id));
        assert_eq!(ch.end_time, engine.time().painted_time() + 2205);
        assert!(ch.left > 0 && ch.right > 0);
    }

    #[test]
    fn same_sound_in_later_ticks_keeps_its_start() {
        let mut loader = MemoryLoader::new();
        loader.insert("weapons/shot.sfx", tone(None));
        let (mut engine, handle) = engine_with(loader);
        let id = engine.precache_sound("weapons/shot.sfx").unwrap();
        let near = Vec3::new(100.0, 0.0, 0.0);

        engine.start_sound(EntityId(10), LogicalChannel::AUTO, id, near, 1.0, 1.0).unwrap();
        for e in 0..10 {
            handle.advance_frames(500);
            engine.update(Listener::default(), 0.016, None);
            let slot = engine.start_sound(EntityId(11 + e), LogicalChannel::AUTO, id, near, 1.0, 1.0).unwrap();
            assert_eq!(engine.pool().get(slot).unwrap().pos, 0, "start in tick {}", e + 1);
        }

        // a second start in the same tick is still spread out
        let twins: Vec<i64> = (0..8)
            .map(|e| {
                let slot = engine.start_sound(EntityId(40 + e), LogicalChannel::AUTO, id, near, 1.0, 1.0).unwrap();
                engine.pool().get(slot).unwrap().pos
            })
            .collect();
        assert!(twins.iter().any(|&p| p > 0));
    }

    #[test]
    fn out_of_range_sound_takes_no_slot() {
        let mut loader = MemoryLoader::new();
        loader.insert("a.sfx", tone(None));
        let (mut engine, _) = engine_with(loader);
        let id = engine.precache_sound("a.sfx").unwrap();
        let far = Vec3::new(5000.0, 0.0, 0.0);
        assert!(engine.start_sound(EntityId(5), LogicalChannel(1), id, far, 1.0, 1.0).is_none());
        assert_eq!(engine.pool().audible_count(), 0);
    }

    #[test]
    fn static_sound_requires_loop() {
        let mut loader = MemoryLoader::new();
        loader.insert("once.sfx", tone(None));
        loader.insert("hum.sfx", tone(Some(0)));
        let (mut engine, _) = engine_with(loader);
        let once = engine.precache_sound("once.sfx").unwrap();
        let hum = engine.precache_sound("hum.sfx").unwrap();

        let before = engine.pool().total();
        assert!(matches!(engine.static_sound(once, Vec3::ZERO, 255.0, 1.0), Err(AudioError::NotLooped(_))));
        assert_eq!(engine.pool().total(), before);

        let slot = engine.static_sound(hum, Vec3::ZERO, 255.0, 1.0).unwrap();
        assert_eq!(slot.0, before);
        assert!(engine.pool().get(slot).unwrap().looping);
    }

    #[test]
    fn update_advances_painted_time() {
        let (mut engine, handle) = engine_with(MemoryLoader::new());
        engine.update(Listener::default(), 0.016, None);
        let first = engine.time().painted_time();
        // mix_ahead 0.1s at 11025 Hz
        assert_eq!(first, 1102);

        handle.advance_frames(500);
        engine.update(Listener::default(), 0.016, None);
        assert_eq!(engine.time().sound_time(), 500);
        assert_eq!(engine.time().painted_time(), 1602);
    }

    #[test]
    fn nosound_is_inert() {
        let mut loader = MemoryLoader::new();
        loader.insert("a.sfx", tone(None));
        let cfg = AudioConfig { nosound: true, ..Default::default() };
        let device = MockAudioDevice::new(DeviceFormat::stereo16(11025, 1024));
        let handle = device.handle();
        let mut engine = AudioEngine::new(cfg, Arc::new(device), Box::new(loader));
        assert!(!engine.is_started());
        assert!(engine.precache_sound("a.sfx").is_none());
        engine.update(Listener::default(), 0.1, None);
        assert_eq!(handle.submits(), 0);
        assert_eq!(engine.sound_info(), "sound system not started");
    }

    #[test]
    fn sound_list_reports_resident_sounds() {
        let mut loader = MemoryLoader::new();
        loader.insert("hum.sfx", tone(Some(0)));
        let (mut engine, _) = engine_with(loader);
        engine.precache_sound("hum.sfx");
        engine.touch_sound("never.sfx");
        let list = engine.sound_list();
        assert!(list.contains("L(16b)   4410 : hum.sfx"));
        assert!(!list.contains("never.sfx"));
        assert!(list.ends_with("Total resident: 4410"));
    }
}
