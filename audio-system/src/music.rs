//! Background music: one codec stream feeding the raw sample queue.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use asset_manager::{CodecRegistry, CodecType, StreamHandle, StreamStatus};
use tracing::{debug, info, warn};

use crate::error::AudioError;
use crate::raw_queue::{RawFormat, RawSampleQueue};

/// Largest single read from the codec.
pub const SCRATCH_BYTES: usize = 16384;
pub const NUM_TRACKS: usize = 100;

/// Extensions probed for `trackNN`, in preference order.
const WANTED_HANDLERS: &[(CodecType, &str)] = &[
    (CodecType::VORBIS, "ogg"),
    (CodecType::OPUS, "opus"),
    (CodecType::MP3, "mp3"),
    (CodecType::FLAC, "flac"),
    (CodecType::WAV, "wav"),
    (CodecType::MOD, "it"),
    (CodecType::MOD, "s3m"),
    (CodecType::MOD, "xm"),
    (CodecType::MOD, "mod"),
    (CodecType::UMX, "umx"),
    (CodecType::RAW, "raw"),
    (CodecType::RAW, "pcm"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicHandler {
    pub codec_type: CodecType,
    pub ext: &'static str,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicState {
    Stopped,
    Playing,
    Paused,
}

pub struct MusicPlayer {
    handlers: Vec<MusicHandler>,
    music_dir: PathBuf,
    stream: Option<StreamHandle>,
    remap: [u8; NUM_TRACKS],
    enabled: bool,
    playing: bool,
    was_playing: bool,
    track: u8,
    looping: bool,
    /// Volume seen on the previous tick.
    cd_volume: f32,
    did_rewind: bool,
    scratch: Vec<u8>,
}

fn identity_remap() -> [u8; NUM_TRACKS] {
    std::array::from_fn(|i| i as u8)
}

impl Default for MusicPlayer {
    fn default() -> Self {
        Self::new("music")
    }
}

impl MusicPlayer {
    pub fn new(music_dir: impl Into<PathBuf>) -> Self {
        Self {
            handlers: Vec::new(),
            music_dir: music_dir.into(),
            stream: None,
            remap: identity_remap(),
            enabled: true,
            playing: false,
            was_playing: false,
            track: 0,
            looping: false,
            cd_volume: 0.0,
            did_rewind: false,
            scratch: vec![0u8; SCRATCH_BYTES],
        }
    }

    /// Build the handler list from the codecs that are registered.
    pub fn init(&mut self, codecs: &CodecRegistry, bgm_volume: f32) {
        self.refresh_handlers(codecs);
        self.remap = identity_remap();
        self.enabled = true;
        self.cd_volume = bgm_volume;
        info!(handlers = self.handlers.len(), "music player initialized");
    }

    /// Rebuild the handler list after codecs were registered or initialized.
    pub fn refresh_handlers(&mut self, codecs: &CodecRegistry) {
        self.handlers = WANTED_HANDLERS
            .iter()
            .filter_map(|&(codec_type, ext)| {
                codecs
                    .is_available(codec_type)
                    .map(|available| MusicHandler { codec_type, ext, available })
            })
            .collect();
    }

    pub fn shutdown(&mut self, raw: &mut RawSampleQueue) {
        self.stop(raw);
        self.handlers.clear();
    }

    pub fn handlers(&self) -> &[MusicHandler] {
        &self.handlers
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    pub fn set_music_dir(&mut self, dir: impl Into<PathBuf>) {
        self.music_dir = dir.into();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> MusicState {
        if self.playing {
            MusicState::Playing
        } else if self.stream.as_ref().is_some_and(|s| s.status() == StreamStatus::Paused) {
            MusicState::Paused
        } else {
            MusicState::Stopped
        }
    }

    /// Track of the open stream, after remapping.
    pub fn track(&self) -> Option<u8> {
        self.stream.as_ref().map(|_| self.track)
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    fn track_path(&self, track: u8, ext: &str) -> PathBuf {
        self.music_dir.join(format!("track{:02}.{}", track, ext))
    }

    pub fn play(
        &mut self,
        codecs: &mut CodecRegistry,
        raw: &mut RawSampleQueue,
        track: u8,
        looping: bool,
    ) -> Result<(), AudioError> {
        if !self.enabled {
            return Ok(());
        }
        if self.handlers.is_empty() {
            debug!("no music handlers");
            return Ok(());
        }
        let track = self.remap.get(track as usize).copied().unwrap_or(track);
        if track < 1 {
            debug!("bad track number {}", track);
            return Err(AudioError::BadTrack(track));
        }
        if self.playing && self.track == track {
            return Ok(());
        }
        self.stop(raw);

        let found = self
            .handlers
            .iter()
            .filter(|h| h.available && h.codec_type.intersects(CodecType::CDRIP))
            .map(|h| (h.codec_type, self.track_path(track, h.ext)))
            .find(|(_, path)| path.is_file());
        let Some((codec_type, path)) = found else {
            warn!("couldn't find a cdrip for track {}", track);
            return Err(AudioError::TrackNotFound(track));
        };

        let stream = codecs.open_stream(&path, codec_type, looping).map_err(|e| {
            warn!("couldn't handle music file {}: {}", path.display(), e);
            AudioError::from(e)
        })?;
        info!(track, path = %path.display(), looping, "music started");
        self.stream = Some(stream);
        self.looping = looping;
        self.track = track;
        self.playing = true;
        self.was_playing = false;
        self.did_rewind = false;

        if self.cd_volume == 0.0 {
            self.pause();
        }
        Ok(())
    }

    /// Close the stream. Safe to call when nothing is open.
    pub fn stop(&mut self, raw: &mut RawSampleQueue) {
        if let Some(stream) = self.stream.take() {
            stream.close();
            raw.clear();
            debug!(track = self.track, "music stopped");
        }
        self.playing = false;
        self.was_playing = false;
    }

    pub fn pause(&mut self) {
        if !self.enabled || !self.playing {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if stream.status() != StreamStatus::Playing {
            return;
        }
        stream.set_status(StreamStatus::Paused);
        self.was_playing = true;
        self.playing = false;
    }

    pub fn resume(&mut self) {
        if !self.enabled || !self.was_playing {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if stream.status() != StreamStatus::Paused {
            return;
        }
        stream.set_status(StreamStatus::Playing);
        self.playing = true;
    }

    pub fn jump_to_order(&mut self, order: i32) -> Result<(), AudioError> {
        match self.stream.as_mut() {
            Some(stream) => stream.jump_to_order(order).map_err(AudioError::from),
            None => Ok(()),
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self, raw: &mut RawSampleQueue) {
        self.stop(raw);
        self.enabled = false;
    }

    /// Enable, stop and restore the identity remap table.
    pub fn reset(&mut self, raw: &mut RawSampleQueue) {
        self.enabled = true;
        self.stop(raw);
        self.remap = identity_remap();
    }

    /// Set `remap[1..=n]` from `targets`.
    pub fn set_remap(&mut self, targets: &[u8]) {
        for (slot, &t) in self.remap.iter_mut().skip(1).zip(targets) {
            *slot = t;
        }
    }

    /// Entries that differ from the identity mapping.
    pub fn remapped(&self) -> Vec<(u8, u8)> {
        self.remap
            .iter()
            .enumerate()
            .skip(1)
            .filter(|&(i, &t)| i as u8 != t)
            .map(|(i, &t)| (i as u8, t))
            .collect()
    }

    pub fn info(&self) -> String {
        let mut s = String::new();
        let mode = if self.looping { "looping" } else { "playing" };
        match self.state() {
            MusicState::Playing => {
                let _ = writeln!(s, "Currently {} track {}", mode, self.track);
            }
            MusicState::Paused => {
                let _ = writeln!(s, "Paused {} track {}", mode, self.track);
            }
            MusicState::Stopped => {}
        }
        let _ = write!(s, "Volume is {}", self.cd_volume);
        s
    }

    /// Per-tick pump: applies volume-driven pause/resume, then tops the raw
    /// queue up from the stream. Stream faults stop playback and are returned.
    pub fn update(
        &mut self,
        painted: u64,
        device_rate: u32,
        raw: &mut RawSampleQueue,
        bgm_volume: f32,
    ) -> Result<(), AudioError> {
        if !self.enabled {
            return Ok(());
        }
        if bgm_volume != self.cd_volume {
            let was_silent = self.cd_volume == 0.0;
            self.cd_volume = bgm_volume;
            if bgm_volume == 0.0 {
                self.pause();
            } else if was_silent {
                self.resume();
            }
        }
        self.update_stream(painted, device_rate, raw, bgm_volume)
    }

    fn update_stream(
        &mut self,
        painted: u64,
        device_rate: u32,
        raw: &mut RawSampleQueue,
        volume: f32,
    ) -> Result<(), AudioError> {
        match self.stream.as_ref() {
            Some(s) if s.status() == StreamStatus::Playing => {}
            _ => return Ok(()),
        }
        if volume <= 0.0 || device_rate == 0 {
            return Ok(());
        }

        self.did_rewind = false;
        raw.catch_up(painted);

        while raw.end() < painted + raw.capacity() as u64 {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(());
            };
            let info = stream.info();
            let frame_bytes = info.frame_bytes();
            let mut file_samples = raw.free(painted) * info.rate as usize / device_rate as usize;
            if file_samples == 0 || frame_bytes == 0 {
                return Ok(());
            }
            let mut file_size = file_samples * frame_bytes;
            if file_size > self.scratch.len() {
                file_size = self.scratch.len() - self.scratch.len() % frame_bytes;
                file_samples = file_size / frame_bytes;
            }

            let n = match stream.read(&mut self.scratch[..file_size]) {
                Ok(n) => n,
                Err(e) => {
                    warn!("stream read error, stopping: {}", e);
                    self.stop(raw);
                    return Err(AudioError::Read(e));
                }
            };

            if n > 0 {
                if n < file_size {
                    file_samples = n / frame_bytes;
                }
                let format = RawFormat { rate: info.rate, width: info.width, channels: info.channels };
                raw.push(painted, device_rate, format, file_samples, &self.scratch[..n], volume);
                self.did_rewind = false;
                continue;
            }

            // end of stream
            if !self.looping {
                debug!(track = self.track, "music finished");
                self.stop(raw);
                return Ok(());
            }
            if self.did_rewind {
                warn!("stream keeps returning EOF");
                self.stop(raw);
                return Err(AudioError::RepeatedEof);
            }
            if let Err(e) = stream.rewind() {
                warn!("stream seek error, stopping: {}", e);
                self.stop(raw);
                return Err(AudioError::Seek(e));
            }
            self.did_rewind = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_manager::{AssetError, Codec, StreamDecoder, StreamInfo, StreamSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves `len` bytes of silence, counting rewinds.
    struct Scripted {
        len: usize,
        pos: usize,
        rewinds: Arc<AtomicUsize>,
        rewind_moves: bool,
        fail_reads: bool,
    }

    impl StreamDecoder for Scripted {
        fn info(&self) -> StreamInfo {
            StreamInfo { rate: 22050, width: 2, channels: 2 }
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, AssetError> {
            if self.fail_reads {
                return Err(AssetError::Decode("corrupt".into()));
            }
            let n = buf.len().min(self.len - self.pos);
            buf[..n].fill(0);
            self.pos += n;
            Ok(n)
        }
        fn rewind(&mut self) -> Result<(), AssetError> {
            self.rewinds.fetch_add(1, Ordering::SeqCst);
            if self.rewind_moves {
                self.pos = 0;
            }
            Ok(())
        }
    }

    struct ScriptedCodec {
        len: usize,
        rewinds: Arc<AtomicUsize>,
        rewind_moves: bool,
        fail_reads: bool,
    }

    impl Codec for ScriptedCodec {
        fn codec_type(&self) -> CodecType {
            CodecType::WAV
        }
        fn name(&self) -> &str {
            "scripted"
        }
        fn open(&mut self, _source: StreamSource) -> Result<Box<dyn StreamDecoder>, AssetError> {
            Ok(Box::new(Scripted {
                len: self.len,
                pos: 0,
                rewinds: Arc::clone(&self.rewinds),
                rewind_moves: self.rewind_moves,
                fail_reads: self.fail_reads,
            }))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        codecs: CodecRegistry,
        player: MusicPlayer,
        raw: RawSampleQueue,
        rewinds: Arc<AtomicUsize>,
    }

    fn fixture(len: usize, rewind_moves: bool, fail_reads: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("track02.wav"), b"x").unwrap();
        let rewinds = Arc::new(AtomicUsize::new(0));
        let mut codecs = CodecRegistry::new();
        codecs.register(Box::new(ScriptedCodec { len, rewinds: Arc::clone(&rewinds), rewind_moves, fail_reads }));
        codecs.init();
        let mut player = MusicPlayer::new(dir.path());
        player.init(&codecs, 1.0);
        Fixture { _dir: dir, codecs, player, raw: RawSampleQueue::new(8192), rewinds }
    }

    #[test]
    fn handlers_follow_registration() {
        let f = fixture(0, true, false);
        let exts: Vec<&str> = f.player.handlers().iter().map(|h| h.ext).collect();
        assert_eq!(exts, vec!["wav"]);
    }

    #[test]
    fn play_missing_track_reports() {
        let mut f = fixture(400, true, false);
        let err = f.player.play(&mut f.codecs, &mut f.raw, 7, false).unwrap_err();
        assert!(matches!(err, AudioError::TrackNotFound(7)));
        assert_eq!(f.player.state(), MusicState::Stopped);
    }

    #[test]
    fn track_zero_is_bad() {
        let mut f = fixture(400, true, false);
        assert!(matches!(f.player.play(&mut f.codecs, &mut f.raw, 0, false), Err(AudioError::BadTrack(0))));
    }

    #[test]
    fn remap_redirects_tracks() {
        let mut f = fixture(400, true, false);
        f.player.set_remap(&[2]);
        assert_eq!(f.player.remapped(), vec![(1, 2)]);
        f.player.play(&mut f.codecs, &mut f.raw, 1, false).unwrap();
        assert_eq!(f.player.track(), Some(2));
        f.player.reset(&mut f.raw);
        assert!(f.player.remapped().is_empty());
        assert_eq!(f.player.state(), MusicState::Stopped);
    }

    #[test]
    fn non_looping_eof_stops_quietly() {
        let mut f = fixture(400, true, false);
        f.player.play(&mut f.codecs, &mut f.raw, 2, false).unwrap();
        f.player.update(0, 44100, &mut f.raw, 1.0).unwrap();
        assert_eq!(f.player.state(), MusicState::Stopped);
        // stopping drops the queued tail
        assert_eq!(f.raw.end(), 0);
        assert_eq!(f.rewinds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn looping_eof_rewinds_and_keeps_filling() {
        let mut f = fixture(4000, true, false);
        f.player.play(&mut f.codecs, &mut f.raw, 2, true).unwrap();
        f.player.update(0, 44100, &mut f.raw, 1.0).unwrap();
        assert_eq!(f.player.state(), MusicState::Playing);
        assert!(f.rewinds.load(Ordering::SeqCst) >= 1);
        assert_eq!(f.raw.end(), 8192);
    }

    #[test]
    fn eof_right_after_rewind_is_a_fault() {
        let mut f = fixture(400, false, false);
        f.player.play(&mut f.codecs, &mut f.raw, 2, true).unwrap();
        let err = f.player.update(0, 44100, &mut f.raw, 1.0).unwrap_err();
        assert!(matches!(err, AudioError::RepeatedEof));
        assert_eq!(f.rewinds.load(Ordering::SeqCst), 1);
        assert_eq!(f.player.state(), MusicState::Stopped);
    }

    #[test]
    fn read_error_stops() {
        let mut f = fixture(400, true, true);
        f.player.play(&mut f.codecs, &mut f.raw, 2, true).unwrap();
        assert!(matches!(f.player.update(0, 44100, &mut f.raw, 1.0), Err(AudioError::Read(_))));
        assert_eq!(f.player.state(), MusicState::Stopped);
    }

    #[test]
    fn zero_volume_pauses_and_restores() {
        let mut f = fixture(4000, true, false);
        f.player.play(&mut f.codecs, &mut f.raw, 2, true).unwrap();
        f.player.update(0, 44100, &mut f.raw, 0.0).unwrap();
        assert_eq!(f.player.state(), MusicState::Paused);
        f.player.update(0, 44100, &mut f.raw, 0.5).unwrap();
        assert_eq!(f.player.state(), MusicState::Playing);
    }

    #[test]
    fn pause_resume_need_matching_state() {
        let mut f = fixture(4000, true, false);
        f.player.resume();
        assert_eq!(f.player.state(), MusicState::Stopped);
        f.player.play(&mut f.codecs, &mut f.raw, 2, false).unwrap();
        f.player.resume();
        assert_eq!(f.player.state(), MusicState::Playing);
        f.player.pause();
        f.player.pause();
        assert_eq!(f.player.state(), MusicState::Paused);
        assert!(f.player.info().starts_with("Paused playing track 2"));
        f.player.resume();
        assert_eq!(f.player.state(), MusicState::Playing);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut f = fixture(4000, true, false);
        f.player.play(&mut f.codecs, &mut f.raw, 2, false).unwrap();
        f.player.update(0, 44100, &mut f.raw, 1.0).unwrap();
        f.player.stop(&mut f.raw);
        assert_eq!(f.raw.end(), 0);
        f.player.stop(&mut f.raw);
        assert_eq!(f.player.state(), MusicState::Stopped);
        assert_eq!(f.player.track(), None);
    }

    #[test]
    fn playing_same_track_is_noop() {
        // more than one tick of ring space can hold
        let mut f = fixture(200_000, true, false);
        f.player.play(&mut f.codecs, &mut f.raw, 2, false).unwrap();
        f.player.update(0, 44100, &mut f.raw, 1.0).unwrap();
        assert_eq!(f.player.state(), MusicState::Playing);
        let end = f.raw.end();
        f.player.play(&mut f.codecs, &mut f.raw, 2, true).unwrap();
        assert_eq!(f.raw.end(), end);
        assert!(!f.player.is_looping());
        assert_eq!(f.player.state(), MusicState::Playing);
    }

    #[test]
    fn disabled_player_does_nothing() {
        let mut f = fixture(4000, true, false);
        f.player.play(&mut f.codecs, &mut f.raw, 2, false).unwrap();
        f.player.disable(&mut f.raw);
        f.player.update(0, 44100, &mut f.raw, 1.0).unwrap();
        assert_eq!(f.raw.end(), 0);
        assert!(!f.player.is_enabled());
    }
}
