//! Compressed music streams decoded with symphonia.
//!
//! Each decoder hands out 16-bit little-endian PCM, keeping at most the
//! first two channels of the source.

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::codec::{Codec, CodecRegistry, CodecType, StreamDecoder, StreamInfo, StreamSource};
use crate::util::AssetError;

/// One container type served by symphonia.
#[derive(Debug, Clone)]
pub struct SymphoniaCodec {
    ty: CodecType,
    name: String,
    extension: &'static str,
}

impl SymphoniaCodec {
    pub fn new(ty: CodecType, extension: &'static str) -> Self {
        Self { ty, name: format!("symphonia {}", extension), extension }
    }

    /// Register every container type this build can decode.
    pub fn register_all(registry: &mut CodecRegistry) {
        for (ty, ext) in [
            (CodecType::WAV, "wav"),
            (CodecType::FLAC, "flac"),
            (CodecType::MP3, "mp3"),
            (CodecType::VORBIS, "ogg"),
        ] {
            registry.register(Box::new(SymphoniaCodec::new(ty, ext)));
        }
    }
}

impl Codec for SymphoniaCodec {
    fn codec_type(&self) -> CodecType {
        self.ty
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, source: StreamSource) -> Result<Box<dyn StreamDecoder>, AssetError> {
        let path = source.path.display().to_string();
        let reject = |reason: String| AssetError::OpenRejected { path: path.clone(), reason };

        let mut hint = Hint::new();
        hint.with_extension(self.extension);
        let mss = MediaSourceStream::new(Box::new(source.file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| reject(format!("probe error: {}", e)))?;

        let format = probed.format;
        let track = format.default_track().ok_or_else(|| reject("no default track".into()))?;
        let track_id = track.id;
        let rate = track.codec_params.sample_rate.ok_or_else(|| reject("unknown sample rate".into()))?;
        let src_channels = track.codec_params.channels.map_or(0, |c| c.count());
        if src_channels == 0 {
            return Err(reject("no audio channels".into()));
        }
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| reject(format!("codec make error: {}", e)))?;

        let keep = src_channels.min(2);
        debug!(path = %path, rate, channels = src_channels, "symphonia stream opened");
        Ok(Box::new(SymphoniaDecoder {
            format,
            decoder,
            track_id,
            src_channels,
            info: StreamInfo { rate, width: 2, channels: keep as u8 },
            pending: Vec::new(),
            pending_pos: 0,
        }))
    }
}

struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    src_channels: usize,
    info: StreamInfo,
    pending: Vec<u8>,
    pending_pos: usize,
}

impl SymphoniaDecoder {
    /// Decode the next packet into `pending`. `false` at end of stream.
    fn refill(&mut self) -> Result<bool, AssetError> {
        self.pending.clear();
        self.pending_pos = 0;
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(AssetError::Decode(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(audio) => {
                    append_pcm(&mut self.pending, audio, self.src_channels, self.info.channels as usize);
                    if !self.pending.is_empty() {
                        return Ok(true);
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("skipping corrupt packet: {}", e);
                }
                Err(e) => return Err(AssetError::Decode(e.to_string())),
            }
        }
    }
}

fn append_pcm(out: &mut Vec<u8>, audio: AudioBufferRef<'_>, src_channels: usize, keep: usize) {
    let spec = *audio.spec();
    let mut samples = SampleBuffer::<i16>::new(audio.capacity() as u64, spec);
    samples.copy_interleaved_ref(audio);
    for frame in samples.samples().chunks_exact(src_channels) {
        for s in &frame[..keep] {
            out.extend_from_slice(&s.to_le_bytes());
        }
    }
}

impl StreamDecoder for SymphoniaDecoder {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AssetError> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.pending_pos >= self.pending.len() && !self.refill()? {
                break;
            }
            let avail = &self.pending[self.pending_pos..];
            let n = avail.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&avail[..n]);
            filled += n;
            self.pending_pos += n;
        }
        Ok(filled)
    }

    fn rewind(&mut self) -> Result<(), AssetError> {
        self.format
            .seek(SeekMode::Accurate, SeekTo::TimeStamp { ts: 0, track_id: self.track_id })
            .map_err(|e| AssetError::Seek(e.to_string()))?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF");
        v.extend_from_slice(&(36 + data_len).to_le_bytes());
        v.extend_from_slice(b"WAVEfmt ");
        v.extend_from_slice(&16u32.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&channels.to_le_bytes());
        v.extend_from_slice(&rate.to_le_bytes());
        v.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        v.extend_from_slice(&(channels * 2).to_le_bytes());
        v.extend_from_slice(&16u16.to_le_bytes());
        v.extend_from_slice(b"data");
        v.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            v.extend_from_slice(&s.to_le_bytes());
        }
        v
    }

    #[test]
    fn wav_stream_decodes_and_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track03.wav");
        let samples: Vec<i16> = (0..2000).map(|i| (i % 100) as i16).collect();
        std::fs::write(&path, wav_bytes(22050, 1, &samples)).unwrap();

        let mut codec = SymphoniaCodec::new(CodecType::WAV, "wav");
        let mut dec = codec.open(StreamSource::open(&path).unwrap()).unwrap();
        assert_eq!(dec.info(), StreamInfo { rate: 22050, width: 2, channels: 1 });

        let mut buf = vec![0u8; 8192];
        let mut total = 0;
        loop {
            let n = dec.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 4000);

        dec.rewind().unwrap();
        let n = dec.read(&mut buf[..4]).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], &[0, 0, 1, 0]);
    }
}
