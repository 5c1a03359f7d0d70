//! Headered raw PCM streams (`.raw` / `.pcm`).
//!
//! Layout: `[u16 channels][u16 width][u32 rate]` little-endian, followed by
//! interleaved little-endian samples until end of file.

use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::codec::{Codec, CodecType, StreamDecoder, StreamInfo, StreamSource};
use crate::util::AssetError;

pub const RAW_HEADER_LEN: u64 = 8;

#[derive(Debug, Default)]
pub struct RawPcmCodec;

impl RawPcmCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for RawPcmCodec {
    fn codec_type(&self) -> CodecType {
        CodecType::RAW
    }

    fn name(&self) -> &str {
        "raw pcm"
    }

    fn open(&mut self, source: StreamSource) -> Result<Box<dyn StreamDecoder>, AssetError> {
        let path = source.path.display().to_string();
        let mut reader = BufReader::new(source.file);
        let mut header = [0u8; RAW_HEADER_LEN as usize];
        reader
            .read_exact(&mut header)
            .map_err(|_| AssetError::OpenRejected { path: path.clone(), reason: "missing header".into() })?;

        let channels = u16::from_le_bytes([header[0], header[1]]);
        let width = u16::from_le_bytes([header[2], header[3]]);
        let rate = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if !(1..=2).contains(&channels) || !(1..=2).contains(&width) || rate == 0 {
            return Err(AssetError::OpenRejected {
                path,
                reason: format!("unsupported layout: {} ch, {} bytes, {} Hz", channels, width, rate),
            });
        }

        Ok(Box::new(RawPcmDecoder {
            reader,
            info: StreamInfo { rate, width: width as u8, channels: channels as u8 },
        }))
    }
}

struct RawPcmDecoder {
    reader: BufReader<std::fs::File>,
    info: StreamInfo,
}

impl StreamDecoder for RawPcmDecoder {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AssetError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn rewind(&mut self) -> Result<(), AssetError> {
        self.reader
            .seek(SeekFrom::Start(RAW_HEADER_LEN))
            .map(|_| ())
            .map_err(|e| AssetError::Seek(e.to_string()))
    }
}

/// Header bytes for a raw PCM stream.
pub fn raw_pcm_header(channels: u16, width: u16, rate: u32) -> [u8; RAW_HEADER_LEN as usize] {
    let mut h = [0u8; RAW_HEADER_LEN as usize];
    h[0..2].copy_from_slice(&channels.to_le_bytes());
    h[2..4].copy_from_slice(&width.to_le_bytes());
    h[4..8].copy_from_slice(&rate.to_le_bytes());
    h
}

/// A complete raw PCM file: header followed by `data`.
pub fn write_raw_pcm(channels: u16, width: u16, rate: u32, data: &[u8]) -> Vec<u8> {
    let mut v = raw_pcm_header(channels, width, rate).to_vec();
    v.extend_from_slice(data);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn open(path: &Path) -> Result<Box<dyn StreamDecoder>, AssetError> {
        RawPcmCodec::new().open(StreamSource::open(path)?)
    }

    #[test]
    fn reads_until_eof_then_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track02.raw");
        std::fs::write(&path, write_raw_pcm(1, 2, 22050, &[1, 0, 2, 0, 3, 0])).unwrap();

        let mut dec = open(&path).unwrap();
        assert_eq!(dec.info(), StreamInfo { rate: 22050, width: 2, channels: 1 });
        let mut buf = [0u8; 4];
        assert_eq!(dec.read(&mut buf).unwrap(), 4);
        assert_eq!(dec.read(&mut buf).unwrap(), 2);
        assert_eq!(dec.read(&mut buf).unwrap(), 0);
        dec.rewind().unwrap();
        assert_eq!(dec.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 0, 2, 0]);
    }

    #[test]
    fn bad_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.raw");
        std::fs::write(&path, write_raw_pcm(6, 2, 44100, &[])).unwrap();
        assert!(matches!(open(&path), Err(AssetError::OpenRejected { .. })));

        std::fs::write(&path, [0u8; 3]).unwrap();
        assert!(matches!(open(&path), Err(AssetError::OpenRejected { .. })));
    }
}
