use asset_manager::raw_pcm::write_raw_pcm;
use asset_manager::{AssetError, CodecRegistry, CodecType, RawPcmCodec, StreamStatus};
use tempfile::tempdir;

#[test]
fn raw_stream_opens_through_registry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("track02.raw");
    std::fs::write(&path, write_raw_pcm(2, 2, 44100, &[0u8; 64])).unwrap();

    let mut codecs = CodecRegistry::new();
    codecs.register(Box::new(RawPcmCodec::new()));
    codecs.init();
    assert_eq!(codecs.is_available(CodecType::RAW), Some(true));

    let mut stream = codecs.open_stream(&path, CodecType::RAW, true).unwrap();
    assert_eq!(stream.status(), StreamStatus::Playing);
    assert!(stream.looping);
    assert_eq!(stream.info().frame_bytes(), 4);

    let mut buf = [0u8; 100];
    assert_eq!(stream.read(&mut buf).unwrap(), 64);
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    stream.rewind().unwrap();
    assert_eq!(stream.read(&mut buf).unwrap(), 64);
    assert!(matches!(stream.jump_to_order(3), Err(AssetError::Unsupported(_))));
    stream.close();
}

#[test]
fn uninitialized_codec_cannot_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("track02.raw");
    std::fs::write(&path, write_raw_pcm(1, 1, 11025, &[0x80; 8])).unwrap();

    let mut codecs = CodecRegistry::new();
    codecs.register(Box::new(RawPcmCodec::new()));
    assert!(matches!(
        codecs.open_stream(&path, CodecType::RAW, false),
        Err(AssetError::CodecUnavailable(CodecType::RAW))
    ));
}

#[test]
fn missing_track_is_not_found() {
    let dir = tempdir().unwrap();
    let mut codecs = CodecRegistry::new();
    codecs.register(Box::new(RawPcmCodec::new()));
    codecs.init();
    let err = codecs.open_stream(&dir.path().join("track09.raw"), CodecType::RAW, false).unwrap_err();
    assert!(matches!(err, AssetError::NotFound(_)));
}
