//! Text commands for the sound and music subsystems.
//!
//! Every command returns the text it would print. Bad arguments are reported
//! in that text and never abort the command line.

use std::fmt::Write as _;

use asset_manager::util::SFX_EXTENSION;
use glam::Vec3;

use crate::channel::{EntityId, LogicalChannel};
use crate::engine::AudioEngine;
use crate::music::MusicState;

pub fn execute(engine: &mut AudioEngine, line: &str) -> String {
    let mut args = line.split_whitespace();
    let Some(cmd) = args.next() else {
        return String::new();
    };
    let args: Vec<&str> = args.collect();
    match cmd.to_ascii_lowercase().as_str() {
        "cd" | "music" => cd_command(engine, &args),
        "play" => play_command(engine, &args),
        "playvol" => playvol_command(engine, &args),
        "stopsound" => {
            engine.stop_all_sounds(true);
            String::new()
        }
        "soundlist" => engine.sound_list(),
        "soundinfo" => engine.sound_info(),
        other => format!("unknown command \"{}\"", other),
    }
}

/// Sound names without an extension get the loader's default one.
fn sound_name(arg: &str) -> String {
    if arg.contains('.') {
        arg.to_string()
    } else {
        format!("{}.{}", arg, SFX_EXTENSION)
    }
}

fn parse_track(arg: Option<&&str>) -> Result<u8, String> {
    match arg {
        None => Err("track number required".to_string()),
        Some(s) => s.parse::<u8>().map_err(|_| format!("invalid track number \"{}\"", s)),
    }
}

fn play_command(engine: &mut AudioEngine, args: &[&str]) -> String {
    let mut out = String::new();
    for arg in args {
        let name = sound_name(arg);
        let Some(sound) = engine.precache_sound(&name) else {
            let _ = writeln!(out, "can't play {}", name);
            continue;
        };
        let origin = engine.listener().origin;
        let emitter = EntityId(engine.play_hash);
        engine.play_hash += 1;
        engine.start_sound(emitter, LogicalChannel::AUTO, sound, origin, 1.0, 1.0);
    }
    out.trim_end().to_string()
}

fn playvol_command(engine: &mut AudioEngine, args: &[&str]) -> String {
    let mut out = String::new();
    for pair in args.chunks(2) {
        let name = sound_name(pair[0]);
        let volume = match pair.get(1).map(|v| v.parse::<f32>()) {
            Some(Ok(v)) => v,
            Some(Err(_)) => {
                let _ = writeln!(out, "invalid volume \"{}\" for {}", pair[1], name);
                continue;
            }
            None => {
                let _ = writeln!(out, "missing volume for {}", name);
                continue;
            }
        };
        let Some(sound) = engine.precache_sound(&name) else {
            let _ = writeln!(out, "can't play {}", name);
            continue;
        };
        let origin = engine.listener().origin;
        let emitter = EntityId(engine.playvol_hash);
        engine.playvol_hash += 1;
        engine.start_sound(emitter, LogicalChannel::AUTO, sound, origin, volume, 1.0);
    }
    out.trim_end().to_string()
}

fn cd_command(engine: &mut AudioEngine, args: &[&str]) -> String {
    let Some(sub) = args.first() else {
        return "commands: on, off, reset, remap, play, loop, stop, pause, resume, info".to_string();
    };
    match sub.to_ascii_lowercase().as_str() {
        "on" => {
            engine.music_enable();
            String::new()
        }
        "off" => {
            engine.music_disable();
            String::new()
        }
        "reset" => {
            engine.music_reset();
            String::new()
        }
        "remap" => remap_command(engine, &args[1..]),
        "play" | "loop" => {
            let looping = sub.eq_ignore_ascii_case("loop");
            match parse_track(args.get(1)) {
                Ok(track) => match engine.music_play(track, looping) {
                    Ok(()) => String::new(),
                    Err(e) => e.to_string(),
                },
                Err(msg) => msg,
            }
        }
        "stop" => {
            engine.music_stop();
            String::new()
        }
        "pause" => {
            engine.music_pause();
            String::new()
        }
        "resume" => {
            engine.music_resume();
            String::new()
        }
        "info" => engine.music_info(),
        other => format!("unknown cd command \"{}\"", other),
    }
}

fn remap_command(engine: &mut AudioEngine, args: &[&str]) -> String {
    if args.is_empty() {
        let mut out = String::new();
        for (from, to) in engine.music().remapped() {
            let _ = writeln!(out, "  {} -> {}", from, to);
        }
        return out.trim_end().to_string();
    }
    let mut targets = Vec::with_capacity(args.len());
    for arg in args {
        match arg.parse::<u8>() {
            Ok(t) => targets.push(t),
            Err(_) => return format!("invalid track number \"{}\"", arg),
        }
    }
    engine.music_remap(&targets);
    String::new()
}

/// One-line summary used by front ends for a status bar.
pub fn status_line(engine: &AudioEngine) -> String {
    let music = match engine.music_state() {
        MusicState::Playing => "playing",
        MusicState::Paused => "paused",
        MusicState::Stopped => "stopped",
    };
    let pos: Vec3 = engine.listener().origin;
    format!(
        "channels {} | music {} | listener ({:.0}, {:.0}, {:.0})",
        engine.pool().audible_count(),
        music,
        pos.x,
        pos.y,
        pos.z
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use asset_manager::sfx::{write_sfx_bytes, SampleFormat};
    use asset_manager::MemoryLoader;
    use audio_backend::mock_backend::MockAudioDevice;
    use audio_backend::DeviceFormat;

    use crate::config::AudioConfig;

    fn engine() -> AudioEngine {
        let mut loader = MemoryLoader::new();
        loader.insert("misc/talk.sfx", write_sfx_bytes(&[0.1; 1000], 11025, 1, SampleFormat::S16, None));
        let device = MockAudioDevice::new(DeviceFormat::stereo16(11025, 4096));
        AudioEngine::new(AudioConfig::default(), Arc::new(device), Box::new(loader))
    }

    #[test]
    fn play_appends_sfx_extension() {
        let mut e = engine();
        let out = e.execute("play misc/talk");
        assert_eq!(out, "");
        assert!(e.sounds().find("misc/talk.sfx").is_some());
        assert_eq!(e.pool().audible_count(), 1);
        assert_eq!(e.play_hash, 346);
    }

    #[test]
    fn playvol_reports_bad_volume_and_continues() {
        let mut e = engine();
        let out = e.execute("playvol misc/talk loud misc/talk.sfx 0.5");
        assert!(out.contains("invalid volume \"loud\""));
        assert_eq!(e.pool().audible_count(), 1);
    }

    #[test]
    fn cd_play_rejects_malformed_track() {
        let mut e = engine();
        assert_eq!(e.execute("cd play abc"), "invalid track number \"abc\"");
        assert_eq!(e.execute("cd play"), "track number required");
        assert!(e.execute("cd play 0").contains("bad track number 0"));
    }

    #[test]
    fn cd_remap_lists_changes() {
        let mut e = engine();
        assert_eq!(e.execute("cd remap 3 2"), "");
        assert_eq!(e.execute("cd remap"), "  1 -> 3");
        e.execute("cd reset");
        assert_eq!(e.execute("cd remap"), "");
    }

    #[test]
    fn cd_info_without_music() {
        let mut e = engine();
        assert_eq!(e.execute("cd info"), "Volume is 1");
    }

    #[test]
    fn unknown_commands_are_reported() {
        let mut e = engine();
        assert_eq!(e.execute("frobnicate"), "unknown command \"frobnicate\"");
        assert_eq!(e.execute("cd spin"), "unknown cd command \"spin\"");
        assert_eq!(e.execute("   "), "");
    }

    #[test]
    fn status_line_counts_channels() {
        let mut e = engine();
        e.execute("play misc/talk");
        assert!(status_line(&e).starts_with("channels 1 | music stopped"));
    }
}
