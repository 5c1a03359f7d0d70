use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use asset_manager::DirectoryLoader;
use audio_backend::mock_backend::{MockAudioDevice, MockDeviceHandle};
use audio_backend::DeviceFormat;
use audio_system::console::status_line;
use audio_system::{AudioConfig, AudioEngine, Listener, SoftwareMixer};
use clap::Parser;

/// Drive the mixer on a headless device with console commands.
///
/// Commands come from `-c` arguments, or one per line on stdin.
#[derive(Parser)]
struct Args {
    /// RON config file
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    sound_dir: Option<String>,
    #[arg(long)]
    music_dir: Option<String>,
    /// Device rate in Hz
    #[arg(long, default_value_t = 44100)]
    rate: u32,
    /// Device ring size in frames
    #[arg(long, default_value_t = 16384)]
    buffer_frames: usize,
    /// Frames played between ticks
    #[arg(long, default_value_t = 16)]
    tick_ms: u32,
    /// Ticks run after each command
    #[arg(long, default_value_t = 4)]
    ticks: u32,
    /// Paint into the ring instead of only advancing the clock
    #[arg(long)]
    mix: bool,
    #[arg(short, long = "command")]
    commands: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AudioConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AudioConfig::default(),
    };
    if let Some(dir) = &args.sound_dir {
        config.sound_dir = dir.clone();
    }
    if let Some(dir) = &args.music_dir {
        config.music_dir = dir.clone();
    }

    let device = MockAudioDevice::new(DeviceFormat::stereo16(args.rate, args.buffer_frames));
    let handle = device.handle();
    let loader = DirectoryLoader::new(&config.sound_dir);
    let mut engine = AudioEngine::new(config, Arc::new(device), Box::new(loader));
    if args.mix {
        engine.set_mixer(Box::new(SoftwareMixer::new()));
    }

    if args.commands.is_empty() {
        for line in io::stdin().lock().lines() {
            run_line(&mut engine, &handle, &args, &line.context("reading stdin")?);
        }
    } else {
        for line in &args.commands {
            run_line(&mut engine, &handle, &args, line);
        }
    }

    println!("{}", status_line(&engine));
    engine.shutdown();
    Ok(())
}

fn run_line(engine: &mut AudioEngine, handle: &MockDeviceHandle, args: &Args, line: &str) {
    let out = engine.execute(line);
    if !out.is_empty() {
        println!("{}", out);
    }
    let frames = (args.rate as u64 * args.tick_ms as u64 / 1000) as usize;
    let dt = args.tick_ms as f32 / 1000.0;
    for _ in 0..args.ticks {
        handle.advance_frames(frames);
        engine.update(Listener::default(), dt, None);
    }
}
