//! Spatial player (wavefield-sp) - Main entry point
//!
//! Demo deployment of the streaming scheduler: opens the default (or named)
//! output device through the cpal backend and plays one sine voice per
//! spatial channel from the built-in tone source. Embedders replace the
//! tone source with their own [`wavefield_sp::synth::SynthesisSource`].

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wavefield_sp::config::Config;
use wavefield_sp::device::cpal::{CpalDevice, CpalReverb};
use wavefield_sp::playback::start_audio;
use wavefield_sp::synth::ToneGenerator;

/// Command-line arguments for wavefield-sp
#[derive(Parser, Debug)]
#[command(name = "wavefield-sp")]
#[command(about = "Spatial streaming player for Wavefield")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "WAVEFIELD_SP_CONFIG")]
    config: Option<PathBuf>,

    /// Number of spatial voices
    #[arg(short = 'n', long, env = "WAVEFIELD_SP_VOICES")]
    voices: Option<usize>,

    /// Frames per voice per hardware buffer
    #[arg(short, long, env = "WAVEFIELD_SP_BLOCK_SIZE")]
    block_size: Option<usize>,

    /// Output device name (default: system default device)
    #[arg(short, long, env = "WAVEFIELD_SP_DEVICE")]
    device: Option<String>,

    /// Seconds to play before exiting (0 = run until killed)
    #[arg(long, default_value = "0")]
    duration: u64,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wavefield_sp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(voices) = args.voices {
        config.num_voices = voices;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if args.device.is_some() {
        config.device = args.device.clone();
    }

    info!(
        "Starting Wavefield spatial player: {} voices, {}-frame blocks @ {} Hz",
        config.num_voices, config.block_size, config.sample_rate
    );

    let device = Arc::new(
        CpalDevice::open(config.device.clone(), config.sample_rate)
            .context("failed to open audio output device")?,
    );

    let source = Box::new(ToneGenerator::new(config.engine_tick_frames));

    let session = start_audio(device, source, &CpalReverb, &config)
        .context("failed to start audio session")?;
    info!("Session running with {} voices", session.voices().len());

    if args.duration > 0 {
        thread::sleep(Duration::from_secs(args.duration));
        session.stop();
        info!("Playback finished");
    } else {
        // The scheduler owns playback from here; park until killed
        loop {
            thread::park();
        }
    }

    Ok(())
}
