//! Streaming playback: voice pool, scheduler loop, underrun recovery
//!
//! [`start_audio`] wires the pieces together: it builds the voice pool on
//! the injected device, initializes the synthesis source against the live
//! voice count, and hands both to a [`SchedulerContext`] running on its own
//! worker thread for the rest of the session.

pub mod monitor;
pub mod pool;
pub mod scheduler;

pub use monitor::UnderrunMonitor;
pub use pool::{create_voice_pool, spread_position};
pub use scheduler::{CycleOutcome, SchedulerContext};

use crate::config::Config;
use crate::device::{PlaybackDevice, ReverbSetup, VoiceId};
use crate::error::{Error, Result};
use crate::synth::SynthesisSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};
use wavefield_common::{Orientation, Vec3};

/// Buffers in flight per voice. Triple buffering gives one block of
/// lookahead beyond the block being played, so a late refill does not
/// immediately go audible.
pub const QUEUE_DEPTH: usize = 3;

/// A running playback session: the voice pool plus the scheduler thread
/// feeding it.
///
/// Position and listener setters may be called from any thread while the
/// scheduler runs; they follow the device's last-write-wins contract.
/// Dropping the session does NOT stop playback: the scheduler keeps
/// running for the process lifetime unless [`stop`](Self::stop) is called.
pub struct AudioSession {
    device: Arc<dyn PlaybackDevice>,
    voices: Vec<VoiceId>,
    stop: Arc<AtomicBool>,
    scheduler: Option<JoinHandle<()>>,
}

/// Start the spatial playback session.
///
/// Creates the voice pool (best-effort per voice), runs the one-shot reverb
/// setup, initializes the synthesis source for the live voice count, and
/// spawns the scheduler thread. Returns the session handle with the live
/// voice list.
pub fn start_audio(
    device: Arc<dyn PlaybackDevice>,
    mut source: Box<dyn SynthesisSource + Send>,
    reverb: &dyn ReverbSetup,
    config: &Config,
) -> Result<AudioSession> {
    config.validate()?;

    if let Err(e) = device.set_rendering_quality(config.rendering_quality) {
        warn!("Could not set rendering quality: {}", e);
    }

    let voices = pool::create_voice_pool(device.as_ref(), config.num_voices, config.block_size, reverb)?;

    // The source renders one interleaved channel per live voice
    source.initialize(0, voices.len(), config.sample_rate)?;
    source.enable_dsp(true)?;

    let context = SchedulerContext::new(
        Arc::clone(&device),
        source,
        voices.clone(),
        config.block_size,
        config.sample_rate,
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = Arc::clone(&stop);
    let scheduler = thread::Builder::new()
        .name("wavefield-scheduler".into())
        .spawn(move || context.run_loop(loop_stop))
        .map_err(|e| Error::Internal(format!("failed to spawn scheduler thread: {}", e)))?;

    info!("Audio session started with {} voices", voices.len());
    Ok(AudioSession { device, voices, stop, scheduler: Some(scheduler) })
}

impl AudioSession {
    /// Live voice handles, in channel order.
    pub fn voices(&self) -> &[VoiceId] {
        &self.voices
    }

    /// Move a voice in the sound field (last write wins).
    pub fn set_voice_position(&self, voice: VoiceId, position: Vec3) -> Result<()> {
        self.device.set_voice_position(voice, position)
    }

    /// Move the listener (last write wins).
    pub fn set_listener_position(&self, position: Vec3) -> Result<()> {
        self.device.set_listener_position(position)
    }

    /// Re-orient the listener (last write wins).
    pub fn set_listener_orientation(&self, orientation: Orientation) -> Result<()> {
        self.device.set_listener_orientation(orientation)
    }

    /// Flag an integrator can set to end the scheduler loop during orderly
    /// teardown.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Request the scheduler to stop and wait for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.scheduler.take() {
            if handle.join().is_err() {
                warn!("Scheduler thread panicked during shutdown");
            }
        }
    }
}
