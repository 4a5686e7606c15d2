//! Playback device interface
//!
//! The scheduler drives voices through this capability trait instead of a
//! concrete audio API, so the whole playback pipeline runs unmodified
//! against real hardware ([`CpalDevice`]) or a deterministic in-memory
//! backend ([`mock::MockDevice`]) in tests.
//!
//! The model is a queue-based streaming voice: each voice owns a fixed set
//! of hardware buffers cycling between a *pending* queue (waiting to be
//! played) and a *processed* set (played, waiting to be refilled). The
//! scheduler polls the processed count, unqueues the oldest processed
//! buffer, overwrites it, and queues it again.
//!
//! # Thread safety
//!
//! Implementations must be `Send + Sync`. State mutation calls
//! (`set_voice_position`, listener setters, `play`) may be issued from any
//! thread at any time with last-write-wins semantics and no atomicity
//! between a query and a set. Queue operations (`processed_buffers`,
//! `unqueue_buffer`, `write_buffer`, `queue_buffer`) are NOT synchronized
//! against each other by the device; only the scheduler thread may issue
//! them.

pub mod cpal;
pub mod mock;

pub use self::cpal::CpalDevice;
pub use self::mock::MockDevice;

use crate::error::Result;
use serde::Deserialize;
use wavefield_common::{Orientation, Vec3};

/// Opaque handle to one playback voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Opaque handle to one hardware buffer, valid between `unqueue_buffer`
/// and the matching `queue_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Voice playback state as reported by the device.
///
/// `Stopped` during a running session means the voice starved (its pending
/// queue drained before a refill landed) and is a recoverable fault, not a
/// terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Stopped,
}

/// Spatial rendering quality hint.
///
/// Backends that can trade rendering cost for fidelity honor this; others
/// ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingQuality {
    Low,
    High,
}

/// A spatial playback device hosting queue-based streaming voices.
pub trait PlaybackDevice: Send + Sync {
    /// Create one voice with `queue_depth` buffers of `block_size` frames,
    /// each pre-filled with silence and queued, and start playback on it.
    fn create_voice(&self, queue_depth: usize, block_size: usize) -> Result<VoiceId>;

    /// Number of buffers the device has finished playing on this voice and
    /// not yet handed back through `unqueue_buffer`.
    fn processed_buffers(&self, voice: VoiceId) -> Result<usize>;

    /// Detach the oldest processed buffer from the voice's queue.
    fn unqueue_buffer(&self, voice: VoiceId) -> Result<BufferId>;

    /// Overwrite a detached buffer with new PCM data (16-bit mono frames at
    /// the session sample rate). `samples.len()` must equal the voice's
    /// `block_size`.
    fn write_buffer(&self, voice: VoiceId, buffer: BufferId, samples: &[i16]) -> Result<()>;

    /// Re-attach a detached buffer at the tail of the voice's pending queue.
    fn queue_buffer(&self, voice: VoiceId, buffer: BufferId) -> Result<()>;

    /// Current playback state of the voice.
    fn play_state(&self, voice: VoiceId) -> Result<PlayState>;

    /// (Re)start playback on the voice with whatever buffers are pending.
    fn play(&self, voice: VoiceId) -> Result<()>;

    /// Move a voice in the sound field. Last write wins.
    fn set_voice_position(&self, voice: VoiceId, position: Vec3) -> Result<()>;

    /// Move the listener. Last write wins.
    fn set_listener_position(&self, position: Vec3) -> Result<()>;

    /// Re-orient the listener. Last write wins.
    fn set_listener_orientation(&self, orientation: Orientation) -> Result<()>;

    /// Rendering quality hint; default implementation ignores it.
    fn set_rendering_quality(&self, _quality: RenderingQuality) -> Result<()> {
        Ok(())
    }
}

/// One-shot hook attaching a shared reverb effect to the finished voice
/// pool. The reverb DSP itself is external to this crate.
pub trait ReverbSetup {
    fn attach(&self, voices: &[VoiceId]) -> Result<()>;
}

/// Reverb hook that attaches nothing.
pub struct NoReverb;

impl ReverbSetup for NoReverb {
    fn attach(&self, _voices: &[VoiceId]) -> Result<()> {
        Ok(())
    }
}
