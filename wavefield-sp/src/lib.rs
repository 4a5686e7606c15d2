//! # Wavefield Spatial Player (wavefield-sp)
//!
//! Real-time multi-channel spatial playback driven by an external synthesis
//! engine.
//!
//! **Purpose:** Pull interleaved PCM blocks from a synthesis source,
//! demultiplex them into per-voice streaming buffer queues on a spatial
//! playback device, and keep all voices fed and aligned from one scheduler
//! loop, gating synthesis on simultaneous buffer availability and
//! recovering stalled voices without stopping the session.
//!
//! **Architecture:** Injected capability traits for the synthesis engine
//! ([`synth::SynthesisSource`]), the playback device
//! ([`device::PlaybackDevice`]: cpal backend or hardware-free mock), and
//! the one-shot reverb setup ([`device::ReverbSetup`]); one dedicated
//! scheduler thread per session.

pub mod config;
pub mod device;
pub mod error;
pub mod playback;
pub mod synth;

pub use config::Config;
pub use error::{Error, Result};
pub use playback::{start_audio, AudioSession};
