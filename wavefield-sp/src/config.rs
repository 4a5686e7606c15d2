//! wavefield-sp configuration
//!
//! Session parameters loaded from an optional TOML file, with defaults
//! matching the reference deployment (44.1 kHz mono voices, 512-frame
//! blocks, 64-frame engine ticks). The binary layers clap/env overrides on
//! top of the file.

use crate::device::RenderingQuality;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

fn default_num_voices() -> usize {
    4
}

fn default_block_size() -> usize {
    512
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_engine_tick_frames() -> usize {
    64
}

fn default_rendering_quality() -> RenderingQuality {
    RenderingQuality::High
}

/// Spatial player configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Number of playback voices (spatial channels)
    #[serde(default = "default_num_voices")]
    pub num_voices: usize,

    /// Frames per voice per hardware buffer
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Session sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Native tick size of the synthesis engine, in frames.
    ///
    /// `block_size` must be an integer multiple of this. Used to size the
    /// built-in tone source; an injected synthesis source reports its own
    /// tick size, which must agree with the block size the same way.
    #[serde(default = "default_engine_tick_frames")]
    pub engine_tick_frames: usize,

    /// Output device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,

    /// Spatial rendering quality hint passed to the backend
    #[serde(default = "default_rendering_quality")]
    pub rendering_quality: RenderingQuality,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_voices: default_num_voices(),
            block_size: default_block_size(),
            sample_rate: default_sample_rate(),
            engine_tick_frames: default_engine_tick_frames(),
            device: None,
            rendering_quality: default_rendering_quality(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields fall back to defaults; the result is validated before
    /// being returned.
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate parameter ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.num_voices == 0 {
            return Err(Error::Config("num_voices must be at least 1".into()));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".into()));
        }
        // Rejects zero and non-multiple block sizes
        wavefield_common::timing::ticks_per_block(self.block_size, self.engine_tick_frames)?;
        Ok(())
    }
}
