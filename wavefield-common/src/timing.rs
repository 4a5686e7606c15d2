//! Block/tick timing conversions for the streaming scheduler
//!
//! The scheduler deals in three units:
//!
//! 1. **Frames**: individual samples of one voice (`block_size` frames per
//!    hardware buffer).
//! 2. **Engine ticks**: the synthesis engine's native render granularity
//!    (typically 64 frames). One playback block is an integer number of
//!    engine ticks.
//! 3. **Wall-clock nanoseconds**: how long one block takes to play at the
//!    session sample rate. The scheduler sleeps half of that between polls
//!    so it always observes buffer readiness with headroom.
//!
//! All functions here are pure; they are computed once at session startup
//! and cached in the scheduler state.

use crate::error::{Error, Result};
use std::time::Duration;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Wall-clock duration of one playback block.
///
/// `block_size` frames at `sample_rate` Hz, rounded to the nearest
/// nanosecond.
pub fn block_duration(block_size: usize, sample_rate: u32) -> Duration {
    let ns = block_size as f64 / sample_rate as f64 * NANOS_PER_SEC;
    Duration::from_nanos(ns.round() as u64)
}

/// Scheduler poll interval: half of one block's playback duration.
///
/// Half a block period is fine enough to always catch a freed buffer before
/// the queue drains, and coarse enough not to saturate a core. Computed
/// directly from the frame count so the halving happens before rounding.
pub fn sleep_interval(block_size: usize, sample_rate: u32) -> Duration {
    let ns = block_size as f64 / sample_rate as f64 * NANOS_PER_SEC / 2.0;
    Duration::from_nanos(ns.round() as u64)
}

/// Number of native engine ticks needed to fill one playback block.
///
/// The block size must be a non-zero integer multiple of the engine tick
/// size; anything else would leave a partial tick per block and drift the
/// channel alignment.
pub fn ticks_per_block(block_size: usize, tick_frames: usize) -> Result<usize> {
    if tick_frames == 0 {
        return Err(Error::InvalidTiming("engine tick size must be non-zero".into()));
    }
    if block_size == 0 || block_size % tick_frames != 0 {
        return Err(Error::InvalidTiming(format!(
            "block size {} is not a non-zero multiple of the engine tick size {}",
            block_size, tick_frames
        )));
    }
    Ok(block_size / tick_frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_duration_64_at_44100() {
        // 64 / 44100 s = 1_451_247.16... ns
        assert_eq!(block_duration(64, 44100), Duration::from_nanos(1_451_247));
    }

    #[test]
    fn test_sleep_interval_is_half_a_block() {
        // 64 / 44100 / 2 s = 725_623.58... ns, rounds up
        assert_eq!(sleep_interval(64, 44100), Duration::from_nanos(725_624));
    }

    #[test]
    fn test_sleep_interval_default_block() {
        // 512 / 44100 / 2 s = 5_804_988.66... ns
        assert_eq!(sleep_interval(512, 44100), Duration::from_nanos(5_804_989));
    }

    #[test]
    fn test_ticks_per_block_exact() {
        assert_eq!(ticks_per_block(64, 64).unwrap(), 1);
        assert_eq!(ticks_per_block(512, 64).unwrap(), 8);
        assert_eq!(ticks_per_block(2048, 64).unwrap(), 32);
    }

    #[test]
    fn test_ticks_per_block_rejects_remainder() {
        assert!(ticks_per_block(100, 64).is_err());
        assert!(ticks_per_block(63, 64).is_err());
    }

    #[test]
    fn test_ticks_per_block_rejects_zero() {
        assert!(ticks_per_block(0, 64).is_err());
        assert!(ticks_per_block(512, 0).is_err());
    }
}
