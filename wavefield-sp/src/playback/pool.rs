//! Voice pool initialization
//!
//! Creates the session's voices, spreads them across the stereo field, and
//! runs the one-shot reverb setup. Creation is best-effort: a voice the
//! device cannot create is logged and left out of the pool rather than
//! failing the session. The pool is only fatal when it comes up empty.

use crate::device::{PlaybackDevice, ReverbSetup, VoiceId};
use crate::error::{Error, Result};
use tracing::{error, info, warn};
use wavefield_common::Vec3;

use super::QUEUE_DEPTH;

/// Even spread across [-1, 1) on the x axis, one unit in front of the
/// listener: `pan(i) = (i / n) * 2 - 1`.
pub fn spread_position(index: usize, count: usize) -> Vec3 {
    let pan = (index as f32 / count as f32) * 2.0 - 1.0;
    Vec3::new(pan, 0.0, -1.0)
}

/// Create `num_voices` streaming voices with silence-filled buffer queues,
/// position them, and attach the shared reverb once.
///
/// Returns the live voice handles; this list is the sole shared state
/// handed to the scheduler thread.
pub fn create_voice_pool(
    device: &dyn PlaybackDevice,
    num_voices: usize,
    block_size: usize,
    reverb: &dyn ReverbSetup,
) -> Result<Vec<VoiceId>> {
    let mut voices = Vec::with_capacity(num_voices);
    for index in 0..num_voices {
        match device.create_voice(QUEUE_DEPTH, block_size) {
            Ok(voice) => {
                info!("Created {} ({} of {})", voice, index + 1, num_voices);
                voices.push(voice);
            }
            Err(e) => {
                // Best-effort: the session runs on the surviving voices
                error!("Failed to create voice {} of {}: {}", index + 1, num_voices, e);
            }
        }
    }

    if voices.is_empty() {
        return Err(Error::Device("no playback voices could be created".into()));
    }
    if voices.len() < num_voices {
        warn!("Voice pool degraded: {} of {} voices live", voices.len(), num_voices);
    }

    // Spread the live voices out
    for (index, &voice) in voices.iter().enumerate() {
        let position = spread_position(index, voices.len());
        if let Err(e) = device.set_voice_position(voice, position) {
            warn!("Failed to position {}: {}", voice, e);
        }
    }

    if let Err(e) = reverb.attach(&voices) {
        warn!("Reverb setup failed, continuing dry: {}", e);
    }

    Ok(voices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockDevice, NoReverb};
    use std::sync::Mutex;

    #[test]
    fn test_spread_position_four_voices() {
        assert_eq!(spread_position(0, 4).x, -1.0);
        assert_eq!(spread_position(1, 4).x, -0.5);
        assert_eq!(spread_position(2, 4).x, 0.0);
        assert_eq!(spread_position(3, 4).x, 0.5);
    }

    #[test]
    fn test_spread_position_single_voice_is_hard_left() {
        // Degenerate but well-defined: (0/1)*2-1
        assert_eq!(spread_position(0, 1).x, -1.0);
    }

    #[test]
    fn test_spread_position_sits_in_front_of_listener() {
        let p = spread_position(2, 8);
        assert_eq!(p.y, 0.0);
        assert_eq!(p.z, -1.0);
    }

    #[test]
    fn test_pool_creates_positions_and_prefills() {
        let device = MockDevice::new();
        let voices = create_voice_pool(&device, 4, 256, &NoReverb).unwrap();

        assert_eq!(voices.len(), 4);
        for (i, &voice) in voices.iter().enumerate() {
            // Full queue of silence, playing
            assert_eq!(device.buffer_counts(voice).unwrap(), (QUEUE_DEPTH, 0, 0));
            assert_eq!(device.voice_position(voice).unwrap(), spread_position(i, 4));
        }
    }

    #[test]
    fn test_pool_survives_one_failed_voice() {
        let device = MockDevice::new();
        device.fail_voice_creation(1);

        let voices = create_voice_pool(&device, 4, 256, &NoReverb).unwrap();
        assert_eq!(voices.len(), 3);
        // Positions re-spread over the live count, not the requested count
        assert_eq!(device.voice_position(voices[0]).unwrap(), spread_position(0, 3));
        assert_eq!(device.voice_position(voices[2]).unwrap(), spread_position(2, 3));
    }

    #[test]
    fn test_pool_with_no_voices_is_fatal() {
        let device = MockDevice::new();
        for i in 0..3 {
            device.fail_voice_creation(i);
        }
        assert!(create_voice_pool(&device, 3, 256, &NoReverb).is_err());
    }

    struct RecordingReverb {
        calls: Mutex<Vec<Vec<VoiceId>>>,
    }

    impl ReverbSetup for RecordingReverb {
        fn attach(&self, voices: &[VoiceId]) -> crate::error::Result<()> {
            self.calls.lock().unwrap().push(voices.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_reverb_attached_once_with_full_pool() {
        let device = MockDevice::new();
        let reverb = RecordingReverb { calls: Mutex::new(Vec::new()) };

        let voices = create_voice_pool(&device, 3, 128, &reverb).unwrap();

        let calls = reverb.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], voices);
    }
}
