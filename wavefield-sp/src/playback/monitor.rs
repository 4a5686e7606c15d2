//! Underrun detection and recovery
//!
//! Runs immediately after each refill pass. A voice reporting `Stopped`
//! starved at some point since the last check (refill fell behind and the
//! pending queue drained); the only recovery is to reissue play with
//! whatever buffers are queued now. Retries are unbounded; the monitor
//! will keep restarting a voice every cycle until it sticks.

use crate::device::{PlaybackDevice, PlayState, VoiceId};
use tracing::warn;

/// Per-session underrun recovery state.
#[derive(Debug, Default)]
pub struct UnderrunMonitor {
    restarts: u64,
}

impl UnderrunMonitor {
    pub fn new() -> Self {
        UnderrunMonitor::default()
    }

    /// Restart every stalled voice. Returns how many restarts were issued
    /// this pass.
    pub fn recover_stalled(&mut self, device: &dyn PlaybackDevice, voices: &[VoiceId]) -> usize {
        let mut restarted = 0;
        for &voice in voices {
            match device.play_state(voice) {
                Ok(PlayState::Playing) => {}
                Ok(PlayState::Stopped) => {
                    warn!("{} stalled on buffer starvation, restarting playback", voice);
                    match device.play(voice) {
                        Ok(()) => {
                            restarted += 1;
                            self.restarts += 1;
                        }
                        Err(e) => warn!("Failed to restart {}: {}", voice, e),
                    }
                }
                Err(e) => warn!("Could not query play state of {}: {}", voice, e),
            }
        }
        restarted
    }

    /// Total restarts issued over the session lifetime.
    pub fn total_restarts(&self) -> u64 {
        self.restarts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;

    #[test]
    fn test_healthy_voices_are_left_alone() {
        let device = MockDevice::new();
        let voices = vec![
            device.create_voice(3, 64).unwrap(),
            device.create_voice(3, 64).unwrap(),
        ];

        let mut monitor = UnderrunMonitor::new();
        assert_eq!(monitor.recover_stalled(&device, &voices), 0);
        assert_eq!(device.play_commands(voices[0]), 0);
        assert_eq!(monitor.total_restarts(), 0);
    }

    #[test]
    fn test_stalled_voice_gets_exactly_one_play() {
        let device = MockDevice::new();
        let healthy = device.create_voice(3, 64).unwrap();
        let stalled = device.create_voice(3, 64).unwrap();
        device.force_stop(stalled).unwrap();

        let mut monitor = UnderrunMonitor::new();
        assert_eq!(monitor.recover_stalled(&device, &[healthy, stalled]), 1);

        assert_eq!(device.play_commands(stalled), 1);
        assert_eq!(device.play_commands(healthy), 0);
        assert_eq!(device.play_state(stalled).unwrap(), PlayState::Playing);
    }

    #[test]
    fn test_recovery_retries_every_pass_until_it_sticks() {
        let device = MockDevice::new();
        let voice = device.create_voice(3, 64).unwrap();

        let mut monitor = UnderrunMonitor::new();
        for _ in 0..3 {
            device.force_stop(voice).unwrap();
            monitor.recover_stalled(&device, &[voice]);
        }
        assert_eq!(device.play_commands(voice), 3);
        assert_eq!(monitor.total_restarts(), 3);
    }
}
