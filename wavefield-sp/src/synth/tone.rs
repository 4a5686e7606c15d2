//! Reference synthesis source: one sine tone per voice
//!
//! Stands in for a real synthesis engine in the demo binary and in tests.
//! Voice `v` gets harmonic `v + 1` of a 110 Hz fundamental, so a spatial
//! spread of voices is audible as a chord spread across the field.

use super::SynthesisSource;
use crate::error::{Error, Result};
use std::f32::consts::TAU;

const FUNDAMENTAL_HZ: f32 = 110.0;

/// Tone amplitude, kept well under full scale so several voices sum
/// without clipping at the output stage.
const AMPLITUDE: f32 = 0.25 * i16::MAX as f32;

/// Per-voice sine generator implementing [`SynthesisSource`].
pub struct ToneGenerator {
    tick_frames: usize,
    sample_rate: u32,
    channels: usize,
    /// Phase increment per frame, per channel
    phase_steps: Vec<f32>,
    /// Current phase per channel, in radians
    phases: Vec<f32>,
    dsp_enabled: bool,
}

impl ToneGenerator {
    pub fn new(tick_frames: usize) -> Self {
        ToneGenerator {
            tick_frames,
            sample_rate: 0,
            channels: 0,
            phase_steps: Vec::new(),
            phases: Vec::new(),
            dsp_enabled: false,
        }
    }
}

impl SynthesisSource for ToneGenerator {
    fn initialize(&mut self, _input_channels: usize, output_channels: usize, sample_rate: u32)
        -> Result<()>
    {
        if output_channels == 0 || sample_rate == 0 {
            return Err(Error::Synthesis("tone generator needs channels and a sample rate".into()));
        }
        self.sample_rate = sample_rate;
        self.channels = output_channels;
        self.phase_steps = (0..output_channels)
            .map(|v| TAU * FUNDAMENTAL_HZ * (v + 1) as f32 / sample_rate as f32)
            .collect();
        self.phases = vec![0.0; output_channels];
        Ok(())
    }

    fn enable_dsp(&mut self, enabled: bool) -> Result<()> {
        self.dsp_enabled = enabled;
        Ok(())
    }

    fn tick_frames(&self) -> usize {
        self.tick_frames
    }

    fn render_ticks(&mut self, ticks: usize, _input_offset: usize, out: &mut [i16]) -> Result<()> {
        let frames = ticks * self.tick_frames;
        let expected = frames * self.channels;
        if out.len() != expected {
            return Err(Error::Synthesis(format!(
                "output slice holds {} samples, render needs {}",
                out.len(),
                expected
            )));
        }

        if !self.dsp_enabled {
            out.fill(0);
            return Ok(());
        }

        for n in 0..frames {
            for v in 0..self.channels {
                out[v + n * self.channels] = (self.phases[v].sin() * AMPLITUDE) as i16;
                self.phases[v] += self.phase_steps[v];
                if self.phases[v] >= TAU {
                    self.phases[v] -= TAU;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tone(channels: usize) -> ToneGenerator {
        let mut tone = ToneGenerator::new(64);
        tone.initialize(0, channels, 44100).unwrap();
        tone.enable_dsp(true).unwrap();
        tone
    }

    #[test]
    fn test_silent_until_dsp_enabled() {
        let mut tone = ToneGenerator::new(64);
        tone.initialize(0, 2, 44100).unwrap();

        let mut out = vec![1i16; 64 * 2];
        tone.render_ticks(1, 0, &mut out).unwrap();
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_render_produces_signal_on_every_channel() {
        let mut tone = make_tone(3);
        let mut out = vec![0i16; 2 * 64 * 3];
        tone.render_ticks(2, 0, &mut out).unwrap();

        for v in 0..3 {
            let energy: i64 = out
                .iter()
                .skip(v)
                .step_by(3)
                .map(|&s| (s as i64).abs())
                .sum();
            assert!(energy > 0, "channel {} is silent", v);
        }
    }

    #[test]
    fn test_render_rejects_wrong_slice_length() {
        let mut tone = make_tone(2);
        let mut out = vec![0i16; 17];
        assert!(tone.render_ticks(1, 0, &mut out).is_err());
    }

    #[test]
    fn test_phase_continuity_across_calls() {
        // Two back-to-back renders must not restart the waveform: the first
        // sample of the second call continues where the first left off.
        let mut split = make_tone(1);
        let mut a = vec![0i16; 64];
        let mut b = vec![0i16; 64];
        split.render_ticks(1, 0, &mut a).unwrap();
        split.render_ticks(1, 0, &mut b).unwrap();

        let mut joined = make_tone(1);
        let mut whole = vec![0i16; 128];
        joined.render_ticks(2, 0, &mut whole).unwrap();

        assert_eq!(&whole[..64], &a[..]);
        assert_eq!(&whole[64..], &b[..]);
    }
}
