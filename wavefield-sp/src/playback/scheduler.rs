//! Streaming playback scheduler
//!
//! One worker loop keeps every voice's buffer queue fed from a single
//! interleaved synthesis stream:
//!
//! ```text
//! poll -> (all voices ready?) -> synthesize -> refill each voice
//!      -> restart stalled voices -> sleep half a block -> poll
//! ```
//!
//! The gate is all-or-nothing: every voice shares one interleaved render
//! call, so refilling a subset would desynchronize channel alignment across
//! the pool. A partially-ready poll skips the entire cycle and re-checks
//! after the sleep.
//!
//! All state lives in an owned [`SchedulerContext`]; the loop holds no
//! globals and shares nothing but the device handle.

use crate::device::{PlaybackDevice, VoiceId};
use crate::error::Result;
use crate::synth::SynthesisSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, trace, warn};
use wavefield_common::timing;

use super::monitor::UnderrunMonitor;

/// What one pass of the scheduler loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// At least one voice had no free buffer; nothing was rendered
    NotReady,
    /// The synthesis call failed; refill skipped, retried next cycle
    SynthesisFailed,
    /// A block was rendered and distributed
    Refilled {
        /// Voices successfully refilled this cycle
        refilled: usize,
        /// Stalled voices restarted after the refill
        restarted: usize,
    },
}

/// Owned state of the scheduler loop: voice list, synthesis source, timing
/// constants and the two scratch buffers, allocated once at startup.
pub struct SchedulerContext {
    device: Arc<dyn PlaybackDevice>,
    source: Box<dyn SynthesisSource + Send>,
    voices: Vec<VoiceId>,
    block_size: usize,
    ticks_per_block: usize,
    sleep_interval: Duration,
    /// Interleaved synthesis output, `block_size * voices.len()` samples,
    /// laid out as `sample(n, v) = interleaved[v + n * voices.len()]`
    interleaved: Vec<i16>,
    /// One voice's demultiplexed block
    per_voice: Vec<i16>,
    monitor: UnderrunMonitor,
}

impl SchedulerContext {
    /// Build the scheduler state for an initialized source and a live voice
    /// pool. Fails if the block size is not a whole number of the source's
    /// native ticks.
    pub fn new(
        device: Arc<dyn PlaybackDevice>,
        source: Box<dyn SynthesisSource + Send>,
        voices: Vec<VoiceId>,
        block_size: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        let ticks_per_block = timing::ticks_per_block(block_size, source.tick_frames())?;
        let sleep_interval = timing::sleep_interval(block_size, sample_rate);
        let num_voices = voices.len();

        Ok(SchedulerContext {
            device,
            source,
            voices,
            block_size,
            ticks_per_block,
            sleep_interval,
            interleaved: vec![0; block_size * num_voices],
            per_voice: vec![0; block_size],
            monitor: UnderrunMonitor::new(),
        })
    }

    pub fn voices(&self) -> &[VoiceId] {
        &self.voices
    }

    pub fn ticks_per_block(&self) -> usize {
        self.ticks_per_block
    }

    pub fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    /// Restarts issued by the underrun monitor so far.
    pub fn total_restarts(&self) -> u64 {
        self.monitor.total_restarts()
    }

    /// Readiness gate: true only when every voice reports at least one
    /// processed buffer. A failed query counts as not ready; the cycle is
    /// skipped rather than risking a partial refill.
    fn all_voices_ready(&self) -> bool {
        for &voice in &self.voices {
            match self.device.processed_buffers(voice) {
                Ok(count) if count > 0 => {}
                Ok(_) => return false,
                Err(e) => {
                    warn!("Could not poll {}: {}", voice, e);
                    return false;
                }
            }
        }
        true
    }

    /// Demultiplex voice `index` out of the interleaved block, then cycle
    /// its oldest processed buffer: unqueue, overwrite, re-queue.
    fn refill_voice(&mut self, index: usize) -> Result<()> {
        let voice = self.voices[index];
        let stride = self.voices.len();
        for n in 0..self.block_size {
            self.per_voice[n] = self.interleaved[index + n * stride];
        }

        let buffer = self.device.unqueue_buffer(voice)?;
        self.device.write_buffer(voice, buffer, &self.per_voice)?;
        self.device.queue_buffer(voice, buffer)?;
        Ok(())
    }

    /// Refill every voice from the freshly rendered block. A voice whose
    /// refill fails is logged and skipped; its queue runs short until a
    /// later cycle succeeds. Returns the number of voices refilled.
    fn refill_all(&mut self) -> usize {
        let mut refilled = 0;
        for index in 0..self.voices.len() {
            match self.refill_voice(index) {
                Ok(()) => refilled += 1,
                Err(e) => warn!("Refill failed on {}: {}", self.voices[index], e),
            }
        }
        refilled
    }

    /// One pass of the scheduler loop, without the sleep. Factored out of
    /// [`run_loop`](Self::run_loop) so tests can drive cycles directly.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        if !self.all_voices_ready() {
            trace!("Gate closed, skipping cycle");
            return CycleOutcome::NotReady;
        }

        if let Err(e) = self.source.render_ticks(self.ticks_per_block, 0, &mut self.interleaved) {
            error!("Synthesis render failed: {}", e);
            return CycleOutcome::SynthesisFailed;
        }

        let refilled = self.refill_all();
        let restarted = self.monitor.recover_stalled(self.device.as_ref(), &self.voices);
        trace!("Cycle complete: {} refilled, {} restarted", refilled, restarted);
        CycleOutcome::Refilled { refilled, restarted }
    }

    /// Run the scheduler until `stop` is set. Sleeps half a block period
    /// after every cycle, ready or not; the fixed cadence is the only
    /// synchronization with the device.
    pub fn run_loop(mut self, stop: Arc<AtomicBool>) {
        info!(
            "Scheduler running: {} voices, {}-frame blocks, {} ticks/block, {:?} poll interval",
            self.voices.len(),
            self.block_size,
            self.ticks_per_block,
            self.sleep_interval
        );
        while !stop.load(Ordering::Relaxed) {
            self.run_cycle();
            thread::sleep(self.sleep_interval);
        }
        info!("Scheduler stopped ({} underrun restarts)", self.monitor.total_restarts());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockDevice, NoReverb};
    use crate::playback::pool::create_voice_pool;
    use crate::synth::CallbackSource;
    use std::sync::atomic::AtomicUsize;

    const BLOCK: usize = 64;

    /// Context over a mock device with a render that writes
    /// `value(v, n) = v * 1000 + n` and counts calls.
    fn test_context(
        num_voices: usize,
    ) -> (Arc<MockDevice>, Arc<AtomicUsize>, SchedulerContext) {
        let device = Arc::new(MockDevice::new());
        let voices = create_voice_pool(device.as_ref(), num_voices, BLOCK, &NoReverb).unwrap();

        let renders = Arc::new(AtomicUsize::new(0));
        let render_count = Arc::clone(&renders);
        let mut source = Box::new(CallbackSource::new(BLOCK, move |_ticks, out: &mut [i16]| {
            render_count.fetch_add(1, Ordering::SeqCst);
            let stride = num_voices;
            for n in 0..BLOCK {
                for v in 0..stride {
                    out[v + n * stride] = (v * 1000 + n) as i16;
                }
            }
            Ok(())
        }));
        source.initialize(0, num_voices, 44100).unwrap();
        source.enable_dsp(true).unwrap();

        let context = SchedulerContext::new(
            Arc::clone(&device) as Arc<dyn PlaybackDevice>,
            source,
            voices,
            BLOCK,
            44100,
        )
        .unwrap();
        (device, renders, context)
    }

    #[test]
    fn test_gate_closed_until_every_voice_has_consumed() {
        let (device, renders, mut context) = test_context(3);

        // Nothing consumed: repeated polls never render
        for _ in 0..5 {
            assert_eq!(context.run_cycle(), CycleOutcome::NotReady);
        }
        assert_eq!(renders.load(Ordering::SeqCst), 0);

        // Two of three ready is still not ready
        let voices = context.voices().to_vec();
        device.consume(voices[0], 1).unwrap();
        device.consume(voices[1], 1).unwrap();
        assert_eq!(context.run_cycle(), CycleOutcome::NotReady);
        assert_eq!(renders.load(Ordering::SeqCst), 0);

        // All three ready opens the gate
        device.consume(voices[2], 1).unwrap();
        assert_eq!(
            context.run_cycle(),
            CycleOutcome::Refilled { refilled: 3, restarted: 0 }
        );
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refill_preserves_queue_depth_and_demuxes() {
        let (device, _renders, mut context) = test_context(4);
        let voices = context.voices().to_vec();
        device.consume_all(1);

        context.run_cycle();

        for (v, &voice) in voices.iter().enumerate() {
            // Conservation: every buffer accounted for, none detached
            assert_eq!(device.buffer_counts(voice).unwrap(), (3, 0, 0));

            // The re-queued buffer holds this voice's demultiplexed channel
            let buffer = device.last_queued(voice).unwrap();
            let data = device.buffer_data(voice, buffer).unwrap();
            let expected: Vec<i16> = (0..BLOCK).map(|n| (v * 1000 + n) as i16).collect();
            assert_eq!(data, expected);
        }
    }

    #[test]
    fn test_one_render_feeds_all_voices() {
        let (device, renders, mut context) = test_context(4);
        device.consume_all(1);

        context.run_cycle();
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        device.consume_all(1);
        context.run_cycle();
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_refill_skips_voice_but_not_the_rest() {
        let (device, _renders, mut context) = test_context(3);
        let voices = context.voices().to_vec();
        device.consume_all(1);
        device.fail_next_unqueue(voices[1]);

        assert_eq!(
            context.run_cycle(),
            CycleOutcome::Refilled { refilled: 2, restarted: 0 }
        );

        // The failed voice still has its processed buffer awaiting the next
        // cycle; the others cycled theirs back
        assert_eq!(device.buffer_counts(voices[1]).unwrap(), (2, 1, 0));
        assert_eq!(device.buffer_counts(voices[0]).unwrap(), (3, 0, 0));
        assert_eq!(device.buffer_counts(voices[2]).unwrap(), (3, 0, 0));
    }

    #[test]
    fn test_starved_voice_is_restarted_after_refill() {
        let (device, _renders, mut context) = test_context(2);
        let voices = context.voices().to_vec();

        // Voice 0 drains completely: starvation stops it
        device.consume(voices[0], 3).unwrap();
        device.consume(voices[1], 1).unwrap();
        assert_eq!(
            device.play_state(voices[0]).unwrap(),
            crate::device::PlayState::Stopped
        );

        let outcome = context.run_cycle();
        assert_eq!(outcome, CycleOutcome::Refilled { refilled: 2, restarted: 1 });
        assert_eq!(
            device.play_state(voices[0]).unwrap(),
            crate::device::PlayState::Playing
        );
        assert_eq!(device.play_commands(voices[0]), 1);
        assert_eq!(context.total_restarts(), 1);
    }

    #[test]
    fn test_synthesis_failure_leaves_queues_untouched() {
        let device = Arc::new(MockDevice::new());
        let voices = create_voice_pool(device.as_ref(), 2, BLOCK, &NoReverb).unwrap();

        let mut source = Box::new(CallbackSource::new(BLOCK, |_ticks, _out: &mut [i16]| {
            Err(crate::error::Error::Synthesis("engine fault".into()))
        }));
        source.initialize(0, 2, 44100).unwrap();

        let mut context = SchedulerContext::new(
            Arc::clone(&device) as Arc<dyn PlaybackDevice>,
            source,
            voices.clone(),
            BLOCK,
            44100,
        )
        .unwrap();

        device.consume_all(1);
        assert_eq!(context.run_cycle(), CycleOutcome::SynthesisFailed);
        // Processed buffers still await the retry
        assert_eq!(device.buffer_counts(voices[0]).unwrap(), (2, 1, 0));
    }

    #[test]
    fn test_timing_constants() {
        let (_device, _renders, context) = test_context(2);
        // 64-frame block of 64-frame ticks at 44.1 kHz
        assert_eq!(context.ticks_per_block(), 1);
        assert_eq!(context.sleep_interval(), Duration::from_nanos(725_624));
    }

    #[test]
    fn test_rejects_block_not_multiple_of_tick() {
        let device = Arc::new(MockDevice::new());
        let voices = create_voice_pool(device.as_ref(), 1, 100, &NoReverb).unwrap();
        let source = Box::new(CallbackSource::new(64, |_t, _o: &mut [i16]| Ok(())));

        let result = SchedulerContext::new(
            device as Arc<dyn PlaybackDevice>,
            source,
            voices,
            100,
            44100,
        );
        assert!(result.is_err());
    }
}
