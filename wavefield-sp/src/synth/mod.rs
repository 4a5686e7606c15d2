//! Synthesis source interface
//!
//! The scheduler pulls interleaved PCM from an external synthesis engine
//! through this trait. The engine is opaque: one `render_ticks` call is
//! synchronous, blocking, and atomic from the scheduler's point of view:
//! there are no partial results and no cancellation mid-call. Its cost must
//! fit inside one block's playback duration or the voices will underrun.

pub mod tone;

pub use tone::ToneGenerator;

use crate::error::Result;

/// An external synthesis engine rendering interleaved 16-bit PCM.
///
/// Sample layout: for a source configured with `output_channels = V`,
/// `out[v + n * V]` is frame `n` of channel `v`. Channel `v` feeds voice `v`
/// of the session; the interleaved layout is what keeps all voices
/// sample-aligned across one render call.
pub trait SynthesisSource {
    /// Configure channel counts and sample rate. Called once before any
    /// rendering. The scheduler passes `input_channels = 0` and
    /// `output_channels` equal to the live voice count.
    fn initialize(&mut self, input_channels: usize, output_channels: usize, sample_rate: u32)
        -> Result<()>;

    /// Switch the engine's DSP graph on or off. Called once with `true`
    /// after `initialize`.
    fn enable_dsp(&mut self, enabled: bool) -> Result<()>;

    /// The engine's native render granularity, in frames per channel.
    fn tick_frames(&self) -> usize;

    /// Render `ticks` native ticks of interleaved output into `out`.
    ///
    /// `out.len()` is `ticks * tick_frames() * output_channels`.
    /// `input_offset` indexes into the engine's input stream and is always 0
    /// for input-less sessions.
    fn render_ticks(&mut self, ticks: usize, input_offset: usize, out: &mut [i16]) -> Result<()>;
}

/// Adapts a host-supplied render closure into a [`SynthesisSource`].
///
/// For hosts that marshal rendering into their own execution context (the
/// typical embedding: the engine lives behind a channel and the closure
/// blocks until the host thread has filled the block). The closure receives
/// `(ticks, out)`; channel count and sample rate from `initialize` are
/// recorded and queryable. `enable_dsp` is likewise only recorded: the
/// engine behind the closure owns its DSP state and renders silence itself
/// when its graph is off.
pub struct CallbackSource<F> {
    tick_frames: usize,
    channels: usize,
    sample_rate: u32,
    dsp_enabled: bool,
    render: F,
}

impl<F> CallbackSource<F>
where
    F: FnMut(usize, &mut [i16]) -> Result<()>,
{
    pub fn new(tick_frames: usize, render: F) -> Self {
        CallbackSource { tick_frames, channels: 0, sample_rate: 0, dsp_enabled: false, render }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn dsp_enabled(&self) -> bool {
        self.dsp_enabled
    }
}

impl<F> SynthesisSource for CallbackSource<F>
where
    F: FnMut(usize, &mut [i16]) -> Result<()>,
{
    fn initialize(&mut self, _input_channels: usize, output_channels: usize, sample_rate: u32)
        -> Result<()>
    {
        self.channels = output_channels;
        self.sample_rate = sample_rate;
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
        (self.render)(ticks, out)
    }
}
