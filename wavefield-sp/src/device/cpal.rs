//! Real playback backend over cpal
//!
//! Implements the queue-based streaming voice model on top of a single cpal
//! output stream. Each voice owns a pair of lock-free SPSC rings:
//!
//! - `filled`: scheduler → audio callback, blocks waiting to be played
//! - `reclaim`: audio callback → scheduler, blocks played and awaiting refill
//!
//! `processed_buffers` is the reclaim ring's occupancy, so the scheduler
//! sees the same semantics a hardware buffer queue exposes. A voice whose
//! `filled` ring drains mid-callback flips to `Stopped` (starvation) and
//! stays silent until the scheduler reissues `play`.
//!
//! The cpal stream handle is not `Send`, so it lives on a dedicated output
//! thread for the device's lifetime; everything the callback touches is
//! behind `Arc`. The callback itself never blocks: shared state is read
//! with `try_lock`, and a failed lock yields one callback of the previous
//! pan state (positions are last-write-wins anyway).

use super::{BufferId, PlaybackDevice, PlayState, RenderingQuality, ReverbSetup, VoiceId};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_4;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wavefield_common::{Orientation, Vec3};

const STATE_STOPPED: u8 = 0;
const STATE_PLAYING: u8 = 1;

const QUALITY_LOW: u8 = 0;
const QUALITY_HIGH: u8 = 1;

/// One hardware buffer's worth of mono PCM, tagged with its handle.
struct AudioBlock {
    id: BufferId,
    samples: Box<[i16]>,
}

/// Playback cursor over the block currently being consumed by the callback.
struct PlayCursor {
    block: AudioBlock,
    offset: usize,
}

/// Per-voice state shared between the scheduler-facing API and the callback.
struct VoiceSlot {
    id: VoiceId,
    block_size: usize,

    // Scheduler side of the rings
    filled_tx: Mutex<HeapProd<AudioBlock>>,
    reclaim_rx: Mutex<HeapCons<AudioBlock>>,
    /// Blocks between unqueue_buffer and queue_buffer
    checked_out: Mutex<HashMap<BufferId, AudioBlock>>,

    // Callback side of the rings
    filled_rx: Mutex<HeapCons<AudioBlock>>,
    reclaim_tx: Mutex<HeapProd<AudioBlock>>,
    current: Mutex<Option<PlayCursor>>,

    state: AtomicU8,
    position: Mutex<Vec3>,
}

impl VoiceSlot {
    /// Pull the next sample for this voice, recycling exhausted blocks into
    /// the reclaim ring. `None` means the filled ring is drained (underrun).
    ///
    /// Callback-only; nothing else locks `current`.
    fn next_sample(&self) -> Option<i16> {
        let mut current = self.current.try_lock().ok()?;
        loop {
            if let Some(cursor) = current.as_mut() {
                if cursor.offset < cursor.block.samples.len() {
                    let sample = cursor.block.samples[cursor.offset];
                    cursor.offset += 1;
                    return Some(sample);
                }
                let exhausted = current.take();
                if let (Some(cursor), Ok(mut reclaim)) = (exhausted, self.reclaim_tx.try_lock()) {
                    // Capacity equals queue depth, so this cannot overflow
                    let _ = reclaim.try_push(cursor.block);
                }
            }
            let next = self.filled_rx.try_lock().ok()?.try_pop();
            match next {
                Some(block) => *current = Some(PlayCursor { block, offset: 0 }),
                None => return None,
            }
        }
    }
}

/// Listener pose read by the callback each cycle.
#[derive(Clone, Copy)]
struct Listener {
    position: Vec3,
    orientation: Orientation,
}

impl Default for Listener {
    fn default() -> Self {
        Listener { position: Vec3::ZERO, orientation: Orientation::default() }
    }
}

/// Everything the audio callback can reach.
struct SharedOutput {
    voices: Mutex<Vec<Arc<VoiceSlot>>>,
    listener: Mutex<Listener>,
    quality: AtomicU8,
    next_voice: AtomicU64,
    next_buffer: AtomicU64,
    underruns: AtomicU64,
    stream_error: AtomicBool,
}

/// Real spatial playback device over the system's default audio host.
pub struct CpalDevice {
    shared: Arc<SharedOutput>,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
}

impl CpalDevice {
    /// Open an output device and start the output stream.
    ///
    /// `device_name = None` selects the system default; a named device that
    /// cannot be found falls back to the default with a warning rather than
    /// failing the session.
    pub fn open(device_name: Option<String>, sample_rate: u32) -> Result<Self> {
        let shared = Arc::new(SharedOutput {
            voices: Mutex::new(Vec::new()),
            listener: Mutex::new(Listener::default()),
            quality: AtomicU8::new(QUALITY_HIGH),
            next_voice: AtomicU64::new(0),
            next_buffer: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            stream_error: AtomicBool::new(false),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        // cpal's Stream is !Send, so a dedicated thread owns it for the
        // device's lifetime and reports the startup outcome back once.
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_shared = Arc::clone(&shared);
        let thread_shutdown = Arc::clone(&shutdown);
        thread::Builder::new()
            .name("wavefield-output".into())
            .spawn(move || {
                let outcome = run_output_stream(device_name, sample_rate, thread_shared);
                match outcome {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        while !thread_shutdown.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(50));
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| Error::Device(format!("failed to spawn output thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Device("output thread died during startup".into()))??;

        info!("Opened cpal output at {} Hz", sample_rate);
        Ok(CpalDevice { shared, sample_rate, shutdown })
    }

    /// Session sample rate the device was opened with.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total starvation events observed by the audio callback.
    pub fn underrun_count(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// True if the stream reported an error since startup.
    pub fn has_stream_error(&self) -> bool {
        self.shared.stream_error.load(Ordering::Relaxed)
    }

    fn slot(&self, voice: VoiceId) -> Result<Arc<VoiceSlot>> {
        let voices = lock(&self.shared.voices)?;
        voices
            .iter()
            .find(|s| s.id == voice)
            .cloned()
            .ok_or_else(|| Error::Voice(format!("unknown {}", voice)))
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Internal("device state poisoned".into()))
}

impl PlaybackDevice for CpalDevice {
    fn create_voice(&self, queue_depth: usize, block_size: usize) -> Result<VoiceId> {
        let id = VoiceId(self.shared.next_voice.fetch_add(1, Ordering::Relaxed));

        let (mut filled_tx, filled_rx) = HeapRb::<AudioBlock>::new(queue_depth).split();
        let (reclaim_tx, reclaim_rx) = HeapRb::<AudioBlock>::new(queue_depth).split();

        // Pre-fill with silence so playback has something to consume
        for _ in 0..queue_depth {
            let buffer = BufferId(self.shared.next_buffer.fetch_add(1, Ordering::Relaxed));
            let block = AudioBlock { id: buffer, samples: vec![0i16; block_size].into_boxed_slice() };
            filled_tx
                .try_push(block)
                .map_err(|_| Error::Voice(format!("failed to pre-queue buffers on {}", id)))?;
        }

        let slot = Arc::new(VoiceSlot {
            id,
            block_size,
            filled_tx: Mutex::new(filled_tx),
            reclaim_rx: Mutex::new(reclaim_rx),
            checked_out: Mutex::new(HashMap::new()),
            filled_rx: Mutex::new(filled_rx),
            reclaim_tx: Mutex::new(reclaim_tx),
            current: Mutex::new(None),
            state: AtomicU8::new(STATE_PLAYING),
            position: Mutex::new(Vec3::ZERO),
        });

        lock(&self.shared.voices)?.push(slot);
        debug!("Created {} ({} x {}-frame buffers)", id, queue_depth, block_size);
        Ok(id)
    }

    fn processed_buffers(&self, voice: VoiceId) -> Result<usize> {
        let slot = self.slot(voice)?;
        let reclaim = lock(&slot.reclaim_rx)?;
        Ok(reclaim.occupied_len())
    }

    fn unqueue_buffer(&self, voice: VoiceId) -> Result<BufferId> {
        let slot = self.slot(voice)?;
        let block = lock(&slot.reclaim_rx)?
            .try_pop()
            .ok_or_else(|| Error::Voice(format!("{} has no processed buffers", voice)))?;
        let id = block.id;
        lock(&slot.checked_out)?.insert(id, block);
        Ok(id)
    }

    fn write_buffer(&self, voice: VoiceId, buffer: BufferId, samples: &[i16]) -> Result<()> {
        let slot = self.slot(voice)?;
        if samples.len() != slot.block_size {
            return Err(Error::Voice(format!(
                "wrote {} samples into a {}-frame buffer",
                samples.len(),
                slot.block_size
            )));
        }
        let mut checked_out = lock(&slot.checked_out)?;
        let block = checked_out
            .get_mut(&buffer)
            .ok_or_else(|| Error::Voice(format!("{:?} is not detached from {}", buffer, voice)))?;
        block.samples.copy_from_slice(samples);
        Ok(())
    }

    fn queue_buffer(&self, voice: VoiceId, buffer: BufferId) -> Result<()> {
        let slot = self.slot(voice)?;
        let block = lock(&slot.checked_out)?
            .remove(&buffer)
            .ok_or_else(|| Error::Voice(format!("{:?} is not detached from {}", buffer, voice)))?;
        lock(&slot.filled_tx)?
            .try_push(block)
            .map_err(|block| {
                // Should be impossible: ring capacity equals queue depth.
                // Put the block back so it is not leaked.
                if let Ok(mut checked_out) = slot.checked_out.lock() {
                    checked_out.insert(buffer, block);
                }
                Error::Voice(format!("{}'s pending queue is full", voice))
            })?;
        Ok(())
    }

    fn play_state(&self, voice: VoiceId) -> Result<PlayState> {
        let slot = self.slot(voice)?;
        Ok(match slot.state.load(Ordering::Relaxed) {
            STATE_PLAYING => PlayState::Playing,
            _ => PlayState::Stopped,
        })
    }

    fn play(&self, voice: VoiceId) -> Result<()> {
        let slot = self.slot(voice)?;
        slot.state.store(STATE_PLAYING, Ordering::Relaxed);
        Ok(())
    }

    fn set_voice_position(&self, voice: VoiceId, position: Vec3) -> Result<()> {
        let slot = self.slot(voice)?;
        *lock(&slot.position)? = position;
        Ok(())
    }

    fn set_listener_position(&self, position: Vec3) -> Result<()> {
        lock(&self.shared.listener)?.position = position;
        Ok(())
    }

    fn set_listener_orientation(&self, orientation: Orientation) -> Result<()> {
        lock(&self.shared.listener)?.orientation = orientation;
        Ok(())
    }

    fn set_rendering_quality(&self, quality: RenderingQuality) -> Result<()> {
        let value = match quality {
            RenderingQuality::Low => QUALITY_LOW,
            RenderingQuality::High => QUALITY_HIGH,
        };
        self.shared.quality.store(value, Ordering::Relaxed);
        debug!("Rendering quality set to {:?}", quality);
        Ok(())
    }
}

/// Default reverb hook for the cpal backend.
///
/// The backend carries no reverb DSP of its own; this hook just records
/// which voices a shared effect would span. Integrators with a real effect
/// chain supply their own [`ReverbSetup`].
pub struct CpalReverb;

impl ReverbSetup for CpalReverb {
    fn attach(&self, voices: &[VoiceId]) -> Result<()> {
        info!("Reverb setup requested for {} voices (no effect chain attached)", voices.len());
        Ok(())
    }
}

/// Open the device, build the stream and start it. Runs on the output
/// thread; the returned stream must stay alive for playback to continue.
fn run_output_stream(
    device_name: Option<String>,
    sample_rate: u32,
    shared: Arc<SharedOutput>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name.as_deref() {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::Device(format!("failed to enumerate devices: {}", e)))?;
            match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                Some(found) => {
                    info!("Found requested audio device: {}", name);
                    found
                }
                None => {
                    warn!("Requested device '{}' not found, falling back to default", name);
                    host.default_output_device()
                        .ok_or_else(|| Error::Device("no default output device".into()))?
                }
            }
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Device("no default output device".into()))?,
    };
    debug!("Using audio device: {}", device.name().unwrap_or_else(|_| "Unknown".into()));

    let (config, sample_format) = best_config(&device, sample_rate)?;
    if config.sample_rate.0 != sample_rate {
        warn!(
            "Device does not support {} Hz, streaming at {} Hz (pitch will shift)",
            sample_rate, config.sample_rate.0
        );
    }
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, shared)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, shared)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, shared)?,
        other => {
            return Err(Error::Device(format!("unsupported sample format: {:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| Error::Device(format!("failed to start stream: {}", e)))?;
    info!("Audio output stream started");
    Ok(stream)
}

/// Pick a stereo configuration at the requested rate, or fall back to the
/// device default.
fn best_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::Device(format!("failed to get device configs: {}", e)))?;

    let preferred = supported.find(|c| {
        c.channels() == 2
            && c.min_sample_rate().0 <= sample_rate
            && c.max_sample_rate().0 >= sample_rate
            && c.sample_format() == SampleFormat::F32
    });

    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        let config = config.with_sample_rate(cpal::SampleRate(sample_rate)).config();
        return Ok((config, sample_format));
    }

    let config = device
        .default_output_config()
        .map_err(|e| Error::Device(format!("failed to get default config: {}", e)))?;
    let sample_format = config.sample_format();
    Ok((config.config(), sample_format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    shared: Arc<SharedOutput>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let error_flag = Arc::clone(&shared);

    // Mix bus reused across callbacks; grows once to the device's buffer
    // size and never reallocates after that.
    let mut mix_bus: Vec<f32> = Vec::new();
    let mut listener = Listener::default();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mix_bus.clear();
                mix_bus.resize(frames * 2, 0.0);

                // Positions are last-write-wins; a missed lock replays the
                // previous pose for one callback.
                if let Ok(current) = shared.listener.try_lock() {
                    listener = *current;
                }
                let quality = shared.quality.load(Ordering::Relaxed);

                if let Ok(voices) = shared.voices.try_lock() {
                    for slot in voices.iter() {
                        if slot.state.load(Ordering::Relaxed) != STATE_PLAYING {
                            continue;
                        }
                        let position = slot
                            .position
                            .try_lock()
                            .map(|p| *p)
                            .unwrap_or(Vec3::ZERO);
                        let (gain_l, gain_r) = pan_gains(position, &listener, quality);

                        for frame in 0..frames {
                            match slot.next_sample() {
                                Some(sample) => {
                                    let value = sample as f32 / -(i16::MIN as f32);
                                    mix_bus[frame * 2] += value * gain_l;
                                    mix_bus[frame * 2 + 1] += value * gain_r;
                                }
                                None => {
                                    // Starved: stop the voice, scheduler
                                    // restarts it after the next refill
                                    slot.state.store(STATE_STOPPED, Ordering::Relaxed);
                                    shared.underruns.fetch_add(1, Ordering::Relaxed);
                                    break;
                                }
                            }
                        }
                    }
                }

                for (out, mix) in data.chunks_mut(channels).zip(mix_bus.chunks(2)) {
                    let left = mix[0].clamp(-1.0, 1.0);
                    let right = mix[1].clamp(-1.0, 1.0);
                    out[0] = T::from_sample(left);
                    if channels > 1 {
                        out[1] = T::from_sample(right);
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.stream_error.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| Error::Device(format!("failed to build stream: {}", e)))?;

    Ok(stream)
}

/// Stereo gains for a voice at `position` heard by `listener`.
///
/// High quality: equal-power pan over the angle between the voice direction
/// and the listener's right axis, with 1/(1+d) distance attenuation. Low
/// quality: linear pan on the x offset, no attenuation.
fn pan_gains(position: Vec3, listener: &Listener, quality: u8) -> (f32, f32) {
    if quality == QUALITY_LOW {
        let pan = (position.x - listener.position.x).clamp(-1.0, 1.0);
        return ((1.0 - pan) / 2.0, (1.0 + pan) / 2.0);
    }

    let to_voice = position.sub(&listener.position);
    let distance = to_voice.length();
    let attenuation = 1.0 / (1.0 + distance);

    let right_axis = listener
        .orientation
        .at
        .cross(&listener.orientation.up)
        .normalized();
    let direction = to_voice.normalized();

    // direction == ZERO (voice at the listener) pans center
    let x = direction.dot(&right_axis).clamp(-1.0, 1.0);
    let angle = (x + 1.0) * FRAC_PI_4;
    (angle.cos() * attenuation, angle.sin() * attenuation)
}
