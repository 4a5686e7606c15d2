//! Deterministic in-memory playback backend
//!
//! Simulates the queue-based streaming voice model without hardware: tests
//! script buffer consumption with [`MockDevice::consume`] and inject faults
//! per call site, then drive the real scheduler against it.
//!
//! Consumption semantics mirror a streaming hardware voice: played buffers
//! move from the pending queue to the processed set (where they await
//! `unqueue_buffer`), and a voice whose pending queue drains flips to
//! `Stopped` (starvation), exactly the condition the underrun monitor
//! recovers from.

use super::{BufferId, PlaybackDevice, PlayState, RenderingQuality, VoiceId};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use wavefield_common::{Orientation, Vec3};

struct MockVoice {
    block_size: usize,
    /// Buffers queued and not yet played, oldest first
    pending: VecDeque<BufferId>,
    /// Buffers played and awaiting unqueue, oldest first
    processed: VecDeque<BufferId>,
    /// Buffers currently checked out between unqueue and queue
    detached: HashSet<BufferId>,
    buffers: HashMap<BufferId, Vec<i16>>,
    state: PlayState,
    position: Option<Vec3>,
    /// Explicit play() calls; the implicit start inside create_voice is
    /// not counted, so this is the number of restarts
    play_commands: usize,
    last_queued: Option<BufferId>,
}

#[derive(Default)]
struct MockState {
    next_voice: u64,
    next_buffer: u64,
    creates_seen: usize,
    fail_creates: HashSet<usize>,
    fail_unqueue: HashSet<VoiceId>,
    voices: BTreeMap<VoiceId, MockVoice>,
    listener_position: Vec3,
    listener_orientation: Option<Orientation>,
    rendering_quality: Option<RenderingQuality>,
}

/// Hardware-free [`PlaybackDevice`] for tests and integrators without a
/// sound card.
#[derive(Default)]
pub struct MockDevice {
    inner: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        MockDevice::default()
    }

    /// Make the `index`-th `create_voice` call (0-based) fail.
    pub fn fail_voice_creation(&self, index: usize) {
        self.inner.lock().unwrap().fail_creates.insert(index);
    }

    /// Make the next `unqueue_buffer` on this voice fail (one-shot).
    pub fn fail_next_unqueue(&self, voice: VoiceId) {
        self.inner.lock().unwrap().fail_unqueue.insert(voice);
    }

    /// Simulate the hardware playing `n` pending buffers on this voice.
    ///
    /// Played buffers become processed (awaiting unqueue). Draining the
    /// pending queue stops the voice, as starvation would.
    pub fn consume(&self, voice: VoiceId, n: usize) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let v = voice_mut(&mut state, voice)?;
        for _ in 0..n {
            match v.pending.pop_front() {
                Some(buf) => v.processed.push_back(buf),
                None => break,
            }
        }
        if v.pending.is_empty() {
            v.state = PlayState::Stopped;
        }
        Ok(())
    }

    /// Simulate every voice playing `n` buffers.
    pub fn consume_all(&self, n: usize) {
        let ids: Vec<VoiceId> = self.voice_ids();
        for id in ids {
            let _ = self.consume(id, n);
        }
    }

    /// Force a voice into the stopped state without touching its queues.
    pub fn force_stop(&self, voice: VoiceId) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        voice_mut(&mut state, voice)?.state = PlayState::Stopped;
        Ok(())
    }

    /// (pending, processed, detached) buffer counts for a voice.
    pub fn buffer_counts(&self, voice: VoiceId) -> Result<(usize, usize, usize)> {
        let mut state = self.inner.lock().unwrap();
        let v = voice_mut(&mut state, voice)?;
        Ok((v.pending.len(), v.processed.len(), v.detached.len()))
    }

    /// Number of explicit play() restarts issued on this voice.
    pub fn play_commands(&self, voice: VoiceId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .voices
            .get(&voice)
            .map(|v| v.play_commands)
            .unwrap_or(0)
    }

    /// The buffer most recently re-queued on this voice, if any.
    pub fn last_queued(&self, voice: VoiceId) -> Option<BufferId> {
        self.inner.lock().unwrap().voices.get(&voice).and_then(|v| v.last_queued)
    }

    /// Current contents of one of the voice's buffers.
    pub fn buffer_data(&self, voice: VoiceId, buffer: BufferId) -> Option<Vec<i16>> {
        self.inner
            .lock()
            .unwrap()
            .voices
            .get(&voice)
            .and_then(|v| v.buffers.get(&buffer).cloned())
    }

    pub fn voice_ids(&self) -> Vec<VoiceId> {
        self.inner.lock().unwrap().voices.keys().copied().collect()
    }

    pub fn voice_position(&self, voice: VoiceId) -> Option<Vec3> {
        self.inner.lock().unwrap().voices.get(&voice).and_then(|v| v.position)
    }

    pub fn listener_position(&self) -> Vec3 {
        self.inner.lock().unwrap().listener_position
    }

    pub fn listener_orientation(&self) -> Option<Orientation> {
        self.inner.lock().unwrap().listener_orientation
    }

    pub fn rendering_quality(&self) -> Option<RenderingQuality> {
        self.inner.lock().unwrap().rendering_quality
    }
}

fn voice_mut<'a>(state: &'a mut MockState, voice: VoiceId) -> Result<&'a mut MockVoice> {
    state
        .voices
        .get_mut(&voice)
        .ok_or_else(|| Error::Voice(format!("unknown {}", voice)))
}

impl PlaybackDevice for MockDevice {
    fn create_voice(&self, queue_depth: usize, block_size: usize) -> Result<VoiceId> {
        let mut state = self.inner.lock().unwrap();

        let create_index = state.creates_seen;
        state.creates_seen += 1;
        if state.fail_creates.contains(&create_index) {
            return Err(Error::Voice(format!(
                "simulated creation failure for voice index {}",
                create_index
            )));
        }

        let id = VoiceId(state.next_voice);
        state.next_voice += 1;

        let mut pending = VecDeque::with_capacity(queue_depth);
        let mut buffers = HashMap::with_capacity(queue_depth);
        for _ in 0..queue_depth {
            let buf = BufferId(state.next_buffer);
            state.next_buffer += 1;
            buffers.insert(buf, vec![0i16; block_size]);
            pending.push_back(buf);
        }

        state.voices.insert(
            id,
            MockVoice {
                block_size,
                pending,
                processed: VecDeque::new(),
                detached: HashSet::new(),
                buffers,
                state: PlayState::Playing,
                position: None,
                play_commands: 0,
                last_queued: None,
            },
        );
        Ok(id)
    }

    fn processed_buffers(&self, voice: VoiceId) -> Result<usize> {
        let mut state = self.inner.lock().unwrap();
        Ok(voice_mut(&mut state, voice)?.processed.len())
    }

    fn unqueue_buffer(&self, voice: VoiceId) -> Result<BufferId> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_unqueue.remove(&voice) {
            return Err(Error::Voice(format!("simulated unqueue failure on {}", voice)));
        }
        let v = voice_mut(&mut state, voice)?;
        let buf = v
            .processed
            .pop_front()
            .ok_or_else(|| Error::Voice(format!("{} has no processed buffers", voice)))?;
        v.detached.insert(buf);
        Ok(buf)
    }

    fn write_buffer(&self, voice: VoiceId, buffer: BufferId, samples: &[i16]) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let v = voice_mut(&mut state, voice)?;
        if !v.detached.contains(&buffer) {
            return Err(Error::Voice(format!("{:?} is not detached from {}", buffer, voice)));
        }
        if samples.len() != v.block_size {
            return Err(Error::Voice(format!(
                "wrote {} samples into a {}-frame buffer",
                samples.len(),
                v.block_size
            )));
        }
        v.buffers.insert(buffer, samples.to_vec());
        Ok(())
    }

    fn queue_buffer(&self, voice: VoiceId, buffer: BufferId) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let v = voice_mut(&mut state, voice)?;
        if !v.detached.remove(&buffer) {
            return Err(Error::Voice(format!("{:?} is not detached from {}", buffer, voice)));
        }
        v.pending.push_back(buffer);
        v.last_queued = Some(buffer);
        Ok(())
    }

    fn play_state(&self, voice: VoiceId) -> Result<PlayState> {
        let mut state = self.inner.lock().unwrap();
        Ok(voice_mut(&mut state, voice)?.state)
    }

    fn play(&self, voice: VoiceId) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let v = voice_mut(&mut state, voice)?;
        v.play_commands += 1;
        v.state = PlayState::Playing;
        Ok(())
    }

    fn set_voice_position(&self, voice: VoiceId, position: Vec3) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        voice_mut(&mut state, voice)?.position = Some(position);
        Ok(())
    }

    fn set_listener_position(&self, position: Vec3) -> Result<()> {
        self.inner.lock().unwrap().listener_position = position;
        Ok(())
    }

    fn set_listener_orientation(&self, orientation: Orientation) -> Result<()> {
        self.inner.lock().unwrap().listener_orientation = Some(orientation);
        Ok(())
    }

    fn set_rendering_quality(&self, quality: RenderingQuality) -> Result<()> {
        self.inner.lock().unwrap().rendering_quality = Some(quality);
        Ok(())
    }
}
