//! Thread-safe bounded buffer handing audio frames to the output sink.
//!
//! The single genuine concurrency boundary of the emulator: the emulation
//! thread pushes mixed frames, the audio device's callback pops them on its
//! own clock. A single mutex covers both operations. Overflow and underrun
//! are steady-state conditions, not errors; they are only counted for
//! observability.

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;

/// One interleaved stereo frame, floating point in [-1, 1].
pub type StereoFrame = [f32; 2];

/// What `push` does when the buffer is full. Fixed at construction.
///
/// `DropOldest` discards the oldest unread frames (fast-forward friendly,
/// the default). `Block` parks the producer until the consumer drains the
/// buffer, which ties emulation speed to the consumer's pacing.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    Block,
}

#[derive(Debug, Default)]
struct RingBufferState {
    frames: VecDeque<StereoFrame>,
    overflow_count: u64,
    underrun_count: u64,
}

#[derive(Debug)]
pub struct AudioRingBuffer {
    state: Mutex<RingBufferState>,
    space_available: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
}

impl AudioRingBuffer {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0);
        Self {
            state: Mutex::new(RingBufferState::default()),
            space_available: Condvar::new(),
            capacity,
            policy,
        }
    }

    /// Producer side. With [OverflowPolicy::Block] this blocks until the
    /// consumer makes room; with [OverflowPolicy::DropOldest] it never
    /// blocks and the write never overtakes unread data.
    pub fn push(&self, frame: StereoFrame) {
        let mut state = self.state.lock().unwrap();
        if state.frames.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    state.frames.pop_front();
                    state.overflow_count += 1;
                }
                OverflowPolicy::Block => {
                    state = self
                        .space_available
                        .wait_while(state, |state| state.frames.len() >= self.capacity)
                        .unwrap();
                }
            }
        }
        state.frames.push_back(frame);
    }

    /// Consumer side. Fills `out` with up to `out.len()` frames and returns
    /// the number written. Never blocks; an underrun returns fewer frames
    /// and it is the sink's choice to pad with silence.
    pub fn pop_into(&self, out: &mut [StereoFrame]) -> usize {
        let mut state = self.state.lock().unwrap();
        let count = out.len().min(state.frames.len());
        for slot in out[..count].iter_mut() {
            *slot = state.frames.pop_front().unwrap();
        }
        if count < out.len() {
            state.underrun_count += 1;
        }
        self.space_available.notify_one();
        count
    }

    pub fn available(&self) -> usize {
        self.state.lock().unwrap().frames.len()
    }

    pub fn overflow_count(&self) -> u64 {
        self.state.lock().unwrap().overflow_count
    }

    pub fn underrun_count(&self) -> u64 {
        self.state.lock().unwrap().underrun_count
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.frames.clear();
        self.space_available.notify_one();
    }
}
