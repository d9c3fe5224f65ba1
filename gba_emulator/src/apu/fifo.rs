//! Direct-sound sample FIFOs fed by DMA and drained by timer overflows.

use std::collections::VecDeque;

/// Queue depth in bytes. DMA refills in 16-byte bursts once the queue drains
/// to half depth.
pub const FIFO_DEPTH: usize = 32;
pub const REFILL_THRESHOLD: usize = FIFO_DEPTH / 2;

#[derive(Clone, Debug, Default)]
pub struct Fifo {
    samples: VecDeque<i8>,
}

impl Fifo {
    /// Queues the four signed 8-bit samples of one FIFO data word. Samples
    /// beyond the queue depth are discarded.
    pub fn write_word(&mut self, value: u32) {
        for byte in value.to_le_bytes() {
            if self.samples.len() < FIFO_DEPTH {
                self.samples.push_back(byte as i8);
            }
        }
    }

    /// Queues the two samples of a halfword write to the data port.
    pub fn write_half(&mut self, value: u16) {
        for byte in value.to_le_bytes() {
            if self.samples.len() < FIFO_DEPTH {
                self.samples.push_back(byte as i8);
            }
        }
    }

    /// Dequeues the next sample. An empty queue plays silence.
    pub fn pop(&mut self) -> i8 {
        self.samples.pop_front().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn needs_refill(&self) -> bool {
        self.samples.len() <= REFILL_THRESHOLD
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_word_write_is_little_endian() {
        let mut fifo = Fifo::default();
        fifo.write_word(0x0403_02FF);
        assert_eq!(fifo.pop(), -1);
        assert_eq!(fifo.pop(), 2);
        assert_eq!(fifo.pop(), 3);
        assert_eq!(fifo.pop(), 4);
    }

    #[test]
    fn test_empty_fifo_plays_silence() {
        let mut fifo = Fifo::default();
        assert_eq!(fifo.pop(), 0);
    }

    #[test]
    fn test_overflowing_writes_are_discarded() {
        let mut fifo = Fifo::default();
        for i in 0..10 {
            fifo.write_word(u32::from_le_bytes([i; 4]));
        }
        assert_eq!(fifo.len(), FIFO_DEPTH);
        assert_eq!(fifo.pop(), 0);
    }

    #[test]
    fn test_refill_threshold() {
        let mut fifo = Fifo::default();
        for _ in 0..8 {
            fifo.write_word(0);
        }
        assert!(!fifo.needs_refill());
        for _ in 0..16 {
            fifo.pop();
        }
        assert!(fifo.needs_refill());
    }
}
