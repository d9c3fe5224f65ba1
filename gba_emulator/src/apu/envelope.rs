//! Clocking machinery shared by the PSG channels: the 512 Hz frame
//! sequencer and the volume envelope / length counter units it drives.

/// Divides the 4.19 MHz PSG clock down to the 512 Hz frame sequencer and
/// cycles through its 8 steps. Length is clocked on even steps, sweep on
/// steps 2 and 6, the envelope on step 7.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSequencer {
    divider: u32,
    step: u8,
}

/// PSG clocks per sequencer step (4194304 / 512).
const CLOCKS_PER_STEP: u32 = 8192;

impl FrameSequencer {
    /// Advances by one PSG clock; returns the sequencer step when one fires.
    pub fn tick(&mut self) -> Option<u8> {
        self.divider += 1;
        if self.divider < CLOCKS_PER_STEP {
            return None;
        }
        self.divider = 0;
        let step = self.step;
        self.step = (self.step + 1) % 8;
        Some(step)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub fn is_length_step(step: u8) -> bool {
    step % 2 == 0
}

pub fn is_sweep_step(step: u8) -> bool {
    step == 2 || step == 6
}

pub fn is_envelope_step(step: u8) -> bool {
    step == 7
}

/// 4-bit volume envelope, stepped at 64 Hz.
#[derive(Clone, Copy, Debug, Default)]
pub struct Envelope {
    pub volume: u8,
    pub initial_volume: u8,
    pub increase: bool,
    pub period: u8,
    timer: u8,
}

impl Envelope {
    pub fn configure(&mut self, initial_volume: u8, increase: bool, period: u8) {
        self.initial_volume = initial_volume;
        self.increase = increase;
        self.period = period;
    }

    pub fn trigger(&mut self) {
        self.volume = self.initial_volume;
        self.timer = self.period;
    }

    /// A zeroed decreasing envelope turns the channel's DAC off entirely.
    pub fn dac_enabled(&self) -> bool {
        self.initial_volume != 0 || self.increase
    }

    pub fn clock(&mut self) {
        if self.period == 0 {
            return;
        }
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer == 0 {
            self.timer = self.period;
            if self.increase && self.volume < 15 {
                self.volume += 1;
            } else if !self.increase && self.volume > 0 {
                self.volume -= 1;
            }
        }
    }
}

/// Length counter, stepped at 256 Hz. Expiry silences the channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct LengthCounter {
    pub counter: u16,
    pub enabled: bool,
    max: u16,
}

impl LengthCounter {
    pub fn new(max: u16) -> Self {
        Self {
            counter: 0,
            enabled: false,
            max,
        }
    }

    pub fn load(&mut self, length: u16) {
        debug_assert!(length < self.max);
        self.counter = self.max - length;
    }

    pub fn trigger(&mut self) {
        if self.counter == 0 {
            self.counter = self.max;
        }
    }

    /// Returns true when the channel should be silenced.
    pub fn clock(&mut self) -> bool {
        if !self.enabled || self.counter == 0 {
            return false;
        }
        self.counter -= 1;
        self.counter == 0
    }
}
