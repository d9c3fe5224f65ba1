//! Noise channel (PSG 4): pseudo-random output from a linear feedback shift
//! register with envelope and length control.

use bilge::prelude::*;

use super::envelope::is_envelope_step;
use super::envelope::is_length_step;
use super::envelope::Envelope;
use super::envelope::FrameSequencer;
use super::envelope::LengthCounter;

/// Register 078: SOUND4CNT_L - Length and envelope
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct NoiseControl {
    pub length: u6,
    reserved: u2,
    pub envelope_period: u3,
    pub envelope_increase: bool,
    pub initial_volume: u4,
}

/// Register 07C: SOUND4CNT_H - Polynomial counter and trigger
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct NoiseFrequency {
    pub divisor_code: u3,
    /// 1 = 7-bit LFSR, 0 = 15-bit.
    pub narrow_width: bool,
    pub shift: u4,
    reserved: u6,
    pub length_enable: bool,
    pub trigger: bool,
}

const DIVISOR_TABLE: [u32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

#[derive(Clone, Debug)]
pub struct NoiseChannel {
    control: NoiseControl,
    frequency: NoiseFrequency,

    enabled: bool,
    lfsr: u16,
    phase_timer: u32,
    sequencer: FrameSequencer,
    envelope: Envelope,
    length: LengthCounter,
}

impl Default for NoiseChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseChannel {
    pub fn new() -> Self {
        Self {
            control: NoiseControl::default(),
            frequency: NoiseFrequency::default(),
            enabled: false,
            lfsr: 0x7FFF,
            phase_timer: 0,
            sequencer: FrameSequencer::default(),
            envelope: Envelope::default(),
            length: LengthCounter::new(64),
        }
    }

    fn period(&self) -> u32 {
        DIVISOR_TABLE[u8::from(self.frequency.divisor_code()) as usize]
            << u8::from(self.frequency.shift())
    }

    fn clock_lfsr(&mut self) {
        let feedback = (self.lfsr ^ (self.lfsr >> 1)) & 1;
        self.lfsr >>= 1;
        self.lfsr |= feedback << 14;
        if self.frequency.narrow_width() {
            self.lfsr = (self.lfsr & !(1 << 6)) | (feedback << 6);
        }
    }

    /// Advances the channel by one PSG clock (4.19 MHz).
    pub fn step(&mut self) {
        self.phase_timer = self.phase_timer.saturating_sub(1);
        if self.phase_timer == 0 {
            self.phase_timer = self.period();
            self.clock_lfsr();
        }

        if let Some(step) = self.sequencer.tick() {
            if is_length_step(step) && self.length.clock() {
                self.enabled = false;
            }
            if is_envelope_step(step) {
                self.envelope.clock();
            }
        }
    }

    pub fn sample(&self) -> i8 {
        if !self.enabled || !self.envelope.dac_enabled() {
            return 0;
        }
        let volume = self.envelope.volume as i8;
        // Bit 0 low means output high.
        if self.lfsr & 1 == 0 {
            volume
        } else {
            -volume
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn trigger(&mut self) {
        self.enabled = self.envelope.dac_enabled();
        self.length.trigger();
        self.phase_timer = self.period();
        self.envelope.trigger();
        self.lfsr = 0x7FFF;
    }

    pub fn write_control(&mut self, value: u16) {
        self.control = NoiseControl::from(value);
        self.length.load(u16::from(u8::from(self.control.length())));
        self.envelope.configure(
            u8::from(self.control.initial_volume()),
            self.control.envelope_increase(),
            u8::from(self.control.envelope_period()),
        );
        if !self.envelope.dac_enabled() {
            self.enabled = false;
        }
    }

    /// The length bits are write-only.
    pub fn read_control(&self) -> u16 {
        u16::from(self.control) & 0xFF00
    }

    pub fn write_frequency(&mut self, value: u16) {
        self.frequency = NoiseFrequency::from(value);
        self.length.enabled = self.frequency.length_enable();
        if self.frequency.trigger() {
            self.frequency.set_trigger(false);
            self.trigger();
        }
    }

    pub fn read_frequency(&self) -> u16 {
        u16::from(self.frequency) & 0x40FF
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
