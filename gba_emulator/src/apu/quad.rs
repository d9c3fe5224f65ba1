//! Tone channels (PSG 1 and 2): square wave with duty cycle, envelope and,
//! for PSG 1, a frequency sweep unit.

use bilge::prelude::*;

use super::envelope::is_envelope_step;
use super::envelope::is_length_step;
use super::envelope::is_sweep_step;
use super::envelope::Envelope;
use super::envelope::FrameSequencer;
use super::envelope::LengthCounter;

/// Output level per duty phase, one bit per 1/8th of the waveform.
const DUTY_PATTERNS: [u8; 4] = [0b0000_0001, 0b1000_0001, 0b1000_0111, 0b0111_1110];

/// Register 060: SOUND1CNT_L - Sweep control
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct SweepControl {
    pub shift: u3,
    /// 0 = add to frequency, 1 = subtract.
    pub decrease: bool,
    pub period: u3,
    reserved: u9,
}

/// Register 062/068: SOUNDnCNT - Duty, length and envelope
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct ToneControl {
    pub length: u6,
    pub duty: u2,
    pub envelope_period: u3,
    pub envelope_increase: bool,
    pub initial_volume: u4,
}

/// Register 064/06C: SOUNDnCNT_X - Frequency and trigger
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct ToneFrequency {
    pub frequency: u11,
    reserved: u3,
    pub length_enable: bool,
    pub trigger: bool,
}

#[derive(Clone, Debug)]
pub struct QuadChannel {
    with_sweep: bool,
    sweep: SweepControl,
    control: ToneControl,
    frequency: ToneFrequency,

    enabled: bool,
    phase: u8,
    phase_timer: u32,
    sequencer: FrameSequencer,
    envelope: Envelope,
    length: LengthCounter,

    sweep_shadow: u16,
    sweep_timer: u8,
    sweep_active: bool,
}

impl QuadChannel {
    pub fn new(with_sweep: bool) -> Self {
        Self {
            with_sweep,
            sweep: SweepControl::default(),
            control: ToneControl::default(),
            frequency: ToneFrequency::default(),
            enabled: false,
            phase: 0,
            phase_timer: 0,
            sequencer: FrameSequencer::default(),
            envelope: Envelope::default(),
            length: LengthCounter::new(64),
            sweep_shadow: 0,
            sweep_timer: 0,
            sweep_active: false,
        }
    }

    fn period(&self) -> u32 {
        (2048 - u32::from(self.frequency.frequency())) * 4
    }

    /// Advances the channel by one PSG clock (4.19 MHz).
    pub fn step(&mut self) {
        self.phase_timer = self.phase_timer.saturating_sub(1);
        if self.phase_timer == 0 {
            self.phase_timer = self.period();
            self.phase = (self.phase + 1) & 7;
        }

        if let Some(step) = self.sequencer.tick() {
            if is_length_step(step) && self.length.clock() {
                self.enabled = false;
            }
            if self.with_sweep && is_sweep_step(step) {
                self.clock_sweep();
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
        let pattern = DUTY_PATTERNS[u8::from(self.control.duty()) as usize];
        if pattern & (1 << self.phase) != 0 {
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

        if self.with_sweep {
            self.sweep_shadow = u16::from(self.frequency.frequency());
            self.sweep_timer = self.sweep_period();
            self.sweep_active = self.sweep.period() != u3::new(0) || self.sweep.shift() != u3::new(0);
            if self.sweep.shift() != u3::new(0) {
                self.next_sweep_frequency();
            }
        }
    }

    fn sweep_period(&self) -> u8 {
        // A period of 0 behaves as 8.
        match u8::from(self.sweep.period()) {
            0 => 8,
            n => n,
        }
    }

    /// Computes the next sweep frequency and disables the channel on
    /// overflow past 2047.
    fn next_sweep_frequency(&mut self) -> u16 {
        let delta = self.sweep_shadow >> u8::from(self.sweep.shift());
        let next = if self.sweep.decrease() {
            self.sweep_shadow.wrapping_sub(delta)
        } else {
            self.sweep_shadow + delta
        };
        if next > 2047 {
            self.enabled = false;
        }
        next
    }

    fn clock_sweep(&mut self) {
        if self.sweep_timer > 0 {
            self.sweep_timer -= 1;
        }
        if self.sweep_timer > 0 || !self.sweep_active {
            return;
        }
        self.sweep_timer = self.sweep_period();
        if self.sweep.period() == u3::new(0) {
            return;
        }

        let next = self.next_sweep_frequency();
        if next <= 2047 && self.sweep.shift() != u3::new(0) {
            self.sweep_shadow = next;
            self.frequency.set_frequency(u11::new(next));
            self.next_sweep_frequency();
        }
    }

    pub fn write_sweep(&mut self, value: u16) {
        self.sweep = SweepControl::from(value);
    }

    pub fn read_sweep(&self) -> u16 {
        u16::from(self.sweep) & 0x007F
    }

    pub fn write_control(&mut self, value: u16) {
        self.control = ToneControl::from(value);
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
        u16::from(self.control) & 0xFFC0
    }

    pub fn write_frequency(&mut self, value: u16) {
        self.frequency = ToneFrequency::from(value);
        self.length.enabled = self.frequency.length_enable();
        if self.frequency.trigger() {
            self.frequency.set_trigger(false);
            self.trigger();
        }
    }

    /// Only the length-enable bit reads back.
    pub fn read_frequency(&self) -> u16 {
        u16::from(self.frequency) & 0x4000
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.with_sweep);
    }
}
