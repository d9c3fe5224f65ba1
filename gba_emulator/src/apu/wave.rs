//! Wave channel (PSG 3): plays 4-bit samples from two banks of wave RAM.

use bilge::prelude::*;

use super::envelope::is_length_step;
use super::envelope::FrameSequencer;
use super::envelope::LengthCounter;
use crate::common::uint::U8Ext;

/// Register 070: SOUND3CNT_L - Wave bank control
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct WaveBankControl {
    reserved: u5,
    /// 0 = two banks of 32 samples, 1 = one bank of 64 samples.
    pub two_dimensional: bool,
    /// Bank used for playback; the CPU accesses the other one.
    pub bank_select: u1,
    pub playback_enable: bool,
    reserved: u8,
}

/// Register 072: SOUND3CNT_H - Length and volume
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct WaveControl {
    pub length: u8,
    reserved: u5,
    /// 0 = mute, 1 = 100%, 2 = 50%, 3 = 25%.
    pub volume: u2,
    /// Overrides the volume code with 75%.
    pub force_volume: bool,
}

/// Register 074: SOUND3CNT_X - Frequency and trigger
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct WaveFrequency {
    pub frequency: u11,
    reserved: u3,
    pub length_enable: bool,
    pub trigger: bool,
}

#[derive(Clone, Debug)]
pub struct WaveChannel {
    bank_control: WaveBankControl,
    control: WaveControl,
    frequency: WaveFrequency,
    /// Two banks of 16 bytes, two 4-bit samples per byte.
    wave_ram: [[u8; 16]; 2],

    enabled: bool,
    position: u8,
    phase_timer: u32,
    sequencer: FrameSequencer,
    length: LengthCounter,
    current_sample: u8,
}

impl Default for WaveChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveChannel {
    pub fn new() -> Self {
        Self {
            bank_control: WaveBankControl::default(),
            control: WaveControl::default(),
            frequency: WaveFrequency::default(),
            wave_ram: [[0; 16]; 2],
            enabled: false,
            position: 0,
            phase_timer: 0,
            sequencer: FrameSequencer::default(),
            length: LengthCounter::new(256),
            current_sample: 0,
        }
    }

    fn period(&self) -> u32 {
        (2048 - u32::from(self.frequency.frequency())) * 2
    }

    fn fetch_sample(&mut self) {
        let bank = if self.bank_control.two_dimensional() {
            // 64-sample mode plays both banks back to back.
            (self.position / 32) as usize & 1
        } else {
            u8::from(self.bank_control.bank_select()) as usize
        };
        let index = (self.position % 32) as usize;
        let byte = self.wave_ram[bank][index / 2];
        self.current_sample = if index % 2 == 0 {
            byte.high_nibble()
        } else {
            byte.low_nibble()
        };
    }

    /// Advances the channel by one PSG clock (4.19 MHz).
    pub fn step(&mut self) {
        self.phase_timer = self.phase_timer.saturating_sub(1);
        if self.phase_timer == 0 {
            self.phase_timer = self.period();
            let samples = if self.bank_control.two_dimensional() {
                64
            } else {
                32
            };
            self.position = (self.position + 1) % samples;
            self.fetch_sample();
        }

        if let Some(step) = self.sequencer.tick() {
            if is_length_step(step) && self.length.clock() {
                self.enabled = false;
            }
        }
    }

    pub fn sample(&self) -> i8 {
        if !self.enabled || !self.bank_control.playback_enable() {
            return 0;
        }
        // Center the 4-bit sample and scale to the PSG range of +/-15.
        let centered = (self.current_sample as i16) * 2 - 15;
        let scaled = if self.control.force_volume() {
            centered * 3 / 4
        } else {
            match u8::from(self.control.volume()) {
                0 => 0,
                1 => centered,
                2 => centered / 2,
                _ => centered / 4,
            }
        };
        scaled as i8
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn trigger(&mut self) {
        self.enabled = self.bank_control.playback_enable();
        self.length.trigger();
        self.position = 0;
        self.phase_timer = self.period();
        self.fetch_sample();
    }

    pub fn write_bank_control(&mut self, value: u16) {
        self.bank_control = WaveBankControl::from(value);
        if !self.bank_control.playback_enable() {
            self.enabled = false;
        }
    }

    pub fn read_bank_control(&self) -> u16 {
        u16::from(self.bank_control) & 0x00E0
    }

    pub fn write_control(&mut self, value: u16) {
        self.control = WaveControl::from(value);
        self.length.load(u16::from(self.control.length()));
    }

    /// The length bits are write-only.
    pub fn read_control(&self) -> u16 {
        u16::from(self.control) & 0xE000
    }

    pub fn write_frequency(&mut self, value: u16) {
        self.frequency = WaveFrequency::from(value);
        self.length.enabled = self.frequency.length_enable();
        if self.frequency.trigger() {
            self.frequency.set_trigger(false);
            self.trigger();
        }
    }

    pub fn read_frequency(&self) -> u16 {
        u16::from(self.frequency) & 0x4000
    }

    /// Registers 090..0A0: WAVE_RAM - CPU access goes to the bank not
    /// selected for playback.
    pub fn write_wave_ram(&mut self, offset: usize, value: u8) {
        let bank = 1 - u8::from(self.bank_control.bank_select()) as usize;
        self.wave_ram[bank][offset & 0xF] = value;
    }

    pub fn read_wave_ram(&self, offset: usize) -> u8 {
        let bank = 1 - u8::from(self.bank_control.bank_select()) as usize;
        self.wave_ram[bank][offset & 0xF]
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn playing_channel() -> WaveChannel {
        let mut channel = WaveChannel::new();
        // Fill bank 0 while bank 1 is selected for playback, then flip.
        channel.write_bank_control(0x0040);
        for i in 0..16 {
            channel.write_wave_ram(i, 0xF0);
        }
        // Playback from bank 0, 100% volume, trigger.
        channel.write_bank_control(0x0080);
        channel.write_control(1 << 13);
        channel.write_frequency(0x8000 | 2047);
        channel
    }

    #[test]
    fn test_alternating_nibbles() {
        let mut channel = playing_channel();
        let mut seen = Vec::new();
        // Period is 2 clocks at frequency 2047.
        for _ in 0..8 {
            channel.step();
            channel.step();
            seen.push(channel.sample());
        }
        // 0xF0 alternates between nibble 15 (-> +15) and 0 (-> -15).
        assert!(seen.contains(&15));
        assert!(seen.contains(&-15));
    }

    #[test]
    fn test_volume_codes() {
        let mut channel = playing_channel();
        channel.current_sample = 15;
        channel.write_control(1 << 13);
        assert_eq!(channel.sample(), 15);
        channel.write_control(2 << 13);
        assert_eq!(channel.sample(), 7);
        channel.write_control(1 << 15);
        assert_eq!(channel.sample(), 11);
    }

    #[test]
    fn test_disabled_playback_is_silent() {
        let mut channel = playing_channel();
        channel.write_bank_control(0);
        assert_eq!(channel.sample(), 0);
    }

    #[test]
    fn test_cpu_accesses_idle_bank() {
        let mut channel = WaveChannel::new();
        channel.write_wave_ram(0, 0xAB);
        assert_eq!(channel.read_wave_ram(0), 0xAB);
        // Selecting bank 1 for playback exposes bank... the same data is
        // no longer visible once the banks flip.
        channel.write_bank_control(0x0040);
        assert_ne!(channel.read_wave_ram(0), 0xAB);
    }
}
