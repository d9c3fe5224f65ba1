//! Audio processing unit: four PSG channels, two DMA-fed sample FIFOs, the
//! mixer and the resampling path into the shared output ring buffer.
//!
//! Channels are stepped on the 4.19 MHz PSG clock (every 4th scheduler tick)
//! and a mixed stereo frame is produced every [CYCLES_PER_SAMPLE] ticks. The
//! mixed stream is resampled to the configured output rate and pushed into an
//! [AudioRingBuffer] whose storage is shared with the external audio sink.

mod envelope;
mod fifo;
mod noise;
mod quad;
mod resampler;
mod ring_buffer;
mod wave;

use std::path::Path;
use std::sync::Arc;

use bilge::prelude::*;
use intbits::Bits;

pub use self::fifo::Fifo;
pub use self::noise::NoiseChannel;
pub use self::quad::QuadChannel;
pub use self::resampler::StereoResampler;
pub use self::ring_buffer::AudioRingBuffer;
pub use self::ring_buffer::OverflowPolicy;
pub use self::ring_buffer::StereoFrame;
pub use self::wave::WaveChannel;

/// Rate at which the mixer produces frames, before resampling.
pub const NATIVE_SAMPLE_RATE: u32 = 32768;
/// Scheduler ticks between two mixed frames.
pub const CYCLES_PER_SAMPLE: u32 = crate::CLOCK_SPEED / NATIVE_SAMPLE_RATE;

pub const FIFO_A_ADDR: u32 = 0x0400_00A0;
pub const FIFO_B_ADDR: u32 = 0x0400_00A4;

/// Register 080: SOUNDCNT_L - PSG master volume and enables
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
struct PsgControl {
    volume_r: u3,
    reserved: u1,
    volume_l: u3,
    reserved: u1,
    enable_r: u4,
    enable_l: u4,
}

/// Register 082: SOUNDCNT_H - Mix ratios and direct-sound control
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
struct MixControl {
    /// 0 = 25%, 1 = 50%, 2 = 100%.
    psg_volume: u2,
    dma_a_full_volume: bool,
    dma_b_full_volume: bool,
    reserved: u4,
    dma_a_enable_r: bool,
    dma_a_enable_l: bool,
    /// Timer (0 or 1) driving FIFO A.
    dma_a_timer: u1,
    dma_a_reset: bool,
    dma_b_enable_r: bool,
    dma_b_enable_l: bool,
    dma_b_timer: u1,
    dma_b_reset: bool,
}

/// Audio output configuration, validated before construction.
#[derive(Clone, Copy, Debug)]
pub struct AudioConfig {
    pub output_sample_rate: u32,
    pub buffer_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 48000,
            buffer_capacity: 4096,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

pub struct Apu {
    pub psg1: QuadChannel,
    pub psg2: QuadChannel,
    pub psg3: WaveChannel,
    pub psg4: NoiseChannel,
    fifo: [Fifo; 2],
    /// Most recent sample popped from each FIFO, held until the next
    /// timer overflow.
    latch: [i8; 2],

    psg_control: PsgControl,
    mix_control: MixControl,
    master_enable: bool,
    bias: u16,

    wait_cycles: u32,
    output_sample_rate: u32,
    resampler: StereoResampler,
    buffer: Arc<AudioRingBuffer>,
}

impl Apu {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            psg1: QuadChannel::new(true),
            psg2: QuadChannel::new(false),
            psg3: WaveChannel::new(),
            psg4: NoiseChannel::new(),
            fifo: [Fifo::default(), Fifo::default()],
            latch: [0; 2],
            psg_control: PsgControl::default(),
            mix_control: MixControl::default(),
            master_enable: false,
            bias: 0x0200,
            wait_cycles: 0,
            output_sample_rate: config.output_sample_rate,
            resampler: StereoResampler::new(NATIVE_SAMPLE_RATE, config.output_sample_rate),
            buffer: Arc::new(AudioRingBuffer::new(
                config.buffer_capacity,
                config.overflow_policy,
            )),
        }
    }

    /// The ring buffer handle for the output sink. The storage stays alive
    /// for the sink even after the emulator is torn down.
    pub fn audio_buffer(&self) -> Arc<AudioRingBuffer> {
        self.buffer.clone()
    }

    /// Steps the four PSG oscillators by one 4.19 MHz clock.
    pub fn step_psg(&mut self) {
        self.psg1.step();
        self.psg2.step();
        self.psg3.step();
        self.psg4.step();
    }

    /// Advances the sample wait counter by one scheduler tick and mixes a
    /// frame when it expires.
    pub fn tick(&mut self) {
        if self.wait_cycles == 0 {
            self.generate();
            self.wait_cycles = CYCLES_PER_SAMPLE - 1;
        } else {
            self.wait_cycles -= 1;
        }
    }

    /// Timer overflow notification: drains one FIFO sample per overflow into
    /// the direct-sound latch. Returns per-FIFO flags requesting a DMA
    /// refill.
    pub fn on_timer_overflow(&mut self, timer_id: usize, times: u32) -> [bool; 2] {
        let mut refill = [false; 2];
        if timer_id > 1 {
            return refill;
        }
        let timers = [
            u8::from(self.mix_control.dma_a_timer()) as usize,
            u8::from(self.mix_control.dma_b_timer()) as usize,
        ];
        for (id, fifo) in self.fifo.iter_mut().enumerate() {
            if timers[id] != timer_id {
                continue;
            }
            for _ in 0..times {
                self.latch[id] = fifo.pop();
            }
            refill[id] = fifo.needs_refill();
        }
        refill
    }

    /// Mixes one stereo frame and pushes it through the resampler into the
    /// shared ring buffer.
    fn generate(&mut self) {
        let frame = self.mix();
        let buffer = self.buffer.clone();
        self.resampler.push(frame, |f| buffer.push(f));
    }

    fn mix(&self) -> StereoFrame {
        if !self.master_enable {
            return [0.0; 2];
        }

        let psg = [
            self.psg1.sample() as i32,
            self.psg2.sample() as i32,
            self.psg3.sample() as i32,
            self.psg4.sample() as i32,
        ];
        let enable_l = u8::from(self.psg_control.enable_l());
        let enable_r = u8::from(self.psg_control.enable_r());
        let mut left: i32 = psg
            .iter()
            .enumerate()
            .filter(|(id, _)| enable_l.bit(*id))
            .map(|(_, s)| s)
            .sum();
        let mut right: i32 = psg
            .iter()
            .enumerate()
            .filter(|(id, _)| enable_r.bit(*id))
            .map(|(_, s)| s)
            .sum();

        left = left * (u8::from(self.psg_control.volume_l()) as i32 + 1) / 8;
        right = right * (u8::from(self.psg_control.volume_r()) as i32 + 1) / 8;
        let psg_shift = match u8::from(self.mix_control.psg_volume()) {
            0 => 2,
            1 => 1,
            _ => 0,
        };
        left >>= psg_shift;
        right >>= psg_shift;

        let dma_scale = [
            if self.mix_control.dma_a_full_volume() { 4 } else { 2 },
            if self.mix_control.dma_b_full_volume() { 4 } else { 2 },
        ];
        let dma_enable_l = [
            self.mix_control.dma_a_enable_l(),
            self.mix_control.dma_b_enable_l(),
        ];
        let dma_enable_r = [
            self.mix_control.dma_a_enable_r(),
            self.mix_control.dma_b_enable_r(),
        ];
        for id in 0..2 {
            let sample = self.latch[id] as i32 * dma_scale[id];
            if dma_enable_l[id] {
                left += sample;
            }
            if dma_enable_r[id] {
                right += sample;
            }
        }

        // Bias to unsigned 10 bit range, clamp, then normalize to [-1, 1].
        let bias = self.bias as i32;
        let to_float = |sample: i32| ((sample + bias).clamp(0, 0x3FF) - 0x200) as f32 / 512.0;
        [to_float(left), to_float(right)]
    }

    /// Registers 0A0/0A4: FIFO_A/FIFO_B data ports. Write-only, one word of
    /// four signed samples per write.
    pub fn write_fifo_word(&mut self, id: usize, value: u32) {
        self.fifo[id].write_word(value);
    }

    pub fn read_register(&self, offset: u32) -> u16 {
        match offset {
            0x60 => self.psg1.read_sweep(),
            0x62 => self.psg1.read_control(),
            0x64 => self.psg1.read_frequency(),
            0x68 => self.psg2.read_control(),
            0x6C => self.psg2.read_frequency(),
            0x70 => self.psg3.read_bank_control(),
            0x72 => self.psg3.read_control(),
            0x74 => self.psg3.read_frequency(),
            0x78 => self.psg4.read_control(),
            0x7C => self.psg4.read_frequency(),
            0x80 => self.psg_control.into(),
            0x82 => u16::from(self.mix_control) & !0x8800,
            0x84 => self.read_soundcnt_x(),
            0x88 => self.bias,
            0x90..=0x9F => {
                let lo = self.psg3.read_wave_ram(offset as usize - 0x90) as u16;
                let hi = self.psg3.read_wave_ram(offset as usize - 0x90 + 1) as u16;
                lo | (hi << 8)
            }
            _ => 0,
        }
    }

    pub fn write_register(&mut self, offset: u32, value: u16) {
        // With the master enable cleared only SOUNDCNT_X is writable.
        if !self.master_enable && offset != 0x84 {
            return;
        }
        match offset {
            0x60 => self.psg1.write_sweep(value),
            0x62 => self.psg1.write_control(value),
            0x64 => self.psg1.write_frequency(value),
            0x68 => self.psg2.write_control(value),
            0x6C => self.psg2.write_frequency(value),
            0x70 => self.psg3.write_bank_control(value),
            0x72 => self.psg3.write_control(value),
            0x74 => self.psg3.write_frequency(value),
            0x78 => self.psg4.write_control(value),
            0x7C => self.psg4.write_frequency(value),
            0x80 => self.psg_control = value.into(),
            0x82 => self.write_soundcnt_h(value),
            0x84 => self.write_soundcnt_x(value),
            0x88 => self.bias = value & 0xC3FE,
            0x90..=0x9F => {
                let base = offset as usize - 0x90;
                self.psg3.write_wave_ram(base, value as u8);
                self.psg3.write_wave_ram(base + 1, (value >> 8) as u8);
            }
            0xA0 | 0xA2 => self.fifo[0].write_half(value),
            0xA4 | 0xA6 => self.fifo[1].write_half(value),
            _ => {}
        }
    }

    fn write_soundcnt_h(&mut self, value: u16) {
        self.mix_control = MixControl::from(value);
        if self.mix_control.dma_a_reset() {
            self.mix_control.set_dma_a_reset(false);
            self.fifo[0].reset();
            self.latch[0] = 0;
        }
        if self.mix_control.dma_b_reset() {
            self.mix_control.set_dma_b_reset(false);
            self.fifo[1].reset();
            self.latch[1] = 0;
        }
    }

    /// Register 084: SOUNDCNT_X - Master enable and channel status
    /// 7  bit  0
    /// ---- ----
    /// E... 4321
    /// |    ||||
    /// |    ++++- Channel active flags (read-only)
    /// +--------- PSG/FIFO master enable
    fn write_soundcnt_x(&mut self, value: u16) {
        let enable = value.bit(7);
        if self.master_enable && !enable {
            // Disabling the APU silences and clears the channel state.
            self.psg1.reset();
            self.psg2.reset();
            self.psg3.reset();
            self.psg4.reset();
            self.fifo[0].reset();
            self.fifo[1].reset();
            self.latch = [0; 2];
            self.psg_control = PsgControl::default();
            self.mix_control = MixControl::default();
        }
        self.master_enable = enable;
    }

    fn read_soundcnt_x(&self) -> u16 {
        let mut value: u16 = 0;
        value.set_bit(0, self.psg1.enabled());
        value.set_bit(1, self.psg2.enabled());
        value.set_bit(2, self.psg3.enabled());
        value.set_bit(3, self.psg4.enabled());
        value.set_bit(7, self.master_enable);
        value
    }

    pub fn fifo_len(&self, id: usize) -> usize {
        self.fifo[id].len()
    }

    pub fn reset(&mut self) {
        self.psg1.reset();
        self.psg2.reset();
        self.psg3.reset();
        self.psg4.reset();
        self.fifo[0].reset();
        self.fifo[1].reset();
        self.latch = [0; 2];
        self.psg_control = PsgControl::default();
        self.mix_control = MixControl::default();
        self.master_enable = false;
        self.bias = 0x0200;
        self.wait_cycles = 0;
        self.resampler = StereoResampler::new(NATIVE_SAMPLE_RATE, self.output_sample_rate);
        self.buffer.clear();
    }
}

/// Writes interleaved stereo frames to a RIFF WAVE file. Useful for
/// inspecting the mixed output of a captured run.
pub fn write_wav(path: &Path, frames: &[StereoFrame], sample_rate: u32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for frame in frames {
        writer.write_sample(frame[0])?;
        writer.write_sample(frame[1])?;
    }
    writer.finalize()?;
    Ok(())
}
