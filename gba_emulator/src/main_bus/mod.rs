//! Main bus connecting the CPU to memory and the memory-mapped peripherals.
//!
//! The bus owns every peripheral the scheduler drives: the interrupt
//! controller, the timer bank, the DMA controller, the video stepper and the
//! APU. IO registers are dispatched at halfword granularity, with byte and
//! word accesses composed on top.

use intbits::Bits;
use log::trace;
use log::warn;

use crate::apu::Apu;
use crate::apu::AudioConfig;
use crate::apu::FIFO_A_ADDR;
use crate::apu::FIFO_B_ADDR;
use crate::common::uint::U16Ext;
use crate::common::uint::U32Ext;
use crate::components::dma::DmaController;
use crate::components::dma::DmaUnit;
use crate::components::irq::Interrupt;
use crate::components::irq::InterruptController;
use crate::components::timers::TimerBank;
use crate::components::video::VideoEvents;
use crate::components::video::VideoStepper;

pub const EWRAM_SIZE: usize = 256 * 1024;
pub const IWRAM_SIZE: usize = 32 * 1024;

/// One of the 10 hardware keys. The discriminant is the bit index in
/// KEYINPUT.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Key {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Right = 4,
    Left = 5,
    Up = 6,
    Down = 7,
    R = 8,
    L = 9,
}

enum MemoryBlock {
    Ewram(usize),
    Iwram(usize),
    Io(u32),
    Rom(usize),
    Unmapped,
}

fn memory_map(addr: u32) -> MemoryBlock {
    match addr >> 24 {
        0x02 => MemoryBlock::Ewram(addr as usize & (EWRAM_SIZE - 1)),
        0x03 => MemoryBlock::Iwram(addr as usize & (IWRAM_SIZE - 1)),
        0x04 => MemoryBlock::Io(addr & 0x00FF_FFFF),
        0x08..=0x0D => MemoryBlock::Rom(addr as usize & 0x01FF_FFFF),
        _ => MemoryBlock::Unmapped,
    }
}

pub struct MainBus {
    pub ewram: Vec<u8>,
    pub iwram: Vec<u8>,
    pub rom: Vec<u8>,
    pub irq: InterruptController,
    pub timers: TimerBank,
    pub dma: DmaController,
    pub video: VideoStepper,
    pub apu: Apu,
    /// KEYINPUT register, active low.
    keyinput: u16,
}

impl MainBus {
    pub fn new(rom: Vec<u8>, audio: &AudioConfig) -> Self {
        Self {
            ewram: vec![0; EWRAM_SIZE],
            iwram: vec![0; IWRAM_SIZE],
            rom,
            irq: InterruptController::new(),
            timers: TimerBank::new(),
            dma: DmaController::new(),
            video: VideoStepper::new(),
            apu: Apu::new(audio),
            keyinput: 0x03FF,
        }
    }

    pub fn bus_read8(&mut self, addr: u32) -> u8 {
        match memory_map(addr) {
            MemoryBlock::Ewram(offset) => self.ewram[offset],
            MemoryBlock::Iwram(offset) => self.iwram[offset],
            MemoryBlock::Io(offset) => {
                let halfword = self.io_read16(offset & !1);
                if offset & 1 == 0 {
                    halfword.low_byte()
                } else {
                    halfword.high_byte()
                }
            }
            MemoryBlock::Rom(offset) => self.rom.get(offset).copied().unwrap_or(0),
            MemoryBlock::Unmapped => {
                warn!("Read from unmapped address {addr:08X}");
                0
            }
        }
    }

    pub fn bus_read16(&mut self, addr: u32) -> u16 {
        let addr = addr & !1;
        if let MemoryBlock::Io(offset) = memory_map(addr) {
            return self.io_read16(offset);
        }
        u16::from_le_bytes([self.bus_read8(addr), self.bus_read8(addr + 1)])
    }

    pub fn bus_read32(&mut self, addr: u32) -> u32 {
        let addr = addr & !3;
        let mut value = 0_u32;
        value.set_low_word(self.bus_read16(addr));
        value.set_high_word(self.bus_read16(addr + 2));
        value
    }

    pub fn bus_write8(&mut self, addr: u32, value: u8) {
        match memory_map(addr) {
            MemoryBlock::Ewram(offset) => self.ewram[offset] = value,
            MemoryBlock::Iwram(offset) => self.iwram[offset] = value,
            MemoryBlock::Io(offset) => self.io_write8(offset, value),
            MemoryBlock::Rom(_) => warn!("Write to ROM address {addr:08X}"),
            MemoryBlock::Unmapped => warn!("Write to unmapped address {addr:08X}"),
        }
    }

    pub fn bus_write16(&mut self, addr: u32, value: u16) {
        let addr = addr & !1;
        if let MemoryBlock::Io(offset) = memory_map(addr) {
            self.io_write16(offset, value);
            return;
        }
        self.bus_write8(addr, value.low_byte());
        self.bus_write8(addr + 1, value.high_byte());
    }

    pub fn bus_write32(&mut self, addr: u32, value: u32) {
        let addr = addr & !3;
        // Word writes to a FIFO data port push all four samples at once.
        match addr {
            FIFO_A_ADDR => self.apu.write_fifo_word(0, value),
            FIFO_B_ADDR => self.apu.write_fifo_word(1, value),
            _ => {
                self.bus_write16(addr, value.low_word());
                self.bus_write16(addr + 2, value.high_word());
            }
        }
    }

    fn io_read16(&mut self, offset: u32) -> u16 {
        match offset {
            0x004 => self.video.read_dispstat(),
            0x006 => self.video.read_vcount(),
            0x060..=0x0A6 => self.apu.read_register(offset),
            0x0B0..=0x0DE => self.dma_read16(offset),
            0x100..=0x10E => self.timer_read16(offset),
            0x130 => self.keyinput,
            0x200 => self.irq.read_ie(),
            0x202 => self.irq.read_if(),
            0x208 => self.irq.read_ime(),
            _ => {
                warn!("Read from unimplemented register {offset:03X}");
                0
            }
        }
    }

    fn io_write16(&mut self, offset: u32, value: u16) {
        match offset {
            0x004 => self.video.write_dispstat(value),
            0x060..=0x0A6 => self.apu.write_register(offset, value),
            0x0B0..=0x0DE => self.dma_write16(offset, value),
            0x100..=0x10E => self.timer_write16(offset, value),
            0x200 => {
                self.irq.write_ie(value);
                self.irq.update_halt_state();
            }
            0x202 => self.irq.write_if(value),
            0x208 => {
                self.irq.write_ime(value);
                self.irq.update_halt_state();
            }
            0x300 => self.irq.write_haltcnt(value.high_byte()),
            _ => {
                warn!("Write to unimplemented register {offset:03X} = {value:04X}");
            }
        }
    }

    fn io_write8(&mut self, offset: u32, value: u8) {
        // HALTCNT is the only byte-writable register the scheduler cares
        // about. Other byte writes modify their halfword in place.
        if offset == 0x301 {
            self.irq.write_haltcnt(value);
            return;
        }
        let mut halfword = self.io_read16(offset & !1);
        if offset & 1 == 0 {
            halfword.set_low_byte(value);
        } else {
            halfword.set_high_byte(value);
        }
        self.io_write16(offset & !1, halfword);
    }

    /// Registers 0B0-0DE: DMA channel N at 0B0 + N * 12. Source, dest and
    /// count are write-only.
    fn dma_write16(&mut self, offset: u32, value: u16) {
        let relative = offset - 0xB0;
        let id = (relative / 12) as usize;
        let channel = &mut self.dma.channels[id];
        match relative % 12 {
            0 => channel.source.set_low_word(value),
            2 => channel.source.set_high_word(value),
            4 => channel.dest.set_low_word(value),
            6 => channel.dest.set_high_word(value),
            8 => channel.count = value,
            10 => channel.write_control(id, value),
            _ => {}
        }
    }

    fn dma_read16(&self, offset: u32) -> u16 {
        let relative = offset - 0xB0;
        let id = (relative / 12) as usize;
        match relative % 12 {
            10 => self.dma.channels[id].read_control(),
            _ => 0,
        }
    }

    /// Registers 100-10E: Timer N at 100 + N * 4.
    fn timer_write16(&mut self, offset: u32, value: u16) {
        let relative = offset - 0x100;
        let timer = &mut self.timers.timers[(relative / 4) as usize];
        match relative % 4 {
            0 => timer.write_reload(value),
            2 => timer.write_control(value.low_byte()),
            _ => {}
        }
    }

    fn timer_read16(&self, offset: u32) -> u16 {
        let relative = offset - 0x100;
        let timer = &self.timers.timers[(relative / 4) as usize];
        match relative % 4 {
            0 => timer.counter(),
            2 => timer.read_control() as u16,
            _ => 0,
        }
    }

    /// Advances the timer bank and fans overflows out to interrupt and FIFO
    /// consumers.
    pub fn step_timers(&mut self, ticks: u32) {
        let overflows = self.timers.step(ticks);
        for (id, times) in overflows.into_iter().enumerate() {
            if times == 0 {
                continue;
            }
            if self.timers.timers[id].control().irq_enable {
                self.irq.raise(Interrupt::timer(id));
            }
            if id < 2 {
                let refill = self.apu.on_timer_overflow(id, times);
                if refill[0] {
                    self.dma.request_fifo(FIFO_A_ADDR);
                }
                if refill[1] {
                    self.dma.request_fifo(FIFO_B_ADDR);
                }
            }
        }
    }

    /// Advances the video stepper by one cycle and fans the resulting events
    /// out to the interrupt and DMA controllers. The caller handles render
    /// requests from the returned events.
    pub fn tick_video(&mut self) -> Option<VideoEvents> {
        let events = self.video.tick()?;
        if events.vblank_irq {
            self.irq.raise(Interrupt::VBlank);
        }
        if events.hblank_irq {
            self.irq.raise(Interrupt::HBlank);
        }
        if events.vcount_irq {
            self.irq.raise(Interrupt::VCount);
        }
        if events.vblank_start {
            self.dma.on_vblank();
        }
        if events.hblank_dma {
            self.dma.on_hblank();
        }
        Some(events)
    }

    /// Executes one pending DMA transfer unit. Returns false when no channel
    /// has work.
    pub fn run_dma(&mut self) -> bool {
        let Some(unit) = self.dma.next_unit() else {
            return false;
        };
        self.execute_dma_unit(unit);
        true
    }

    fn execute_dma_unit(&mut self, unit: DmaUnit) {
        if unit.word_transfer {
            let value = self.bus_read32(unit.source);
            self.bus_write32(unit.dest, value);
        } else {
            let value = self.bus_read16(unit.source);
            self.bus_write16(unit.dest, value);
        }
        if unit.finished {
            trace!("DMA {} finished", unit.channel);
            if unit.irq {
                self.irq.raise(Interrupt::dma(unit.channel));
            }
        }
    }

    /// Updates one key in KEYINPUT. The register stores keys active low.
    pub fn set_key_state(&mut self, key: Key, pressed: bool) {
        self.keyinput.set_bit(key as usize, !pressed);
    }

    pub fn reset(&mut self) {
        self.ewram.fill(0);
        self.iwram.fill(0);
        self.irq.reset();
        self.timers.reset();
        self.dma.reset();
        self.video.reset();
        self.apu.reset();
        self.keyinput = 0x03FF;
    }
}
