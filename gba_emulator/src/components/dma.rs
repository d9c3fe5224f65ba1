//! DMA controller with cycle-interleaved transfers.
//!
//! The controller evaluates pending requests and hands out at most one
//! transfer unit per scheduling pass, so DMA traffic is charged against the
//! same cycle budget the CPU uses. The bus performs the actual memory copy:
//! the controller only computes addresses and bookkeeping.

use std::fmt::Display;

use log::trace;
use packed_struct::prelude::*;

pub const NUM_CHANNELS: usize = 4;

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressAdjust {
    #[default]
    Increment = 0,
    Decrement = 1,
    Fixed = 2,
    /// Increment during the transfer, reload on repeat. Destination only.
    IncrementReload = 3,
}

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartTiming {
    #[default]
    Immediate = 0,
    VBlank = 1,
    HBlank = 2,
    /// Channels 1/2: sound FIFO refill. Channel 3: video capture.
    Special = 3,
}

/// Register 0BN+A: DMAnCNT_H - DMA channel N control
/// 15   bit    0
/// ---- ----  ---- ----
/// EITT GWRS  SDD. ....
/// |||| ||||  |||
/// |||| ||||  |++------- Destination adjust: 0=inc, 1=dec, 2=fixed, 3=inc/reload
/// |||| |||+--+--------- Source adjust: 0=inc, 1=dec, 2=fixed
/// |||| ||+------------- Repeat on every trigger
/// |||| |+-------------- Transfer size: 0=halfword, 1=word
/// |||| +--------------- Game pak DRQ (channel 3 only)
/// ||++----------------- Start timing: 0=immediate, 1=vblank, 2=hblank, 3=special
/// |+------------------- IRQ on transfer complete
/// +-------------------- Channel enable
#[derive(PackedStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0")]
pub struct DmaControl {
    pub enable: bool,
    pub irq_enable: bool,
    #[packed_field(size_bits = "2", ty = "enum")]
    pub timing: StartTiming,
    pub gamepak_drq: bool,
    pub word_transfer: bool,
    pub repeat: bool,
    #[packed_field(size_bits = "2", ty = "enum")]
    pub source_adjust: AddressAdjust,
    #[packed_field(size_bits = "2", ty = "enum")]
    pub dest_adjust: AddressAdjust,
    #[packed_field(size_bits = "5")]
    pub _unused: u8,
}

/// A single transfer unit (one halfword or word copy) to be executed by the
/// bus, plus completion bookkeeping for the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaUnit {
    pub channel: usize,
    pub source: u32,
    pub dest: u32,
    pub word_transfer: bool,
    /// Set on the last unit of a request.
    pub finished: bool,
    /// Raise the channel's interrupt when `finished`.
    pub irq: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DmaChannel {
    pub source: u32,
    pub dest: u32,
    pub count: u16,
    pub control: DmaControl,

    internal_source: u32,
    internal_dest: u32,
    remaining: u32,
    /// True while a triggered request still has units to transfer.
    active: bool,
    /// True while the request being serviced is a FIFO refill.
    fifo_mode: bool,
}

impl Display for DmaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08X} -> {:08X} x{} {} {:?}",
            self.internal_source,
            self.internal_dest,
            self.remaining,
            if self.control.word_transfer { "w" } else { "h" },
            self.control.timing,
        )
    }
}

impl DmaChannel {
    fn transfer_count(&self, id: usize) -> u32 {
        let max = if id == 3 { 0x10000 } else { 0x4000 };
        match self.count as u32 {
            0 => max,
            n => n.min(max),
        }
    }

    fn trigger(&mut self, id: usize, fifo_mode: bool) {
        if fifo_mode {
            // FIFO refills always move 4 words to a fixed destination.
            self.remaining = 4;
        } else {
            self.remaining = self.transfer_count(id);
            if self.control.dest_adjust == AddressAdjust::IncrementReload {
                self.internal_dest = self.dest;
            }
        }
        self.fifo_mode = fifo_mode;
        self.active = true;
        trace!("DMA {id} triggered: {self}");
    }

    pub fn write_control(&mut self, id: usize, value: u16) {
        let new_control = DmaControl::unpack_from_slice(&value.to_be_bytes()).unwrap();
        let enabled = new_control.enable && !self.control.enable;
        self.control = new_control;
        if enabled {
            // 0->1 enable transition latches the internal addresses.
            self.internal_source = self.source;
            self.internal_dest = self.dest;
            if self.control.timing == StartTiming::Immediate {
                self.trigger(id, false);
            }
        } else if !new_control.enable {
            self.active = false;
        }
    }

    pub fn read_control(&self) -> u16 {
        u16::from_be_bytes(self.control.pack().unwrap())
    }

    /// Produces the next transfer unit and advances the internal addresses.
    fn next_unit(&mut self, id: usize) -> DmaUnit {
        debug_assert!(self.active && self.remaining > 0);
        let word_transfer = self.control.word_transfer || self.fifo_mode;
        let unit_size = if word_transfer { 4 } else { 2 };

        let unit_source = self.internal_source;
        let unit_dest = self.internal_dest;

        match self.control.source_adjust {
            AddressAdjust::Decrement => {
                self.internal_source = self.internal_source.wrapping_sub(unit_size)
            }
            AddressAdjust::Fixed => {}
            _ => self.internal_source = self.internal_source.wrapping_add(unit_size),
        }
        if !self.fifo_mode {
            match self.control.dest_adjust {
                AddressAdjust::Decrement => {
                    self.internal_dest = self.internal_dest.wrapping_sub(unit_size)
                }
                AddressAdjust::Fixed => {}
                _ => self.internal_dest = self.internal_dest.wrapping_add(unit_size),
            }
        }

        self.remaining -= 1;
        let finished = self.remaining == 0;
        if finished {
            self.active = false;
            // Non-repeating requests disable the channel entirely.
            if !self.control.repeat || self.control.timing == StartTiming::Immediate {
                self.control.enable = false;
            }
        }

        DmaUnit {
            channel: id,
            source: unit_source,
            dest: unit_dest,
            word_transfer,
            finished,
            irq: self.control.irq_enable,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DmaController {
    pub channels: [DmaChannel; NUM_CHANNELS],
}

impl DmaController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.channels.iter().any(|channel| channel.active)
    }

    /// Returns the next transfer unit of the highest-priority active channel.
    /// Channel 0 has the highest priority.
    pub fn next_unit(&mut self) -> Option<DmaUnit> {
        for id in 0..NUM_CHANNELS {
            if self.channels[id].active {
                return Some(self.channels[id].next_unit(id));
            }
        }
        None
    }

    /// Arms channels configured for vblank start timing.
    pub fn on_vblank(&mut self) {
        self.trigger_timing(StartTiming::VBlank);
    }

    /// Arms channels configured for hblank start timing.
    pub fn on_hblank(&mut self) {
        self.trigger_timing(StartTiming::HBlank);
    }

    fn trigger_timing(&mut self, timing: StartTiming) {
        for id in 0..NUM_CHANNELS {
            let channel = &mut self.channels[id];
            if channel.control.enable && !channel.active && channel.control.timing == timing {
                channel.trigger(id, false);
            }
        }
    }

    /// Requests a FIFO refill transfer towards `fifo_addr`. Only channels 1
    /// and 2 in special timing mode can service sound FIFOs.
    pub fn request_fifo(&mut self, fifo_addr: u32) {
        for id in 1..=2 {
            let channel = &mut self.channels[id];
            if channel.control.enable
                && !channel.active
                && channel.control.timing == StartTiming::Special
                && channel.internal_dest == fifo_addr
            {
                channel.trigger(id, true);
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
