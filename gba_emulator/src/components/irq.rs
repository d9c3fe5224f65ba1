//! Interrupt controller and the halt/stop/interrupt-wait state machine.
//!
//! Pure register state plus transition rules. The frame scheduler is the only
//! caller of [InterruptController::update_halt_state]; components only raise
//! flags through [InterruptController::raise].

use intbits::Bits;
use log::trace;

/// One of the 14 interrupt sources of the hardware. The discriminant is the
/// bit index in the IE/IF registers.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Interrupt {
    VBlank = 0,
    HBlank = 1,
    VCount = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Serial = 7,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
    Keypad = 12,
    GamePak = 13,
}

impl Interrupt {
    pub fn timer(id: usize) -> Interrupt {
        match id {
            0 => Interrupt::Timer0,
            1 => Interrupt::Timer1,
            2 => Interrupt::Timer2,
            _ => Interrupt::Timer3,
        }
    }

    pub fn dma(channel: usize) -> Interrupt {
        match channel {
            0 => Interrupt::Dma0,
            1 => Interrupt::Dma1,
            2 => Interrupt::Dma2,
            _ => Interrupt::Dma3,
        }
    }
}

/// Low-power CPU states. `Halted` pauses instruction execution while
/// peripherals keep running, `Stopped` freezes all hardware stepping.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, strum::Display)]
pub enum HaltState {
    #[default]
    Running,
    Halted,
    Stopped,
}

/// Records that the CPU voluntarily halted awaiting a specific interrupt
/// subset (BIOS IntrWait semantics).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct InterruptWait {
    pub active: bool,
    pub mask: u16,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct InterruptController {
    /// IE - Interrupt enable mask
    pub enable: u16,
    /// IF - Interrupt request flags
    pub flags: u16,
    /// IME - Interrupt master enable
    pub master_enable: bool,
    pub halt_state: HaltState,
    pub wait: InterruptWait,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// An interrupt is pending iff it is both requested and enabled.
    pub fn pending(&self) -> u16 {
        self.enable & self.flags
    }

    pub fn raise(&mut self, interrupt: Interrupt) {
        trace!("irq raised: {interrupt}");
        self.flags.set_bit(interrupt as usize, true);
    }

    /// Wake-on-interrupt rule, applied once per scheduler cycle: a halted or
    /// stopped CPU resumes when a pending interrupt exists, unless an
    /// interrupt-wait is active and the pending set misses its mask.
    pub fn update_halt_state(&mut self) {
        let pending = self.pending();
        if self.halt_state == HaltState::Running || pending == 0 {
            return;
        }
        if !self.wait.active || (pending & self.wait.mask) != 0 {
            self.halt_state = HaltState::Running;
            self.wait = InterruptWait::default();
        }
    }

    /// Begin an interrupt-wait: halt until one of the interrupts in `mask`
    /// becomes pending.
    pub fn start_interrupt_wait(&mut self, mask: u16) {
        self.halt_state = HaltState::Halted;
        self.wait = InterruptWait { active: true, mask };
    }

    /// Register 200: IE - Interrupt Enable
    pub fn write_ie(&mut self, value: u16) {
        self.enable = value & 0x3FFF;
    }

    pub fn read_ie(&self) -> u16 {
        self.enable
    }

    /// Register 202: IF - Interrupt Request Flags
    ///
    /// Writing 1 to a bit acknowledges (clears) that request.
    pub fn write_if(&mut self, value: u16) {
        self.flags &= !value;
    }

    pub fn read_if(&self) -> u16 {
        self.flags
    }

    /// Register 208: IME - Interrupt Master Enable
    pub fn write_ime(&mut self, value: u16) {
        self.master_enable = value.bit(0);
    }

    pub fn read_ime(&self) -> u16 {
        self.master_enable as u16
    }

    /// Register 301: HALTCNT - Low Power Mode Control
    ///
    /// Bit 7 selects Stop, otherwise Halt. Write-only.
    pub fn write_haltcnt(&mut self, value: u8) {
        self.halt_state = if value.bit(7) {
            HaltState::Stopped
        } else {
            HaltState::Halted
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
