//! Bank of four cascadable 16-bit timers.
//!
//! Timers advance on prescaled scheduler ticks. Overflows reload the counter
//! from the reload register and are reported per batched [TimerBank::step]
//! call, so a single large tick batch yields the exact overflow count rather
//! than just the first one. A timer in cascade mode ignores the prescaler and
//! instead counts overflows of its predecessor.

use packed_struct::prelude::*;

pub const NUM_TIMERS: usize = 4;

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Prescaler {
    #[default]
    Div1 = 0,
    Div64 = 1,
    Div256 = 2,
    Div1024 = 3,
}

impl Prescaler {
    pub fn divisor(self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }
}

/// Register 10N+2: TMnCNT_H - Timer N control
/// 7  bit  0
/// ---- ----
/// EI.. .CPP
/// ||     |||
/// ||     |++- Prescaler: 0=F/1, 1=F/64, 2=F/256, 3=F/1024
/// ||     +--- Cascade: count overflows of timer N-1 instead of ticks
/// |+--------- IRQ enable on overflow
/// +---------- Timer enable
#[derive(PackedStruct, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0")]
pub struct TimerControl {
    pub enable: bool,
    pub irq_enable: bool,
    #[packed_field(size_bits = "3")]
    pub _unused: u8,
    pub cascade: bool,
    #[packed_field(size_bits = "2", ty = "enum")]
    pub prescaler: Prescaler,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    counter: u16,
    reload: u16,
    control: TimerControl,
    prescaler_counter: u32,
}

impl Timer {
    /// Applies `increments` counter steps, returning the number of overflows.
    fn increment(&mut self, increments: u32) -> u32 {
        let space = 0x10000 - self.counter as u32;
        if increments < space {
            self.counter += increments as u16;
            return 0;
        }
        // Reload of 0xFFFF makes the counter overflow on every increment.
        let period = 0x10000 - self.reload as u32;
        let past_overflow = increments - space;
        let times = 1 + past_overflow / period;
        let counter = self.reload as u32 + past_overflow % period;
        debug_assert!(counter <= 0xFFFF);
        self.counter = counter as u16;
        times
    }

    /// Advances the timer by raw scheduler ticks through the prescaler.
    fn step_ticks(&mut self, ticks: u32) -> u32 {
        let divisor = self.control.prescaler.divisor();
        let total = self.prescaler_counter + ticks;
        self.prescaler_counter = total % divisor;
        self.increment(total / divisor)
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn control(&self) -> TimerControl {
        self.control
    }

    /// Register 10N+0: TMnCNT_L - writes set the reload value, reads return
    /// the live counter.
    pub fn write_reload(&mut self, value: u16) {
        self.reload = value;
    }

    pub fn write_control(&mut self, value: u8) {
        let new_control = TimerControl::unpack_from_slice(&[value]).unwrap();
        // 0->1 enable transition latches the reload value into the counter.
        if new_control.enable && !self.control.enable {
            self.counter = self.reload;
            self.prescaler_counter = 0;
        }
        self.control = new_control;
    }

    pub fn read_control(&self) -> u8 {
        self.control.pack().unwrap()[0]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimerBank {
    pub timers: [Timer; NUM_TIMERS],
}

impl TimerBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances all timers by `ticks` and returns the overflow count of each.
    ///
    /// A cascading timer increments once per overflow of its predecessor
    /// within the same batch. Timer 0 has no predecessor; cascade mode stops
    /// it, as on hardware.
    pub fn step(&mut self, ticks: u32) -> [u32; NUM_TIMERS] {
        let mut overflows = [0; NUM_TIMERS];
        let mut previous_overflows = 0;
        for (id, timer) in self.timers.iter_mut().enumerate() {
            let times = if !timer.control.enable {
                0
            } else if timer.control.cascade {
                timer.increment(previous_overflows)
            } else {
                timer.step_ticks(ticks)
            };
            overflows[id] = times;
            previous_overflows = times;
        }
        overflows
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
