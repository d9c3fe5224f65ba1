//! Scanline/dot timing of the video hardware.
//!
//! Only the stepper is implemented here: it advances the per-line phase
//! machine, raises the DISPSTAT driven interrupts and signals when a scanline
//! is ready to render. Pixel rendering itself is an external collaborator
//! reached through [crate::ScanlineRenderer].

use bilge::prelude::*;

/// Cycles of the visible portion of a scanline.
pub const CYCLES_VISIBLE: u32 = 960;
/// Cycles of the hblank portion of a scanline.
pub const CYCLES_HBLANK: u32 = 272;
/// Total cycles per scanline.
pub const CYCLES_PER_LINE: u32 = CYCLES_VISIBLE + CYCLES_HBLANK;
/// Visible scanlines per frame.
pub const VISIBLE_LINES: u16 = 160;
/// Total scanlines per frame, including vblank.
pub const TOTAL_LINES: u16 = 228;

/// Register 004: DISPSTAT - General video status
#[bitsize(16)]
#[derive(Clone, Copy, DebugBits, Default, FromBits, PartialEq)]
pub struct DispStat {
    /// Set while vcount is in 160..227.
    pub vblank_flag: bool,
    /// Set during the hblank portion of every line.
    pub hblank_flag: bool,
    /// Set while vcount matches the vcount target.
    pub vcount_flag: bool,
    pub vblank_irq_enable: bool,
    pub hblank_irq_enable: bool,
    pub vcount_irq_enable: bool,
    reserved: u2,
    pub vcount_target: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Visible,
    HBlank,
}

/// Events produced by a single stepper transition, consumed by the frame
/// scheduler to fan out interrupts, DMA triggers and render requests.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct VideoEvents {
    /// The given scanline finished its visible portion and can be rendered.
    pub scanline_ready: Option<u16>,
    /// Entered hblank on a visible line (hblank DMA trigger point).
    pub hblank_dma: bool,
    /// Entered the vblank region (vblank DMA trigger point).
    pub vblank_start: bool,
    /// The last scanline of the frame completed.
    pub frame_complete: bool,
    pub vblank_irq: bool,
    pub hblank_irq: bool,
    pub vcount_irq: bool,
}

#[derive(Clone, PartialEq, Debug)]
pub struct VideoStepper {
    dispstat: DispStat,
    vcount: u16,
    phase: Phase,
    wait_cycles: u32,
}

impl Default for VideoStepper {
    fn default() -> Self {
        Self {
            dispstat: DispStat::default(),
            vcount: 0,
            phase: Phase::Visible,
            wait_cycles: CYCLES_VISIBLE - 1,
        }
    }
}

impl VideoStepper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vcount(&self) -> u16 {
        self.vcount
    }

    pub fn in_vblank(&self) -> bool {
        self.dispstat.vblank_flag()
    }

    /// Advances the stepper by one cycle. Returns events on phase
    /// transitions, which happen when the internal wait counter runs out.
    pub fn tick(&mut self) -> Option<VideoEvents> {
        if self.wait_cycles > 0 {
            self.wait_cycles -= 1;
            return None;
        }
        Some(self.step())
    }

    fn step(&mut self) -> VideoEvents {
        let mut events = VideoEvents::default();
        match self.phase {
            Phase::Visible => {
                self.phase = Phase::HBlank;
                self.wait_cycles = CYCLES_HBLANK - 1;
                self.dispstat.set_hblank_flag(true);

                // The hblank IRQ fires on every line, hblank DMA only on
                // visible lines.
                if self.dispstat.hblank_irq_enable() {
                    events.hblank_irq = true;
                }
                if self.vcount < VISIBLE_LINES {
                    events.hblank_dma = true;
                    events.scanline_ready = Some(self.vcount);
                }
            }
            Phase::HBlank => {
                self.phase = Phase::Visible;
                self.wait_cycles = CYCLES_VISIBLE - 1;
                self.dispstat.set_hblank_flag(false);

                self.vcount += 1;
                if self.vcount == VISIBLE_LINES {
                    self.dispstat.set_vblank_flag(true);
                    events.vblank_start = true;
                    if self.dispstat.vblank_irq_enable() {
                        events.vblank_irq = true;
                    }
                } else if self.vcount == TOTAL_LINES {
                    self.vcount = 0;
                    self.dispstat.set_vblank_flag(false);
                    events.frame_complete = true;
                }

                let vcount_match = self.vcount == self.dispstat.vcount_target() as u16;
                if vcount_match && !self.dispstat.vcount_flag() && self.dispstat.vcount_irq_enable()
                {
                    events.vcount_irq = true;
                }
                self.dispstat.set_vcount_flag(vcount_match);
            }
        }
        events
    }

    /// Register 004: DISPSTAT. The flag bits are read-only.
    pub fn write_dispstat(&mut self, value: u16) {
        let flags = u16::from(self.dispstat) & 0x0007;
        self.dispstat = DispStat::from((value & !0x0007) | flags);
    }

    pub fn read_dispstat(&self) -> u16 {
        self.dispstat.into()
    }

    /// Register 006: VCOUNT - Current scanline. Read-only.
    pub fn read_vcount(&self) -> u16 {
        self.vcount
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
