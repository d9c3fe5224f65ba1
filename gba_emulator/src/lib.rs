//! Cycle-accurate scheduler for a GBA-class system.
//!
//! [System] drives a pluggable CPU core and the bus peripherals in lockstep:
//! the CPU executes one instruction at a time and the peripherals are
//! forwarded by the instruction's cycle cost. DMA transfers interleave with
//! CPU execution one unit per cycle.

pub mod apu;
pub mod common;
pub mod components;
pub mod cpu;
pub mod debugger;
pub mod main_bus;

use std::cell::RefCell;
use std::cell::RefMut;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::bail;

use crate::apu::AudioConfig;
use crate::apu::AudioRingBuffer;
use crate::common::util::EdgeDetector;
use crate::components::irq::HaltState;
use crate::components::video::CYCLES_PER_LINE;
use crate::components::video::TOTAL_LINES;
use crate::cpu::CpuCore;
use crate::cpu::ExecutionHookRef;
use crate::debugger::Debugger;
use crate::debugger::DebuggerRef;
use crate::main_bus::Key;
use crate::main_bus::MainBus;

/// CPU clock in Hz.
pub const CLOCK_SPEED: u32 = 16_777_216;
/// Scheduler cycles per video frame (228 lines of 1232 cycles).
pub const FRAME_CYCLES: u32 = CYCLES_PER_LINE * TOTAL_LINES as u32;
/// PSG channels run at a quarter of the CPU clock.
pub const PSG_CLOCK_DIVIDER: u64 = 4;

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Emulated frames advanced per [System::run_frame] call. Only the last
    /// one is rendered.
    pub speed_multiplier: u32,
    /// Number of frames to skip rendering between rendered frames.
    pub frameskip: u32,
    pub audio: AudioConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            speed_multiplier: 1,
            frameskip: 0,
            audio: AudioConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.speed_multiplier == 0 {
            bail!("speed_multiplier must be at least 1");
        }
        if self.audio.output_sample_rate == 0 {
            bail!("output_sample_rate must be non-zero");
        }
        if self.audio.buffer_capacity == 0 {
            bail!("audio buffer_capacity must be non-zero");
        }
        Ok(())
    }
}

/// Receives finished scanlines from the scheduler. Rendering itself is up to
/// the frontend.
pub trait ScanlineRenderer {
    fn on_scanline(&mut self, line: u16);
}

pub struct System<CpuT: CpuCore> {
    pub cpu: CpuT,
    pub bus: MainBus,
    config: Config,
    renderer: Option<Box<dyn ScanlineRenderer>>,
    debugger: DebuggerRef,

    /// Position inside the current run_frame window. Overshoot from the last
    /// CPU instruction carries into the next frame.
    frame_cycles: u64,
    /// Monotonic tick counter, used to derive the PSG clock.
    total_ticks: u64,
    /// Turns the level-triggered `IME && (IE & IF)` condition into a single
    /// dispatch per pending episode.
    irq_edge: EdgeDetector,
    frame_counter: u64,
    did_render: bool,
}

impl<CpuT: CpuCore> System<CpuT> {
    pub fn new(mut cpu: CpuT, rom: Vec<u8>, config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let debugger = Rc::new(RefCell::new(Debugger::new()));
        cpu.set_execution_hook(Some(debugger.clone() as ExecutionHookRef));
        Ok(Self {
            cpu,
            bus: MainBus::new(rom, &config.audio),
            config,
            renderer: None,
            debugger,
            frame_cycles: 0,
            total_ticks: 0,
            irq_edge: EdgeDetector::new(),
            frame_counter: 0,
            did_render: false,
        })
    }

    /// Runs one output frame: `speed_multiplier` emulated frames of
    /// [FRAME_CYCLES] cycles each. Returns true when a frame was rendered.
    pub fn run_frame(&mut self) -> bool {
        self.did_render = false;
        let speed = self.config.speed_multiplier as u64;
        let total = FRAME_CYCLES as u64 * speed;
        let render_frame = self.frame_counter % (self.config.frameskip as u64 + 1) == 0;

        while self.frame_cycles < total {
            // Render only during the last sub-frame pass.
            let render = render_frame && self.frame_cycles / FRAME_CYCLES as u64 == speed - 1;

            self.bus.irq.update_halt_state();
            self.irq_edge
                .update_signal(self.bus.irq.master_enable && self.bus.irq.pending() != 0);

            match self.bus.irq.halt_state {
                HaltState::Stopped => {
                    // Stop freezes all hardware stepping. Cycles still pass
                    // so the frame window completes.
                    self.frame_cycles += 1;
                }
                HaltState::Halted => {
                    // DMA keeps running while the CPU sleeps.
                    self.bus.run_dma();
                    self.forward(1, render);
                }
                HaltState::Running => {
                    if self.irq_edge.consume_rise() {
                        self.cpu.raise_irq(&mut self.bus);
                    }
                    // At most one DMA unit per pass, ahead of the
                    // instruction.
                    self.bus.run_dma();
                    let cycles = self.cpu.step(&mut self.bus).max(1);
                    self.forward(cycles, render);
                }
            }
        }
        self.frame_cycles -= total;
        self.frame_counter += 1;
        self.did_render
    }

    /// Forwards the peripherals by the given number of cycles.
    fn forward(&mut self, cycles: u32, render: bool) {
        self.frame_cycles += cycles as u64;
        for _ in 0..cycles {
            self.total_ticks += 1;
            self.bus.step_timers(1);
            if self.total_ticks % PSG_CLOCK_DIVIDER == 0 {
                self.bus.apu.step_psg();
            }
            self.bus.apu.tick();

            if let Some(events) = self.bus.tick_video() {
                if render {
                    if let Some(line) = events.scanline_ready {
                        if let Some(renderer) = &mut self.renderer {
                            renderer.on_scanline(line);
                        }
                    }
                    if events.frame_complete {
                        self.did_render = true;
                    }
                }
            }
        }
    }

    pub fn set_speed_multiplier(&mut self, speed_multiplier: u32) -> anyhow::Result<()> {
        if speed_multiplier == 0 {
            bail!("speed_multiplier must be at least 1");
        }
        self.config.speed_multiplier = speed_multiplier;
        Ok(())
    }

    pub fn set_frameskip(&mut self, frameskip: u32) {
        self.config.frameskip = frameskip;
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn ScanlineRenderer>) {
        self.renderer = Some(renderer);
    }

    pub fn set_key_state(&mut self, key: Key, pressed: bool) {
        self.bus.set_key_state(key, pressed);
    }

    pub fn audio_buffer(&self) -> Arc<AudioRingBuffer> {
        self.bus.apu.audio_buffer()
    }

    /// Exposes the interactive debugger to set breakpoints and inspect hits.
    pub fn debugger(&self) -> RefMut<'_, Debugger> {
        self.debugger.deref().borrow_mut()
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.frame_cycles = 0;
        self.total_ticks = 0;
        self.irq_edge = EdgeDetector::new();
        self.frame_counter = 0;
        self.did_render = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_cycle_count_matches_scanline_timing() {
        assert_eq!(FRAME_CYCLES, 280_896);
        assert_eq!(CLOCK_SPEED / apu::NATIVE_SAMPLE_RATE, 512);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
        let mut config = Config::default();
        config.speed_multiplier = 0;
        assert!(config.validate().is_err());
        let mut config = Config::default();
        config.audio.buffer_capacity = 0;
        assert!(config.validate().is_err());
    }
}
