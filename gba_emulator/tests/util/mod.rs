//! Scripted CPU core for driving the scheduler in tests.

use std::collections::VecDeque;

use gba_emulator::cpu::CpuCore;
use gba_emulator::cpu::CpuMode;
use gba_emulator::cpu::ExecutionHookRef;
use gba_emulator::main_bus::MainBus;

/// One scripted instruction. After the script runs out the core executes
/// `Idle` forever.
#[derive(Clone, Copy, Debug)]
pub enum Action {
    Idle,
    Write8(u32, u8),
    Write16(u32, u16),
    Write32(u32, u32),
    /// Halt until one of the masked interrupts becomes pending, mirroring
    /// the BIOS IntrWait call.
    IntrWait(u16),
}

pub struct ScriptedCpu {
    script: VecDeque<Action>,
    cycles_per_step: u32,
    pc: u32,
    hook: Option<ExecutionHookRef>,

    pub executed: u64,
    pub irq_raises: u32,
}

impl ScriptedCpu {
    pub fn new(script: Vec<Action>) -> Self {
        Self::with_cycles_per_step(script, 1)
    }

    pub fn with_cycles_per_step(script: Vec<Action>, cycles_per_step: u32) -> Self {
        Self {
            script: script.into(),
            cycles_per_step,
            pc: 0x0800_0000,
            hook: None,
            executed: 0,
            irq_raises: 0,
        }
    }
}

impl CpuCore for ScriptedCpu {
    fn step(&mut self, bus: &mut MainBus) -> u32 {
        if let Some(hook) = &self.hook {
            hook.borrow_mut().on_execute(self.pc, CpuMode::Arm);
        }
        self.pc = self.pc.wrapping_add(4);
        self.executed += 1;
        match self.script.pop_front() {
            Some(Action::Write8(addr, value)) => bus.bus_write8(addr, value),
            Some(Action::Write16(addr, value)) => bus.bus_write16(addr, value),
            Some(Action::Write32(addr, value)) => bus.bus_write32(addr, value),
            Some(Action::IntrWait(mask)) => bus.irq.start_interrupt_wait(mask),
            Some(Action::Idle) | None => {}
        }
        self.cycles_per_step
    }

    fn raise_irq(&mut self, _bus: &mut MainBus) {
        self.irq_raises += 1;
    }

    fn set_execution_hook(&mut self, hook: Option<ExecutionHookRef>) {
        self.hook = hook;
    }

    fn reset(&mut self) {
        self.pc = 0x0800_0000;
        self.executed = 0;
        self.irq_raises = 0;
    }
}
