//! CPU core seam.
//!
//! The scheduler drives any core implementing [CpuCore]. The core executes
//! one instruction per [CpuCore::step] call against the bus and reports its
//! cycle cost, which the scheduler uses to keep the peripherals in lockstep.

use std::cell::RefCell;
use std::rc::Rc;

use strum::Display;
use strum::EnumString;

use crate::main_bus::MainBus;

#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum CpuMode {
    Arm,
    Thumb,
}

/// Called before each instruction executes. Hooks observe execution but
/// cannot alter scheduling.
pub trait ExecutionHook {
    fn on_execute(&mut self, address: u32, mode: CpuMode);
}

pub type ExecutionHookRef = Rc<RefCell<dyn ExecutionHook>>;

pub trait CpuCore {
    /// Executes one instruction and returns its cost in scheduler cycles.
    /// Must return at least 1.
    fn step(&mut self, bus: &mut MainBus) -> u32;

    /// Enters the core's interrupt dispatch sequence.
    fn raise_irq(&mut self, bus: &mut MainBus);

    fn set_execution_hook(&mut self, hook: Option<ExecutionHookRef>);

    fn reset(&mut self);
}
