//! Debugger functionality
//!
//! Tracks execution breakpoints and records hits reported by the CPU core's
//! execution hook. The debugger only observes: a hit is recorded for the
//! frontend to pick up, scheduling is never altered.

use std::cell::RefCell;
use std::fmt::Display;
use std::fmt::UpperHex;
use std::rc::Rc;
use std::str::FromStr;

use itertools::Itertools;
use num_traits::PrimInt;

use crate::common::util::RingBuffer;
use crate::cpu::CpuMode;
use crate::cpu::ExecutionHook;

/// An execution breakpoint on an instruction address in a specific CPU mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub address: u32,
    pub mode: CpuMode,
}

impl FromStr for Breakpoint {
    type Err = anyhow::Error;

    /// Parses `[arm|thumb] ADDR` with a hex address. The mode defaults to
    /// arm.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, addr) = match s.split_once(' ') {
            Some((key, arg)) => (CpuMode::from_str(key.trim())?, arg.trim()),
            None => (CpuMode::Arm, s.trim()),
        };
        Ok(Breakpoint {
            address: parse_hex(addr)?,
            mode,
        })
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:X}", self.mode, self.address)
    }
}

/// An owned collection of breakpoints. Cloning yields an independent set, so
/// frontends can edit a copy and swap it in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    breakpoints: Vec<Breakpoint>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, breakpoint: &Breakpoint) -> bool {
        self.breakpoints.iter().any(|b| b == breakpoint)
    }

    pub fn add(&mut self, breakpoint: Breakpoint) {
        if !self.contains(&breakpoint) {
            self.breakpoints.push(breakpoint);
        }
    }

    pub fn remove(&mut self, breakpoint: &Breakpoint) {
        self.breakpoints.retain(|b| b != breakpoint);
    }

    pub fn toggle(&mut self, breakpoint: Breakpoint) {
        if self.contains(&breakpoint) {
            self.remove(&breakpoint);
        } else {
            self.add(breakpoint);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }
}

impl Display for BreakpointSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.breakpoints.iter().join(", "))
    }
}

/// A breakpoint hit recorded during execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakHit {
    pub breakpoint: Breakpoint,
}

pub struct Debugger {
    pub breakpoints: BreakpointSet,
    pub hit_log: RingBuffer<BreakHit, 1024>,
    break_reason: Option<BreakHit>,
    pub enabled: bool,
}

pub type DebuggerRef = Rc<RefCell<Debugger>>;

impl Debugger {
    pub fn new() -> Self {
        Self {
            breakpoints: BreakpointSet::new(),
            hit_log: RingBuffer::default(),
            break_reason: None,
            enabled: false,
        }
    }

    pub fn take_break_reason(&mut self) -> Option<BreakHit> {
        self.break_reason.take()
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionHook for Debugger {
    fn on_execute(&mut self, address: u32, mode: CpuMode) {
        if !self.enabled {
            return;
        }
        let breakpoint = Breakpoint { address, mode };
        if self.breakpoints.contains(&breakpoint) {
            let hit = BreakHit { breakpoint };
            self.break_reason = Some(hit);
            self.hit_log.push(hit);
        }
    }
}

/// Parses a hex address string like `0800A130`.
fn parse_hex<T: PrimInt + UpperHex>(s: &str) -> anyhow::Result<T> {
    T::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| anyhow::anyhow!("Invalid hex address: {s}"))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_breakpoint() {
        assert_eq!(
            Breakpoint::from_str("8000").unwrap(),
            Breakpoint {
                address: 0x8000,
                mode: CpuMode::Arm
            }
        );
        assert_eq!(
            Breakpoint::from_str("thumb 0x0800A130").unwrap(),
            Breakpoint {
                address: 0x0800_A130,
                mode: CpuMode::Thumb
            }
        );
        assert!(Breakpoint::from_str("xyz 8000").is_err());
        assert!(Breakpoint::from_str("nothex").is_err());
    }

    #[test]
    fn test_breakpoint_round_trips_through_display() {
        let breakpoint = Breakpoint::from_str("thumb 3001FC0").unwrap();
        assert_eq!(
            Breakpoint::from_str(&breakpoint.to_string()).unwrap(),
            breakpoint
        );
    }

    #[test]
    fn test_set_add_remove_toggle() {
        let mut set = BreakpointSet::new();
        let a = Breakpoint::from_str("8000").unwrap();
        let b = Breakpoint::from_str("thumb 8004").unwrap();

        set.add(a);
        set.add(a);
        assert_eq!(set.iter().count(), 1);

        set.toggle(b);
        assert!(set.contains(&b));
        set.toggle(b);
        assert!(!set.contains(&b));

        set.remove(&a);
        assert!(set.is_empty());
    }

    #[test]
    fn test_cloned_set_is_independent() {
        let mut set = BreakpointSet::new();
        set.add(Breakpoint::from_str("8000").unwrap());
        let mut copy = set.clone();
        copy.add(Breakpoint::from_str("9000").unwrap());
        assert_eq!(set.iter().count(), 1);
        assert_eq!(copy.iter().count(), 2);
    }

    #[test]
    fn test_hook_records_hits_only_when_enabled() {
        let mut debugger = Debugger::new();
        debugger
            .breakpoints
            .add(Breakpoint::from_str("8000").unwrap());

        debugger.on_execute(0x8000, CpuMode::Arm);
        assert_eq!(debugger.take_break_reason(), None);

        debugger.enabled = true;
        debugger.on_execute(0x8000, CpuMode::Thumb);
        assert_eq!(debugger.take_break_reason(), None);

        debugger.on_execute(0x8000, CpuMode::Arm);
        let hit = debugger.take_break_reason().unwrap();
        assert_eq!(hit.breakpoint.address, 0x8000);
        assert_eq!(debugger.take_break_reason(), None);
    }

    #[test]
    fn test_set_display_joins_breakpoints() {
        let mut set = BreakpointSet::new();
        set.add(Breakpoint::from_str("8000").unwrap());
        set.add(Breakpoint::from_str("thumb A130").unwrap());
        assert_eq!(set.to_string(), "arm 8000, thumb A130");
    }
}
