//! Traits and types used by all components of the emulator.

pub mod logging;
pub mod uint;
pub mod util;
