//! Hardware blocks driven by the frame scheduler.

pub mod dma;
pub mod irq;
pub mod timers;
pub mod video;
