// File I/O operations

pub mod handoff;

pub use handoff::{Checkpoint, HandoffConfig, RawSnapshot, TimeRange};
