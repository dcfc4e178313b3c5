//! Nightshade Autofocus Sequencer
//!
//! The control loop around the autofocus engine: it owns the focuser and the
//! measurement source, applies backlash compensation, and reports the outcome.

pub mod autofocus_instructions;
pub mod device_ops;

pub use autofocus_instructions::*;
pub use device_ops::*;
