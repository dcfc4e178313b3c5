//! Nightshade Autofocus Engine
//!
//! Curve fitting and the sampling state machine behind a focuser autofocus run.
//! The engine is driven one frame at a time: the caller moves the focuser,
//! measures star HFD, and passes the sample to [`AutoFocus::add`], which replies
//! with the next move or a final result. [`BacklashCompensator`] turns the
//! requested positions into the moves to actually command.

mod backlash;
mod engine;
mod error;
pub mod linalg;
mod options;
mod point;
pub mod regression;

pub use backlash::*;
pub use engine::*;
pub use error::*;
pub use options::*;
pub use point::*;
