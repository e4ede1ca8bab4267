//! Gesture input side of the engine
//!
//! - [`pose`] - Hand poses as reported by the landmark detector
//! - [`policy`] - Fixed thresholds mapping one hand to keys and pulses
//! - [`scripted`] - Replay source used in place of a live detector
//!
//! ```text
//! PoseSource ──► Sample ──► GesturePolicy ──► TickInput { desired, pulses }
//! ```

pub mod policy;
pub mod pose;
pub mod scripted;

pub use policy::{GesturePolicy, GestureState, TickInput};
pub use pose::{Hand, Handedness, IdleSource, PoseError, PoseSource, Sample};
pub use scripted::ScriptedPoseSource;
