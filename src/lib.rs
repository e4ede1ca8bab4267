//! Turns per-frame hand gestures into a stable stream of virtual key events.
//!
//! ```text
//! PoseSource ──► GesturePolicy ──► KeyEngine::tick ──► CommandChannel ──► ActuationWorker ──► KeyInjector
//!  (camera)       (thresholds)      (Reconciler)        (unbounded)        (held-key set)      (OS keys)
//! ```
//!
//! The tick side runs on the sampling cadence and never blocks. A single worker
//! thread applies commands in order and is the only caller of the injector.

pub mod actuation;
pub mod config;
pub mod engine;
pub mod gesture;
pub mod reconcile;

pub use actuation::{Command, Key, KeyInjector, KeySet};
pub use config::EngineConfig;
pub use engine::{KeyEngine, ShutdownReport};
