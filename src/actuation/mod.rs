//! Actuation subsystem for virtual key output
//!
//! Everything that touches the key injector lives here. Producers never call the
//! injector themselves, they push [`Command`]s into the command channel and a single
//! dedicated worker thread applies them in submission order.
//!
//! 1. [`channel`] - Unbounded, ordered command queue
//! 2. [`worker`] - Actuation worker owning the held-key set
//! 3. [`injector`] - Key injector collaborator and in-tree implementations
//!
//! # Architecture
//!
//! ```text
//! Reconciler ──► CommandSender ══► CommandReceiver ──► ActuationWorker ──► KeyInjector
//!  (tick)          (enqueue)         (dequeue)          (held-key set)      (key_down/up)
//! ```

pub mod channel;
pub mod error;
pub mod injector;
pub mod worker;

pub use channel::{command_channel, CommandReceiver, CommandSender};
pub use error::ActuationError;
pub use injector::{InjectedEvent, KeyAction, KeyInjector, LoggingInjector, RecordingInjector};
pub use worker::{ActuationWorker, JoinOutcome, WorkerExit, WorkerHandle, WorkerStats};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Opaque name of a logical input key, e.g. `"w"` or `"space"`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Set of keys, ordered so that generated command batches are deterministic
pub type KeySet = BTreeSet<Key>;

/// Actuation command transferred from the reconciler to the worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Assert the key down unless the worker already holds it
    Press(Key),
    /// Clear the key if the worker currently holds it
    Release(Key),
    /// Self-contained pulse: down, wait `hold`, up. Ignores hold tracking.
    Tap { key: Key, hold: Duration },
    /// Release every held key and clear the held-key set
    ReleaseAll,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Press(key) => write!(f, "Press({})", key),
            Command::Release(key) => write!(f, "Release({})", key),
            Command::Tap { key, hold } => write!(f, "Tap({}, {}ms)", key, hold.as_millis()),
            Command::ReleaseAll => write!(f, "ReleaseAll"),
        }
    }
}
