//! Error definitions for the actuation subsystem

use super::Key;
use thiserror::Error;

/// Errors raised while queueing or applying actuation commands
#[derive(Debug, Error)]
pub enum ActuationError {
    /// The key injector rejected a key_down/key_up call
    ///
    /// Recovered locally by the worker; never propagated to the reconciler.
    #[error("Injection failed for key '{key}': {reason}")]
    InjectionFailed { key: Key, reason: String },

    /// The command channel has no consumer anymore
    #[error("Command channel closed: {0}")]
    ChannelClosed(String),

    /// Spawning or joining the worker thread failed
    #[error("Worker thread error: {0}")]
    WorkerError(String),

    /// Operation not allowed in the current engine state
    #[error("Invalid engine state: {0}")]
    InvalidState(String),
}
