//! Key injector collaborator
//!
//! The OS-level injection call is out of tree. Implementations of [`KeyInjector`]
//! assert or clear the logical state of a named key; the actuation worker is the only
//! caller during normal operation.

use super::{ActuationError, Key, KeySet};
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Asserts/clears logical key state
///
/// Implementations must be idempotent-safe: calling `key_up` on a key that is not down
/// is allowed. Failures are reported as [`ActuationError::InjectionFailed`] and never
/// panic.
pub trait KeyInjector: Send + Sync + 'static {
    fn key_down(&self, key: &Key) -> Result<(), ActuationError>;

    fn key_up(&self, key: &Key) -> Result<(), ActuationError>;

    /// Human readable name used in log output
    fn name(&self) -> &str {
        "injector"
    }
}

/// Direction of an injected key transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Down,
    Up,
}

/// Dry-run injector that only writes the calls to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInjector;

impl KeyInjector for LoggingInjector {
    fn key_down(&self, key: &Key) -> Result<(), ActuationError> {
        info!("key_down({}) at {}", key, Local::now().format("%H:%M:%S.%3f"));
        Ok(())
    }

    fn key_up(&self, key: &Key) -> Result<(), ActuationError> {
        info!("key_up({}) at {}", key, Local::now().format("%H:%M:%S.%3f"));
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// One successful injector call as seen by [`RecordingInjector`]
#[derive(Clone, Debug)]
pub struct InjectedEvent {
    pub key: Key,
    pub action: KeyAction,
    pub at: DateTime<Local>,
}

/// Injector that records every successful call in order
///
/// Clones share the same log, so a test can keep one clone while the worker owns the
/// other. Keys registered via [`RecordingInjector::fail_on`] reject every call.
#[derive(Clone, Debug, Default)]
pub struct RecordingInjector {
    events: Arc<Mutex<Vec<InjectedEvent>>>,
    failing: Arc<Mutex<HashSet<Key>>>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all future calls for `key` fail
    pub fn fail_on(&self, key: impl Into<Key>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    /// Lets calls for `key` succeed again
    pub fn recover(&self, key: &Key) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn events(&self) -> Vec<InjectedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded calls without timestamps
    pub fn actions(&self) -> Vec<(KeyAction, Key)> {
        self.events()
            .into_iter()
            .map(|event| (event.action, event.key))
            .collect()
    }

    /// Keys whose last recorded transition was `Down`
    pub fn keys_down(&self) -> KeySet {
        let mut down = KeySet::new();
        for event in self.events() {
            match event.action {
                KeyAction::Down => {
                    down.insert(event.key);
                }
                KeyAction::Up => {
                    down.remove(&event.key);
                }
            }
        }
        down
    }

    fn record(&self, key: &Key, action: KeyAction) -> Result<(), ActuationError> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key);
        if failing {
            return Err(ActuationError::InjectionFailed {
                key: key.clone(),
                reason: format!("{:?} rejected", action),
            });
        }

        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(InjectedEvent {
                key: key.clone(),
                action,
                at: Local::now(),
            });
        Ok(())
    }
}

impl KeyInjector for RecordingInjector {
    fn key_down(&self, key: &Key) -> Result<(), ActuationError> {
        self.record(key, KeyAction::Down)
    }

    fn key_up(&self, key: &Key) -> Result<(), ActuationError> {
        self.record(key, KeyAction::Up)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
