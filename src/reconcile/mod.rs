//! Reconciliation of desired key state into minimal actuation commands
//!
//! Runs once per sampling tick. The reconciler keeps the previous tick's desired-key
//! set and emits only the transitions:
//!
//! ```text
//! prev = {w}      cur = {w, a}   ──►  Press(a)
//! prev = {w, a}   cur = {}       ──►  Release(a), Release(w)
//! prev = {w}      cur = {w}      ──►  (nothing)
//! ```
//!
//! Pulse triggers (e.g. jump) become `Tap` commands gated by a per-key cooldown.
//! The reconciler never looks at the worker's held-key set.

pub mod cooldown;

pub use cooldown::Cooldowns;

use crate::actuation::{Command, Key, KeySet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Diff engine between consecutive desired-key sets
#[derive(Debug, Clone)]
pub struct Reconciler {
    previous: KeySet,
    cooldowns: Cooldowns,
    tap_duration: Duration,
}

impl Reconciler {
    pub fn new(tap_duration: Duration, cooldown_period: Duration) -> Self {
        Self {
            previous: KeySet::new(),
            cooldowns: Cooldowns::new(cooldown_period),
            tap_duration,
        }
    }

    pub fn cooldown_period(&self) -> Duration {
        self.cooldowns.period()
    }

    /// Desired set stored from the last tick
    pub fn previous(&self) -> &KeySet {
        &self.previous
    }

    /// Computes the commands for one tick
    ///
    /// Order: presses for newly desired keys, releases for keys no longer desired,
    /// then taps for pulse triggers that are out of cooldown.
    pub fn reconcile(&mut self, desired: &KeySet, pulses: &[Key], now: Instant) -> Vec<Command> {
        let mut commands: Vec<Command> = desired
            .difference(&self.previous)
            .cloned()
            .map(Command::Press)
            .collect();

        commands.extend(
            self.previous
                .difference(desired)
                .cloned()
                .map(Command::Release),
        );

        self.previous = desired.clone();

        for key in pulses {
            if self.cooldowns.try_fire(key, now) {
                commands.push(Command::Tap {
                    key: key.clone(),
                    hold: self.tap_duration,
                });
            } else {
                debug!(
                    "Pulse {} suppressed, cooldown {}ms remaining",
                    key,
                    self.cooldowns.remaining(key, now).as_millis()
                );
            }
        }

        commands
    }

    /// Forgets the previous desired set, e.g. after an external ReleaseAll
    pub fn reset(&mut self) {
        self.previous.clear();
    }
}
