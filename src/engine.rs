//! Key engine with statum state machine
//!
//! Owns the producer side of the command channel, the reconciler and the actuation
//! worker thread. The tick path is synchronous and never blocks: it diffs the desired
//! keys, enqueues the resulting commands and returns.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Active ──► Stopped
//!                   │  ▲
//!                   └──┘ tick / emergency_stop
//! ```
//!
//! # Shutdown
//!
//! ```text
//! enqueue ReleaseAll ──► drop sender ──► worker drains + exits ──► Finished
//!                                             │
//!                                    grace elapsed / panic
//!                                             ▼
//!                        cancel abort token ──► forced key_up for every issued key
//! ```
//!
//! A worker left detached after a timeout keeps running in release-only mode, so it
//! cannot assert a key again after the forced release.

use crate::actuation::{
    command_channel, ActuationError, Command, CommandSender, JoinOutcome, Key, KeyInjector,
    KeySet, WorkerHandle, WorkerStats,
};
use crate::config::EngineConfig;
use crate::gesture::TickInput;
use crate::reconcile::Reconciler;
use statum::{machine, state};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum EngineState {
    Initializing, // Configured, no worker yet
    Active,       // Worker running, accepting ticks
    Stopped,      // Worker drained or forcibly released
}

/// What happened during shutdown
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Worker drained the channel and exited within the grace period
    pub drained: bool,
    /// Keys released directly through the injector, bypassing the channel
    pub forced_release: Vec<Key>,
    /// Worker counters, `None` if the worker never reported back
    pub stats: Option<WorkerStats>,
}

#[machine]
pub struct KeyEngine<S: EngineState> {
    injector: Arc<dyn KeyInjector>,
    reconciler: Reconciler,
    sender: Option<CommandSender>,
    worker: Option<WorkerHandle>,
    abort: CancellationToken,
    hold_on_start: KeySet,
    issued: KeySet,
    grace: Duration,
    ticks: u64,
    report: Option<ShutdownReport>,
}

impl<S: EngineState> KeyEngine<S> {
    /// Number of ticks processed so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Every key the engine ever sent a Press or Tap for
    pub fn issued_keys(&self) -> &KeySet {
        &self.issued
    }
}

impl KeyEngine<Initializing> {
    pub fn create(config: &EngineConfig, injector: Arc<dyn KeyInjector>) -> Self {
        info!(
            "Creating key engine (tap {}ms, cooldown {}ms, grace {}ms)",
            config.tap_duration_ms, config.cooldown_ms, config.shutdown_grace_ms
        );

        let hold_on_start = config
            .hold_on_start
            .iter()
            .map(|name| Key::new(name.as_str()))
            .collect();

        Self::new(
            injector,
            Reconciler::new(config.tap_duration(), config.cooldown()),
            None, // sender
            None, // worker
            CancellationToken::new(),
            hold_on_start,
            KeySet::new(),
            config.shutdown_grace(),
            0,
            None,
        )
    }

    /// Spawns the worker and latches the startup keys
    pub fn start(mut self) -> Result<KeyEngine<Active>, ActuationError> {
        let (sender, receiver) = command_channel();
        let worker = WorkerHandle::spawn(receiver, self.injector.clone(), self.abort.clone())?;

        for key in &self.hold_on_start {
            info!("Latching {} for the whole run", key);
            sender.enqueue(Command::Press(key.clone()))?;
            self.issued.insert(key.clone());
        }

        self.sender = Some(sender);
        self.worker = Some(worker);

        info!(
            "Key engine active (injector '{}', pulse cooldown {}ms)",
            self.injector.name(),
            self.reconciler.cooldown_period().as_millis()
        );
        Ok(self.transition())
    }
}

impl KeyEngine<Active> {
    /// Reconciles one tick and enqueues the resulting commands
    ///
    /// Returns the enqueued commands. Fails only if the worker is gone; the reconciler
    /// is reset then, so a later tick re-presses everything still desired.
    pub fn tick(
        &mut self,
        desired: &KeySet,
        pulses: &[Key],
        now: Instant,
    ) -> Result<Vec<Command>, ActuationError> {
        self.ticks += 1;
        let commands = self.reconciler.reconcile(desired, pulses, now);

        if !commands.is_empty() {
            debug!("Tick {}: {} command(s)", self.ticks, commands.len());
        }

        for command in &commands {
            if let Command::Press(key) | Command::Tap { key, .. } = command {
                self.issued.insert(key.clone());
            }
            if let Err(e) = self.enqueue(command.clone()) {
                error!("Tick {}: enqueue of {} failed: {}", self.ticks, command, e);
                self.reconciler.reset();
                return Err(e);
            }
        }

        Ok(commands)
    }

    /// Convenience wrapper for gesture policy output
    pub fn tick_input(
        &mut self,
        input: &TickInput,
        now: Instant,
    ) -> Result<Vec<Command>, ActuationError> {
        self.tick(&input.desired, &input.pulses, now)
    }

    /// Releases everything held, including latched startup keys
    ///
    /// The reconciler forgets its previous set so keys still desired on the next tick
    /// are pressed again.
    pub fn emergency_stop(&mut self) -> Result<(), ActuationError> {
        warn!("Emergency stop: releasing all keys");
        self.reconciler.reset();
        self.enqueue(Command::ReleaseAll)
    }

    /// Cooperative shutdown, see module docs
    pub fn shutdown(mut self) -> KeyEngine<Stopped> {
        info!("Shutting down key engine after {} tick(s)", self.ticks);

        if let Err(e) = self.enqueue(Command::ReleaseAll) {
            warn!("Could not queue final ReleaseAll: {}", e);
        }
        // Sender droppen = Shutdown-Signal für den Worker
        self.sender = None;

        let outcome = match self.worker.take() {
            Some(worker) => worker.join_within(self.grace),
            None => JoinOutcome::Panicked("worker handle missing".to_string()),
        };

        let report = match outcome {
            JoinOutcome::Finished(exit) => {
                let forced_release = if exit.still_held.is_empty() {
                    Vec::new()
                } else {
                    self.force_release(&exit.still_held)
                };
                ShutdownReport {
                    drained: true,
                    forced_release,
                    stats: Some(exit.stats),
                }
            }
            JoinOutcome::TimedOut | JoinOutcome::Panicked(_) => {
                // Worker darf danach nichts mehr drücken
                self.abort.cancel();
                let issued = self.issued.clone();
                ShutdownReport {
                    drained: false,
                    forced_release: self.force_release(&issued),
                    stats: None,
                }
            }
        };

        info!("Key engine stopped: {:?}", report);
        self.report = Some(report);
        self.transition()
    }

    fn enqueue(&self, command: Command) -> Result<(), ActuationError> {
        match &self.sender {
            Some(sender) => sender.enqueue(command),
            None => Err(ActuationError::InvalidState(
                "engine has no command sender".to_string(),
            )),
        }
    }

    /// Last-resort release that bypasses the channel
    fn force_release(&self, keys: &KeySet) -> Vec<Key> {
        warn!("Forcing release of {} key(s)", keys.len());
        let mut released = Vec::new();
        for key in keys {
            match self.injector.key_up(key) {
                Ok(()) => released.push(key.clone()),
                Err(e) => error!("Forced key_up({}) failed: {}", key, e),
            }
        }
        released
    }
}

impl KeyEngine<Stopped> {
    pub fn report(&self) -> Option<&ShutdownReport> {
        self.report.as_ref()
    }

    pub fn into_report(self) -> ShutdownReport {
        self.report.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::{KeyAction, RecordingInjector};
    use std::thread;

    fn config() -> EngineConfig {
        EngineConfig {
            hold_on_start: Vec::new(),
            ..EngineConfig::default()
        }
    }

    fn set(keys: &[&str]) -> KeySet {
        keys.iter().map(|k| Key::from(*k)).collect()
    }

    #[test]
    fn tick_returns_enqueued_commands() {
        let injector = RecordingInjector::new();
        let mut engine = KeyEngine::create(&config(), Arc::new(injector))
            .start()
            .unwrap();

        let now = Instant::now();
        let first = engine.tick(&set(&["w"]), &[], now).unwrap();
        let second = engine.tick(&set(&["w"]), &[], now).unwrap();

        assert_eq!(first, vec![Command::Press(Key::from("w"))]);
        assert!(second.is_empty());
        assert_eq!(engine.ticks(), 2);

        let report = engine.shutdown().into_report();
        assert!(report.drained);
    }

    #[test]
    fn latched_keys_are_pressed_at_start_and_released_at_shutdown() {
        let injector = RecordingInjector::new();
        let config = EngineConfig {
            hold_on_start: vec!["u".to_string()],
            ..EngineConfig::default()
        };
        let mut engine = KeyEngine::create(&config, Arc::new(injector.clone()))
            .start()
            .unwrap();

        // Reconciliation never releases the latched key
        engine.tick(&set(&["w"]), &[], Instant::now()).unwrap();
        engine.tick(&KeySet::new(), &[], Instant::now()).unwrap();

        let report = engine.shutdown().into_report();

        assert!(report.drained);
        assert!(report.forced_release.is_empty());
        assert_eq!(
            injector.actions(),
            vec![
                (KeyAction::Down, Key::from("u")),
                (KeyAction::Down, Key::from("w")),
                (KeyAction::Up, Key::from("w")),
                (KeyAction::Up, Key::from("u")),
            ]
        );
    }

    #[test]
    fn emergency_stop_represses_still_desired_keys() {
        let injector = RecordingInjector::new();
        let mut engine = KeyEngine::create(&config(), Arc::new(injector.clone()))
            .start()
            .unwrap();
        let now = Instant::now();

        engine.tick(&set(&["w"]), &[], now).unwrap();
        engine.emergency_stop().unwrap();
        let after = engine.tick(&set(&["w"]), &[], now).unwrap();

        assert_eq!(after, vec![Command::Press(Key::from("w"))]);

        engine.shutdown();
        assert_eq!(
            injector.actions(),
            vec![
                (KeyAction::Down, Key::from("w")),
                (KeyAction::Up, Key::from("w")),
                (KeyAction::Down, Key::from("w")),
                (KeyAction::Up, Key::from("w")),
            ]
        );
    }

    /// Crashes the worker thread on the first key_down
    struct PanickingInjector;

    impl KeyInjector for PanickingInjector {
        fn key_down(&self, key: &Key) -> Result<(), ActuationError> {
            panic!("injector crashed on {}", key)
        }

        fn key_up(&self, _key: &Key) -> Result<(), ActuationError> {
            Ok(())
        }
    }

    #[test]
    fn failed_enqueue_resets_reconciler() {
        let mut engine = KeyEngine::create(&config(), Arc::new(PanickingInjector))
            .start()
            .unwrap();
        let now = Instant::now();

        engine.tick(&set(&["w"]), &[], now).unwrap();
        thread::sleep(Duration::from_millis(200));
        let err = engine.tick(&set(&["a", "w"]), &[], now).unwrap_err();

        assert!(matches!(err, ActuationError::ChannelClosed(_)));
        assert!(engine.reconciler.previous().is_empty());

        let report = engine.shutdown().into_report();
        assert!(!report.drained);
        assert_eq!(report.forced_release, vec![Key::from("a"), Key::from("w")]);
    }

    #[test]
    fn tap_keys_count_as_issued() {
        let injector = RecordingInjector::new();
        let mut engine = KeyEngine::create(&config(), Arc::new(injector))
            .start()
            .unwrap();

        engine
            .tick(&KeySet::new(), &[Key::from("space")], Instant::now())
            .unwrap();

        assert_eq!(engine.issued_keys(), &set(&["space"]));
        engine.shutdown();
    }
}
