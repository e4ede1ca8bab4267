//! Actuation worker with statum state machine
//!
//! The worker is the only component allowed to call the key injector. It owns the
//! authoritative held-key set, so duplicate `Press`/`Release` commands are suppressed
//! here even if a producer enqueues them twice.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Running ──► (channel closed) ──► WorkerExit
//! ```
//!
//! Injection failures are logged and counted; the worker keeps draining the channel.
//! When the channel closes the worker releases whatever it still holds before the
//! thread ends, so no key stays asserted.
//!
//! Once the abort token is cancelled the worker only releases: queued `Press` and
//! `Tap` commands are skipped, a running tap hold ends early and a key that finished
//! its `key_down` after the abort is released again right away.

use super::{ActuationError, Command, CommandReceiver, Key, KeyInjector, KeySet};
use statum::{machine, state};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const WORKER_THREAD_NAME: &str = "gesturekeys-actuation";
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Counters for everything the worker did with the injector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Commands taken from the channel
    pub commands: u64,
    /// Successful injector calls
    pub injected: u64,
    /// Commands skipped because the held-set already matched or the worker was aborted
    pub suppressed: u64,
    /// Injector calls that returned an error
    pub failed: u64,
}

/// Final state handed back when the worker thread ends
#[derive(Clone, Debug, Default)]
pub struct WorkerExit {
    /// Keys the worker could not release (injector kept failing)
    pub still_held: KeySet,
    pub stats: WorkerStats,
}

#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Idle,    // Created, not consuming yet
    Running, // Draining the command channel
}

#[machine]
pub struct ActuationWorker<S: WorkerState> {
    receiver: CommandReceiver,
    injector: Arc<dyn KeyInjector>,
    abort: CancellationToken,
    held: KeySet,
    stats: WorkerStats,
}

impl<S: WorkerState> ActuationWorker<S> {
    /// Keys currently asserted by this worker
    pub fn held(&self) -> &KeySet {
        &self.held
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }
}

impl ActuationWorker<Idle> {
    pub fn create(
        receiver: CommandReceiver,
        injector: Arc<dyn KeyInjector>,
        abort: CancellationToken,
    ) -> Self {
        debug!("Creating actuation worker for injector '{}'", injector.name());
        Self::new(receiver, injector, abort, KeySet::new(), WorkerStats::default())
    }

    pub fn start(self) -> ActuationWorker<Running> {
        info!("Actuation worker entering Running state");
        self.transition()
    }
}

impl ActuationWorker<Running> {
    /// Applies one command to the injector and updates the held-key set
    pub fn apply(&mut self, command: Command) {
        self.stats.commands += 1;
        debug!("Applying {}", command);

        match command {
            Command::Press(key) => {
                if self.aborted() {
                    debug!("Aborted, press of {} skipped", key);
                    self.stats.suppressed += 1;
                    return;
                }
                if self.held.contains(&key) {
                    debug!("{} already held, press suppressed", key);
                    self.stats.suppressed += 1;
                    return;
                }
                if self.inject_down(&key) {
                    if self.aborted() {
                        warn!("Abort arrived during key_down({}), releasing again", key);
                        self.inject_up(&key);
                    } else {
                        self.held.insert(key);
                    }
                }
            }
            Command::Release(key) => {
                if !self.held.contains(&key) {
                    debug!("{} not held, release suppressed", key);
                    self.stats.suppressed += 1;
                    return;
                }
                // Bei Fehler bleibt die Taste im Set, damit ReleaseAll es erneut versucht
                if self.inject_up(&key) {
                    self.held.remove(&key);
                }
            }
            Command::Tap { key, hold } => {
                if self.aborted() {
                    debug!("Aborted, tap of {} skipped", key);
                    self.stats.suppressed += 1;
                    return;
                }
                if self.inject_down(&key) {
                    self.hold_for(hold);
                    self.inject_up(&key);
                } else {
                    warn!("Tap({}) aborted, key_down failed", key);
                }
            }
            Command::ReleaseAll => self.release_all(),
        }
    }

    /// Releases every held key and clears the set regardless of injector results
    pub fn release_all(&mut self) {
        if self.held.is_empty() {
            debug!("ReleaseAll with nothing held");
            return;
        }
        info!("Releasing {} held key(s)", self.held.len());
        let held = std::mem::take(&mut self.held);
        for key in held {
            self.inject_up(&key);
        }
    }

    /// Drains the channel until every sender is gone, then releases leftovers
    pub fn run(mut self) -> WorkerExit {
        info!("Actuation worker started");

        while let Some(command) = self.receiver.dequeue() {
            self.apply(command);
        }

        info!("Command channel closed, releasing remaining keys");
        self.release_remaining();

        info!("Actuation worker finished: {:?}", self.stats);
        WorkerExit {
            still_held: self.held,
            stats: self.stats,
        }
    }

    /// Final release pass; keys whose key_up fails stay in the set and are reported
    fn release_remaining(&mut self) {
        let held = std::mem::take(&mut self.held);
        for key in held {
            if !self.inject_up(&key) {
                self.held.insert(key);
            }
        }
        if !self.held.is_empty() {
            error!("Keys still held after shutdown: {:?}", self.held);
        }
    }

    fn aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Sleeps for `hold`, returning early once the worker is aborted
    fn hold_for(&self, hold: Duration) {
        let deadline = Instant::now() + hold;
        while !self.aborted() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(ABORT_POLL_INTERVAL));
        }
        debug!("Tap hold cut short by abort");
    }

    fn inject_down(&mut self, key: &Key) -> bool {
        let result = self.injector.key_down(key);
        self.record(result, key, "key_down")
    }

    fn inject_up(&mut self, key: &Key) -> bool {
        let result = self.injector.key_up(key);
        self.record(result, key, "key_up")
    }

    fn record(&mut self, result: Result<(), ActuationError>, key: &Key, call: &str) -> bool {
        match result {
            Ok(()) => {
                self.stats.injected += 1;
                true
            }
            Err(e) => {
                error!("{}({}) failed: {}", call, key, e);
                self.stats.failed += 1;
                false
            }
        }
    }
}

/// Outcome of waiting for the worker thread
#[derive(Debug)]
pub enum JoinOutcome {
    /// Worker drained the channel and exited
    Finished(WorkerExit),
    /// Grace period elapsed, the thread is left detached (cancel its abort token)
    TimedOut,
    /// Worker thread panicked
    Panicked(String),
}

/// Owns the worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    handle: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    /// Spawns the worker on a dedicated OS thread
    ///
    /// Cancelling `abort` turns the worker into release-only mode.
    pub fn spawn(
        receiver: CommandReceiver,
        injector: Arc<dyn KeyInjector>,
        abort: CancellationToken,
    ) -> Result<Self, ActuationError> {
        let worker = ActuationWorker::create(receiver, injector, abort);

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.start().run())
            .map_err(|e| {
                error!("Failed to spawn actuation worker: {}", e);
                ActuationError::WorkerError(format!("Failed to spawn worker thread: {}", e))
            })?;

        info!("Actuation worker thread spawned");
        Ok(Self { handle })
    }

    /// Waits at most `grace` for the worker to exit
    pub fn join_within(self, grace: Duration) -> JoinOutcome {
        let deadline = Instant::now() + grace;

        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Actuation worker did not exit within {}ms",
                    grace.as_millis()
                );
                return JoinOutcome::TimedOut;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        match self.handle.join() {
            Ok(exit) => JoinOutcome::Finished(exit),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Actuation worker panicked: {}", message);
                JoinOutcome::Panicked(message)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
