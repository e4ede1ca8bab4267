//! Command channel between the reconciler and the actuation worker
//!
//! Thin wrapper around tokio's unbounded mpsc channel. The sender side never blocks,
//! the receiver side blocks its (non-async) worker thread until a command arrives or
//! every sender has been dropped. Dropping the last [`CommandSender`] is the shutdown
//! signal: the receiver still yields all queued commands before returning `None`.

use super::{ActuationError, Command};
use tokio::sync::mpsc;
use tracing::debug;

/// Creates a connected sender/receiver pair
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    debug!("Created unbounded command channel");
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer half. Cloneable, so additional producers are possible.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Queues a command without blocking
    ///
    /// Only fails once the receiver is gone, i.e. the worker has exited.
    pub fn enqueue(&self, command: Command) -> Result<(), ActuationError> {
        self.tx
            .send(command)
            .map_err(|e| ActuationError::ChannelClosed(format!("dropped {}", e.0)))
    }
}

/// Consumer half, owned by the actuation worker
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandReceiver {
    /// Blocks until the next command is available
    ///
    /// Returns `None` once all senders are dropped and the queue is drained.
    /// Must not be called from inside an async runtime.
    pub fn dequeue(&mut self) -> Option<Command> {
        self.rx.blocking_recv()
    }
}
