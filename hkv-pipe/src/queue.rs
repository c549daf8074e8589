//! # Command Queue
//!
//! Bounded multi-producer/single-consumer queue between producers and the
//! batching loop, built on a crossbeam bounded channel.
//!
//! Producers block in `enqueue` once `capacity` commands are waiting, so a
//! burst is slowed down instead of dropped. The loop calls `drain_available`,
//! which takes exactly the commands present when it was called; anything
//! enqueued meanwhile waits for the next cycle.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use hkv_common::{PipeError, PipeResult};

use crate::command::Command;

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub(crate) struct QueueSender {
    tx: Sender<Command>,
}

/// Consumer side, owned by the batching loop.
pub(crate) struct QueueReceiver {
    rx: Receiver<Command>,
}

/// Creates a queue holding at most `capacity` commands.
pub(crate) fn command_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = bounded(capacity);
    (QueueSender { tx }, QueueReceiver { rx })
}

impl QueueSender {
    /// Blocks while the queue is full. Fails only when the loop is gone.
    pub(crate) fn enqueue(&self, command: Command) -> PipeResult<()> {
        self.tx.send(command).map_err(|_| PipeError::Closed)
    }

    pub(crate) fn depth(&self) -> usize {
        self.tx.len()
    }
}

impl QueueReceiver {
    pub(crate) fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Removes every command queued at the instant of the call, in arrival
    /// order, without waiting for more.
    pub(crate) fn drain_available(&self) -> Vec<Command> {
        let snapshot = self.rx.len();
        let mut batch = Vec::with_capacity(snapshot);
        for _ in 0..snapshot {
            match self.rx.try_recv() {
                Ok(command) => batch.push(command),
                // Sole consumer: the snapshot can only grow, so this is a
                // disconnected channel.
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }
}
