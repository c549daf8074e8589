//! # Batching Loop
//!
//! Purpose: The single consumer of the command queue. Each cycle drains
//! whatever is queued, pipelines it over one leased connection, and routes
//! the ordered replies back to their producers.
//!
//! ## Design Principles
//! 1. **Single Writer**: Only this thread touches the leased connection, so
//!    reply *i* of a cycle always belongs to the *i*-th command sent.
//! 2. **Adaptive Batching**: Draining everything available means quiet periods
//!    make small batches and bursts make large ones, bounded by queue capacity.
//! 3. **Nobody Hangs**: Every drained command is completed exactly once, with
//!    its reply or with the error that prevented one.
//! 4. **Scoped Acquisition**: The lease is dropped at the end of the cycle on
//!    every path.
//!
//! ## Cycle
//!
//! ```text
//! queue empty? ── yes ──> sleep(idle_interval) ──> repeat
//!      │ no
//!      v
//! lease ── err ──> drain, complete all with the lease error
//!      │ ok
//!      v
//! drain ──> send(non-barriers) ──> flush ──> receive × sent
//!      │
//!      v
//! complete in queue order (barriers only signal) ──> drop lease
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hkv_common::{PipeError, PipeResult, Value};
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::metrics::Metrics;
use crate::provider::{ConnectionProvider, PipelineConnection};
use crate::queue::QueueReceiver;

pub(crate) struct Batcher<P: ConnectionProvider> {
    queue: QueueReceiver,
    provider: Arc<P>,
    metrics: Arc<Metrics>,
    idle_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<P: ConnectionProvider> Batcher<P> {
    pub(crate) fn new(
        queue: QueueReceiver,
        provider: Arc<P>,
        metrics: Arc<Metrics>,
        idle_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Batcher {
            queue,
            provider,
            metrics,
            idle_interval,
            shutdown,
        }
    }

    /// Runs until shutdown is requested and the queue has been emptied.
    pub(crate) fn run(self) {
        debug!(idle_interval = ?self.idle_interval, "batching loop started");
        loop {
            if self.queue.is_empty() {
                if self.shutdown.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(self.idle_interval);
                continue;
            }
            self.run_cycle();
        }
        debug!("batching loop stopped");
    }

    /// One lease, one drain, one round trip.
    pub(crate) fn run_cycle(&self) {
        let mut lease = match self.provider.lease() {
            Ok(lease) => lease,
            Err(err) => {
                self.fail_available(err);
                return;
            }
        };
        self.metrics.record_lease();

        let batch = self.queue.drain_available();
        let drained = batch.len();
        let sent = batch.iter().filter(|command| command.request().is_some()).count();
        trace!(drained, sent, "dispatching batch");

        match exchange(&mut lease, &batch, sent) {
            Ok(replies) => {
                let mut replies = replies.into_iter();
                for command in batch {
                    let result = command.request().map(|_| {
                        replies.next().unwrap_or_else(|| {
                            Err(PipeError::Protocol("reply missing from batch".to_string()))
                        })
                    });
                    self.complete(command, result);
                }
            }
            Err(err) => {
                warn!(error = %err, drained, "pipeline exchange failed");
                for command in batch {
                    let result = command.request().map(|_| Err(err.clone()));
                    self.complete(command, result);
                }
            }
        }

        self.metrics.record_batch(drained, sent);
        drop(lease);
    }

    /// Lease failure policy: fail outright. Everything currently queued is
    /// completed with the lease error so no caller waits on a dead backend.
    fn fail_available(&self, err: PipeError) {
        self.metrics.record_lease_failure();
        let batch = self.queue.drain_available();
        warn!(error = %err, drained = batch.len(), "connection lease failed; failing batch");
        for command in batch {
            let result = command.request().map(|_| Err(err.clone()));
            self.complete(command, result);
        }
    }

    fn complete(&self, command: Command, result: Option<PipeResult<Value>>) {
        match &result {
            None => self.metrics.record_barrier(),
            Some(Err(err)) => {
                self.metrics.record_command_error();
                if command.is_discard() {
                    debug!(error = %err, "fire-and-forget command failed");
                }
            }
            Some(Ok(_)) => {}
        }
        if command.is_discard() {
            self.metrics.record_discarded();
        }
        command.complete(result);
    }
}

/// Sends every non-barrier command, flushes once and reads `sent` replies.
///
/// A send/flush failure is batch-wide. A transport failure while receiving
/// poisons that reply and every later one without reading further; backend
/// error replies are ordinary per-command results.
fn exchange<C: PipelineConnection>(
    conn: &mut C,
    batch: &[Command],
    sent: usize,
) -> PipeResult<Vec<PipeResult<Value>>> {
    if sent == 0 {
        return Ok(Vec::new());
    }

    for request in batch.iter().filter_map(Command::request) {
        conn.send(&request.name, &request.args)?;
    }
    conn.flush()?;

    let mut replies = Vec::with_capacity(sent);
    while replies.len() < sent {
        match conn.receive() {
            Err(err) if err.is_transport() => {
                warn!(error = %err, received = replies.len(), sent, "reply stream broken");
                replies.resize(sent, Err(err));
            }
            reply => replies.push(reply),
        }
    }
    Ok(replies)
}
