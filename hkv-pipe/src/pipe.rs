//! # Pipeline Client API
//!
//! Purpose: Let many threads issue commands as if each had its own
//! connection, while one background loop coalesces them into pipelined
//! round trips over a single leased connection.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVPipe` hides the queue, the loop and the pool.
//! 2. **One Record, Several Contracts**: Every call builds the same `Command`;
//!    only its completion variant differs.
//! 3. **Explicit Ownership**: The pipe owns its worker thread; dropping the
//!    pipe drains the queue and joins the worker. No globals.
//!
//! ## Contracts
//!
//! | Call | Returns | Caller learns the outcome by |
//! |------|---------|------------------------------|
//! | `send` | immediately | never (reply discarded) |
//! | `do_sync` / `query` | after the reply | the return value |
//! | `do_deferred` + `wait` | slot immediately | reading the slot after `wait` |
//! | `submit_polling` | `Reply` immediately | polling `Reply::try_get` |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use hkv_common::{Arg, FromValue, PipeError, PipeResult, Value};
use tracing::{debug, warn};

use crate::batcher::Batcher;
use crate::command::{Command, Completion};
use crate::completion::{DeferredSlot, Reply, ResultCell};
use crate::config::{EngineConfig, PipeConfig};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pool::ConnectionPool;
use crate::provider::ConnectionProvider;
use crate::queue::{command_queue, QueueSender};

/// Batching client over a single logical backend connection.
///
/// `KVPipe` is `Send + Sync`; share it across producer threads with `Arc` or
/// scoped threads.
pub struct KVPipe<P: ConnectionProvider = ConnectionPool> {
    queue: QueueSender,
    provider: Arc<P>,
    metrics: Arc<Metrics>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl KVPipe<ConnectionPool> {
    /// Creates a pool-backed pipe with default configuration.
    pub fn connect(addr: impl Into<String>) -> PipeResult<Self> {
        let config = PipeConfig {
            addr: addr.into(),
            ..PipeConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a pool-backed pipe with a custom configuration.
    pub fn with_config(config: PipeConfig) -> PipeResult<Self> {
        let pool = ConnectionPool::new(config.pool())?;
        Self::with_provider(pool, config.engine())
    }

    /// The pool the loop leases from, for callers that need a dedicated
    /// connection (blocking commands, transactions).
    pub fn pool(&self) -> &ConnectionPool {
        &self.provider
    }
}

impl<P: ConnectionProvider> KVPipe<P> {
    /// Starts the batching loop over `provider`.
    pub fn with_provider(provider: P, config: EngineConfig) -> PipeResult<Self> {
        config.validate()?;

        let (queue, receiver) = command_queue(config.queue_capacity);
        let provider = Arc::new(provider);
        let metrics = Arc::new(Metrics::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let batcher = Batcher::new(
            receiver,
            provider.clone(),
            metrics.clone(),
            config.idle_interval,
            shutdown.clone(),
        );
        let worker = thread::Builder::new()
            .name("hkv-pipe-batcher".to_string())
            .spawn(move || batcher.run())?;

        debug!(queue_capacity = config.queue_capacity, "pipeline started");
        Ok(KVPipe {
            queue,
            provider,
            metrics,
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Queues a command whose reply is read and dropped.
    ///
    /// Blocks only while the queue is full.
    pub fn send(&self, name: &str, args: Vec<Arg>) -> PipeResult<()> {
        check_name(name)?;
        self.queue
            .enqueue(Command::new(name, args, Completion::Discard))
    }

    /// Queues a command and blocks until its reply arrives.
    pub fn do_sync(&self, name: &str, args: Vec<Arg>) -> PipeResult<Value> {
        check_name(name)?;
        let (tx, rx) = bounded(1);
        self.queue
            .enqueue(Command::new(name, args, Completion::Blocking(tx)))?;
        rx.recv().map_err(|_| PipeError::Closed)?
    }

    /// `do_sync` followed by a conversion into `T`.
    pub fn query<T: FromValue>(&self, name: &str, args: Vec<Arg>) -> PipeResult<T> {
        hkv_common::convert(self.do_sync(name, args))
    }

    /// Queues a command whose outcome lands in the returned slot.
    ///
    /// The slot is guaranteed to be populated once a later `wait()` from the
    /// same thread returns.
    pub fn do_deferred(&self, name: &str, args: Vec<Arg>) -> DeferredSlot {
        DeferredSlot::new(self.enqueue_slot(name, args))
    }

    /// Blocks until every command this thread queued before the call has
    /// completed.
    ///
    /// Implemented as a barrier marker: it travels through the queue like any
    /// command and is signaled after everything ahead of it. Commands other
    /// threads race in concurrently get no ordering promise beyond arrival.
    pub fn wait(&self) -> PipeResult<()> {
        let (tx, rx) = bounded(1);
        self.queue.enqueue(Command::barrier(tx))?;
        rx.recv().map_err(|_| PipeError::Closed)
    }

    /// Queues a command and returns a handle to poll for its outcome.
    pub fn submit_polling(&self, name: &str, args: Vec<Arg>) -> Reply {
        Reply::new(self.enqueue_slot(name, args))
    }

    /// Commands queued but not yet drained by the loop.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops the loop once everything already queued has been processed.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn enqueue_slot(&self, name: &str, args: Vec<Arg>) -> Arc<ResultCell> {
        if let Err(err) = check_name(name) {
            return ResultCell::ready(Err(err));
        }
        let cell = ResultCell::new();
        let command = Command::new(name, args, Completion::Slot(cell.clone()));
        match self.queue.enqueue(command) {
            Ok(()) => cell,
            Err(err) => ResultCell::ready(Err(err)),
        }
    }

    fn stop(&mut self) {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return,
        };
        self.shutdown.store(true, Ordering::Release);
        if worker.join().is_err() {
            warn!("batching loop panicked");
        }
        debug!("pipeline stopped");
    }
}

impl<P: ConnectionProvider> Drop for KVPipe<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_name(name: &str) -> PipeResult<()> {
    if name.is_empty() {
        return Err(PipeError::EmptyCommand);
    }
    Ok(())
}
