//! # Completion Handles
//!
//! Purpose: The caller-facing halves of the non-blocking and deferred
//! contracts. Both wrap a write-once `ResultCell` that the batching loop
//! fills exactly once.
//!
//! ## Design Principles
//! 1. **Publish Then Flag**: The result is stored before `done` is set with
//!    `Release`; readers check `done` with `Acquire` before touching it.
//! 2. **Not Ready Is Explicit**: Accessors return `None` until `done` is
//!    observed, never a partial or default value.
//! 3. **Stable Once Ready**: Reads clone the stored result, so repeated polls
//!    see the same answer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hkv_common::{FromValue, PipeResult, Value};
use parking_lot::Mutex;

/// Write-once result storage shared between one producer and the loop.
pub(crate) struct ResultCell {
    done: AtomicBool,
    result: Mutex<Option<PipeResult<Value>>>,
}

impl ResultCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(ResultCell {
            done: AtomicBool::new(false),
            result: Mutex::new(None),
        })
    }

    /// Cell that is complete from the start, for commands rejected before
    /// they were ever queued.
    pub(crate) fn ready(result: PipeResult<Value>) -> Arc<Self> {
        let cell = Self::new();
        cell.fill(result);
        cell
    }

    /// Stores the result and flips `done`. Called once per cell.
    pub(crate) fn fill(&self, result: PipeResult<Value>) {
        let mut slot = self.result.lock();
        debug_assert!(slot.is_none(), "result cell filled twice");
        *slot = Some(result);
        drop(slot);
        self.done.store(true, Ordering::Release);
    }

    fn is_ready(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn get(&self) -> Option<PipeResult<Value>> {
        if !self.is_ready() {
            return None;
        }
        self.result.lock().clone()
    }
}

/// Result holder returned by `KVPipe::submit_polling`.
///
/// Poll `is_ready()` (or just `try_get()`) while doing other work; once ready
/// the outcome never changes.
#[derive(Clone)]
pub struct Reply {
    cell: Arc<ResultCell>,
}

impl Reply {
    pub(crate) fn new(cell: Arc<ResultCell>) -> Self {
        Reply { cell }
    }

    /// Returns true once the backend reply (or error) has been stored.
    pub fn is_ready(&self) -> bool {
        self.cell.is_ready()
    }

    /// Returns the outcome, or `None` while the command is still in flight.
    pub fn try_get(&self) -> Option<PipeResult<Value>> {
        self.cell.get()
    }

    /// Like `try_get`, converting the value into `T`.
    pub fn try_get_as<T: FromValue>(&self) -> Option<PipeResult<T>> {
        self.try_get().map(hkv_common::convert)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Result slot returned by `KVPipe::do_deferred`.
///
/// Populated by the time a later `KVPipe::wait` from the same thread returns.
#[derive(Clone)]
pub struct DeferredSlot {
    cell: Arc<ResultCell>,
}

impl DeferredSlot {
    pub(crate) fn new(cell: Arc<ResultCell>) -> Self {
        DeferredSlot { cell }
    }

    pub fn is_ready(&self) -> bool {
        self.cell.is_ready()
    }

    /// Returns the outcome, or `None` while the command is still queued.
    pub fn get(&self) -> Option<PipeResult<Value>> {
        self.cell.get()
    }

    pub fn get_as<T: FromValue>(&self) -> Option<PipeResult<T>> {
        self.get().map(hkv_common::convert)
    }
}

impl fmt::Debug for DeferredSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredSlot")
            .field("ready", &self.is_ready())
            .finish()
    }
}
