//! # Command Records
//!
//! The unit the queue carries: an optional backend request plus the way its
//! producer wants to hear about the outcome.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;
use hkv_common::{Arg, PipeError, PipeResult, Value};

use crate::completion::ResultCell;

/// Backend operation and its arguments.
#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub(crate) name: String,
    pub(crate) args: Vec<Arg>,
}

/// How a producer learns that its command finished.
pub(crate) enum Completion {
    /// Fire-and-forget: the reply is read and dropped.
    Discard,
    /// One-shot channel a blocked producer is receiving on. The result is the
    /// message, so the value is always written before the wake-up.
    Blocking(Sender<PipeResult<Value>>),
    /// Write-once cell behind a `DeferredSlot` or a polling `Reply`.
    Slot(Arc<ResultCell>),
    /// Barrier marker: fired once everything ahead of it has completed.
    Barrier(Sender<()>),
}

/// One queued unit of work.
pub(crate) struct Command {
    request: Option<Request>,
    completion: Completion,
}

impl Command {
    pub(crate) fn new(name: &str, args: Vec<Arg>, completion: Completion) -> Self {
        Command {
            request: Some(Request {
                name: name.to_string(),
                args,
            }),
            completion,
        }
    }

    /// Placeholder that never reaches the backend; it only keeps its place in
    /// signal order.
    pub(crate) fn barrier(signal: Sender<()>) -> Self {
        Command {
            request: None,
            completion: Completion::Barrier(signal),
        }
    }

    pub(crate) fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub(crate) fn is_discard(&self) -> bool {
        matches!(self.completion, Completion::Discard)
    }

    /// Delivers `result` and fires the completion signal.
    ///
    /// `result` is `None` only for barriers. A dropped receiver means the
    /// producer gave up listening, which is not an error for the loop.
    pub(crate) fn complete(self, result: Option<PipeResult<Value>>) {
        match self.completion {
            Completion::Discard => {}
            Completion::Blocking(tx) => {
                let _ = tx.send(result.unwrap_or(Err(PipeError::EmptyCommand)));
            }
            Completion::Slot(cell) => cell.fill(result.unwrap_or(Err(PipeError::EmptyCommand))),
            Completion::Barrier(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.completion {
            Completion::Discard => "discard",
            Completion::Blocking(_) => "blocking",
            Completion::Slot(_) => "slot",
            Completion::Barrier(_) => "barrier",
        };
        f.debug_struct("Command")
            .field("request", &self.request)
            .field("completion", &kind)
            .finish()
    }
}
