//! # Connection Provider Contract
//!
//! Purpose: The narrow seam between the batching loop and whatever owns the
//! backend connections. The loop leases one connection per cycle, pipelines a
//! batch over it, and drops the lease to give it back.
//!
//! ## Design Principles
//! 1. **Scoped Acquisition**: A lease is an RAII value; dropping it releases the
//!    connection on every exit path, errors and unwinding included.
//! 2. **Strategy Pattern**: `KVPipe` is generic over the provider, so tests swap
//!    in an in-memory backend without touching the loop.
//! 3. **FIFO Replies**: `receive` returns replies in exactly the order their
//!    commands were passed to `send` within one lease.

use hkv_common::{Arg, PipeResult, Value};

/// A connection able to pipeline commands.
pub trait PipelineConnection {
    /// Queues a command for sending without waiting for its reply.
    fn send(&mut self, name: &str, args: &[Arg]) -> PipeResult<()>;

    /// Pushes every queued command to the backend.
    fn flush(&mut self) -> PipeResult<()>;

    /// Reads the next reply in send order.
    ///
    /// A backend error reply is `Err(PipeError::Server)` and leaves the stream
    /// usable; transport errors (`is_transport()`) do not.
    fn receive(&mut self) -> PipeResult<Value>;
}

/// Lends connections to the batching loop.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Leased connection; released when dropped.
    type Lease: PipelineConnection;

    /// Leases one connection, blocking or failing per the provider's policy.
    fn lease(&self) -> PipeResult<Self::Lease>;
}
