//! # HybridKV Pipeline Client
//!
//! Purpose: Turn commands issued independently by many threads into one
//! pipelined round trip per cycle over a single pooled connection, then route
//! each reply back to the thread that asked for it.
//!
//! ## Design Principles
//! 1. **Single Consumer**: One background loop owns the connection for a
//!    whole cycle, so reply order equals send order.
//! 2. **Bounded Queue**: Producers block instead of growing memory without limit.
//! 3. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hkv_pipe::{args, KVPipe};
//!
//! let pipe = KVPipe::connect("127.0.0.1:6379")?;
//! pipe.send("SET", args!["a1", 1])?;
//! let value: i64 = pipe.query("GET", args!["a1"])?;
//! assert_eq!(value, 1);
//! # Ok::<(), hkv_pipe::PipeError>(())
//! ```

mod batcher;
mod command;
mod completion;
mod config;
mod metrics;
mod pipe;
mod pool;
mod provider;
mod queue;
mod resp;

#[cfg(test)]
mod testing;

pub use completion::{DeferredSlot, Reply};
pub use config::{
    EngineConfig, PipeConfig, DEFAULT_IDLE_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_STALE_AFTER,
};
pub use metrics::{HistogramSnapshot, MetricsSnapshot};
pub use pipe::KVPipe;
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use provider::{ConnectionProvider, PipelineConnection};

pub use hkv_common::{args, convert, Arg, FromValue, PipeError, PipeResult, Value};
