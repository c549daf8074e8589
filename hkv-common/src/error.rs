//! # Error Types
//!
//! Purpose: One error enum shared by the pipeline engine, the connection pool
//! and the reply conversion helpers.
//!
//! ## Design Principles
//! 1. **Cloneable**: A transport failure hits every command of a batch, so the
//!    same error must be handed to many callers.
//! 2. **Scoped Failures**: `is_transport()` separates failures that poison a
//!    connection from failures that belong to a single command.
//! 3. **No Boxed Sources**: IO errors are flattened into kind + message.

use std::io;

use thiserror::Error;

/// Result alias used across the HybridKV pipeline crates.
pub type PipeResult<T> = Result<T, PipeError>;

/// Errors surfaced by the pipeline engine and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    /// Network or IO failure while reading/writing.
    #[error("io error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// RESP2 framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Backend returned an error reply for this command.
    #[error("server error: {0}")]
    Server(String),

    /// A connection could not be leased or dialed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Pool is at capacity and configured not to wait.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Reply was nil where a value was required.
    #[error("nil reply")]
    Nil,

    /// Reply type cannot be converted into the requested type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Textual reply could not be parsed into the requested type.
    #[error("parse error: {0}")]
    Parse(String),

    /// Command name was empty.
    #[error("empty command name")]
    EmptyCommand,

    /// Configuration was rejected at construction time.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The batching loop has stopped; nothing more can be enqueued.
    #[error("pipeline closed")]
    Closed,
}

impl PipeError {
    /// Returns true when the error leaves the connection in an unknown state.
    ///
    /// Transport errors desynchronize the reply stream, so a connection that
    /// produced one must not be read from again or returned to the pool.
    pub fn is_transport(&self) -> bool {
        matches!(self, PipeError::Io { .. } | PipeError::Protocol(_))
    }

    /// Returns true for an error reply sent by the backend itself.
    pub fn is_server(&self) -> bool {
        matches!(self, PipeError::Server(_))
    }
}

impl From<io::Error> for PipeError {
    fn from(err: io::Error) -> Self {
        PipeError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
