// hkv-common - Shared types for the HybridKV pipeline client
//
// This crate defines the error type, command arguments and reply values that
// the pipeline engine and its connection layer exchange.

pub mod args;
pub mod error;
pub mod value;

// Re-export for convenience
pub use args::*;
pub use error::*;
pub use value::*;
