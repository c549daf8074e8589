//! # Pipeline Configuration
//!
//! `PipeConfig` is the full surface for a pool-backed pipe; `EngineConfig` is
//! the subset the batching loop itself needs when a custom provider is injected.

use std::time::Duration;

use hkv_common::{PipeError, PipeResult};

use crate::pool::PoolConfig;

/// Default queue capacity; also the largest batch a single cycle can drain.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default coalescing quantum slept by the loop when the queue is empty.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(2);

/// Default idle time after which a pooled connection is probed before reuse.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

/// Settings consumed by the batching loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bound on queued commands. Producers block once it is reached.
    pub queue_capacity: usize,
    /// Sleep between polls of an empty queue.
    pub idle_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Rejects settings the loop cannot run with.
    pub fn validate(&self) -> PipeResult<()> {
        if self.queue_capacity == 0 {
            return Err(PipeError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.idle_interval.is_zero() {
            return Err(PipeError::InvalidConfig(
                "idle_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a pipe backed by the built-in connection pool.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Sent as `AUTH <password>` right after dialing.
    pub password: Option<String>,
    /// Sent as `SELECT <db>` right after dialing.
    pub db: Option<u32>,
    /// Bound on queued commands (backpressure and max batch size).
    pub queue_capacity: usize,
    /// Sleep between polls of an empty queue.
    pub idle_interval: Duration,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use); 0 means unlimited.
    pub max_active: usize,
    /// Block when the pool is exhausted instead of failing.
    pub wait_on_exhausted: bool,
    /// Idle time after which a connection is pinged before reuse.
    pub stale_after: Duration,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for PipeConfig {
    fn default() -> Self {
        PipeConfig {
            addr: "127.0.0.1:6379".to_string(),
            password: None,
            db: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            max_idle: 50,
            max_active: 50,
            wait_on_exhausted: true,
            stale_after: DEFAULT_STALE_AFTER,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl PipeConfig {
    /// Splits out the loop settings.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            queue_capacity: self.queue_capacity,
            idle_interval: self.idle_interval,
        }
    }

    /// Splits out the pool settings.
    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            addr: self.addr.clone(),
            password: self.password.clone(),
            db: self.db,
            max_idle: self.max_idle,
            max_active: self.max_active,
            wait_on_exhausted: self.wait_on_exhausted,
            stale_after: self.stale_after,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipeConfig::default().engine().validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacity_and_interval() {
        let config = EngineConfig {
            queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipeError::InvalidConfig(_))));

        let config = EngineConfig {
            idle_interval: Duration::ZERO,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipeError::InvalidConfig(_))));
    }
}
