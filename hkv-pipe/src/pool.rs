//! # Connection Pool
//!
//! Purpose: Reuse TCP connections for the pipeline so each batch cycle pays
//! for one lease instead of one handshake, and serve as the default
//! `ConnectionProvider`.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: The mutex is released around every network call
//!    (dial, AUTH, liveness probe).
//! 3. **Blocking Backpressure**: With `wait_on_exhausted`, callers park on a
//!    condition variable until a connection comes back instead of failing.
//! 4. **Test-on-Borrow**: Connections idle past `stale_after` are pinged before
//!    reuse and transparently re-dialed when the probe fails.
//! 5. **Cache-Friendly Buffers**: Each connection reuses its own buffers.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hkv_common::{Arg, PipeError, PipeResult, Value};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::provider::{ConnectionProvider, PipelineConnection};
use crate::resp::{encode_command, read_frame};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Sent as `AUTH <password>` right after dialing.
    pub password: Option<String>,
    /// Sent as `SELECT <db>` right after dialing.
    pub db: Option<u32>,
    /// Maximum number of idle connections to keep.
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

struct IdleConnection {
    conn: Connection,
    since: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool with the provided configuration.
    ///
    /// No connection is dialed until the first `acquire`.
    pub fn new(config: PoolConfig) -> PipeResult<Self> {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    /// Acquires a connection from the pool.
    ///
    /// **Logic**:
    /// 1. Reuse the most recently returned idle connection, probing it first
    ///    when it has been idle for `stale_after` or longer.
    /// 2. Otherwise dial a new one if the `max_active` bound allows.
    /// 3. Otherwise wait for a release, or fail with `PoolExhausted`.
    pub fn acquire(&self) -> PipeResult<PooledConnection> {
        let config = &self.inner.config;
        let mut state = self.inner.state.lock();
        loop {
            // Most recently used first: it is the least likely to be stale.
            if let Some(idle) = state.idle.pop_back() {
                let revived = MutexGuard::unlocked(&mut state, || self.revive(idle));
                match revived {
                    Some(conn) => return Ok(PooledConnection::new(self.inner.clone(), conn)),
                    None => {
                        state.total = state.total.saturating_sub(1);
                        continue;
                    }
                }
            }

            if config.max_active == 0 || state.total < config.max_active {
                state.total += 1;
                let dialed = MutexGuard::unlocked(&mut state, || Connection::connect(config));
                return match dialed {
                    Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
                    Err(err) => {
                        state.total = state.total.saturating_sub(1);
                        self.inner.available.notify_one();
                        warn!(addr = %config.addr, error = %err, "dial failed");
                        Err(err)
                    }
                };
            }

            if !config.wait_on_exhausted {
                return Err(PipeError::PoolExhausted);
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Total connections currently owned by the pool (idle + in-use).
    pub fn active(&self) -> usize {
        self.inner.state.lock().total
    }

    /// Connections parked in the idle set.
    pub fn idle(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    fn revive(&self, idle: IdleConnection) -> Option<Connection> {
        let mut conn = idle.conn;
        if idle.since.elapsed() < self.inner.config.stale_after {
            return Some(conn);
        }
        match conn.exec("PING", &[]) {
            Ok(_) => Some(conn),
            Err(err) => {
                warn!(addr = %self.inner.config.addr, error = %err, "stale connection failed liveness probe");
                None
            }
        }
    }
}

impl PoolInner {
    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        self.available.notify_one();
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.state.lock();
        if state.idle.len() < self.config.max_idle {
            state.idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
        } else {
            state.total = state.total.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

impl ConnectionProvider for ConnectionPool {
    type Lease = PooledConnection;

    fn lease(&self) -> PipeResult<PooledConnection> {
        self.acquire()
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Sends one command and waits for its reply.
    pub fn exec(&mut self, name: &str, args: &[Arg]) -> PipeResult<Value> {
        let result = self.with_conn(|conn| conn.exec(name, args));
        self.track(result)
    }

    fn with_conn<T>(&mut self, f: impl FnOnce(&mut Connection) -> PipeResult<T>) -> PipeResult<T> {
        match self.conn.as_mut() {
            Some(conn) => f(conn),
            None => Err(PipeError::Connection("connection already released".to_string())),
        }
    }

    fn track<T>(&mut self, result: PipeResult<T>) -> PipeResult<T> {
        if let Err(err) = &result {
            // If IO/protocol fails, do not return this connection to the pool.
            if err.is_transport() {
                self.valid = false;
            }
        }
        result
    }
}

impl PipelineConnection for PooledConnection {
    fn send(&mut self, name: &str, args: &[Arg]) -> PipeResult<()> {
        let result = self.with_conn(|conn| conn.send(name, args));
        self.track(result)
    }

    fn flush(&mut self) -> PipeResult<()> {
        let result = self.with_conn(Connection::flush);
        self.track(result)
    }

    fn receive(&mut self) -> PipeResult<Value> {
        let result = self.with_conn(Connection::receive);
        self.track(result)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        // Unread replies would be handed to the next borrower.
        if self.valid && conn.pending == 0 {
            self.pool.return_connection(conn);
        } else {
            debug!(pending = conn.pending, "discarding connection");
            self.pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers.
///
/// Commands are encoded into `write_buf` by `send` and written out by `flush`;
/// `pending` counts replies still owed by the server.
struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    pending: usize,
}

impl Connection {
    fn connect(config: &PoolConfig) -> PipeResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(4096),
            pending: 0,
        };

        if let Some(password) = &config.password {
            conn.exec("AUTH", &[Arg::from(password.as_str())])
                .map_err(|err| PipeError::Connection(format!("AUTH failed: {err}")))?;
        }
        if let Some(db) = config.db {
            conn.exec("SELECT", &[Arg::from(db)])
                .map_err(|err| PipeError::Connection(format!("SELECT failed: {err}")))?;
        }

        debug!(addr = %config.addr, "dialed connection");
        Ok(conn)
    }

    fn send(&mut self, name: &str, args: &[Arg]) -> PipeResult<()> {
        encode_command(name.as_bytes(), args, &mut self.write_buf);
        self.pending += 1;
        Ok(())
    }

    fn flush(&mut self) -> PipeResult<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let stream = self.reader.get_mut();
        let written = stream.write_all(&self.write_buf).and_then(|()| stream.flush());
        self.write_buf.clear();
        written?;
        Ok(())
    }

    fn receive(&mut self) -> PipeResult<Value> {
        if self.pending == 0 {
            return Err(PipeError::Protocol(
                "receive called with no outstanding command".to_string(),
            ));
        }
        let frame = read_frame(&mut self.reader, &mut self.line_buf)?;
        self.pending -= 1;
        frame.into_result()
    }

    fn exec(&mut self, name: &str, args: &[Arg]) -> PipeResult<Value> {
        self.send(name, args)?;
        self.flush()?;
        self.receive()
    }
}

fn connect_stream(config: &PoolConfig) -> PipeResult<TcpStream> {
    let addr: SocketAddr = config
        .addr
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| PipeError::InvalidAddress(config.addr.clone()))?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}
