//! In-memory `ConnectionProvider` used by the unit tests.
//!
//! It executes a handful of string commands against a `HashMap`, records what
//! the loop sent per flush, and can be told to fail leases, flushes or reads.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hkv_common::{Arg, PipeError, PipeResult, Value};
use parking_lot::Mutex;

use crate::provider::{ConnectionProvider, PipelineConnection};

#[derive(Default)]
struct MemoryState {
    data: HashMap<Vec<u8>, Bytes>,
    /// Command names per flush, in send order.
    flushes: Vec<Vec<String>>,
    leases: usize,
    releases: usize,
    fail_leases: usize,
    fail_flush: bool,
    /// Receive call (1-based, per lease) that fails with a transport error.
    fail_receive_at: Option<usize>,
    flush_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryProvider {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_next_leases(&self, count: usize) {
        self.state.lock().fail_leases = count;
    }

    pub(crate) fn fail_flush(&self, fail: bool) {
        self.state.lock().fail_flush = fail;
    }

    pub(crate) fn fail_receive_at(&self, call: Option<usize>) {
        self.state.lock().fail_receive_at = call;
    }

    pub(crate) fn slow_flush(&self, delay: Duration) {
        self.state.lock().flush_delay = Some(delay);
    }

    pub(crate) fn leases(&self) -> usize {
        self.state.lock().leases
    }

    pub(crate) fn releases(&self) -> usize {
        self.state.lock().releases
    }

    pub(crate) fn flushes(&self) -> Vec<Vec<String>> {
        self.state.lock().flushes.clone()
    }

    /// Every command name the backend received, across all flushes.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.state.lock().flushes.concat()
    }

    pub(crate) fn get(&self, key: &str) -> Option<Bytes> {
        self.state.lock().data.get(key.as_bytes()).cloned()
    }
}

impl ConnectionProvider for MemoryProvider {
    type Lease = MemoryLease;

    fn lease(&self) -> PipeResult<MemoryLease> {
        let mut state = self.state.lock();
        if state.fail_leases > 0 {
            state.fail_leases -= 1;
            return Err(PipeError::Connection("lease refused".to_string()));
        }
        state.leases += 1;
        Ok(MemoryLease {
            state: self.state.clone(),
            queued: Vec::new(),
            replies: VecDeque::new(),
            receives: 0,
        })
    }
}

pub(crate) struct MemoryLease {
    state: Arc<Mutex<MemoryState>>,
    queued: Vec<(String, Vec<Arg>)>,
    replies: VecDeque<PipeResult<Value>>,
    receives: usize,
}

impl PipelineConnection for MemoryLease {
    fn send(&mut self, name: &str, args: &[Arg]) -> PipeResult<()> {
        self.queued.push((name.to_string(), args.to_vec()));
        Ok(())
    }

    fn flush(&mut self) -> PipeResult<()> {
        let delay = self.state.lock().flush_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.fail_flush {
            self.queued.clear();
            return Err(PipeError::Io {
                kind: std::io::ErrorKind::BrokenPipe,
                message: "flush refused".to_string(),
            });
        }
        let names = self.queued.iter().map(|(name, _)| name.clone()).collect();
        state.flushes.push(names);
        for (name, args) in self.queued.drain(..) {
            let reply = execute(&mut state.data, &name, &args);
            self.replies.push_back(reply);
        }
        Ok(())
    }

    fn receive(&mut self) -> PipeResult<Value> {
        self.receives += 1;
        if self.state.lock().fail_receive_at == Some(self.receives) {
            return Err(PipeError::Protocol("connection reset".to_string()));
        }
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(PipeError::Protocol("no reply pending".to_string())))
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.state.lock().releases += 1;
    }
}

fn execute(data: &mut HashMap<Vec<u8>, Bytes>, name: &str, args: &[Arg]) -> PipeResult<Value> {
    match (name.to_ascii_uppercase().as_str(), args) {
        ("PING", []) => Ok(Value::Status("PONG".to_string())),
        ("SET", [key, value]) => {
            data.insert(key.as_bytes().to_vec(), Bytes::copy_from_slice(value.as_bytes()));
            Ok(Value::Status("OK".to_string()))
        }
        ("GET", [key]) => Ok(data
            .get(key.as_bytes())
            .cloned()
            .map(Value::Bulk)
            .unwrap_or(Value::Nil)),
        ("DEL", [key]) => Ok(Value::Int(i64::from(data.remove(key.as_bytes()).is_some()))),
        _ => Err(PipeError::Server(format!("ERR unknown command '{name}'"))),
    }
}
