//! # Pipeline Benchmark Harness
//!
//! Purpose: Drive a live server through `KVPipe` from many threads and report
//! throughput plus how well commands were coalesced into batches.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Keys are derived from thread and op indices.
//! 2. **Allocation Control**: Values are pre-built once and shared by reference.
//! 3. **Contract Coverage**: Measures the blocking and the deferred paths
//!    separately, since they coalesce very differently.
//!
//! Usage: `bench_pipe [addr] [threads] [ops_per_thread] [value_size]`
//! (`RUST_LOG=hkv_pipe=debug` for loop logs).

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use hkv_pipe::{args, KVPipe, MetricsSnapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:6379";
const DEFAULT_THREADS: usize = 16;
const DEFAULT_OPS_PER_THREAD: usize = 10_000;
const DEFAULT_VALUE_SIZE: usize = 64;

struct BenchConfig {
    addr: String,
    threads: usize,
    ops_per_thread: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let threads = parse_usize(args.next(), DEFAULT_THREADS).max(1);
        let ops_per_thread = parse_usize(args.next(), DEFAULT_OPS_PER_THREAD).max(1);
        let value_size = parse_usize(args.next(), DEFAULT_VALUE_SIZE);

        BenchConfig {
            addr,
            threads,
            ops_per_thread,
            value_size,
        }
    }

    fn total_ops(&self) -> usize {
        self.threads * self.ops_per_thread
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn report(label: &str, ops: usize, elapsed: Duration, before: &MetricsSnapshot, after: &MetricsSnapshot) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let batches = after.batches_total - before.batches_total;
    let per_batch = (ops as f64) / (batches.max(1) as f64);
    println!(
        "{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {batches} batches, {per_batch:.1} cmds/batch)"
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = BenchConfig::from_args();
    let pipe = KVPipe::connect(config.addr.clone())
        .with_context(|| format!("failed to start pipeline against {}", config.addr))?;
    pipe.do_sync("PING", args![])
        .with_context(|| format!("server at {} did not answer PING", config.addr))?;

    info!(
        addr = %config.addr,
        threads = config.threads,
        ops_per_thread = config.ops_per_thread,
        value_size = config.value_size,
        "starting benchmark"
    );
    let value = vec![b'x'; config.value_size];

    // Blocking SET: every producer waits for its own reply.
    let before = pipe.stats();
    let start = Instant::now();
    run_per_op(&config, |t, i| {
        pipe.do_sync("SET", args![key(t, i), value.as_slice()])?;
        Ok(())
    })?;
    report("SET sync", config.total_ops(), start.elapsed(), &before, &pipe.stats());

    // Deferred GET: each producer queues everything, then waits once.
    let before = pipe.stats();
    let start = Instant::now();
    run_per_thread(&config, |t| {
        let slots: Vec<_> = (0..config.ops_per_thread)
            .map(|i| pipe.do_deferred("GET", args![key(t, i)]))
            .collect();
        pipe.wait()?;
        for slot in slots {
            let fetched = slot.get_as::<Vec<u8>>().context("slot empty after wait")??;
            ensure!(fetched.len() == value.len(), "short value for thread {t}");
        }
        Ok(())
    })?;
    report("GET deferred", config.total_ops(), start.elapsed(), &before, &pipe.stats());

    // Fire-and-forget DEL, drained by a final barrier.
    let before = pipe.stats();
    let start = Instant::now();
    run_per_op(&config, |t, i| {
        pipe.send("DEL", args![key(t, i)])?;
        Ok(())
    })?;
    pipe.wait()?;
    report("DEL send", config.total_ops(), start.elapsed(), &before, &pipe.stats());

    let stats = pipe.stats();
    info!(
        batches = stats.batches_total,
        commands = stats.commands_total,
        mean_batch = stats.batch_sizes.mean(),
        errors = stats.command_errors_total,
        "benchmark finished"
    );
    pipe.shutdown();
    Ok(())
}

fn key(thread: usize, op: usize) -> String {
    format!("bench:{thread}:{op}")
}

fn run_per_op<F>(config: &BenchConfig, op: F) -> Result<()>
where
    F: Fn(usize, usize) -> Result<()> + Sync,
{
    run_per_thread(config, |t| (0..config.ops_per_thread).try_for_each(|i| op(t, i)))
}

fn run_per_thread<F>(config: &BenchConfig, work: F) -> Result<()>
where
    F: Fn(usize) -> Result<()> + Sync,
{
    thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let work = &work;
                scope.spawn(move || work(t))
            })
            .collect();
        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => anyhow::bail!("benchmark thread panicked"),
            }
        }
        Ok(())
    })
}
