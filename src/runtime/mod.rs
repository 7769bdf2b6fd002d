//! Per-core echo runtime.
//!
//! Platform-specific event loops:
//! - Linux: io_uring for completion-based I/O, or mio/epoll for comparison
//! - macOS: mio/kqueue for readiness-based I/O
//!
//! Both share the same shared-nothing shape: the supervisor builds one
//! bound endpoint per worker index, each worker thread is pinned to its
//! core and services only its own socket, and counters flow back to the
//! supervisor by value at join.

#[cfg(target_os = "linux")]
mod context;
mod socket;
mod stats;

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod mio_impl;

#[cfg(target_os = "linux")]
mod uring;

pub use stats::WorkerStats;

use crate::config::{Config, RuntimeType};
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// Depth of both the receive and send context pools per worker.
pub const OUTSTANDING_OPS: usize = 64;

/// Upper bound on one dequeue wait; also the shutdown-check cadence.
pub const SHUTDOWN_TIMEOUT_MS: u64 = 100;

/// Per-context datagram buffer, comfortably above a typical MTU.
pub const DATAGRAM_BUFFER_SIZE: usize = 2048;

/// Completions handled per dequeue batch.
pub(crate) const MAX_COMPLETION_BATCH: usize = OUTSTANDING_OPS * 2;

/// Number of logical processors on this host.
pub fn available_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve the configured core count: 0 or more than the machine has
/// means one worker per processor.
pub fn effective_workers(cores: usize) -> usize {
    let processors = available_processors();
    if cores == 0 || cores > processors {
        processors
    } else {
        cores
    }
}

/// Build the per-worker endpoints, run the selected backend until the
/// shutdown flag is set, and return the aggregated counters.
pub fn run(config: &Config, shutdown: Arc<AtomicBool>) -> io::Result<WorkerStats> {
    let worker_count = effective_workers(config.cores);

    info!(
        port = config.port,
        workers = worker_count,
        runtime = ?config.runtime,
        "Starting echo runtime"
    );

    let mut endpoints = Vec::with_capacity(worker_count);
    for cpu in 0..worker_count {
        match socket::create_endpoint(config.port, cpu, config.recvbuf) {
            Ok(endpoint) => {
                info!(cpu, family = %endpoint.family, "Created endpoint");
                endpoints.push(endpoint);
            }
            Err(e) => {
                warn!(cpu, error = %e, "Skipping worker, could not create endpoint");
            }
        }
    }

    if endpoints.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "failed to create any workers",
        ));
    }

    let per_worker = match config.runtime {
        RuntimeType::Mio => mio_impl::run(endpoints, shutdown)?,
        RuntimeType::Uring => {
            #[cfg(target_os = "linux")]
            {
                uring::run(endpoints, shutdown)?
            }
            #[cfg(not(target_os = "linux"))]
            {
                let _ = (endpoints, shutdown);
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "the io_uring runtime requires Linux; use --runtime mio",
                ));
            }
        }
    };

    Ok(WorkerStats::aggregate(per_worker.iter()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_workers_clamps_to_processor_count() {
        let processors = available_processors();
        assert_eq!(effective_workers(0), processors);
        assert_eq!(effective_workers(processors + 100), processors);
        assert_eq!(effective_workers(1), 1);
    }
}
