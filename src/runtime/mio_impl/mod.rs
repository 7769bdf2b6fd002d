//! mio-based event loop implementation.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS). The
//! per-worker discipline is the same as the completion backend: one socket,
//! one poller, one pinned thread, no shared state on the datapath.

mod event_loop;

use crate::runtime::socket::Endpoint;
use crate::runtime::stats::WorkerStats;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Run the echo workers on the mio backend.
pub fn run(endpoints: Vec<Endpoint>, shutdown: Arc<AtomicBool>) -> io::Result<Vec<WorkerStats>> {
    event_loop::run(endpoints, shutdown)
}
