//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM set a process-wide atomic flag; each worker observes
//! it between dequeue batches and exits its loop cooperatively, so the
//! handler only flips the flag and reports how many workers it is waiting
//! on to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install signal handlers for graceful shutdown.
///
/// Returns an `Arc<AtomicBool>` that is set to `true` when a shutdown
/// signal (SIGINT or SIGTERM) is received. `workers` is the number of
/// worker threads that will be drained once the flag flips; a second
/// signal skips the drain and exits immediately.
pub fn install_signal_handler(workers: usize) -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();

    ctrlc::set_handler(move || {
        if shutdown_flag.swap(true, Ordering::SeqCst) {
            tracing::warn!(workers, "Received second signal, exiting without draining workers");
            std::process::exit(1);
        }
        tracing::info!(workers, "Received shutdown signal, draining workers");
    })
    .expect("Failed to set signal handler");

    shutdown
}
