//! Linux io_uring event loop implementation.
//!
//! Completion-based I/O: every worker keeps a fixed number of `RecvMsg`
//! operations outstanding on its own ring and drains completions in
//! batches, echoing each datagram back with a pooled `SendMsg` context.

mod event_loop;
mod token;

pub(crate) use token::{OpType, TokenAllocator};

use crate::runtime::socket::Endpoint;
use crate::runtime::stats::WorkerStats;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Run the echo workers on the io_uring backend.
pub fn run(endpoints: Vec<Endpoint>, shutdown: Arc<AtomicBool>) -> io::Result<Vec<WorkerStats>> {
    event_loop::run(endpoints, shutdown)
}
