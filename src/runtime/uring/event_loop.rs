//! io_uring event loop for Linux.
//!
//! Completion-based model: each worker owns one ring tied to one endpoint,
//! keeps `OUTSTANDING_OPS` receives posted at all times, and services
//! completions in bounded batches. The batch wait carries a timeout so the
//! shutdown flag is observed even on an idle socket.

use super::{OpType, TokenAllocator};
use crate::affinity;
use crate::runtime::context::{ContextPool, IoContext};
use crate::runtime::socket::Endpoint;
use crate::runtime::stats::WorkerStats;
use crate::runtime::{
    DATAGRAM_BUFFER_SIZE, MAX_COMPLETION_BATCH, OUTSTANDING_OPS, SHUTDOWN_TIMEOUT_MS,
};
use io_uring::{opcode, squeue, types, IoUring};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Run one pinned worker thread per endpoint and collect their counters.
pub(crate) fn run(
    endpoints: Vec<Endpoint>,
    shutdown: Arc<AtomicBool>,
) -> io::Result<Vec<WorkerStats>> {
    let mut handles = Vec::with_capacity(endpoints.len());

    for (worker_id, endpoint) in endpoints.into_iter().enumerate() {
        let shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name(format!("worker-{worker_id}"))
            .spawn(move || {
                match affinity::pin_current_thread(endpoint.cpu) {
                    Ok(()) => info!(worker = worker_id, cpu = endpoint.cpu, "Thread affinity set"),
                    Err(e) => warn!(
                        worker = worker_id,
                        cpu = endpoint.cpu,
                        error = %e,
                        "Could not set thread affinity"
                    ),
                }

                match worker_loop(worker_id, endpoint, shutdown) {
                    Ok(stats) => stats,
                    Err(e) => {
                        error!(worker = worker_id, error = %e, "Worker failed");
                        WorkerStats::default()
                    }
                }
            })?;

        handles.push(handle);
    }

    // Workers observe the shutdown flag within one dequeue timeout; a
    // panicked worker forfeits only its own counters.
    let mut stats = Vec::with_capacity(handles.len());
    for handle in handles {
        stats.push(handle.join().unwrap_or_default());
    }

    Ok(stats)
}

fn worker_loop(
    worker_id: usize,
    endpoint: Endpoint,
    shutdown: Arc<AtomicBool>,
) -> io::Result<WorkerStats> {
    let fd = endpoint.socket.as_raw_fd();

    let mut recv_ctxs: Vec<Box<IoContext>> = (0..OUTSTANDING_OPS)
        .map(|_| Box::new(IoContext::new(DATAGRAM_BUFFER_SIZE)))
        .collect();
    let mut send_pool = ContextPool::new(OUTSTANDING_OPS, DATAGRAM_BUFFER_SIZE);
    let mut tokens = TokenAllocator::new(MAX_COMPLETION_BATCH);
    let mut stats = WorkerStats::default();

    // Receives stay posted until the ring closes, so the ring must be
    // declared after the contexts: it then drops first and the kernel
    // cancels and retires the in-flight operations while the buffers they
    // point into are still alive.
    let ring_depth = (MAX_COMPLETION_BATCH as u32).next_power_of_two();
    let mut ring: IoUring = IoUring::new(ring_depth)?;

    for idx in 0..OUTSTANDING_OPS {
        if let Err(e) = submit_recv(&mut ring, &mut tokens, fd, &mut recv_ctxs[idx], idx) {
            warn!(worker = worker_id, error = %e, "Failed to post initial receive");
        }
    }

    info!(
        worker = worker_id,
        outstanding = OUTSTANDING_OPS,
        "Worker started"
    );

    let timeout = types::Timespec::new()
        .sec(SHUTDOWN_TIMEOUT_MS / 1000)
        .nsec(((SHUTDOWN_TIMEOUT_MS % 1000) * 1_000_000) as u32);

    while !shutdown.load(Ordering::Relaxed) {
        let args = types::SubmitArgs::new().timespec(&timeout);
        match ring.submitter().submit_with_args(1, &args) {
            Ok(_) => {}
            Err(ref e) if e.raw_os_error() == Some(libc::ETIME) => continue,
            Err(ref e) if e.raw_os_error() == Some(libc::EINTR) => continue,
            // EBUSY means the completion queue needs draining first.
            Err(ref e) if e.raw_os_error() == Some(libc::EBUSY) => {}
            Err(_) => continue,
        }

        let mut handled = 0;
        while handled < MAX_COMPLETION_BATCH {
            let cqe = match ring.completion().next() {
                Some(cqe) => cqe,
                None => break,
            };
            handled += 1;

            let op = match tokens.free(cqe.user_data()) {
                Some(op) => op,
                None => {
                    debug!(worker = worker_id, token = cqe.user_data(), "Spurious completion");
                    continue;
                }
            };

            match op {
                OpType::Recv { ctx } => {
                    let result = cqe.result();
                    if result < 0 {
                        let err = io::Error::from_raw_os_error(-result);
                        if !shutdown.load(Ordering::Relaxed) {
                            warn!(worker = worker_id, error = %err, "Receive failed");
                        }
                    } else {
                        let n = result as usize;
                        stats.record_recv(n);

                        if n > 0 {
                            match send_pool.acquire() {
                                Some(send_idx) => {
                                    send_pool.get_mut(send_idx).stage_echo(&recv_ctxs[ctx], n);
                                    match submit_send(
                                        &mut ring,
                                        &mut tokens,
                                        fd,
                                        send_pool.get_mut(send_idx),
                                        send_idx,
                                        n,
                                    ) {
                                        Ok(()) => stats.record_send(n),
                                        Err(e) => {
                                            warn!(
                                                worker = worker_id,
                                                error = %e,
                                                "Failed to post echo send, dropping datagram"
                                            );
                                            send_pool.release(send_idx);
                                        }
                                    }
                                }
                                None => {
                                    warn!(
                                        worker = worker_id,
                                        "No send context available, dropping echo"
                                    );
                                }
                            }
                        }
                    }

                    // Keep the receive pipeline at depth regardless of the
                    // echo outcome.
                    if let Err(e) = submit_recv(&mut ring, &mut tokens, fd, &mut recv_ctxs[ctx], ctx)
                    {
                        warn!(
                            worker = worker_id,
                            error = %e,
                            "Failed to re-post receive, pipeline depth reduced"
                        );
                    }
                }
                OpType::Send { ctx } => {
                    let result = cqe.result();
                    if result < 0 {
                        let err = io::Error::from_raw_os_error(-result);
                        debug!(worker = worker_id, error = %err, "Echo send failed");
                    }
                    send_pool.release(ctx);
                }
            }
        }
    }

    info!(
        worker = worker_id,
        packets_received = stats.packets_received,
        packets_sent = stats.packets_sent,
        bytes_received = stats.bytes_received,
        bytes_sent = stats.bytes_sent,
        "Worker shutting down"
    );

    Ok(stats)
}

fn submit_recv(
    ring: &mut IoUring,
    tokens: &mut TokenAllocator,
    fd: RawFd,
    ctx: &mut IoContext,
    idx: usize,
) -> io::Result<()> {
    let token = tokens.alloc(OpType::Recv { ctx: idx });
    let msg = ctx.prepare_recv();

    let recv = opcode::RecvMsg::new(types::Fd(fd), msg)
        .build()
        .user_data(token);

    if let Err(e) = push_sqe(ring, &recv) {
        tokens.free(token);
        return Err(e);
    }
    Ok(())
}

fn submit_send(
    ring: &mut IoUring,
    tokens: &mut TokenAllocator,
    fd: RawFd,
    ctx: &mut IoContext,
    idx: usize,
    len: usize,
) -> io::Result<()> {
    let token = tokens.alloc(OpType::Send { ctx: idx });
    let msg = ctx.prepare_send(len);

    let send = opcode::SendMsg::new(types::Fd(fd), msg)
        .build()
        .user_data(token);

    if let Err(e) = push_sqe(ring, &send) {
        tokens.free(token);
        return Err(e);
    }
    Ok(())
}

/// Push one SQE, flushing the submission queue once if it is full.
fn push_sqe(ring: &mut IoUring, sqe: &squeue::Entry) -> io::Result<()> {
    unsafe {
        if ring.submission().push(sqe).is_ok() {
            return Ok(());
        }
    }

    ring.submit()?;

    unsafe {
        ring.submission()
            .push(sqe)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "submission queue full"))
    }
}
