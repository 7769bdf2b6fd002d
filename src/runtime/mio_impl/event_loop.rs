//! mio event loop.
//!
//! Readiness model: poll reports the socket readable, then the worker
//! drains it with non-blocking `recv_from` calls and echoes each datagram
//! straight back. The poll timeout doubles as the shutdown-check cadence,
//! and under sustained load the drain loop re-checks the flag every batch
//! so shutdown stays live.

use crate::affinity;
use crate::runtime::socket::Endpoint;
use crate::runtime::stats::WorkerStats;
use crate::runtime::{DATAGRAM_BUFFER_SIZE, MAX_COMPLETION_BATCH, SHUTDOWN_TIMEOUT_MS};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

const SOCKET_TOKEN: Token = Token(0);

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
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(8);

    let std_socket: std::net::UdpSocket = endpoint.socket.into();
    let mut socket = UdpSocket::from_std(std_socket);
    poll.registry()
        .register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;

    let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];
    let mut stats = WorkerStats::default();

    info!(worker = worker_id, "Worker started");

    let timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);

    while !shutdown.load(Ordering::Relaxed) {
        match poll.poll(&mut events, Some(timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(worker = worker_id, error = %e, "Poll failed");
                continue;
            }
        }

        for event in events.iter() {
            if event.token() == SOCKET_TOKEN && event.is_readable() {
                drain_socket(worker_id, &socket, &mut buf, &mut stats, &shutdown);
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

/// Drain the socket until it would block, echoing as we go.
///
/// mio readiness is edge-triggered, so the socket must be read down to
/// `WouldBlock` before polling again; the shutdown flag is re-checked every
/// `MAX_COMPLETION_BATCH` datagrams so a saturating sender cannot pin the
/// worker in this loop.
fn drain_socket(
    worker_id: usize,
    socket: &UdpSocket,
    buf: &mut [u8],
    stats: &mut WorkerStats,
    shutdown: &AtomicBool,
) {
    let mut drained = 0usize;

    loop {
        match socket.recv_from(buf) {
            Ok((n, peer)) => {
                stats.record_recv(n);

                if n > 0 {
                    match socket.send_to(&buf[..n], peer) {
                        Ok(sent) => stats.record_send(sent),
                        Err(e) => {
                            warn!(
                                worker = worker_id,
                                peer = %peer,
                                error = %e,
                                "Failed to send echo, dropping datagram"
                            );
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(worker = worker_id, error = %e, "Receive failed");
                break;
            }
        }

        drained += 1;
        if drained % MAX_COMPLETION_BATCH == 0 && shutdown.load(Ordering::Relaxed) {
            break;
        }
    }
}
