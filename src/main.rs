//! udp-echod: a scalable shared-nothing UDP echo server
//!
//! The listening port is partitioned into one socket per core. Each worker
//! thread is pinned to its core and owns its socket, its event queue, and
//! its I/O contexts outright, so the datapath runs without locks or shared
//! buffers. Every datagram is echoed back to its sender verbatim.
//!
//! Features:
//! - io_uring completion backend (Linux) and mio readiness backend
//! - SO_REUSEPORT fan-out with SO_INCOMING_CPU steering hints
//! - Configuration via CLI arguments or TOML file

mod affinity;
mod config;
mod runtime;
mod signal;

use config::Config;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Warnings and errors to stderr, informational lines to stdout; each
    // event is written as a single atomic line.
    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .init();

    let workers = runtime::effective_workers(config.cores);
    println!("udp-echod: scalable UDP echo server");
    println!("Port: {}", config.port);
    println!("Available processors: {}", runtime::available_processors());
    println!("Using {} worker(s)", workers);

    let shutdown = signal::install_signal_handler(workers);

    let totals = runtime::run(&config, shutdown)?;

    println!("\nFinal statistics:");
    println!("  Total packets received: {}", totals.packets_received);
    println!("  Total packets sent: {}", totals.packets_sent);
    println!("  Total bytes received: {}", totals.bytes_received);
    println!("  Total bytes sent: {}", totals.bytes_sent);

    Ok(())
}
