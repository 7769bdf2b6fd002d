//! Per-worker datapath counters.
//!
//! Each worker owns its counters exclusively; no atomics are needed on the
//! datapath. The supervisor reads them only from the value a worker thread
//! returns at join, which orders the read after every worker write.

/// Monotonic per-worker counters for the echo datapath.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl WorkerStats {
    /// Record a completed receive of `n` bytes.
    #[inline]
    pub fn record_recv(&mut self, n: usize) {
        self.packets_received += 1;
        self.bytes_received += n as u64;
    }

    /// Record a successfully enqueued echo of `n` bytes.
    #[inline]
    pub fn record_send(&mut self, n: usize) {
        self.packets_sent += 1;
        self.bytes_sent += n as u64;
    }

    /// Sum a set of per-worker snapshots into process totals.
    pub fn aggregate<'a>(workers: impl IntoIterator<Item = &'a WorkerStats>) -> WorkerStats {
        let mut total = WorkerStats::default();
        for w in workers {
            total.packets_received += w.packets_received;
            total.packets_sent += w.packets_sent;
            total.bytes_received += w.bytes_received;
            total.bytes_sent += w.bytes_sent;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_aggregate() {
        let mut a = WorkerStats::default();
        a.record_recv(100);
        a.record_recv(0);
        a.record_send(100);

        let mut b = WorkerStats::default();
        b.record_recv(64);

        assert_eq!(a.packets_received, 2);
        assert_eq!(a.bytes_received, 100);
        assert_eq!(a.packets_sent, 1);
        assert_eq!(a.bytes_sent, 100);

        let total = WorkerStats::aggregate([&a, &b]);
        assert_eq!(total.packets_received, 3);
        assert_eq!(total.packets_sent, 1);
        assert_eq!(total.bytes_received, 164);
        assert_eq!(total.bytes_sent, 100);
    }

    #[test]
    fn test_sent_never_exceeds_received_in_echo_flow() {
        // The echo flow only records a send for a previously recorded
        // non-empty receive, so sent counters trail received counters.
        let mut stats = WorkerStats::default();
        for i in 0..100 {
            stats.record_recv(64);
            if i % 3 != 0 {
                stats.record_send(64);
            }
        }
        assert!(stats.packets_sent <= stats.packets_received);
        assert!(stats.bytes_sent <= stats.bytes_received);
    }
}
