//! Publish counters shared between the simulation loop and observers.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Lock-free counters updated by the publish gateway.
#[derive(Debug, Default)]
pub struct PublishMetrics {
    routine_sent: AtomicU64,
    crash_confirmed: AtomicU64,
    send_failures: AtomicU64,
    crash_lost: AtomicU64,
    confirm_retries: AtomicU64,
    broadcast_failures: AtomicU64,
    rate: Mutex<RateWindow>,
}

/// Deliveries bucketed by the whole second of the record's event time.
#[derive(Debug, Default)]
struct RateWindow {
    second: i64,
    count: u64,
    last_full_second: u64,
}

impl RateWindow {
    fn record(&mut self, at_ms: i64) {
        let second = at_ms.div_euclid(1_000);
        if second > self.second {
            self.last_full_second = if second == self.second + 1 { self.count } else { 0 };
            self.second = second;
            self.count = 0;
        }
        self.count += 1;
    }
}

/// Point-in-time copy of [`PublishMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishMetricsSnapshot {
    pub routine_sent: u64,
    pub crash_confirmed: u64,
    pub send_failures: u64,
    pub crash_lost: u64,
    pub confirm_retries: u64,
    pub broadcast_failures: u64,
    /// Deliveries in the last completed second of simulated time.
    pub messages_per_second: u64,
}

impl PublishMetricsSnapshot {
    /// Records that reached the transport.
    pub fn delivered(&self) -> u64 {
        self.routine_sent + self.crash_confirmed
    }
}

impl PublishMetrics {
    pub fn record_routine_sent(&self) {
        self.routine_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crash_confirmed(&self) {
        self.crash_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crash_lost(&self) {
        self.crash_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confirm_retry(&self) {
        self.confirm_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast_failure(&self) {
        self.broadcast_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one delivered record towards the per-second rate.
    pub fn record_delivery(&self, at_ms: i64) {
        self.rate.lock().record(at_ms);
    }

    pub fn snapshot(&self) -> PublishMetricsSnapshot {
        PublishMetricsSnapshot {
            routine_sent: self.routine_sent.load(Ordering::Relaxed),
            crash_confirmed: self.crash_confirmed.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            crash_lost: self.crash_lost.load(Ordering::Relaxed),
            confirm_retries: self.confirm_retries.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
            messages_per_second: self.rate.lock().last_full_second,
        }
    }

    /// Summary line for the periodic fleet log.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "sent={} crashes_confirmed={} send_failures={} crashes_lost={} retries={} broadcast_failures={} rate={}/s",
            s.routine_sent,
            s.crash_confirmed,
            s.send_failures,
            s.crash_lost,
            s.confirm_retries,
            s.broadcast_failures,
            s.messages_per_second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let m = PublishMetrics::default();
        m.record_routine_sent();
        m.record_routine_sent();
        m.record_crash_confirmed();
        m.record_confirm_retry();
        let s = m.snapshot();
        assert_eq!(s.routine_sent, 2);
        assert_eq!(s.crash_confirmed, 1);
        assert_eq!(s.confirm_retries, 1);
        assert_eq!(s.delivered(), 3);
        assert_eq!(s.crash_lost, 0);
        assert!(m.summary().contains("sent=2"));
    }

    #[test]
    fn rate_reports_the_last_completed_second() {
        let m = PublishMetrics::default();
        let start = 1_709_303_400_000_i64;
        for offset in [0, 100, 900] {
            m.record_delivery(start + offset);
        }
        assert_eq!(m.snapshot().messages_per_second, 0);

        m.record_delivery(start + 1_000);
        assert_eq!(m.snapshot().messages_per_second, 3);
        m.record_delivery(start + 1_500);
        assert_eq!(m.snapshot().messages_per_second, 3);

        m.record_delivery(start + 2_000);
        assert_eq!(m.snapshot().messages_per_second, 2);
        assert!(m.summary().ends_with("rate=2/s"));

        // A gap with no deliveries reads as a zero rate.
        m.record_delivery(start + 5_000);
        assert_eq!(m.snapshot().messages_per_second, 0);
    }
}
