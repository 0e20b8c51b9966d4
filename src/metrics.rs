//! Tunnel metrics collection.
//!
//! Aggregate counters only; nothing here identifies a forwarded connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Tunnel metrics collector.
pub struct TunnelMetrics {
    /// Collector creation time
    start_time: Instant,
    /// Carriers dialed or accepted
    total_carriers: AtomicU64,
    /// Carriers with a live session
    active_carriers: AtomicU64,
    /// Carrier-level failures (handshake, session build, open/accept)
    carrier_failures: AtomicU64,
    /// Client reconnections
    reconnects: AtomicU64,
    /// Forwarded connections started
    total_streams: AtomicU64,
    /// Forwarded connections still relaying
    active_streams: AtomicU64,
    /// Relays that ended with an error
    stream_errors: AtomicU64,
    /// Target dial failures
    dial_failures: AtomicU64,
    /// Bytes moved from the local side to the remote side
    bytes_up: AtomicU64,
    /// Bytes moved from the remote side to the local side
    bytes_down: AtomicU64,
}

impl TunnelMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_carriers: AtomicU64::new(0),
            active_carriers: AtomicU64::new(0),
            carrier_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            total_streams: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            dial_failures: AtomicU64::new(0),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
        }
    }

    /// A carrier was established.
    pub fn carrier_opened(&self) {
        self.total_carriers.fetch_add(1, Ordering::Relaxed);
        self.active_carriers.fetch_add(1, Ordering::Relaxed);
    }

    /// A carrier with a live session went away.
    pub fn carrier_closed(&self) {
        // Saturate: a carrier can fail before it was counted active.
        let _ = self
            .active_carriers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Count a carrier-level failure.
    pub fn increment_carrier_failures(&self) {
        self.carrier_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a client reconnection.
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// A relay started.
    pub fn stream_opened(&self) {
        self.total_streams.fetch_add(1, Ordering::Relaxed);
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// A relay finished.
    pub fn stream_closed(&self, up: u64, down: u64, failed: bool) {
        let _ = self
            .active_streams
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.bytes_up.fetch_add(up, Ordering::Relaxed);
        self.bytes_down.fetch_add(down, Ordering::Relaxed);
        if failed {
            self.stream_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a target dial failure.
    pub fn increment_dial_failures(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            total_carriers: self.total_carriers.load(Ordering::Relaxed),
            active_carriers: self.active_carriers.load(Ordering::Relaxed),
            carrier_failures: self.carrier_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            total_streams: self.total_streams.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
        }
    }

    /// Format metrics as a simple text report.
    pub fn format_report(&self) -> String {
        let s = self.snapshot();

        format!(
            r#"Tunnel Metrics
==============
Uptime: {} seconds

Carriers:
  Total:      {}
  Active:     {}
  Failures:   {}
  Reconnects: {}

Streams:
  Total:         {}
  Active:        {}
  Errors:        {}
  Dial Failures: {}

Traffic:
  Up:   {} bytes
  Down: {} bytes
"#,
            s.uptime_secs,
            s.total_carriers,
            s.active_carriers,
            s.carrier_failures,
            s.reconnects,
            s.total_streams,
            s.active_streams,
            s.stream_errors,
            s.dial_failures,
            s.bytes_up,
            s.bytes_down,
        )
    }
}

impl Default for TunnelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_carriers: u64,
    pub active_carriers: u64,
    pub carrier_failures: u64,
    pub reconnects: u64,
    pub total_streams: u64,
    pub active_streams: u64,
    pub stream_errors: u64,
    pub dial_failures: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
}

impl MetricsSnapshot {
    /// Average forwarded connections per carrier.
    pub fn streams_per_carrier(&self) -> f64 {
        if self.total_carriers == 0 {
            0.0
        } else {
            self.total_streams as f64 / self.total_carriers as f64
        }
    }

    /// Calculate throughput in bytes per second.
    pub fn throughput_bps(&self) -> f64 {
        if self.uptime_secs == 0 {
            0.0
        } else {
            (self.bytes_up + self.bytes_down) as f64 / self.uptime_secs as f64
        }
    }
}
