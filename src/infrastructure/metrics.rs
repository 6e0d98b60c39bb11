//! Metrics collection for runtime monitoring
//!
//! Lock-free counters using atomic operations.
//! Updated by the dispatcher and log sink, read through snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Runtime metrics collector
///
/// Thread-safe counters shared via `Arc`.
pub struct MetricsCollector {
    /// Connections registered with the poller
    connections_opened: AtomicU64,
    /// Connections closed (hangup, error, timeout or explicit)
    connections_closed: AtomicU64,
    /// Connections closed because their idle timer expired
    connections_timed_out: AtomicU64,
    /// Readiness events handed to the worker pool
    events_dispatched: AtomicU64,
    /// Timer callbacks run by the heap
    timers_expired: AtomicU64,
    /// Handler tasks queued on the pool
    tasks_submitted: AtomicU64,
    /// Handler tasks that returned without panicking
    tasks_completed: AtomicU64,
    /// Log lines rejected by a full log queue
    log_lines_dropped: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_timed_out: u64,
    pub active_connections: u64,
    pub events_dispatched: u64,
    pub timers_expired: u64,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub log_lines_dropped: u64,
    pub event_rate: f64, // events per second
    pub uptime_seconds: u64,
}

impl MetricsCollector {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            connections_timed_out: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            timers_expired: AtomicU64::new(0),
            tasks_submitted: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            log_lines_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.connections_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timers_expired(&self, count: u64) {
        self.timers_expired.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_log_dropped(&self) {
        self.log_lines_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        let events = self.events_dispatched.load(Ordering::Relaxed);

        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            events as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            connections_opened: opened,
            connections_closed: closed,
            connections_timed_out: self.connections_timed_out.load(Ordering::Relaxed),
            active_connections: opened.saturating_sub(closed),
            events_dispatched: events,
            timers_expired: self.timers_expired.load(Ordering::Relaxed),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            log_lines_dropped: self.log_lines_dropped.load(Ordering::Relaxed),
            event_rate: rate,
            uptime_seconds: uptime,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
