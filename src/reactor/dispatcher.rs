//! Readiness dispatch loop
//!
//! Ties the pieces together the way a reactor-style server's main loop does:
//! the timer heap decides how long to wait, the poller reports ready
//! descriptors, and the worker pool runs the per-connection handlers.
//! Idle connections are closed when their timer fires; any activity pushes
//! the timer back.
//!
//! Timer callbacks cannot reach the poller (the loop owns it), so they only
//! push the expired descriptor into a bounded queue that the loop drains
//! right after expiring timers. When that queue overflows the callback raises
//! a flag instead, and the loop closes every connection left without a timer.

use crate::infrastructure::block_queue::BlockQueue;
use crate::infrastructure::config::ServerConfig;
use crate::infrastructure::metrics::MetricsCollector;
use crate::infrastructure::thread_pool::ThreadPool;
use crate::reactor::poller::{Interest, Poller, ReadyEvent};
use crate::timer::{HeapTimer, TimerId};
use crate::Result;
use std::collections::HashSet;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a connection was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CloseReason {
    /// Idle timer expired
    TimedOut,
    /// Peer hung up
    HangUp,
    /// Poller reported an error condition
    Error,
    /// Closed by the owner of the dispatcher
    Requested,
}

/// Per-connection callbacks
///
/// `on_readable`/`on_writable` run on pool workers; `on_close` runs on the
/// dispatcher thread.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_readable(&self, fd: RawFd);

    fn on_writable(&self, _fd: RawFd) {}

    fn on_close(&self, fd: RawFd, reason: CloseReason);
}

impl<T: ConnectionHandler> ConnectionHandler for Arc<T> {
    fn on_readable(&self, fd: RawFd) {
        (**self).on_readable(fd)
    }

    fn on_writable(&self, fd: RawFd) {
        (**self).on_writable(fd)
    }

    fn on_close(&self, fd: RawFd, reason: CloseReason) {
        (**self).on_close(fd, reason)
    }
}

/// Interest set used for new connections
pub const CONNECTION_INTEREST: Interest = Interest::from_bits(
    Interest::READABLE.bits() | Interest::READ_HANG_UP.bits() | Interest::EDGE_TRIGGERED.bits(),
);

const CLOSE_EVENTS: Interest =
    Interest::from_bits(Interest::HANG_UP.bits() | Interest::READ_HANG_UP.bits() | Interest::ERROR.bits());

/// Main loop state
pub struct Dispatcher<P: Poller, H: ConnectionHandler> {
    poller: P,
    handler: Arc<H>,
    timers: HeapTimer,
    pool: ThreadPool,
    expired: Arc<BlockQueue<RawFd>>,
    /// Set when an expiry did not fit in `expired`
    overflowed: Arc<AtomicBool>,
    connections: HashSet<RawFd>,
    events: Vec<ReadyEvent>,
    timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl<P: Poller, H: ConnectionHandler> Dispatcher<P, H> {
    /// Create a dispatcher and spawn its worker pool
    pub fn new(poller: P, handler: H, config: &ServerConfig, metrics: Arc<MetricsCollector>) -> Result<Self> {
        let pool = ThreadPool::new(config.worker_threads)?;
        Ok(Self {
            poller,
            handler: Arc::new(handler),
            timers: HeapTimer::new(),
            pool,
            expired: Arc::new(BlockQueue::new(config.expired_queue_capacity)),
            overflowed: Arc::new(AtomicBool::new(false)),
            connections: HashSet::new(),
            events: Vec::with_capacity(config.max_events),
            timeout: Duration::from_millis(config.connection_timeout_ms),
            metrics,
        })
    }

    /// Start watching a connection and arm its idle timer
    pub fn add_connection(&mut self, fd: RawFd) -> Result<()> {
        if fd < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative descriptor").into());
        }
        self.poller.register(fd, CONNECTION_INTEREST)?;
        self.connections.insert(fd);
        self.arm_timer(fd);
        self.metrics.record_connection_opened();
        tracing::debug!("Connection {} registered", fd);
        Ok(())
    }

    /// Change what a live connection is watched for
    pub fn modify_connection(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        self.poller.modify(fd, interest)?;
        Ok(())
    }

    /// Unregister, cancel the timer and notify the handler
    ///
    /// Unknown descriptors are ignored.
    pub fn close_connection(&mut self, fd: RawFd, reason: CloseReason) {
        if !self.connections.remove(&fd) {
            return;
        }
        // Already gone when the close came from the timer itself
        let _ = self.timers.cancel(timer_id(fd));
        if let Err(e) = self.poller.unregister(fd) {
            tracing::debug!("Unregister of {} failed: {}", fd, e);
        }
        self.metrics.record_connection_closed();
        tracing::debug!("Connection {} closed: {:?}", fd, reason);
        self.handler.on_close(fd, reason);
    }

    /// One loop iteration: expire idle connections, wait, dispatch
    ///
    /// Returns the number of readiness events handled.
    pub fn run_once(&mut self) -> Result<usize> {
        let now = Instant::now();
        let fired = self.timers.expire_ready(now);
        self.metrics.record_timers_expired(fired as u64);
        let wait = self.timers.next_deadline(now);
        self.reap_expired();

        let mut events = std::mem::take(&mut self.events);
        events.clear();
        let result = self.poller.wait(wait, &mut events);

        let handled = match result {
            Ok(_) => {
                for event in &events {
                    self.dispatch(*event);
                }
                events.len()
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
            Err(e) => {
                self.events = events;
                return Err(e.into());
            }
        };

        self.events = events;
        Ok(handled)
    }

    /// Loop until `running` is cleared
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        tracing::info!("Dispatcher running with {} workers", self.pool.size());
        while running.load(Ordering::Acquire) {
            self.run_once()?;
        }
        tracing::info!("Dispatcher stopped");
        Ok(())
    }

    /// Close every connection and wait for queued handler work to finish
    pub fn shutdown(mut self) {
        let open: Vec<RawFd> = self.connections.iter().copied().collect();
        for fd in open {
            self.close_connection(fd, CloseReason::Requested);
        }
        self.timers.clear();
        self.pool.shutdown();
    }

    /// Live connections
    #[inline]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn poller(&self) -> &P {
        &self.poller
    }

    #[inline]
    pub fn poller_mut(&mut self) -> &mut P {
        &mut self.poller
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    fn dispatch(&mut self, event: ReadyEvent) {
        let fd = event.fd;
        if !self.connections.contains(&fd) {
            tracing::trace!("Event for unknown descriptor {}", fd);
            return;
        }

        if event.events.intersects(CLOSE_EVENTS) {
            let reason = if event.events.contains(Interest::ERROR) {
                CloseReason::Error
            } else {
                CloseReason::HangUp
            };
            self.close_connection(fd, reason);
            return;
        }

        // Activity: push the idle deadline back
        let _ = self.timers.adjust(timer_id(fd), self.timeout);

        if event.events.contains(Interest::READABLE) {
            let handler = Arc::clone(&self.handler);
            self.submit(move || handler.on_readable(fd));
        }
        if event.events.contains(Interest::WRITABLE) {
            let handler = Arc::clone(&self.handler);
            self.submit(move || handler.on_writable(fd));
        }
    }

    fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let metrics = Arc::clone(&self.metrics);
        self.pool.submit(move || {
            task();
            metrics.record_task_completed();
        });
        self.metrics.record_task_submitted();
        self.metrics.record_event_dispatched();
    }

    fn arm_timer(&mut self, fd: RawFd) {
        let expired = Arc::clone(&self.expired);
        let overflowed = Arc::clone(&self.overflowed);
        self.timers.add(timer_id(fd), self.timeout, move || {
            if expired.push(fd).is_err() {
                overflowed.store(true, Ordering::Release);
            }
        });
    }

    fn reap_expired(&mut self) {
        while let Ok(fd) = self.expired.try_pop() {
            self.expire_connection(fd);
        }

        if self.overflowed.swap(false, Ordering::Acquire) {
            // A live connection always has a timer unless it expired
            let orphaned: Vec<RawFd> = self
                .connections
                .iter()
                .copied()
                .filter(|&fd| !self.timers.contains(timer_id(fd)))
                .collect();
            tracing::warn!("Expired queue overflowed, closing {} idle connections", orphaned.len());
            for fd in orphaned {
                self.expire_connection(fd);
            }
        }
    }

    fn expire_connection(&mut self, fd: RawFd) {
        if self.connections.contains(&fd) {
            self.metrics.record_timeout();
            self.close_connection(fd, CloseReason::TimedOut);
        }
    }
}

#[inline]
fn timer_id(fd: RawFd) -> TimerId {
    TimerId(fd as u64)
}
