//! Test doubles for the dispatcher
//!
//! - MockPoller: scripted readiness source that records registrations
//! - RecordingHandler: counts callbacks and remembers closes

use crate::reactor::dispatcher::{CloseReason, ConnectionHandler};
use crate::reactor::poller::{Interest, Poller, ReadyEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest a mock wait actually sleeps
const MAX_MOCK_SLEEP: Duration = Duration::from_millis(5);

/// In-memory poller; `wait` returns the next scripted batch, if any
#[derive(Default)]
pub struct MockPoller {
    registered: HashMap<RawFd, Interest>,
    script: VecDeque<Vec<ReadyEvent>>,
    timeouts: Vec<Option<Duration>>,
}

impl MockPoller {
    /// Queue a batch for a future `wait`
    pub fn push_events(&mut self, events: Vec<ReadyEvent>) {
        self.script.push_back(events);
    }

    pub fn interest_of(&self, fd: RawFd) -> Option<Interest> {
        self.registered.get(&fd).copied()
    }

    /// Timeout passed to the most recent `wait` (outer None = never waited)
    pub fn last_timeout(&self) -> Option<Option<Duration>> {
        self.timeouts.last().copied()
    }

    pub fn wait_calls(&self) -> usize {
        self.timeouts.len()
    }
}

impl Poller for MockPoller {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if self.registered.contains_key(&fd) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "already registered"));
        }
        self.registered.insert(fd, interest);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.registered.get_mut(&fd) {
            Some(slot) => {
                *slot = interest;
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "not registered")),
        }
    }

    fn unregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.registered
            .remove(&fd)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "not registered"))
    }

    fn wait(&mut self, timeout: Option<Duration>, events: &mut Vec<ReadyEvent>) -> io::Result<usize> {
        self.timeouts.push(timeout);
        match self.script.pop_front() {
            Some(batch) => {
                let n = batch.len();
                events.extend(batch);
                Ok(n)
            }
            None => {
                if let Some(timeout) = timeout {
                    thread::sleep(timeout.min(MAX_MOCK_SLEEP));
                }
                Ok(0)
            }
        }
    }
}

/// Handler that records what the dispatcher asked of it
#[derive(Default)]
pub struct RecordingHandler {
    readable: AtomicUsize,
    writable: AtomicUsize,
    closed: Mutex<Vec<(RawFd, CloseReason)>>,
}

impl RecordingHandler {
    pub fn readable_count(&self) -> usize {
        self.readable.load(Ordering::SeqCst)
    }

    pub fn writable_count(&self) -> usize {
        self.writable.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<(RawFd, CloseReason)> {
        self.closed.lock().clone()
    }
}

impl ConnectionHandler for RecordingHandler {
    fn on_readable(&self, _fd: RawFd) {
        self.readable.fetch_add(1, Ordering::SeqCst);
    }

    fn on_writable(&self, _fd: RawFd) {
        self.writable.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self, fd: RawFd, reason: CloseReason) {
        self.closed.lock().push((fd, reason));
    }
}

/// Poll `condition` until it holds or `limit` elapses
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
