//! Indexed min-heap of connection timeouts
//!
//! Array-backed binary heap ordered by absolute expiry, plus an
//! `id -> position` map so a live timer can be rescheduled, cancelled or
//! fired by id in O(log n). Every swap updates both slots' map entries in
//! the same step, so the map never points at a stale position.
//!
//! Not internally synchronized: one owner (the reactor thread) drives it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Stand-in expiry for timeouts too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

/// Timer identifier, unique among live timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Action run when a timer expires or is fired explicitly
pub type TimeoutCallback = Box<dyn FnOnce() + Send + 'static>;

/// Timer heap conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("timer {0:?} not found")]
    NotFound(TimerId),
    #[error("timer heap is empty")]
    Empty,
}

struct TimerNode {
    id: TimerId,
    expires: Instant,
    callback: TimeoutCallback,
}

/// Min-heap of timers keyed by expiry, root = nearest deadline
#[derive(Default)]
pub struct HeapTimer {
    heap: Vec<TimerNode>,
    index: HashMap<TimerId, usize>,
}

impl HeapTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate room for `capacity` timers
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Schedule `callback` to run `timeout` from now
    ///
    /// Reusing a live `id` replaces its expiry and callback in place.
    pub fn add<F>(&mut self, id: TimerId, timeout: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_at(id, deadline_after(timeout), callback);
    }

    /// Schedule `callback` at the absolute instant `expires`
    pub fn add_at<F>(&mut self, id: TimerId, expires: Instant, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.index.get(&id).copied() {
            Some(i) => {
                let node = &mut self.heap[i];
                node.expires = expires;
                node.callback = Box::new(callback);
                self.restore(i);
            }
            None => {
                let i = self.heap.len();
                self.index.insert(id, i);
                self.heap.push(TimerNode {
                    id,
                    expires,
                    callback: Box::new(callback),
                });
                self.sift_up(i);
            }
        }
    }

    /// Move a live timer's expiry to `timeout` from now, keeping its callback
    pub fn adjust(&mut self, id: TimerId, timeout: Duration) -> Result<(), TimerError> {
        self.adjust_at(id, deadline_after(timeout))
    }

    /// Move a live timer's expiry to `expires`, keeping its callback
    pub fn adjust_at(&mut self, id: TimerId, expires: Instant) -> Result<(), TimerError> {
        let i = *self.index.get(&id).ok_or(TimerError::NotFound(id))?;
        self.heap[i].expires = expires;
        self.restore(i);
        Ok(())
    }

    /// Remove a timer without running its callback
    pub fn cancel(&mut self, id: TimerId) -> Result<(), TimerError> {
        let i = *self.index.get(&id).ok_or(TimerError::NotFound(id))?;
        drop(self.remove_at(i));
        Ok(())
    }

    /// Remove a timer and run its callback now
    pub fn fire(&mut self, id: TimerId) -> Result<(), TimerError> {
        let i = *self.index.get(&id).ok_or(TimerError::NotFound(id))?;
        let node = self.remove_at(i);
        run_callback(node);
        Ok(())
    }

    /// Remove the earliest timer without running it
    pub fn pop(&mut self) -> Result<TimerId, TimerError> {
        if self.heap.is_empty() {
            return Err(TimerError::Empty);
        }
        Ok(self.remove_at(0).id)
    }

    /// Run and remove every timer with `expires <= now`, earliest first
    ///
    /// Returns the number of callbacks run.
    pub fn expire_ready(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(root) = self.heap.first() {
            if root.expires > now {
                break;
            }
            let node = self.remove_at(0);
            run_callback(node);
            fired += 1;
        }
        if fired > 0 {
            tracing::debug!("Expired {} timers, {} pending", fired, self.heap.len());
        }
        fired
    }

    /// Expire due timers, then report how long until the next one
    ///
    /// Rounded up to whole milliseconds so a poll with this timeout never
    /// wakes before the deadline. `None` means no timer is pending.
    pub fn next_deadline(&mut self, now: Instant) -> Option<Duration> {
        self.expire_ready(now);
        self.heap.first().map(|root| {
            let remaining = root.expires.saturating_duration_since(now);
            let millis = remaining.as_nanos().div_ceil(1_000_000);
            Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
        })
    }

    /// Earliest pending expiry
    #[inline]
    pub fn peek_deadline(&self) -> Option<Instant> {
        self.heap.first().map(|root| root.expires)
    }

    /// Expiry of a specific live timer
    #[inline]
    pub fn deadline_of(&self, id: TimerId) -> Option<Instant> {
        self.index.get(&id).map(|&i| self.heap[i].expires)
    }

    #[inline]
    pub fn contains(&self, id: TimerId) -> bool {
        self.index.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every timer without running callbacks
    pub fn clear(&mut self) {
        self.index.clear();
        self.heap.clear();
    }

    /// Re-establish order around a slot whose key changed
    fn restore(&mut self, i: usize) {
        let n = self.heap.len();
        if !self.sift_down(i, n) {
            self.sift_up(i);
        }
    }

    /// Detach the node at `i`, filling the gap with the last node
    fn remove_at(&mut self, i: usize) -> TimerNode {
        let node = self.heap.swap_remove(i);
        self.index.remove(&node.id);
        if i < self.heap.len() {
            self.index.insert(self.heap[i].id, i);
            self.restore(i);
        }
        node
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].expires <= self.heap[i].expires {
                break;
            }
            self.swap_nodes(i, parent);
            i = parent;
        }
    }

    /// Push the node at `index` toward the leaves within `heap[..n]`
    ///
    /// Returns whether it moved.
    fn sift_down(&mut self, index: usize, n: usize) -> bool {
        let mut i = index;
        let mut child = i * 2 + 1;
        while child < n {
            if child + 1 < n && self.heap[child + 1].expires < self.heap[child].expires {
                child += 1;
            }
            if self.heap[i].expires <= self.heap[child].expires {
                break;
            }
            self.swap_nodes(i, child);
            i = child;
            child = i * 2 + 1;
        }
        i > index
    }

    #[inline]
    fn swap_nodes(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.index.insert(self.heap[i].id, i);
        self.index.insert(self.heap[j].id, j);
    }

    /// Panics if heap order or the position map is broken
    #[cfg(test)]
    fn assert_invariants(&self) {
        assert_eq!(self.heap.len(), self.index.len());
        for (i, node) in self.heap.iter().enumerate() {
            assert_eq!(self.index.get(&node.id), Some(&i), "stale index for {:?}", node.id);
            if i > 0 {
                let parent = (i - 1) / 2;
                assert!(
                    self.heap[parent].expires <= node.expires,
                    "parent at {} expires after child at {}",
                    parent,
                    i
                );
            }
        }
    }
}

/// Callback panics are contained; the node is already out of the heap.
fn run_callback(node: TimerNode) {
    let id = node.id;
    if panic::catch_unwind(AssertUnwindSafe(node.callback)).is_err() {
        tracing::warn!("Timer {:?} callback panicked", id);
    }
}

impl std::fmt::Debug for HeapTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapTimer")
            .field("len", &self.heap.len())
            .field("next", &self.peek_deadline())
            .finish()
    }
}

/// `now + timeout`, saturating to a far-future instant on overflow
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
