//! Bounded blocking queue for producer/consumer hand-off
//!
//! Fixed-capacity ring buffer shared between threads. Producers never block:
//! a full queue rejects the item and hands it back. Consumers block (optionally
//! with a deadline) until an item arrives or the queue is closed.
//!
//! All state lives behind a single `parking_lot::Mutex`; waiters test the
//! guarded fields directly instead of calling the public observers, which
//! would re-lock the same non-reentrant mutex.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

/// Conditions reported by queue operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is empty")]
    Empty,
    #[error("queue is closed")]
    Closed,
    #[error("timed out waiting for an item")]
    TimedOut,
}

/// Rejected push; carries the item back to the producer
#[derive(PartialEq, Eq)]
pub enum PushError<T> {
    /// Queue was at capacity
    Full(T),
    /// Queue has been closed
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }

    /// Condition without the payload
    pub fn kind(&self) -> QueueError {
        match self {
            PushError::Full(_) => QueueError::Full,
            PushError::Closed(_) => QueueError::Closed,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Ring buffer state, only touched under the queue mutex
struct State<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    size: usize,
    closed: bool,
}

impl<T> State<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn take_head(&mut self) -> Option<T> {
        if self.size == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.size -= 1;
        item
    }
}

/// Fixed-capacity FIFO with blocking pop and close semantics
///
/// # Example
/// ```
/// use reactor_core::infrastructure::block_queue::{BlockQueue, QueueError};
///
/// let queue = BlockQueue::new(2);
/// queue.push("a").unwrap();
/// queue.push("b").unwrap();
/// assert!(queue.push("c").is_err());
///
/// queue.close();
/// assert_eq!(queue.pop(), Ok("a"));
/// assert_eq!(queue.pop(), Ok("b"));
/// assert_eq!(queue.pop(), Err(QueueError::Closed));
/// ```
pub struct BlockQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

impl<T> BlockQueue<T> {
    /// Create a queue holding at most `capacity` items
    ///
    /// A capacity of zero is raised to one so the ring arithmetic stays valid.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Self {
            state: Mutex::new(State {
                slots,
                head: 0,
                tail: 0,
                size: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Insert at the tail without blocking
    ///
    /// # Returns
    /// - `Ok(())` - item stored, one waiting consumer woken
    /// - `Err(PushError::Full(item))` - queue at capacity
    /// - `Err(PushError::Closed(item))` - queue closed
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.size == state.capacity() {
            return Err(PushError::Full(item));
        }

        let tail = state.tail;
        state.slots[tail] = Some(item);
        state.tail = (tail + 1) % state.capacity();
        state.size += 1;
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head item, blocking until one is available
    ///
    /// Buffered items are still delivered after `close()`; once the queue is
    /// both closed and empty this returns `QueueError::Closed`.
    pub fn pop(&self) -> Result<T, QueueError> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.take_head() {
                return Ok(item);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Remove the head item, waiting at most `timeout`
    ///
    /// Nothing is consumed when the wait times out. A timeout too large to
    /// represent as a deadline waits like `pop`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.pop();
        };
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.take_head() {
                return Ok(item);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                // An item may have landed between the timeout and reacquiring the lock
                return match state.take_head() {
                    Some(item) => Ok(item),
                    None if state.closed => Err(QueueError::Closed),
                    None => Err(QueueError::TimedOut),
                };
            }
        }
    }

    /// Remove the head item without waiting
    pub fn try_pop(&self) -> Result<T, QueueError> {
        let mut state = self.state.lock();
        match state.take_head() {
            Some(item) => Ok(item),
            None if state.closed => Err(QueueError::Closed),
            None => Err(QueueError::Empty),
        }
    }

    /// Mark the queue closed and wake every waiter
    ///
    /// Closing is permanent. Later pushes fail; pops drain what is buffered.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
    }

    /// Drop all buffered items; does not close the queue
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.slots.iter_mut().for_each(|slot| *slot = None);
        state.head = 0;
        state.tail = 0;
        state.size = 0;
    }

    /// Number of buffered items
    #[inline]
    pub fn len(&self) -> usize {
        self.state.lock().size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.lock().size == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        let state = self.state.lock();
        state.size == state.capacity()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Maximum number of buffered items
    #[inline]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }
}

impl<T: Clone> BlockQueue<T> {
    /// Copy of the oldest item
    pub fn front(&self) -> Option<T> {
        let state = self.state.lock();
        if state.size == 0 {
            return None;
        }
        state.slots[state.head].clone()
    }

    /// Copy of the newest item
    pub fn back(&self) -> Option<T> {
        let state = self.state.lock();
        if state.size == 0 {
            return None;
        }
        let last = (state.tail + state.capacity() - 1) % state.capacity();
        state.slots[last].clone()
    }
}

impl<T> fmt::Debug for BlockQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BlockQueue")
            .field("size", &state.size)
            .field("capacity", &state.capacity())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_until_full() {
        let queue = BlockQueue::new(3);
        for i in 0..3 {
            queue.push(i).unwrap();
        }
        assert!(queue.is_full());

        let err = queue.push(99).unwrap_err();
        assert_eq!(err.kind(), QueueError::Full);
        assert_eq!(err.into_inner(), 99);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_fifo_with_wraparound() {
        let queue = BlockQueue::new(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Ok(1));
        queue.push(3).unwrap();
        assert_eq!(queue.pop(), Ok(2));
        assert_eq!(queue.pop(), Ok(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_front_back() {
        let queue = BlockQueue::new(3);
        assert_eq!(queue.front(), None);
        assert_eq!(queue.back(), None);

        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.push("c").unwrap();
        assert_eq!(queue.pop(), Ok("a"));
        queue.push("d").unwrap();

        assert_eq!(queue.front(), Some("b"));
        assert_eq!(queue.back(), Some("d"));
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let queue = BlockQueue::new(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.close();

        assert_eq!(queue.push(3).unwrap_err().kind(), QueueError::Closed);
        assert_eq!(queue.pop(), Ok(1));
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Ok(2));
        assert_eq!(queue.pop(), Err(QueueError::Closed));
        assert_eq!(queue.try_pop(), Err(QueueError::Closed));
        assert!(queue.is_closed());
    }

    #[test]
    fn test_clear_keeps_queue_open() {
        let queue = BlockQueue::new(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.clear();

        assert!(queue.is_empty());
        assert!(!queue.is_closed());
        queue.push(3).unwrap();
        assert_eq!(queue.front(), Some(3));
    }

    #[test]
    fn test_pop_timeout_consumes_nothing() {
        let queue: BlockQueue<u32> = BlockQueue::new(1);
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(30)), Err(QueueError::TimedOut));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(queue.try_pop(), Err(QueueError::Empty));

        queue.push(7).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_timeout_unbounded_duration() {
        let queue = Arc::new(BlockQueue::new(2));
        queue.push(1).unwrap();
        assert_eq!(queue.pop_timeout(Duration::MAX), Ok(1));

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(2).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(2));

        queue.close();
        assert_eq!(queue.pop_timeout(Duration::MAX), Err(QueueError::Closed));
    }

    #[test]
    fn test_zero_capacity_rounds_up() {
        let queue = BlockQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(()).unwrap();
        assert!(queue.push(()).is_err());
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue: Arc<BlockQueue<u32>> = Arc::new(BlockQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), Err(QueueError::Closed));
    }

    #[test]
    fn test_blocking_pop_receives_late_push() {
        let queue = Arc::new(BlockQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(42u32).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(42));
    }

    #[test]
    fn test_producer_consumer_no_loss() {
        const ITEMS: u64 = 10_000;
        let queue = Arc::new(BlockQueue::new(16));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..ITEMS {
                    let mut item = i;
                    loop {
                        match queue.push(item) {
                            Ok(()) => break,
                            Err(PushError::Full(back)) => {
                                item = back;
                                thread::yield_now();
                            }
                            Err(PushError::Closed(_)) => panic!("closed early"),
                        }
                    }
                }
                queue.close();
            })
        };

        let mut received = Vec::with_capacity(ITEMS as usize);
        while let Ok(item) = queue.pop() {
            received.push(item);
        }
        producer.join().unwrap();

        assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
    }

    #[test]
    fn test_multiple_consumers_each_item_once() {
        let queue = Arc::new(BlockQueue::new(64));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Ok(item) = queue.pop() {
                        got.push(item);
                    }
                    got
                })
            })
            .collect();

        for i in 0..1000u32 {
            let mut item = i;
            while let Err(err) = queue.push(item) {
                item = err.into_inner();
                thread::yield_now();
            }
        }
        queue.close();

        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BlockQueue<String>>();
    }

    proptest! {
        #[test]
        fn prop_matches_vecdeque_model(capacity in 1usize..8, ops in proptest::collection::vec(any::<Option<u8>>(), 0..64)) {
            let queue = BlockQueue::new(capacity);
            let mut model = std::collections::VecDeque::new();

            for op in ops {
                match op {
                    Some(value) => {
                        let pushed = queue.push(value).is_ok();
                        prop_assert_eq!(pushed, model.len() < capacity);
                        if pushed {
                            model.push_back(value);
                        }
                    }
                    None => {
                        prop_assert_eq!(queue.try_pop().ok(), model.pop_front());
                    }
                }
                prop_assert_eq!(queue.len(), model.len());
                prop_assert_eq!(queue.front(), model.front().copied());
                prop_assert_eq!(queue.back(), model.back().copied());
            }
        }
    }
}
