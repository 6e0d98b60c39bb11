//! Fixed worker thread pool
//!
//! N named OS threads drain one shared, unbounded FIFO of boxed closures.
//! The shared state is reference-counted and owned by every worker, so work
//! already queued keeps running after the `ThreadPool` handle is dropped.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default worker count when none is configured
pub const DEFAULT_WORKERS: usize = 8;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Pool construction errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("thread pool needs at least one worker")]
    ZeroWorkers,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct PoolState {
    tasks: VecDeque<Task>,
    closed: bool,
}

/// State shared by the handle and all workers
struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Shared {
    fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }
}

/// Fixed-size pool running submitted closures on worker threads
///
/// # Example
/// ```
/// use reactor_core::infrastructure::thread_pool::ThreadPool;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let pool = ThreadPool::new(4).unwrap();
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..100 {
///     let counter = Arc::clone(&counter);
///     pool.submit(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     });
/// }
/// pool.shutdown();
/// assert_eq!(counter.load(Ordering::Relaxed), 100);
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `size` workers
    ///
    /// # Errors
    /// `PoolError::ZeroWorkers` for `size == 0`, `PoolError::Spawn` if the OS
    /// refuses a thread. Workers spawned before a failure are closed again.
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroWorkers);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                tasks: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("pool-worker-{}", id))
                .spawn(move || worker_loop(&worker_shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.close();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        tracing::debug!("Thread pool started with {} workers", size);
        Ok(Self { shared, workers })
    }

    /// Queue a closure for execution on some worker
    ///
    /// Never blocks and never rejects; one idle worker is woken.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.state.lock().tasks.push_back(Box::new(task));
        self.shared.available.notify_one();
    }

    /// Number of workers
    #[inline]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Tasks waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    /// Tasks that have finished running (including ones that panicked)
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Tasks that panicked
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Close the pool and wait for every queued task to finish
    pub fn shutdown(mut self) {
        self.shared.close();
        for handle in std::mem::take(&mut self.workers) {
            if handle.join().is_err() {
                tracing::error!("Pool worker exited abnormally");
            }
        }
    }
}

impl Drop for ThreadPool {
    /// Workers are detached; they drain the remaining queue and exit on their own.
    fn drop(&mut self) {
        self.shared.close();
    }
}

fn worker_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if let Some(task) = state.tasks.pop_front() {
            drop(state);
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                shared.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Task panicked on {}",
                    thread::current().name().unwrap_or("pool-worker")
                );
            }
            shared.completed.fetch_add(1, Ordering::Release);
            state = shared.state.lock();
        } else if state.closed {
            break;
        } else {
            shared.available.wait(&mut state);
        }
    }
}
