//! Infrastructure shared by the reactor
//!
//! This module contains the concurrency primitives and cold-path services:
//! - Bounded blocking queue and worker thread pool
//! - Configuration management
//! - Logging and metrics

pub mod block_queue;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod thread_pool;

pub use block_queue::{BlockQueue, PushError, QueueError};
pub use logging::{init_logging, LogGuard, LogSink};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use thread_pool::{PoolError, ThreadPool};
