//! Building blocks for an event-driven network server
//!
//! Indexed timeout heap, bounded blocking queue, worker pool and a
//! WebSocket frame codec, tied together by a readiness dispatcher.

pub mod infrastructure;
pub mod reactor;
pub mod timer;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use infrastructure::config::{Config, LogConfig, ServerConfig};

use infrastructure::block_queue::QueueError;
use infrastructure::config::ConfigError;
use infrastructure::logging::LogError;
use infrastructure::thread_pool::PoolError;
use thiserror::Error;
use timer::TimerError;
use ws::FrameError;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thread pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Log(#[from] LogError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ReactorError>;
