//! Connection timeout scheduling
//!
//! - HeapTimer: indexed min-heap with reschedule/cancel by id

pub mod heap;

pub use heap::{HeapTimer, TimeoutCallback, TimerError, TimerId};
