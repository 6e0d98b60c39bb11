//! Readiness-driven connection dispatch
//!
//! - poller: descriptor registration and the blocking wait
//! - dispatcher: idle timers, worker hand-off and connection teardown

pub mod dispatcher;
pub mod poller;

pub use dispatcher::{CloseReason, ConnectionHandler, Dispatcher};
pub use poller::{Interest, Poller, ReadyEvent};
