//! Readiness-notification interface
//!
//! The dispatcher only needs descriptor registration and a blocking wait that
//! yields `(descriptor, observed events)` pairs. The OS-level implementation
//! (epoll, kqueue, ...) lives outside this crate and plugs in via `Poller`.

use std::io;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::os::fd::RawFd;
use std::time::Duration;

/// Event mask, bit-compatible with the epoll flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u32);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READABLE: Interest = Interest(0x001);
    pub const WRITABLE: Interest = Interest(0x004);
    pub const ERROR: Interest = Interest(0x008);
    pub const HANG_UP: Interest = Interest(0x010);
    /// Peer closed its write half
    pub const READ_HANG_UP: Interest = Interest(0x2000);
    pub const ONE_SHOT: Interest = Interest(1 << 30);
    pub const EDGE_TRIGGERED: Interest = Interest(1 << 31);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Interest(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if any bit of `other` is set
    #[inline]
    pub const fn intersects(self, other: Interest) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    #[inline]
    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Interest {
    type Output = Interest;

    #[inline]
    fn bitand(self, rhs: Interest) -> Interest {
        Interest(self.0 & rhs.0)
    }
}

/// One readiness notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub fd: RawFd,
    pub events: Interest,
}

/// Readiness source driven by the dispatcher loop
pub trait Poller {
    /// Start watching `fd` for `interest`
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Replace the interest set of a watched descriptor (re-arms one-shot)
    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Stop watching `fd`
    fn unregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Block until at least one descriptor is ready or `timeout` passes
    ///
    /// `None` waits indefinitely. Ready events are appended to `events`;
    /// the return value is how many were appended.
    fn wait(&mut self, timeout: Option<Duration>, events: &mut Vec<ReadyEvent>) -> io::Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_bits() {
        let interest = Interest::READABLE | Interest::READ_HANG_UP | Interest::ONE_SHOT;
        assert!(interest.contains(Interest::READABLE));
        assert!(interest.contains(Interest::READABLE | Interest::ONE_SHOT));
        assert!(!interest.contains(Interest::WRITABLE));
        assert!(interest.intersects(Interest::READ_HANG_UP | Interest::ERROR));
        assert!((interest & Interest::WRITABLE).is_empty());
        assert_eq!(Interest::from_bits(interest.bits()), interest);
    }

    #[test]
    fn test_epoll_compatible_values() {
        assert_eq!(Interest::READABLE.bits(), 0x001);
        assert_eq!(Interest::WRITABLE.bits(), 0x004);
        assert_eq!(Interest::READ_HANG_UP.bits(), 0x2000);
        assert_eq!(Interest::EDGE_TRIGGERED.bits(), 0x8000_0000);
    }
}
