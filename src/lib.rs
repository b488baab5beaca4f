//! A concurrent hierarchical hash wheel timer with intrusive,
//! caller-owned timer entries.
//!
//! The [wheel](crate::wheel) module holds the core data structure; the
//! [thread_timer](crate::thread_timer) and [simulation](crate::simulation)
//! modules provide drivers for real-time and virtual-time use.

pub mod simulation;
pub mod thread_timer;
pub mod wheel;

mod entry;
mod time;
mod timers;

pub use self::entry::TimerEntry;
pub use self::time::Timeval;
pub use self::timers::*;

#[cfg(feature = "uuid-extras")]
mod uuid_extras;
#[cfg(feature = "uuid-extras")]
pub use self::uuid_extras::*;

/// Failures reported by wheel operations
///
/// Every failure is returned to the caller; the wheel never logs and never
/// aborts, apart from the corruption panics documented on the individual
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WheelError {
    /// An internal allocation was refused during construction
    #[error("out of memory")]
    NoMemory,
    /// Reserved for contended operations; unused by the wheel itself
    #[error("resource busy")]
    Busy,
    /// The timer is not armed
    #[error("timer is not present in the wheel")]
    NotFound,
    /// The timer is already armed
    #[error("timer is already armed")]
    Exists,
    /// The wheel was asked for a zero tick resolution
    #[error("tick resolution must be at least one millisecond per tick")]
    InvalidResolution,
}

#[cfg(test)]
pub mod test_helpers {
    use std::time::Duration;

    /// Produce a duration corresponding to the i:th Fibonacci number
    ///
    /// Good for testing timer implementations at a large variety of
    /// timeout delays.
    pub fn fib_time(mut i: usize) -> Duration {
        if i == 0 {
            Duration::from_millis(0)
        } else if i == 1 {
            Duration::from_millis(1)
        } else {
            let mut fminus2: u64 = 0u64;
            let mut fminus1: u64 = 1u64;
            while i >= 2 {
                let fi = fminus2 + fminus1;
                i -= 1;
                fminus2 = fminus1;
                fminus1 = fi;
            }
            Duration::from_millis(fminus1)
        }
    }
}
