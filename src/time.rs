use std::ops::{Add, AddAssign};
use std::time::Duration;

const MICROS_PER_SEC: i64 = 1_000_000;
const MICROS_PER_MILLI: i64 = 1_000;

/// A monotonic point in time as a `{seconds, microseconds}` pair
///
/// The wheel does arithmetic on caller-supplied monotonic time only;
/// it never reads a clock itself. The pair is kept normalised so that
/// `microseconds` always lies in `[0, 1_000_000)`, which makes the
/// derived ordering correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timeval {
    /// Whole seconds
    pub seconds: i64,
    /// Microseconds past `seconds`, in `[0, 1_000_000)`
    pub microseconds: i32,
}

impl Timeval {
    /// The zero time value
    pub const ZERO: Timeval = Timeval {
        seconds: 0,
        microseconds: 0,
    };

    /// Construct a time value from a total number of microseconds
    pub fn from_micros(micros: i64) -> Self {
        Timeval {
            seconds: micros.div_euclid(MICROS_PER_SEC),
            microseconds: micros.rem_euclid(MICROS_PER_SEC) as i32,
        }
    }

    /// Construct a time value from a total number of milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self::from_micros(millis * MICROS_PER_MILLI)
    }

    /// The total number of microseconds this value represents
    pub fn as_micros(&self) -> i64 {
        self.seconds * MICROS_PER_SEC + self.microseconds as i64
    }

    /// The total number of whole milliseconds this value represents
    ///
    /// Sub-millisecond remainders are truncated toward negative infinity,
    /// matching the tick arithmetic of the wheel.
    pub fn as_millis(&self) -> i64 {
        self.as_micros().div_euclid(MICROS_PER_MILLI)
    }

    /// The time elapsed from `earlier` until `self`
    ///
    /// Saturates to zero if `earlier` is actually later, so it is safe
    /// to use for lateness measurements on overdue timers.
    pub fn duration_since(&self, earlier: Timeval) -> Duration {
        let diff = self.as_micros() - earlier.as_micros();
        if diff <= 0 {
            Duration::from_micros(0)
        } else {
            Duration::from_micros(diff as u64)
        }
    }
}

impl From<Duration> for Timeval {
    fn from(d: Duration) -> Self {
        Timeval::from_micros(d.as_micros() as i64)
    }
}

impl Add<Duration> for Timeval {
    type Output = Timeval;

    fn add(self, rhs: Duration) -> Timeval {
        Timeval::from_micros(self.as_micros() + rhs.as_micros() as i64)
    }
}

impl AddAssign<Duration> for Timeval {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip() {
        for ms in [0i64, 1, 999, 1000, 1001, 256_000, 70_000] {
            let tv = Timeval::from_millis(ms);
            assert_eq!(tv.as_millis(), ms);
        }
    }

    #[test]
    fn normalisation() {
        let tv = Timeval::from_micros(2_500_000);
        assert_eq!(tv.seconds, 2);
        assert_eq!(tv.microseconds, 500_000);

        let tv = Timeval::from_micros(-1);
        assert_eq!(tv.seconds, -1);
        assert_eq!(tv.microseconds, 999_999);
        assert_eq!(tv.as_micros(), -1);
    }

    #[test]
    fn ordering_follows_total_micros() {
        let a = Timeval::from_millis(999);
        let b = Timeval::from_millis(1000);
        let c = Timeval::from_micros(1_000_001);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn add_duration() {
        let mut tv = Timeval::from_millis(900);
        tv += Duration::from_millis(200);
        assert_eq!(tv.seconds, 1);
        assert_eq!(tv.microseconds, 100_000);
    }

    #[test]
    fn duration_since_saturates() {
        let early = Timeval::from_millis(5);
        let late = Timeval::from_millis(12);
        assert_eq!(late.duration_since(early), Duration::from_millis(7));
        assert_eq!(early.duration_since(late), Duration::from_millis(0));
    }
}
