use crate::Timeval;
use intrusive_collections::{intrusive_adapter, LinkedList, LinkedListAtomicLink};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

/// A caller-owned timer node
///
/// The wheel never allocates timer storage: callers construct an entry
/// (usually as `Arc::new(TimerEntry::new(data))`), set its due time and
/// hand a reference to [insert](crate::wheel::TimerWheel::insert). While
/// the entry is armed the wheel's slot list holds one `Arc` clone, so an
/// armed entry cannot be freed out from under the wheel; once it fires or
/// is removed the wheel drops that clone again and the caller may reuse
/// or drop the entry freely.
///
/// All bookkeeping fields are atomics so that [was_modified](TimerEntry::was_modified)
/// and the accessors can be read without taking the wheel lock; the wheel
/// only ever writes them while holding its mutex.
pub struct TimerEntry<T> {
    /// Intrusive list hook; meaningful only while armed
    pub(crate) link: LinkedListAtomicLink,
    /// Due time in total microseconds
    pub(crate) due_micros: AtomicI64,
    /// True iff currently linked into some wheel slot
    pub(crate) active: AtomicBool,
    /// Wheel generation observed at the last remove (equals `wheel_gen`
    /// while the entry has not been removed since its last insert)
    pub(crate) generation: AtomicU32,
    /// Wheel generation observed at the last insert
    pub(crate) wheel_gen: AtomicU32,
    /// Packed `(level << 8) | slot` recorded at link time
    pub(crate) position: AtomicU32,
    data: T,
}

intrusive_adapter!(pub(crate) TimerAdapter<T> = Arc<TimerEntry<T>>: TimerEntry<T> { link: LinkedListAtomicLink });

pub(crate) type TimerList<T> = LinkedList<TimerAdapter<T>>;

impl<T> TimerEntry<T> {
    /// Create a detached entry around `data` with all bookkeeping zeroed
    pub fn new(data: T) -> Self {
        TimerEntry {
            link: LinkedListAtomicLink::new(),
            due_micros: AtomicI64::new(0),
            active: AtomicBool::new(false),
            generation: AtomicU32::new(0),
            wheel_gen: AtomicU32::new(0),
            position: AtomicU32::new(0),
            data,
        }
    }

    /// The monotonic time at which this entry should fire
    pub fn due(&self) -> Timeval {
        Timeval::from_micros(self.due_micros.load(Ordering::Relaxed))
    }

    /// Set the due time
    ///
    /// Must only be called while the entry is detached; an armed entry is
    /// not moved by changing its due time.
    pub fn set_due(&self, due: Timeval) {
        debug_assert!(!self.is_armed(), "due time changed on an armed timer");
        self.due_micros.store(due.as_micros(), Ordering::Relaxed);
    }

    /// True iff this entry is currently linked into some wheel slot
    pub fn is_armed(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// True iff this entry has been removed from the wheel since it was
    /// last inserted
    ///
    /// This is the cheap liveness check for callers that hand an entry
    /// reference to a worker: once it returns true, any outstanding
    /// dispatch context for the previous arming is stale.
    pub fn was_modified(&self) -> bool {
        self.generation.load(Ordering::Relaxed) != self.wheel_gen.load(Ordering::Relaxed)
    }

    /// Borrow the caller payload
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Unwrap the entry and return the payload
    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T: fmt::Debug> fmt::Debug for TimerEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEntry")
            .field("due", &self.due())
            .field("armed", &self.is_armed())
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_is_detached_and_unmodified() {
        let e = TimerEntry::new(42u64);
        assert!(!e.is_armed());
        assert!(!e.was_modified());
        assert_eq!(e.due(), Timeval::ZERO);
        assert_eq!(*e.data(), 42);
    }

    #[test]
    fn due_round_trip() {
        let e = TimerEntry::new(());
        e.set_due(Timeval::from_millis(70_000));
        assert_eq!(e.due().as_millis(), 70_000);
        assert_eq!(e.into_data(), ());
    }
}
