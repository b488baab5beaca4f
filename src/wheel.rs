//! The concurrent hierarchical hash wheel itself
//!
//! The wheel models timers as the number of ticks until they are due and
//! breaks that 32-bit delta into four radix-256 digits, one per level.
//! Level 0 holds everything due within the next 256 ticks; each coarser
//! level covers 256 times the span of the one below it. Whenever level 0
//! wraps around to slot zero, the matching slot of the next level up is
//! drained and its timers re-hashed downwards, so that by the time a tick
//! examines a level-0 slot, that slot holds exactly the timers due on that
//! tick. This is the "hashed wheel" scheme of Varghese & Lauck.
//!
//! All mutation is serialised by a single wheel-wide mutex. The mutex is
//! held for the O(1)..O(256) bookkeeping of each operation and released
//! across dispatch callbacks, so a callback may freely re-insert its timer
//! or arm and cancel others.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use intrusive_hash_wheel_timer::{Timeval, TimerEntry};
//! use intrusive_hash_wheel_timer::wheel::TimerWheel;
//!
//! let wheel: TimerWheel<&'static str> = TimerWheel::new(Timeval::ZERO, 1).unwrap();
//!
//! let timer = Arc::new(TimerEntry::new("ding"));
//! timer.set_due(Timeval::from_millis(5));
//! wheel.insert(timer.clone()).unwrap();
//!
//! let fired = wheel.tick(Timeval::from_millis(10), |_, t, now| {
//!     assert_eq!(*t.data(), "ding");
//!     assert!(t.due() <= now);
//! });
//! assert_eq!(fired, 1);
//! assert!(!timer.is_armed());
//! ```

use crate::entry::TimerList;
use crate::{TimerEntry, Timeval, WheelError};
use arr_macro::arr;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Radix bits per level
const WHEEL_BITS: usize = 8;
/// Slots per level
pub const WHEEL_SIZE: usize = 1 << WHEEL_BITS;
const WHEEL_MASK: u64 = (WHEEL_SIZE - 1) as u64;
/// Number of cascading levels
pub const WHEEL_LEVELS: usize = 4;

fn pack_position(level: usize, slot: usize) -> u32 {
    ((level as u32) << WHEEL_BITS) | slot as u32
}

fn unpack_position(pos: u32) -> (usize, usize) {
    ((pos as usize) >> WHEEL_BITS, pos as usize & (WHEEL_SIZE - 1))
}

/// Everything the wheel mutex protects
struct WheelCore<T> {
    /// Tick index of level-0 slot-0's head, i.e. the earliest tick for
    /// which timers have not yet been dispatched
    next_run: u64,
    /// Milliseconds per tick
    tick_resolution: u32,
    /// Bumped once per removal of an armed timer
    generation: u32,
    /// Number of currently armed timers
    len: usize,
    buckets: [[TimerList<T>; WHEEL_SIZE]; WHEEL_LEVELS],
}

impl<T> WheelCore<T> {
    fn new(next_run: u64, tick_resolution: u32) -> Self {
        WheelCore {
            next_run,
            tick_resolution,
            generation: 0,
            len: 0,
            buckets: [
                arr![TimerList::default(); 256],
                arr![TimerList::default(); 256],
                arr![TimerList::default(); 256],
                arr![TimerList::default(); 256],
            ],
        }
    }

    fn insert(&mut self, timer: Arc<TimerEntry<T>>) -> Result<(), WheelError> {
        if timer.active.load(Ordering::Acquire) {
            return Err(WheelError::Exists);
        }
        let gen = self.generation;
        timer.wheel_gen.store(gen, Ordering::Relaxed);
        timer.generation.store(gen, Ordering::Relaxed);
        timer.active.store(true, Ordering::Release);
        self.link(timer);
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, timer: &Arc<TimerEntry<T>>) -> Result<(), WheelError> {
        if !timer.active.load(Ordering::Acquire) {
            return Err(WheelError::NotFound);
        }
        let (level, slot) = unpack_position(timer.position.load(Ordering::Relaxed));
        let removed = unsafe {
            // An armed timer is linked in exactly the slot recorded at link
            // time; both facts are only ever written under this mutex.
            self.buckets[level][slot]
                .cursor_mut_from_ptr(Arc::as_ptr(timer))
                .remove()
        };
        debug_assert!(removed.is_some());
        timer.active.store(false, Ordering::Release);
        self.generation = self.generation.wrapping_add(1);
        timer.generation.store(self.generation, Ordering::Relaxed);
        self.len -= 1;
        Ok(())
    }

    /// Hash `timer` into the slot matching its due time and link it there
    ///
    /// The level is chosen from the delta to `next_run`, the slot from the
    /// digits of the absolute due tick; this is what guarantees that a
    /// cascaded timer always lands at least one level lower.
    fn link(&mut self, timer: Arc<TimerEntry<T>>) {
        let due_ms = timer.due_micros.load(Ordering::Relaxed).max(0) as u64 / 1_000;
        let mut due_tick = due_ms / self.tick_resolution as u64;
        if due_tick < self.next_run {
            // never schedule into the past
            due_tick = self.next_run;
        }
        let diff = due_tick - self.next_run;
        let level = if diff < 1 << WHEEL_BITS {
            0
        } else if diff < 1 << (2 * WHEEL_BITS) {
            1
        } else if diff < 1 << (3 * WHEEL_BITS) {
            2
        } else if diff < 1 << (4 * WHEEL_BITS) {
            3
        } else {
            panic!(
                "timer delta of {} ticks cannot be represented in 32 bits",
                diff
            );
        };
        let slot = ((due_tick >> (level * WHEEL_BITS)) & WHEEL_MASK) as usize;
        timer
            .position
            .store(pack_position(level, slot), Ordering::Relaxed);
        self.buckets[level][slot].push_front(timer);
    }

    /// Drain one higher-level slot, re-hashing its timers downwards
    ///
    /// Returns true if the drained slot was slot zero, in which case the
    /// next level up must be drained as well.
    fn cascade(&mut self, level: usize, slot: usize) -> bool {
        let mut orphans = self.buckets[level][slot].take();
        while let Some(timer) = orphans.pop_front() {
            self.link(timer);
        }
        slot == 0
    }

    /// Execute one tick step: cascade if due, claim the current level-0
    /// slot, mark its timers detached and advance `next_run`
    ///
    /// The claimed timers are handed back so the caller can dispatch them
    /// after dropping the mutex.
    fn advance(&mut self) -> TimerList<T> {
        let pos = self.next_run;
        let idx = (pos & WHEEL_MASK) as usize;
        if idx == 0 && pos > 0 {
            if self.cascade(1, ((pos >> WHEEL_BITS) & WHEEL_MASK) as usize)
                && self.cascade(2, ((pos >> (2 * WHEEL_BITS)) & WHEEL_MASK) as usize)
            {
                self.cascade(3, ((pos >> (3 * WHEEL_BITS)) & WHEEL_MASK) as usize);
            }
        }
        self.next_run += 1;

        let claimed = self.buckets[0][idx].take();
        let mut count = 0usize;
        for timer in claimed.iter() {
            // detached before the mutex is dropped, so a racing remove
            // reports "not found" instead of unlinking twice
            timer.active.store(false, Ordering::Release);
            count += 1;
        }
        self.len -= count;
        claimed
    }
}

/// A concurrent four-level hash wheel over caller-owned timer entries
///
/// Any thread may call any operation at any time; a single internal mutex
/// serialises all wheel state. The wheel holds no storage of its own:
/// arming a timer links the caller's [TimerEntry] into an intrusive slot
/// list, and cancelling or firing unlinks it again, all in O(1).
///
/// Time only moves when a caller donates it: [tick](TimerWheel::tick)
/// advances the wheel one tick at a time up to the provided `now`, however
/// far behind the wheel may be. Overdue timers are never skipped, and are
/// dispatched with the caller's `now` rather than their original due time.
pub struct TimerWheel<T> {
    core: Mutex<WheelCore<T>>,
}

impl<T> TimerWheel<T> {
    /// Create a wheel whose first tick covers the monotonic time `now`
    ///
    /// `tick_resolution_ms` fixes how many milliseconds one tick spans;
    /// it must be non-zero.
    pub fn new(now: Timeval, tick_resolution_ms: u32) -> Result<Self, WheelError> {
        if tick_resolution_ms == 0 {
            return Err(WheelError::InvalidResolution);
        }
        let next_run = now.as_millis().max(0) as u64 / tick_resolution_ms as u64;
        Ok(TimerWheel {
            core: Mutex::new(WheelCore::new(next_run, tick_resolution_ms)),
        })
    }

    /// Arm a detached timer entry
    ///
    /// The entry must have its due time set. The wheel keeps a clone of
    /// the `Arc` until the timer fires or is removed.
    ///
    /// Fails with [WheelError::Exists] if the entry is already armed;
    /// re-arming an active timer is a caller bug and is reported rather
    /// than ignored.
    pub fn insert(&self, timer: Arc<TimerEntry<T>>) -> Result<(), WheelError> {
        self.core.lock().insert(timer)
    }

    /// Cancel an armed timer
    ///
    /// Cancellation is instantaneous and reliable: after `remove` returns
    /// `Ok`, the dispatch callback will not be invoked for this arming.
    ///
    /// Fails with [WheelError::NotFound] if the entry is not armed; in
    /// particular a timer whose dispatch is already in flight has been
    /// detached by the claiming tick and reports "not found".
    pub fn remove(&self, timer: &Arc<TimerEntry<T>>) -> Result<(), WheelError> {
        self.core.lock().remove(timer)
    }

    /// Advance the wheel through every tick up to and including `now`,
    /// dispatching due timers
    ///
    /// Steps execute in strictly increasing time order and none is ever
    /// skipped, however far behind the wheel has fallen. The mutex is held
    /// across each step's bookkeeping and released while `dispatch` runs,
    /// so the callback may re-insert its timer (a due time at or before
    /// the wheel's head schedules it for the next step), arm new timers or
    /// cancel others. Dispatched timers are already detached when the
    /// callback sees them.
    ///
    /// If `now` lies before the wheel's head (the clock went backwards),
    /// nothing is dispatched and the wheel does not rewind.
    ///
    /// Returns the number of timers dispatched.
    pub fn tick<F>(&self, now: Timeval, mut dispatch: F) -> u32
    where
        F: FnMut(&Self, Arc<TimerEntry<T>>, Timeval),
    {
        let now_ms = now.as_millis().max(0) as u64;
        let mut dispatched = 0u32;
        loop {
            let mut claimed = {
                let mut core = self.core.lock();
                if core.next_run > now_ms / core.tick_resolution as u64 {
                    break;
                }
                core.advance()
            };
            while let Some(timer) = claimed.pop_front() {
                dispatched += 1;
                dispatch(self, timer, now);
            }
        }
        dispatched
    }

    /// Lock the wheel and return a guard exposing the same mutations
    ///
    /// For callers that need several operations to be atomic with respect
    /// to other threads, e.g. re-arming a batch of timers. Holding the
    /// guard *is* holding the wheel mutex; dispatch callbacks run with the
    /// mutex released and must use [insert](TimerWheel::insert) and
    /// [remove](TimerWheel::remove) directly instead.
    pub fn lock(&self) -> LockedWheel<'_, T> {
        LockedWheel {
            core: self.core.lock(),
        }
    }

    /// The earliest monotonic time for which timers have not yet been
    /// dispatched
    pub fn next_run(&self) -> Timeval {
        let core = self.core.lock();
        Timeval::from_millis((core.next_run * core.tick_resolution as u64) as i64)
    }

    /// Milliseconds per tick, as fixed at construction
    pub fn tick_resolution(&self) -> u32 {
        self.core.lock().tick_resolution
    }

    /// Number of currently armed timers
    pub fn len(&self) -> usize {
        self.core.lock().len
    }

    /// True iff no timer is currently armed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for TimerWheel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.lock();
        f.debug_struct("TimerWheel")
            .field("next_run", &core.next_run)
            .field("tick_resolution", &core.tick_resolution)
            .field("len", &core.len)
            .finish()
    }
}

/// A locked view of a [TimerWheel]
///
/// Obtained from [TimerWheel::lock]; every operation on the guard runs
/// under the already-held wheel mutex.
pub struct LockedWheel<'a, T> {
    core: MutexGuard<'a, WheelCore<T>>,
}

impl<T> LockedWheel<'_, T> {
    /// Arm a detached timer entry; see [TimerWheel::insert]
    pub fn insert(&mut self, timer: Arc<TimerEntry<T>>) -> Result<(), WheelError> {
        self.core.insert(timer)
    }

    /// Cancel an armed timer; see [TimerWheel::remove]
    pub fn remove(&mut self, timer: &Arc<TimerEntry<T>>) -> Result<(), WheelError> {
        self.core.remove(timer)
    }
}
