//! This module provides a timer for real-time event scheduling with millisecond accuracy.
//!
//! It runs on its own dedicated thread and uses a shareable handle called a `TimerRef` for communication with other threads.
//! This inter-thread communication is based on [crossbeam_channel](crossbeam_channel).
//!
//! The thread owns a [TimerWheel](crate::wheel::TimerWheel) and donates real time to it:
//! every loop iteration it measures the elapsed wall time and ticks the wheel up to that
//! point, so oversleeping the tick resolution only delays dispatch, it never loses timers.
//!
//! ## Note
//! Since this timer runs on its own thread, instance creation will fail if the generic id or state types used are not `Send`.
//!
//! # Example
//! ```
//! # use std::sync::{Arc, Mutex};
//! # use uuid::Uuid;
//! # use std::time::Duration;
//! use intrusive_hash_wheel_timer::*;
//! use intrusive_hash_wheel_timer::thread_timer::*;
//!
//! let timer_core = TimerWithThread::for_uuid_closures();
//!
//! let mut timer = timer_core.timer_ref();
//!
//! let barrier: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
//! let barrier2 = barrier.clone();
//! let id = Uuid::new_v4();
//! let delay = Duration::from_millis(150);
//! timer.schedule_action_once(id, delay, move |timer_id|{
//!     println!("Timer function was triggered! Id={:?}", timer_id);
//!     let mut guard = barrier2.lock().unwrap();
//!     *guard = true;
//! });
//! println!("Waiting timing run to finish...");
//! std::thread::sleep(delay);
//! let mut done = false;
//! while !done {
//!     let guard = barrier.lock().unwrap();
//!     done = *guard;
//! }
//! println!("Timing run completed!");
//! drop(timer);
//! timer_core
//!    .shutdown()
//!    .expect("Timer didn't shutdown properly!");
//! ```

use super::*;

use crate::wheel::TimerWheel;
use channel::select;
use crossbeam_channel as channel;
#[cfg(feature = "fnv")]
use fnv::FnvHashMap;
#[cfg(not(feature = "fnv"))]
use std::collections::HashMap;
use std::{
    fmt,
    hash::Hash,
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

#[derive(Debug)]
enum TimerMsg<I, O>
where
    I: Hash + Clone + Eq,
    O: OneshotState<Id = I>,
{
    Schedule { timeout: Duration, state: O },
    Cancel(I),
    Stop,
}

/// A reference to a thread timer
///
/// This is used to schedule events on the timer from other threads.
///
/// You can get an instance via [timer_ref](TimerWithThread::timer_ref).
pub struct TimerRef<I, O>
where
    I: Hash + Clone + Eq,
    O: OneshotState<Id = I>,
{
    work_queue: channel::Sender<TimerMsg<I, O>>,
}

impl<I, O> Clone for TimerRef<I, O>
where
    I: Hash + Clone + Eq,
    O: OneshotState<Id = I>,
{
    fn clone(&self) -> Self {
        TimerRef {
            work_queue: self.work_queue.clone(),
        }
    }
}

impl<I, O> Timer for TimerRef<I, O>
where
    I: Hash + Clone + Eq,
    O: OneshotState<Id = I>,
{
    type Id = I;
    type OneshotState = O;

    fn schedule_once(&mut self, timeout: Duration, state: Self::OneshotState) {
        self.work_queue
            .send(TimerMsg::Schedule { timeout, state })
            .unwrap_or_else(|e| eprintln!("Could not send Schedule msg: {:?}", e));
    }

    fn cancel(&mut self, id: &Self::Id) {
        self.work_queue
            .send(TimerMsg::Cancel(id.clone()))
            .unwrap_or_else(|e| eprintln!("Could not send Cancel msg: {:?}", e));
    }
}

/// A timer implementation that uses its own thread
///
/// This struct acts as a main handle for the timer and its thread.
pub struct TimerWithThread<I, O>
where
    I: Hash + Clone + Eq,
    O: OneshotState<Id = I>,
{
    timer_thread: thread::JoinHandle<()>,
    work_queue: channel::Sender<TimerMsg<I, O>>,
}

impl<I, O> TimerWithThread<I, O>
where
    I: Hash + Clone + Eq + fmt::Debug + Send + 'static,
    O: OneshotState<Id = I> + fmt::Debug + Send + Sync + 'static,
{
    /// Create a new timer with its own thread.
    ///
    /// The thread will be called `"timer-thread"`.
    pub fn new() -> io::Result<TimerWithThread<I, O>> {
        let (s, r) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("timer-thread".to_string())
            .spawn(move || {
                let timer = TimerThread::new(r);
                timer.run();
            })?;
        let twt = TimerWithThread {
            timer_thread: handle,
            work_queue: s,
        };
        Ok(twt)
    }

    /// Returns a shareable reference to this timer
    ///
    /// The reference contains the timer's work queue
    /// and can be used to schedule timeouts on this timer.
    pub fn timer_ref(&self) -> TimerRef<I, O> {
        TimerRef {
            work_queue: self.work_queue.clone(),
        }
    }

    /// Shut this timer down
    ///
    /// In particular, this method waits for the timer's thread to be
    /// joined, or returns an error.
    pub fn shutdown(self) -> Result<(), ThreadTimerError<I, O>> {
        self.work_queue
            .send(TimerMsg::Stop)
            .unwrap_or_else(|e| eprintln!("Could not send Stop msg: {:?}", e));
        match self.timer_thread.join() {
            Ok(_) => Ok(()),
            Err(_) => {
                eprintln!("Timer thread panicked!");
                Err(ThreadTimerError::CouldNotJoinThread)
            }
        }
    }

    /// Same as [shutdown](TimerWithThread::shutdown), but doesn't wait for the thread to join
    pub fn shutdown_async(&self) -> Result<(), ThreadTimerError<I, O>> {
        self.work_queue
            .send(TimerMsg::Stop)
            .unwrap_or_else(|e| eprintln!("Could not send Stop msg: {:?}", e));
        Ok(())
    }
}

impl<I, O> fmt::Debug for TimerWithThread<I, O>
where
    I: Hash + Clone + Eq,
    O: OneshotState<Id = I>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TimerWithThread>")
    }
}

#[cfg(feature = "uuid-extras")]
impl TimerWithThread<uuid::Uuid, OneShotClosureState<uuid::Uuid>> {
    /// Shorthand for creating a timer instance using Uuid identifiers and closure state
    pub fn for_uuid_closures() -> Self {
        Self::new().expect("timer")
    }
}

/// Errors that can occur when stopping the timer thread
#[derive(Debug)]
pub enum ThreadTimerError<I, O>
where
    I: Hash + Clone + Eq,
    O: OneshotState<Id = I>,
{
    /// Sending of the `Stop` message failed
    CouldNotSendStopAsync,
    /// Sending of the `Stop` message failed in the waiting case
    ///
    /// This variant returns the original timer instance.
    CouldNotSendStop(TimerWithThread<I, O>),
    /// Joining of the timer thread failed
    CouldNotJoinThread,
}

struct TimerThread<I, O>
where
    I: Hash + Clone + Eq + fmt::Debug,
    O: OneshotState<Id = I> + fmt::Debug,
{
    wheel: TimerWheel<O>,
    #[cfg(feature = "fnv")]
    armed: FnvHashMap<I, Arc<TimerEntry<O>>>,
    #[cfg(not(feature = "fnv"))]
    armed: HashMap<I, Arc<TimerEntry<O>>>,
    work_queue: channel::Receiver<TimerMsg<I, O>>,
    running: bool,
    start: Instant,
}

impl<I, O> TimerThread<I, O>
where
    I: Hash + Clone + Eq + fmt::Debug,
    O: OneshotState<Id = I> + fmt::Debug,
{
    fn new(work_queue: channel::Receiver<TimerMsg<I, O>>) -> TimerThread<I, O> {
        TimerThread {
            wheel: TimerWheel::new(Timeval::ZERO, 1).expect("wheel"),
            #[cfg(feature = "fnv")]
            armed: FnvHashMap::default(),
            #[cfg(not(feature = "fnv"))]
            armed: HashMap::new(),
            work_queue,
            running: true,
            start: Instant::now(),
        }
    }

    fn run(mut self) {
        while self.running {
            let now = self.now();
            self.tick(now);

            match self.work_queue.try_recv() {
                Ok(msg) => self.handle_msg(msg),
                Err(channel::TryRecvError::Empty) => {
                    if self.wheel.is_empty() {
                        // wait until something is scheduled;
                        // the clock is re-seated on wake, so the idle
                        // period never has to be ticked through
                        match self.work_queue.recv() {
                            Ok(msg) => {
                                self.reset();
                                self.handle_msg(msg)
                            }
                            Err(channel::RecvError) => {
                                panic!("Timer work_queue unexpectedly shut down!")
                            }
                        }
                    } else {
                        // sleep out the rest of the current tick; oversleep
                        // is made up by the catch-up in the next tick call
                        let timeout = Duration::from_millis(self.wheel.tick_resolution() as u64);
                        let res = select! {
                            recv(self.work_queue) -> msg => msg.ok(),
                            default(timeout) => None,
                        };
                        match res {
                            Some(msg) => self.handle_msg(msg),
                            None => (), // restart loop
                        }
                    }
                }
                Err(channel::TryRecvError::Disconnected) => {
                    panic!("Timer work_queue unexpectedly shut down!")
                }
            }
        }
    }

    #[inline(always)]
    fn now(&self) -> Timeval {
        Timeval::from_millis(self.start.elapsed().as_millis() as i64)
    }

    #[inline(always)]
    fn reset(&mut self) {
        debug_assert!(self.armed.is_empty());
        let resolution = self.wheel.tick_resolution();
        self.start = Instant::now();
        self.wheel = TimerWheel::new(Timeval::ZERO, resolution).expect("wheel");
    }

    #[inline(always)]
    fn handle_msg(&mut self, msg: TimerMsg<I, O>) {
        match msg {
            TimerMsg::Stop => self.running = false,
            TimerMsg::Schedule { timeout, state } => {
                let id = state.id().clone();
                let entry = Arc::new(TimerEntry::new(state));
                entry.set_due(self.now() + timeout);
                match self.wheel.insert(entry.clone()) {
                    Ok(()) => {
                        self.armed.insert(id, entry);
                    }
                    Err(f) => panic!("Could not insert timer entry! {:?}", f),
                }
            }
            TimerMsg::Cancel(ref id) => match self.armed.remove(id) {
                Some(entry) => match self.wheel.remove(&entry) {
                    Ok(()) => (), // ok
                    Err(f) => eprintln!("Could not cancel timer with id={:?}. {:?}", id, f),
                },
                None => (), // also ok, might have been triggered already
            },
        }
    }

    #[inline(always)]
    fn tick(&mut self, now: Timeval) {
        let armed = &mut self.armed;
        self.wheel.tick(now, |_, entry, _| {
            armed.remove(entry.data().id());
            let entry =
                Arc::try_unwrap(entry).expect("shouldn't hold on to these refs anywhere");
            entry.into_data().trigger();
        });
    }
}

#[cfg(feature = "uuid-extras")]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[test]
    fn simple_thread_timing() {
        let num = 20usize;
        let mut barriers: Vec<Arc<Mutex<bool>>> = Vec::with_capacity(num);
        let timer_core = TimerWithThread::for_uuid_closures();
        let mut timer = timer_core.timer_ref();
        let mut total_wait = Duration::from_millis(0);
        println!("Starting timing run.");
        for i in 0..num {
            let barrier = Arc::new(Mutex::new(false));
            barriers.push(barrier.clone());
            let id = Uuid::new_v4();
            let timeout = fib_time(i);
            total_wait += timeout;
            let now = Instant::now();
            timer.schedule_action_once(id, timeout, move |_| {
                let elap = now.elapsed().as_nanos();
                let target = timeout.as_nanos();
                if elap > target {
                    let diff = ((elap - target) as f64) / 1000000.0;
                    println!("Running action {} {}ms late", i, diff);
                } else if elap < target {
                    let diff = ((target - elap) as f64) / 1000000.0;
                    println!("Running action {} {}ms early", i, diff);
                } else {
                    println!("Running action {} exactly on time", i);
                }
                let mut guard = barrier.lock().unwrap();
                *guard = true;
            });
        }
        println!("Waiting timing run to finish {}ms", total_wait.as_millis());
        thread::sleep(total_wait + Duration::from_millis(50));
        timer_core
            .shutdown()
            .expect("Timer didn't shutdown properly!");
        println!("Timing run done!");
        for b in barriers {
            let guard = b.lock().unwrap();
            assert_eq!(*guard, true);
        }
    }

    #[test]
    fn cancelled_action_does_not_run() {
        let timer_core = TimerWithThread::for_uuid_closures();
        let mut timer = timer_core.timer_ref();

        let ran: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
        let ran2 = ran.clone();
        let id = Uuid::new_v4();
        timer.schedule_action_once(id, Duration::from_millis(200), move |_| {
            let mut guard = ran2.lock().unwrap();
            *guard = true;
        });
        thread::sleep(Duration::from_millis(20));
        timer.cancel(&id);
        thread::sleep(Duration::from_millis(300));
        timer_core
            .shutdown()
            .expect("Timer didn't shutdown properly!");
        let guard = ran.lock().unwrap();
        assert_eq!(*guard, false);
    }

    #[test]
    fn rescheduling_from_action() {
        // a triggered action that wants to repeat schedules itself again
        let timer_core = TimerWithThread::for_uuid_closures();
        let timer = timer_core.timer_ref();

        let count: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));

        fn reschedule(
            timer: TimerRef<Uuid, OneShotClosureState<Uuid>>,
            count: Arc<Mutex<u32>>,
        ) {
            let id = Uuid::new_v4();
            timer.clone().schedule_action_once(id, fib_time(7), move |_| {
                let remaining = {
                    let mut guard = count.lock().unwrap();
                    *guard += 1;
                    3 - *guard
                };
                if remaining > 0 {
                    reschedule(timer, count);
                }
            });
        }
        reschedule(timer, count.clone());

        thread::sleep(fib_time(7) * 3 + Duration::from_millis(100));
        timer_core
            .shutdown()
            .expect("Timer didn't shutdown properly!");
        let guard = count.lock().unwrap();
        assert_eq!(*guard, 3);
    }
}
