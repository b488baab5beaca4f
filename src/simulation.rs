//! This module provides an implementation for an event timer used to drive a discrete event simulation.
//!
//! Its particular feature is that it doesn't track real time, but advances a
//! virtual clock one tick at a time, so a simulation proceeds at whatever rate
//! events can be processed.
//!
//! Progress in the simulation is driven by repeatedly calling the [next](SimulationTimer::next) function
//! until it returns [SimulationStep::Finished](SimulationStep::Finished) indicating that the timer is empty
//! and thus the simulation has run to completion.
//!
//! # Example
//! ```
//! # use std::sync::{Arc, Mutex};
//! # use uuid::Uuid;
//! # use std::time::Duration;
//! use intrusive_hash_wheel_timer::*;
//! use intrusive_hash_wheel_timer::simulation::*;
//!
//! let mut timer = SimulationTimer::for_uuid_closures();
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
//! println!("Starting simulation run.");
//! let mut running = true;
//! while running {
//!     match timer.next() {
//!         SimulationStep::Ok => println!("Next!"),
//!         SimulationStep::Finished => running = false,
//!     }
//! }
//! println!("Simulation run done!");
//! let guard = barrier.lock().unwrap();
//! assert_eq!(*guard, true);
//! ```
use super::*;
use crate::wheel::TimerWheel;
#[cfg(feature = "fnv")]
use fnv::FnvHashMap;
#[cfg(not(feature = "fnv"))]
use std::collections::HashMap;
use std::{
    fmt::Debug,
    hash::Hash,
    sync::Arc,
    time::{Duration, SystemTime},
};

/// A timer implementation that uses virtual time
///
/// Time is advanced tick by tick until the next event fires.
pub struct SimulationTimer<I, O>
where
    I: Hash + Clone + Eq + Debug,
    O: OneshotState<Id = I> + Debug,
{
    time: Timeval,
    wheel: TimerWheel<O>,
    #[cfg(feature = "fnv")]
    armed: FnvHashMap<I, Arc<TimerEntry<O>>>,
    #[cfg(not(feature = "fnv"))]
    armed: HashMap<I, Arc<TimerEntry<O>>>,
}

impl<I, O> SimulationTimer<I, O>
where
    I: Hash + Clone + Eq + Debug,
    O: OneshotState<Id = I> + Debug,
{
    /// Create a new simulation timer starting at `0`
    pub fn new() -> Self {
        Self::starting_at(Timeval::ZERO)
    }

    /// Create a new simulation timer starting at a system clock value
    pub fn at(now: SystemTime) -> Self {
        let t = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX EPOCH!");
        Self::starting_at(Timeval::from_millis(t.as_millis() as i64))
    }

    fn starting_at(time: Timeval) -> Self {
        SimulationTimer {
            time,
            wheel: TimerWheel::new(time, 1).expect("wheel"),
            #[cfg(feature = "fnv")]
            armed: FnvHashMap::default(),
            #[cfg(not(feature = "fnv"))]
            armed: HashMap::new(),
        }
    }

    /// Return the timer's current virtual time value
    pub fn current_time(&self) -> Timeval {
        self.time
    }

    /// Advance the virtual time
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> SimulationStep {
        loop {
            if self.wheel.is_empty() {
                return SimulationStep::Finished;
            }
            self.time += Duration::from_millis(1);
            let armed = &mut self.armed;
            let fired = self.wheel.tick(self.time, |_, entry, _| {
                armed.remove(entry.data().id());
                let entry =
                    Arc::try_unwrap(entry).expect("shouldn't hold on to these refs anywhere");
                entry.into_data().trigger();
            });
            if fired > 0 {
                return SimulationStep::Ok;
            }
        }
    }
}

impl<I, O> Default for SimulationTimer<I, O>
where
    I: Hash + Clone + Eq + Debug,
    O: OneshotState<Id = I> + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> SimulationTimer<I, OneShotClosureState<I>>
where
    I: Hash + Clone + Eq + Debug,
{
    /// Shorthand for creating a simulation timer using closure state
    pub fn for_closures() -> Self {
        Self::new()
    }
}

#[cfg(feature = "uuid-extras")]
impl SimulationTimer<uuid::Uuid, OneShotClosureState<uuid::Uuid>> {
    /// Shorthand for creating a simulation timer using Uuid identifiers and closure state
    pub fn for_uuid_closures() -> Self {
        Self::new()
    }
}

/// Result of advancing virtual time
pub enum SimulationStep {
    /// No timer entries remain
    ///
    /// The simulation can be considered complete.
    Finished,
    /// Step was executed, but more timer entries remain
    ///
    /// Continue calling [next](SimulationTimer::next) to advance virtual time.
    Ok,
}

impl<I, O> Timer for SimulationTimer<I, O>
where
    I: Hash + Clone + Eq + Debug,
    O: OneshotState<Id = I> + Debug,
{
    type Id = I;
    type OneshotState = O;

    fn schedule_once(&mut self, timeout: Duration, state: Self::OneshotState) {
        let id = state.id().clone();
        let entry = Arc::new(TimerEntry::new(state));
        entry.set_due(self.time + timeout);
        match self.wheel.insert(entry.clone()) {
            Ok(()) => {
                self.armed.insert(id, entry);
            }
            Err(f) => panic!("Could not insert timer entry! {:?}", f),
        }
    }

    fn cancel(&mut self, id: &Self::Id) {
        match self.armed.remove(id) {
            Some(entry) => match self.wheel.remove(&entry) {
                Ok(()) => (),                                                            // great
                Err(f) => eprintln!("Could not cancel timer with id={:?}. {:?}", id, f), // not so great, but meh
            },
            None => eprintln!("Could not cancel timer with id={:?}. Not found.", id),
        }
    }
}


#[cfg(feature = "uuid-extras")]
#[cfg(test)]
mod uuid_tests {
    use super::*;
    use crate::test_helpers::*;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[test]
    fn simple_simulation() {
        let num = 10usize;
        let mut barriers: Vec<Arc<Mutex<bool>>> = Vec::with_capacity(num);
        let mut timer = SimulationTimer::for_uuid_closures();
        for i in 0..num {
            let barrier = Arc::new(Mutex::new(false));
            barriers.push(barrier.clone());
            let id = Uuid::new_v4();
            let timeout = fib_time(i);
            timer.schedule_action_once(id, timeout, move |_| {
                println!("Running action {}", i);
                let mut guard = barrier.lock().unwrap();
                *guard = true;
            });
        }
        let mut running = true;
        while running {
            match timer.next() {
                SimulationStep::Ok => println!("Next!"),
                SimulationStep::Finished => running = false,
            }
        }
        println!("Simulation run done!");
        for b in barriers {
            let guard = b.lock().unwrap();
            assert_eq!(*guard, true);
        }
    }
}
