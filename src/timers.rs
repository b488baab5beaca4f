use std::{fmt, hash::Hash, time::Duration};

/// A trait for state that can be triggered once
pub trait OneshotState {
    /// The type of the unique id of the outstanding timeout
    type Id: Hash + Clone + Eq;

    /// A reference to the id associated with this state
    fn id(&self) -> &Self::Id;

    /// Trigger should be called by the timer implementation
    /// when the timeout has expired.
    ///
    /// The method can be used for custom expiry actions,
    /// but it is strongly recommended to keep these quick,
    /// as long actions can delay the execution of later timers.
    fn trigger(self);
}

/// A basic low-level timer API
///
/// This allows behaviours to be scheduled for later execution.
/// Repeating timers are deliberately absent: a triggered action that
/// wants to run again simply schedules itself once more.
pub trait Timer {
    /// A type to uniquely identify any timeout to be scheduled or cancelled
    type Id: Hash + Clone + Eq;

    /// The type of state to keep for outstanding timeouts
    type OneshotState: OneshotState<Id = Self::Id>;

    /// Schedule the `state` to be triggered once after the `timeout` expires
    ///
    /// # Note
    ///
    /// Depending on your system and the implementation used,
    /// there is always a certain lag between the triggering of the `state`
    /// and the `timeout` expiring on the system's clock.
    /// Thus it is only guaranteed that the `state` is not triggered *before*
    /// the `timeout` expires, but no bounds on the lag are given.
    fn schedule_once(&mut self, timeout: Duration, state: Self::OneshotState);

    /// Cancel the timer indicated by the unique `id`
    fn cancel(&mut self, id: &Self::Id);
}

/// A timeout state for a one-shot timer using a closure as the triggering action
pub struct OneShotClosureState<I> {
    /// The id of the timeout state
    id: I,
    /// The action to invoke when the timeout expires
    action: Box<dyn FnOnce(I) + Send + Sync + 'static>,
}

impl<I> OneShotClosureState<I> {
    /// Produces a new instance of this state type
    /// from a unique id and the action to be executed
    /// when it expires.
    pub fn new<F>(id: I, action: F) -> Self
    where
        F: FnOnce(I) + Send + Sync + 'static,
    {
        OneShotClosureState {
            id,
            action: Box::new(action),
        }
    }
}

#[cfg(feature = "uuid-extras")]
impl OneShotClosureState<uuid::Uuid> {
    /// Produces a new instance of this state type
    /// using a random unique id and the action to be executed
    /// when it expires.
    ///
    /// Uses `Uuid::new_v4()` internally.
    pub fn with_random_id<F>(action: F) -> Self
    where
        F: FnOnce(uuid::Uuid) + Send + Sync + 'static,
    {
        Self::new(uuid::Uuid::new_v4(), action)
    }
}

impl<I> OneshotState for OneShotClosureState<I>
where
    I: Hash + Clone + Eq,
{
    type Id = I;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn trigger(self) {
        (self.action)(self.id)
    }
}

impl<I> fmt::Debug for OneShotClosureState<I>
where
    I: Hash + Clone + Eq + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OneShotClosureState(id={:?}, action=<function>)",
            self.id
        )
    }
}

/// This trait is a convenience API for [timers](Timer) that use the
/// [OneShotClosureState](OneShotClosureState) state type.
pub trait ClosureTimer: Timer {
    /// Schedule the `action` to be executed once after the `timeout` expires
    ///
    /// # Note
    ///
    /// Depending on your system and the implementation used,
    /// there is always a certain lag between the execution of the `action`
    /// and the `timeout` expiring on the system's clock.
    /// Thus it is only guaranteed that the `action` is not run *before*
    /// the `timeout` expires, but no bounds on the lag are given.
    fn schedule_action_once<F>(&mut self, id: Self::Id, timeout: Duration, action: F)
    where
        F: FnOnce(Self::Id) + Send + Sync + 'static;
}

impl<I, T> ClosureTimer for T
where
    I: Hash + Clone + Eq,
    T: Timer<Id = I, OneshotState = OneShotClosureState<I>>,
{
    fn schedule_action_once<F>(&mut self, id: Self::Id, timeout: Duration, action: F)
    where
        F: FnOnce(Self::Id) + Send + Sync + 'static,
    {
        self.schedule_once(timeout, OneShotClosureState::new(id, action))
    }
}

/// A minimal timer state carrying nothing but its id and delay
///
/// Expiry is a no-op; useful for tests and benchmarks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdOnlyTimerEntry<I> {
    /// The unique id of the outstanding timeout
    pub id: I,
    /// The delay the timeout was scheduled with
    pub delay: Duration,
}

impl<I> IdOnlyTimerEntry<I> {
    /// Create a new entry from the id and the delay until it expires
    pub fn new(id: I, delay: Duration) -> Self {
        IdOnlyTimerEntry { id, delay }
    }
}

impl<I> OneshotState for IdOnlyTimerEntry<I>
where
    I: Hash + Clone + Eq,
{
    type Id = I;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn trigger(self) {
        // nothing to do
    }
}
