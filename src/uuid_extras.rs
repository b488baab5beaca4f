use crate::IdOnlyTimerEntry;
use std::time::Duration;
use uuid::Uuid;

/// An [IdOnlyTimerEntry](crate::IdOnlyTimerEntry) keyed by a [Uuid]
pub type UuidOnlyTimerEntry = IdOnlyTimerEntry<Uuid>;

impl UuidOnlyTimerEntry {
    /// Create an entry with a random id from `Uuid::new_v4()`
    pub fn with_random_id(delay: Duration) -> Self {
        Self::new(Uuid::new_v4(), delay)
    }
}
