//! MicroTask identifier type

use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Unique identifier for a MicroTask
///
/// Handed out from a process-wide counter when the task is created.
/// The maximum value (u32::MAX) is reserved as a sentinel for "no task".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(u32);

impl TaskId {
    /// Sentinel value indicating no task
    pub const NONE: TaskId = TaskId(u32::MAX);

    /// Create a TaskId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        TaskId(id)
    }

    /// Allocate a fresh, unique TaskId
    #[inline]
    pub fn fresh() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        TaskId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Check if this is a valid task ID
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u32::MAX
    }
}

impl From<u32> for TaskId {
    #[inline]
    fn from(id: u32) -> Self {
        TaskId(id)
    }
}

impl From<TaskId> for u32 {
    #[inline]
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "TaskId(NONE)")
        } else {
            write!(f, "TaskId({})", self.0)
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for TaskId {
    fn default() -> Self {
        TaskId::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_basics() {
        let id = TaskId::new(42);
        assert_eq!(id.as_u32(), 42);
        assert!(!id.is_none());
        assert!(id.is_some());
    }

    #[test]
    fn test_task_id_none() {
        let none = TaskId::NONE;
        assert!(none.is_none());
        assert!(!none.is_some());
        assert_eq!(format!("{}", none), "none");
    }

    #[test]
    fn test_fresh_ids_unique() {
        let ids: Vec<_> = (0..100).map(|_| TaskId::fresh()).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
    }
}
