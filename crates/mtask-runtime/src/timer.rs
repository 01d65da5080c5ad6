//! Min-heap timer service
//!
//! Timers carry an opaque [`Message`] payload and fire in deadline order;
//! equal deadlines are broken by caller-supplied priority, then by handle
//! allocation order, so firing order is deterministic. Cancellation is lazy:
//! cancelled handles sit in a tombstone set and are discarded when they
//! surface at the heap top, keeping `cancel` O(1).
//!
//! The heap is shared behind a mutex so OS-thread components and their
//! remotes can schedule against the same clock.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use mtask_core::message::Message;
use mtask_core::ktrace;

/// Identifier for a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value for logs
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A fired timer, handed back from [`TimerHeap::poll_expired`]
#[derive(Debug)]
pub struct TimerEvent {
    pub handle: TimerHandle,
    pub wake_at: Instant,
    pub priority: u32,
    pub payload: Message,
}

/// Heap entry ordered for a max-heap so the earliest deadline surfaces first
struct HeapEntry(TimerEvent);

impl HeapEntry {
    fn rank(&self) -> (Instant, u32, u64) {
        (self.0.wake_at, self.0.priority, self.0.handle.0)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: BinaryHeap is a max-heap, we want the nearest deadline
        other.rank().cmp(&self.rank())
    }
}

struct HeapInner {
    heap: BinaryHeap<HeapEntry>,
    /// Handles scheduled but not yet fired or cancelled
    live: HashSet<TimerHandle>,
    cancelled: HashSet<TimerHandle>,
    total_scheduled: u64,
    total_fired: u64,
    total_cancelled: u64,
}

/// Counters for one timer heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStats {
    /// Entries in the heap, cancelled tombstones included
    pub queued: usize,
    pub pending_cancellations: usize,
    pub total_scheduled: u64,
    pub total_fired: u64,
    pub total_cancelled: u64,
}

/// Shared deadline-ordered timer queue
pub struct TimerHeap {
    inner: Mutex<HeapInner>,
}

impl TimerHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HeapInner {
                heap: BinaryHeap::new(),
                live: HashSet::new(),
                cancelled: HashSet::new(),
                total_scheduled: 0,
                total_fired: 0,
                total_cancelled: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeapInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Schedule a payload for an absolute deadline
    pub fn schedule_abs(&self, payload: Message, wake_at: Instant, priority: u32) -> TimerHandle {
        let handle = TimerHandle::fresh();
        let mut inner = self.lock();
        inner.heap.push(HeapEntry(TimerEvent {
            handle,
            wake_at,
            priority,
            payload,
        }));
        inner.live.insert(handle);
        inner.total_scheduled += 1;
        ktrace!("timer {} scheduled (prio {})", handle.raw(), priority);
        handle
    }

    /// Schedule a payload relative to now
    pub fn schedule_rel(&self, payload: Message, after: Duration, priority: u32) -> TimerHandle {
        self.schedule_abs(payload, Instant::now() + after, priority)
    }

    /// Cancel a timer
    ///
    /// Lazy: the entry stays in the heap as a tombstone until it reaches the
    /// top, so cancellation is O(1). Returns false for handles already
    /// fired, already cancelled or never issued.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        let mut inner = self.lock();
        if !inner.live.remove(&handle) {
            return false;
        }
        inner.cancelled.insert(handle);
        inner.total_cancelled += 1;
        ktrace!("timer {} cancelled", handle.raw());
        true
    }

    /// Pop every timer due at `now`, in firing order
    ///
    /// Cancelled entries surfacing at the top are discarded along the way.
    pub fn poll_expired(&self, now: Instant) -> Vec<TimerEvent> {
        let mut inner = self.lock();
        let mut fired = Vec::new();
        while let Some(top) = inner.heap.peek() {
            if top.0.wake_at > now {
                break;
            }
            let entry = match inner.heap.pop() {
                Some(e) => e,
                None => break,
            };
            if inner.cancelled.remove(&entry.0.handle) {
                continue;
            }
            inner.live.remove(&entry.0.handle);
            inner.total_fired += 1;
            fired.push(entry.0);
        }
        fired
    }

    /// Earliest live deadline, `None` if the heap holds only tombstones
    ///
    /// Prunes cancelled entries off the top as a side effect.
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut inner = self.lock();
        loop {
            let (wake_at, handle) = match inner.heap.peek() {
                Some(top) => (top.0.wake_at, top.0.handle),
                None => return None,
            };
            if inner.cancelled.remove(&handle) {
                inner.heap.pop();
                continue;
            }
            return Some(wake_at);
        }
    }

    /// Entries in the heap, tombstones included
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Check for an empty heap
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Counter snapshot
    pub fn stats(&self) -> TimerStats {
        let inner = self.lock();
        TimerStats {
            queued: inner.heap.len(),
            pending_cancellations: inner.cancelled.len(),
            total_scheduled: inner.total_scheduled,
            total_fired: inner.total_fired,
            total_cancelled: inner.total_cancelled,
        }
    }
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}
