//! Components that run on their own OS thread
//!
//! A [`ThreadedComponent`] owns lock-free mailboxes (crossbeam queues) plus a
//! private [`TimerHeap`]; cloneable [`Remote`] handles let other threads push
//! messages and schedule timers against it. [`ThreadedComponent::wait_event`]
//! is the blocking primitive: it sleeps on a condvar capped at the earliest
//! timer deadline, so a component waiting for input still wakes exactly when
//! its next timer is due, with no polling loop.
//!
//! Fired timer payloads are delivered to the reserved `"event"` inbox, which
//! is local to the owning thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crossbeam_queue::{ArrayQueue, SegQueue};

use mtask_core::component::{CONTROL, INBOX, OUTBOX, SIGNAL};
use mtask_core::error::{KernelError, KernelResult, TrySendError};
use mtask_core::message::Message;
use mtask_core::ktrace;

use crate::timer::{TimerHandle, TimerHeap};

/// Reserved inbox receiving fired timer payloads
pub const EVENT: &str = "event";

enum BoxQueue {
    Bounded(ArrayQueue<Message>),
    Unbounded(SegQueue<Message>),
}

impl BoxQueue {
    fn push(&self, message: Message) -> Result<(), Message> {
        match self {
            BoxQueue::Bounded(q) => q.push(message),
            BoxQueue::Unbounded(q) => {
                q.push(message);
                Ok(())
            }
        }
    }

    fn pop(&self) -> Option<Message> {
        match self {
            BoxQueue::Bounded(q) => q.pop(),
            BoxQueue::Unbounded(q) => q.pop(),
        }
    }

    fn len(&self) -> usize {
        match self {
            BoxQueue::Bounded(q) => q.len(),
            BoxQueue::Unbounded(q) => q.len(),
        }
    }
}

struct Shared {
    name: String,
    /// Box set is fixed at build time, so the map itself is never mutated
    boxes: HashMap<String, BoxQueue>,
    timers: TimerHeap,
    /// Guards nothing but the condvar handshake
    sleep_lock: Mutex<()>,
    wakeup: Condvar,
}

impl Shared {
    /// Senders must take the sleep lock before notifying so a wakeup cannot
    /// slip between the component's readiness check and its wait
    fn notify(&self) {
        let _guard = match self.sleep_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.wakeup.notify_all();
    }

    fn any_queued(&self) -> bool {
        self.boxes.values().any(|q| q.len() > 0)
    }
}

/// Builder for a [`ThreadedComponent`]'s mailbox layout
pub struct ThreadedComponentBuilder {
    name: String,
    inboxes: Vec<(String, Option<usize>)>,
}

impl ThreadedComponentBuilder {
    /// Add an inbox; `capacity` of `None` is unbounded
    pub fn inbox(mut self, name: impl Into<String>, capacity: Option<usize>) -> Self {
        self.inboxes.push((name.into(), capacity));
        self
    }

    pub fn build(self) -> ThreadedComponent {
        let mut boxes = HashMap::new();
        for (name, capacity) in self.inboxes {
            let queue = match capacity {
                Some(cap) => BoxQueue::Bounded(ArrayQueue::new(cap)),
                None => BoxQueue::Unbounded(SegQueue::new()),
            };
            boxes.insert(name, queue);
        }
        ThreadedComponent {
            shared: Arc::new(Shared {
                name: self.name,
                boxes,
                timers: TimerHeap::new(),
                sleep_lock: Mutex::new(()),
                wakeup: Condvar::new(),
            }),
            events: VecDeque::new(),
        }
    }
}

/// A component living on an OS thread rather than the cooperative scheduler
///
/// Not `Clone`: exactly one thread owns the component and consumes its
/// mailboxes. Everyone else talks to it through [`Remote`] handles.
pub struct ThreadedComponent {
    shared: Arc<Shared>,
    /// Fired timer payloads, drained through the "event" inbox
    events: VecDeque<Message>,
}

impl ThreadedComponent {
    /// Builder starting from the conventional box set
    pub fn builder(name: impl Into<String>) -> ThreadedComponentBuilder {
        ThreadedComponentBuilder {
            name: name.into(),
            inboxes: vec![
                (INBOX.to_string(), None),
                (CONTROL.to_string(), None),
                (OUTBOX.to_string(), None),
                (SIGNAL.to_string(), None),
            ],
        }
    }

    /// Component with the conventional boxes, all unbounded
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Handle for other threads to reach this component
    pub fn remote(&self) -> Remote {
        Remote {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Pop one message from a named box
    pub fn recv(&mut self, name: &str) -> KernelResult<Message> {
        if name == EVENT {
            return self.events.pop_front().ok_or(KernelError::MailboxEmpty);
        }
        match self.shared.boxes.get(name) {
            Some(q) => q.pop().ok_or(KernelError::MailboxEmpty),
            None => Err(KernelError::NoSuchBox),
        }
    }

    /// Queued message count; unknown boxes read as zero
    pub fn data_ready(&self, name: &str) -> usize {
        if name == EVENT {
            return self.events.len();
        }
        self.shared.boxes.get(name).map_or(0, |q| q.len())
    }

    /// Schedule a timer against this component's clock
    pub fn schedule_rel(&self, payload: Message, after: Duration, priority: u32) -> TimerHandle {
        self.shared.timers.schedule_rel(payload, after, priority)
    }

    /// Schedule a timer for an absolute deadline
    pub fn schedule_abs(&self, payload: Message, wake_at: Instant, priority: u32) -> TimerHandle {
        self.shared.timers.schedule_abs(payload, wake_at, priority)
    }

    /// Cancel a timer scheduled against this component
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        self.shared.timers.cancel(handle)
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared.timers.next_deadline()
    }

    /// Block until a timer fires or a message is queued
    ///
    /// Due timer payloads are moved onto the "event" inbox before returning.
    /// The condvar wait is capped at the next timer deadline; with no timers
    /// and no senders this blocks indefinitely. Spurious wakeups re-check
    /// and go back to sleep.
    pub fn wait_event(&mut self) {
        loop {
            let fired = self.shared.timers.poll_expired(Instant::now());
            if !fired.is_empty() {
                ktrace!("{}: {} timer(s) fired", self.shared.name, fired.len());
                for event in fired {
                    self.events.push_back(event.payload);
                }
                return;
            }
            if !self.events.is_empty() || self.shared.any_queued() {
                return;
            }

            let guard = match self.shared.sleep_lock.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Re-check under the lock: a sender enqueues before notifying,
            // and notifies under this same lock
            if self.shared.any_queued() {
                return;
            }
            match self.shared.timers.next_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        continue;
                    }
                    let _woken = self.shared.wakeup.wait_timeout(guard, deadline - now);
                }
                None => {
                    let _woken = self.shared.wakeup.wait(guard);
                }
            }
        }
    }
}

/// Cloneable, `Send` handle onto a [`ThreadedComponent`]
#[derive(Clone)]
pub struct Remote {
    shared: Arc<Shared>,
}

impl Remote {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Deliver a message to a named box, waking the component
    pub fn send(&self, message: Message, name: &str) -> Result<(), TrySendError> {
        let queue = match self.shared.boxes.get(name) {
            Some(q) => q,
            None => return Err(TrySendError::no_such_box(message)),
        };
        match queue.push(message) {
            Ok(()) => {
                self.shared.notify();
                Ok(())
            }
            Err(message) => Err(TrySendError::full(message)),
        }
    }

    /// Schedule a timer, waking the component so it re-caps its sleep
    pub fn schedule_rel(&self, payload: Message, after: Duration, priority: u32) -> TimerHandle {
        let handle = self.shared.timers.schedule_rel(payload, after, priority);
        self.shared.notify();
        handle
    }

    /// Schedule for an absolute deadline
    pub fn schedule_abs(&self, payload: Message, wake_at: Instant, priority: u32) -> TimerHandle {
        let handle = self.shared.timers.schedule_abs(payload, wake_at, priority);
        self.shared.notify();
        handle
    }

    /// Cancel a timer on the component's clock
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        self.shared.timers.cancel(handle)
    }

    /// Queued message count for a named box
    pub fn queued(&self, name: &str) -> usize {
        self.shared.boxes.get(name).map_or(0, |q| q.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtask_core::message::Control;
    use std::thread;

    #[test]
    fn test_send_and_recv_across_threads() {
        let mut comp = ThreadedComponent::new("worker");
        let remote = comp.remote();

        let sender = thread::spawn(move || {
            remote.send(Message::data(41u32), INBOX).unwrap();
            remote.send(Message::Control(Control::Shutdown), CONTROL).unwrap();
        });
        sender.join().unwrap();

        comp.wait_event();
        assert_eq!(comp.data_ready(INBOX), 1);
        assert_eq!(comp.recv(INBOX).unwrap().downcast::<u32>(), Some(41));
        assert!(comp.recv(CONTROL).unwrap().is_shutdown());
    }

    #[test]
    fn test_bounded_inbox_applies_backpressure() {
        let mut comp = ThreadedComponent::builder("narrow")
            .inbox("narrow-in", Some(1))
            .build();
        let remote = comp.remote();

        remote.send(Message::data(1u32), "narrow-in").unwrap();
        let err = remote.send(Message::data(2u32), "narrow-in").unwrap_err();
        assert_eq!(err.kind, KernelError::MailboxFull);
        assert_eq!(err.message.downcast::<u32>(), Some(2));

        assert_eq!(comp.recv("narrow-in").unwrap().downcast::<u32>(), Some(1));
    }

    #[test]
    fn test_unknown_box_is_refused() {
        let mut comp = ThreadedComponent::new("c");
        let remote = comp.remote();

        let err = remote.send(Message::data(1u8), "nope").unwrap_err();
        assert_eq!(err.kind, KernelError::NoSuchBox);
        assert_eq!(comp.recv("nope").unwrap_err(), KernelError::NoSuchBox);
        assert_eq!(comp.data_ready("nope"), 0);
    }

    #[test]
    fn test_wait_event_delivers_timer_payload() {
        let mut comp = ThreadedComponent::new("ticker");
        comp.schedule_rel(Message::data("tick"), Duration::from_millis(10), 0);

        let start = Instant::now();
        comp.wait_event();
        assert!(start.elapsed() >= Duration::from_millis(10));

        assert_eq!(comp.data_ready(EVENT), 1);
        let msg = comp.recv(EVENT).unwrap();
        assert_eq!(msg.downcast::<&str>(), Some("tick"));
        assert_eq!(comp.recv(EVENT).unwrap_err(), KernelError::MailboxEmpty);
    }

    #[test]
    fn test_wait_event_wakes_on_message_before_deadline() {
        let mut comp = ThreadedComponent::new("sleeper");
        // Distant timer so the wait is capped far away
        comp.schedule_rel(Message::data("late"), Duration::from_secs(30), 0);
        let remote = comp.remote();

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.send(Message::data(7u8), INBOX).unwrap();
        });

        let start = Instant::now();
        comp.wait_event();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(comp.data_ready(INBOX), 1);
        sender.join().unwrap();
    }

    #[test]
    fn test_remote_timer_recaps_a_parked_wait() {
        let mut comp = ThreadedComponent::new("recap");
        let remote = comp.remote();

        let scheduler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.schedule_rel(Message::data("poke"), Duration::from_millis(10), 0);
        });

        // No timers and no messages at entry: blocks until the remote
        // schedules, then sleeps out the fresh 10ms deadline
        comp.wait_event();
        assert_eq!(comp.data_ready(EVENT), 1);
        scheduler.join().unwrap();
    }

    #[test]
    fn test_fired_order_respects_priority() {
        let mut comp = ThreadedComponent::new("ordered");
        let at = Instant::now() + Duration::from_millis(5);
        comp.schedule_abs(Message::data("b"), at, 2);
        comp.schedule_abs(Message::data("a"), at, 1);

        comp.wait_event();
        assert_eq!(comp.recv(EVENT).unwrap().downcast::<&str>(), Some("a"));
        assert_eq!(comp.recv(EVENT).unwrap().downcast::<&str>(), Some("b"));
    }

    #[test]
    fn test_cancelled_timer_does_not_wake() {
        let mut comp = ThreadedComponent::new("quiet");
        let h = comp.schedule_rel(Message::data("soon"), Duration::from_millis(10), 0);
        comp.schedule_rel(Message::data("later"), Duration::from_millis(40), 0);
        assert!(comp.cancel(h));

        comp.wait_event();
        assert_eq!(comp.data_ready(EVENT), 1);
        assert_eq!(comp.recv(EVENT).unwrap().downcast::<&str>(), Some("later"));
    }
}
