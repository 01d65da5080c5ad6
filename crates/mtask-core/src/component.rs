//! Component: a bundle of named mailboxes plus a resumable behavior
//!
//! The component contract consumed by every higher-level subsystem:
//! `send(msg, box)` / `recv(box)` / `data_ready(box)` keyed by string box
//! names, with reserved `control`/`signal` boxes for shutdown propagation.
//! Box-name metadata is exposed for external graph-wiring tools.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{KernelError, KernelResult, TrySendError};
use crate::mailbox::Mailbox;
use crate::message::Message;
use crate::state::Step;

/// Reserved inbox for payload data
pub const INBOX: &str = "inbox";
/// Reserved outbox for payload data
pub const OUTBOX: &str = "outbox";
/// Reserved inbox for shutdown/control traffic
pub const CONTROL: &str = "control";
/// Reserved outbox for forwarding shutdown onward
pub const SIGNAL: &str = "signal";

/// Shared handle to a component inside the cooperative domain
///
/// Components are referenced by their own task and by every linkage that
/// touches them; `Rc<RefCell<..>>` is the ownership model for the
/// single-threaded domain. Never hand one of these to another OS thread.
pub type ComponentRef = Rc<RefCell<Component>>;

/// A component's resumable `main` entry
///
/// The scheduler resumes `main` once per pass (via the component's
/// MicroTask); the implementation does a bounded slice of work against its
/// mailboxes and returns a [`Step`].
pub trait Behavior {
    /// Advance the component by one slice of work
    fn main(&mut self, component: &mut Component) -> Step;
}

/// Named mailboxes with a stable identity
///
/// Construction registers the four conventional boxes (`inbox`, `control`
/// inbound; `outbox`, `signal` outbound). Extra boxes can be declared for
/// components with richer wiring.
#[derive(Debug)]
pub struct Component {
    name: String,
    inboxes: HashMap<String, Mailbox>,
    outboxes: HashMap<String, Mailbox>,
}

impl Component {
    /// Create a component with the four conventional boxes, all unbounded
    pub fn new(name: impl Into<String>) -> Self {
        let mut inboxes = HashMap::new();
        inboxes.insert(INBOX.to_string(), Mailbox::unbounded());
        inboxes.insert(CONTROL.to_string(), Mailbox::unbounded());

        let mut outboxes = HashMap::new();
        outboxes.insert(OUTBOX.to_string(), Mailbox::unbounded());
        outboxes.insert(SIGNAL.to_string(), Mailbox::unbounded());

        Self {
            name: name.into(),
            inboxes,
            outboxes,
        }
    }

    /// Wrap into the shared handle used by linkages and tasks
    pub fn into_ref(self) -> ComponentRef {
        Rc::new(RefCell::new(self))
    }

    /// Component name (stable for its lifetime)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare an additional inbox, optionally bounded
    pub fn add_inbox(&mut self, name: impl Into<String>, capacity: Option<usize>) {
        let mbox = match capacity {
            Some(cap) => Mailbox::bounded(cap),
            None => Mailbox::unbounded(),
        };
        self.inboxes.insert(name.into(), mbox);
    }

    /// Declare an additional outbox, optionally bounded
    pub fn add_outbox(&mut self, name: impl Into<String>, capacity: Option<usize>) {
        let mbox = match capacity {
            Some(cap) => Mailbox::bounded(cap),
            None => Mailbox::unbounded(),
        };
        self.outboxes.insert(name.into(), mbox);
    }

    /// Bound an existing inbox (used by linkages declaring a pipe width)
    pub fn bound_inbox(&mut self, name: &str, capacity: usize) -> KernelResult<()> {
        match self.inboxes.get_mut(name) {
            Some(mbox) => {
                mbox.set_capacity(Some(capacity));
                Ok(())
            }
            None => Err(KernelError::NoSuchBox),
        }
    }

    /// Append a message to one of this component's outboxes
    ///
    /// Fails with `MailboxFull` when the outbox is bounded and full; the
    /// message comes back in the error and the caller suspends itself and
    /// retries on a later resumption.
    pub fn send(&mut self, message: Message, outbox: &str) -> Result<(), TrySendError> {
        match self.outboxes.get_mut(outbox) {
            Some(mbox) => mbox.push(message).map_err(TrySendError::full),
            None => Err(TrySendError::no_such_box(message)),
        }
    }

    /// Fire-and-forget send: explicit opt-out of the backpressure contract
    ///
    /// Returns `true` if the message was dropped.
    pub fn send_lossy(&mut self, message: Message, outbox: &str) -> bool {
        match self.send(message, outbox) {
            Ok(()) => false,
            Err(e) => {
                crate::kdebug!("{}: dropped message on '{}': {}", self.name, outbox, e.kind);
                true
            }
        }
    }

    /// Pop the oldest message from one of this component's inboxes
    pub fn recv(&mut self, inbox: &str) -> KernelResult<Message> {
        match self.inboxes.get_mut(inbox) {
            Some(mbox) => mbox.pop(),
            None => Err(KernelError::NoSuchBox),
        }
    }

    /// Count of messages waiting on an inbox, without consuming
    ///
    /// Unknown box names count as zero so callers can peek unconditionally.
    pub fn data_ready(&self, inbox: &str) -> usize {
        self.inboxes.get(inbox).map_or(0, Mailbox::len)
    }

    /// Take the oldest message from an outbox (linkage side of the contract)
    pub fn collect(&mut self, outbox: &str) -> Option<Message> {
        self.outboxes.get_mut(outbox).and_then(|m| m.pop().ok())
    }

    /// Count of messages waiting on an outbox
    pub fn outbox_ready(&self, outbox: &str) -> usize {
        self.outboxes.get(outbox).map_or(0, Mailbox::len)
    }

    /// Deliver a message into an inbox (linkage side of the contract)
    pub fn deliver(&mut self, message: Message, inbox: &str) -> Result<(), TrySendError> {
        match self.inboxes.get_mut(inbox) {
            Some(mbox) => mbox.push(message).map_err(TrySendError::full),
            None => Err(TrySendError::no_such_box(message)),
        }
    }

    /// Declared inbox names (metadata for graph-wiring tools)
    pub fn inbox_names(&self) -> Vec<&str> {
        self.inboxes.keys().map(String::as_str).collect()
    }

    /// Declared outbox names (metadata for graph-wiring tools)
    pub fn outbox_names(&self) -> Vec<&str> {
        self.outboxes.keys().map(String::as_str).collect()
    }

    /// Check `control` for a shutdown request, consuming at most one message
    ///
    /// Non-control traffic on `control` is discarded. Convenience for the
    /// common tail of a behavior's `main`.
    pub fn shutdown_requested(&mut self) -> bool {
        if self.data_ready(CONTROL) == 0 {
            return false;
        }
        match self.recv(CONTROL) {
            Ok(msg) => msg.is_shutdown(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Control;

    #[test]
    fn test_conventional_boxes_exist() {
        let comp = Component::new("echo");
        let mut inboxes = comp.inbox_names();
        inboxes.sort_unstable();
        assert_eq!(inboxes, vec![CONTROL, INBOX]);
        let mut outboxes = comp.outbox_names();
        outboxes.sort_unstable();
        assert_eq!(outboxes, vec![OUTBOX, SIGNAL]);
    }

    #[test]
    fn test_send_then_collect_preserves_order() {
        let mut comp = Component::new("src");
        comp.send(Message::data(1u32), OUTBOX).unwrap();
        comp.send(Message::data(2u32), OUTBOX).unwrap();

        assert_eq!(comp.collect(OUTBOX).unwrap().downcast::<u32>(), Some(1));
        assert_eq!(comp.collect(OUTBOX).unwrap().downcast::<u32>(), Some(2));
        assert!(comp.collect(OUTBOX).is_none());
    }

    #[test]
    fn test_deliver_then_recv() {
        let mut comp = Component::new("sink");
        comp.deliver(Message::data("x"), INBOX).unwrap();
        assert_eq!(comp.data_ready(INBOX), 1);
        assert!(comp.recv(INBOX).is_ok());
        assert_eq!(comp.data_ready(INBOX), 0);
    }

    #[test]
    fn test_send_unknown_box_returns_message() {
        let mut comp = Component::new("c");
        let err = comp.send(Message::data(5i64), "sideband").unwrap_err();
        assert_eq!(err.kind, KernelError::NoSuchBox);
        assert_eq!(err.message.downcast::<i64>(), Some(5));
    }

    #[test]
    fn test_backpressure_on_bounded_inbox() {
        let mut comp = Component::new("sink");
        comp.bound_inbox(INBOX, 1).unwrap();
        comp.deliver(Message::data(1u8), INBOX).unwrap();
        let err = comp.deliver(Message::data(2u8), INBOX).unwrap_err();
        assert_eq!(err.kind, KernelError::MailboxFull);
    }

    #[test]
    fn test_send_lossy_drops_on_full() {
        let mut comp = Component::new("src");
        comp.add_outbox("narrow", Some(1));
        assert!(!comp.send_lossy(Message::data(1u8), "narrow"));
        assert!(comp.send_lossy(Message::data(2u8), "narrow"));
        assert_eq!(comp.outbox_ready("narrow"), 1);
    }

    #[test]
    fn test_shutdown_requested() {
        let mut comp = Component::new("c");
        assert!(!comp.shutdown_requested());

        comp.deliver(Message::Control(Control::ProducerFinished), CONTROL)
            .unwrap();
        assert!(!comp.shutdown_requested());

        comp.deliver(Message::shutdown(), CONTROL).unwrap();
        assert!(comp.shutdown_requested());
    }
}
