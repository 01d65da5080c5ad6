//! Linkages and the Postman relay
//!
//! A linkage is a directed edge (source component, outbox) -> (sink
//! component, inbox). Asynchronous linkages are serviced by a Postman: a
//! MicroTask that moves exactly one message per turn, decoupling producer
//! and consumer cadence. Per-link FIFO order is preserved; cross-link
//! global order is not.
//!
//! Delivery policy: while both endpoints are registered a postman never
//! drops a message (a full sink inbox means retry on a later turn). Once an
//! endpoint is deregistered, further delivery attempts are dropped silently;
//! that best-effort tail enables graceful partial shutdown.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use mtask_core::component::{Component, ComponentRef};
use mtask_core::error::KernelError;
use mtask_core::message::Message;
use mtask_core::state::Step;
use mtask_core::{kdebug, kwarn};

use crate::rendezvous::{self, SyncReceiver, SyncSender};
use crate::scheduler::Scheduler;
use crate::task::MicroTask;

/// Identifier for a registered linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkageId(u64);

impl LinkageId {
    /// Raw value for logs
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Delivery mode of a linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Buffered relay via a Postman; `capacity` re-bounds the sink inbox
    /// (the pipe width) when given
    Async { capacity: Option<usize> },

    /// CSP rendezvous: send suspends until the paired recv
    Synchronous,
}

struct LinkEntry {
    id: LinkageId,
    mode: LinkMode,
    /// Tells the servicing postman (or rendezvous slot) to shut down
    kill: Rc<Cell<bool>>,
}

/// Registry of live linkages
///
/// Explicit process-wide state, created once and passed by reference; there
/// is no implicit global registry.
pub struct Links {
    entries: Vec<LinkEntry>,
    next_id: u64,
}

impl Links {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    fn fresh_id(&mut self) -> LinkageId {
        let id = LinkageId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Wire an asynchronous linkage and activate its Postman
    ///
    /// The postman joins the scheduler's next pass, behind tasks that are
    /// already active.
    pub fn link(
        &mut self,
        sched: &mut Scheduler,
        src: &ComponentRef,
        src_box: &str,
        dst: &ComponentRef,
        dst_box: &str,
        capacity: Option<usize>,
    ) -> LinkageId {
        let id = self.fresh_id();
        let kill = Rc::new(Cell::new(false));

        if let Some(cap) = capacity {
            if dst.borrow_mut().bound_inbox(dst_box, cap).is_err() {
                kwarn!(
                    "link {}: sink '{}' has no inbox '{}'",
                    id.raw(),
                    dst.borrow().name(),
                    dst_box
                );
            }
        }

        let name = format!(
            "postman:{}.{}->{}.{}",
            src.borrow().name(),
            src_box,
            dst.borrow().name(),
            dst_box
        );
        kdebug!("link {}: {}", id.raw(), name);

        let task = postman(
            id,
            Rc::downgrade(src),
            src_box.to_string(),
            Rc::downgrade(dst),
            dst_box.to_string(),
            Rc::clone(&kill),
            name,
        );
        sched.activate(task);

        self.entries.push(LinkEntry {
            id,
            mode: LinkMode::Async { capacity },
            kill,
        });
        id
    }

    /// Wire a synchronous rendezvous linkage
    ///
    /// No postman is involved: the returned endpoints are handed to the two
    /// tasks and enforce the handoff directly (see [`crate::rendezvous`]).
    pub fn link_sync(&mut self) -> (LinkageId, SyncSender, SyncReceiver) {
        let id = self.fresh_id();
        let (tx, rx) = rendezvous::sync_link();
        self.entries.push(LinkEntry {
            id,
            mode: LinkMode::Synchronous,
            kill: tx.close_flag(),
        });
        kdebug!("link {}: synchronous rendezvous", id.raw());
        (id, tx, rx)
    }

    /// Deregister a linkage
    ///
    /// An async postman terminates on its next turn, silently dropping any
    /// in-flight message; a synchronous link starts swallowing sends.
    pub fn unlink(&mut self, id: LinkageId) {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            let entry = self.entries.remove(pos);
            entry.kill.set(true);
            kdebug!("unlink {}", id.raw());
        }
    }

    /// Check whether a linkage is still registered
    pub fn is_linked(&self, id: LinkageId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Delivery mode of a registered linkage
    pub fn mode(&self, id: LinkageId) -> Option<LinkMode> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.mode)
    }

    /// Number of registered linkages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Links {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the relay task for one async linkage
///
/// Moves at most one message per turn. A full sink inbox stashes the message
/// for the next turn; a vanished endpoint or a fired kill flag terminates
/// the relay, dropping anything in flight.
fn postman(
    id: LinkageId,
    src: Weak<RefCell<Component>>,
    src_box: String,
    dst: Weak<RefCell<Component>>,
    dst_box: String,
    kill: Rc<Cell<bool>>,
    name: String,
) -> MicroTask {
    let mut pending: Option<Message> = None;

    MicroTask::new(name, move || {
        if kill.get() {
            if pending.take().is_some() {
                kdebug!("link {}: dropped in-flight message on unlink", id.raw());
            }
            return Step::Terminate;
        }

        let (src, dst) = match (src.upgrade(), dst.upgrade()) {
            (Some(s), Some(d)) => (s, d),
            _ => {
                // Endpoint deregistered: best-effort tail, drop silently
                pending = None;
                return Step::Terminate;
            }
        };

        if pending.is_none() {
            pending = src.borrow_mut().collect(&src_box);
        }

        if let Some(message) = pending.take() {
            match dst.borrow_mut().deliver(message, &dst_box) {
                Ok(()) => {}
                Err(e) if e.kind == KernelError::MailboxFull => {
                    // Sink is applying backpressure; retry on a later turn
                    pending = Some(e.message);
                }
                Err(e) => {
                    kwarn!("link {}: sink rejected message: {}", id.raw(), e.kind);
                    return Step::Terminate;
                }
            }
        }

        Step::Yield
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunMode, SchedulerConfig};
    use mtask_core::{INBOX, OUTBOX};

    fn sched(passes: usize) -> Scheduler {
        Scheduler::new(SchedulerConfig::new().run_mode(RunMode::Passes(passes)))
    }

    #[test]
    fn test_postman_moves_one_message_per_turn() {
        let mut s = sched(3);
        let mut links = Links::new();

        let src = Component::new("src").into_ref();
        let dst = Component::new("dst").into_ref();

        for i in 0..5u32 {
            src.borrow_mut().send(Message::data(i), OUTBOX).unwrap();
        }

        links.link(&mut s, &src, OUTBOX, &dst, INBOX, None);
        s.run();

        // Three passes, one message each
        assert_eq!(dst.borrow().data_ready(INBOX), 3);
        assert_eq!(src.borrow().outbox_ready(OUTBOX), 2);
    }

    #[test]
    fn test_per_link_fifo_order() {
        let mut s = sched(10);
        let mut links = Links::new();

        let src = Component::new("src").into_ref();
        let dst = Component::new("dst").into_ref();

        for i in 0..4u32 {
            src.borrow_mut().send(Message::data(i), OUTBOX).unwrap();
        }
        links.link(&mut s, &src, OUTBOX, &dst, INBOX, None);
        s.run();

        for i in 0..4u32 {
            let msg = dst.borrow_mut().recv(INBOX).unwrap();
            assert_eq!(msg.downcast::<u32>(), Some(i));
        }
    }

    #[test]
    fn test_postman_retries_on_full_sink_without_loss() {
        let mut s = sched(4);
        let mut links = Links::new();

        let src = Component::new("src").into_ref();
        let dst = Component::new("dst").into_ref();

        for i in 0..3u32 {
            src.borrow_mut().send(Message::data(i), OUTBOX).unwrap();
        }
        // Pipe width 1: sink inbox holds a single message
        links.link(&mut s, &src, OUTBOX, &dst, INBOX, Some(1));

        s.run_passes(3);
        // Sink stayed full after the first delivery; nothing was lost
        assert_eq!(dst.borrow().data_ready(INBOX), 1);
        assert_eq!(
            dst.borrow_mut().recv(INBOX).unwrap().downcast::<u32>(),
            Some(0)
        );

        s.run_passes(1);
        assert_eq!(
            dst.borrow_mut().recv(INBOX).unwrap().downcast::<u32>(),
            Some(1)
        );
    }

    #[test]
    fn test_unlink_terminates_postman() {
        let mut s = sched(2);
        let mut links = Links::new();

        let src = Component::new("src").into_ref();
        let dst = Component::new("dst").into_ref();
        let id = links.link(&mut s, &src, OUTBOX, &dst, INBOX, None);
        assert!(links.is_linked(id));

        links.unlink(id);
        assert!(!links.is_linked(id));

        src.borrow_mut().send(Message::data(1u8), OUTBOX).unwrap();
        s.run();
        // Postman terminated before relaying anything
        assert_eq!(dst.borrow().data_ready(INBOX), 0);
        assert_eq!(s.stats().terminated, 1);
    }

    #[test]
    fn test_dropped_endpoint_ends_delivery_silently() {
        let mut s = sched(3);
        let mut links = Links::new();

        let src = Component::new("src").into_ref();
        let dst = Component::new("dst").into_ref();
        links.link(&mut s, &src, OUTBOX, &dst, INBOX, None);

        src.borrow_mut().send(Message::data(1u8), OUTBOX).unwrap();
        drop(dst);
        s.run();
        assert_eq!(s.stats().terminated, 1);
    }

    #[test]
    fn test_link_mode_recorded() {
        let mut s = sched(1);
        let mut links = Links::new();
        let src = Component::new("src").into_ref();
        let dst = Component::new("dst").into_ref();

        let a = links.link(&mut s, &src, OUTBOX, &dst, INBOX, Some(4));
        let (b, _tx, _rx) = links.link_sync();

        assert_eq!(links.mode(a), Some(LinkMode::Async { capacity: Some(4) }));
        assert_eq!(links.mode(b), Some(LinkMode::Synchronous));
        assert_eq!(links.len(), 2);
    }
}
