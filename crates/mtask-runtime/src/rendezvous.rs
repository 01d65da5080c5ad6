//! Synchronous rendezvous channel
//!
//! A one-slot CSP handoff between two cooperative tasks on the same
//! scheduler. `send` places the message and returns a [`Waker`]; the sender
//! parks on it via [`Step::Wait`](mtask_core::state::Step::Wait) and is not
//! resumed again until the paired
//! `recv` consumes the message. At most one message is ever in flight.
//!
//! Once a link is closed (explicitly, or because either endpoint was
//! dropped) sends are swallowed with a pre-fired waker so a parked sender
//! can never deadlock on a peer that is gone.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mtask_core::error::{KernelError, KernelResult, TrySendError};
use mtask_core::message::Message;
use mtask_core::state::Waker;
use mtask_core::kdebug;

struct Slot {
    message: Option<Message>,
    /// Sender's waker, fired when recv consumes the message
    handoff: Option<Waker>,
}

/// Sending half of a rendezvous link
pub struct SyncSender {
    slot: Rc<RefCell<Slot>>,
    closed: Rc<Cell<bool>>,
}

/// Receiving half of a rendezvous link
pub struct SyncReceiver {
    slot: Rc<RefCell<Slot>>,
    closed: Rc<Cell<bool>>,
}

/// Create a connected rendezvous pair
pub fn sync_link() -> (SyncSender, SyncReceiver) {
    let slot = Rc::new(RefCell::new(Slot {
        message: None,
        handoff: None,
    }));
    let closed = Rc::new(Cell::new(false));
    (
        SyncSender {
            slot: Rc::clone(&slot),
            closed: Rc::clone(&closed),
        },
        SyncReceiver { slot, closed },
    )
}

impl SyncSender {
    /// Offer a message for handoff
    ///
    /// On success the returned waker fires when the receiver consumes the
    /// message; return `Step::Wait` on it to uphold the rendezvous. A second
    /// send before that is refused with `MailboxFull` and hands the message
    /// back. On a closed link the message is dropped and the waker comes
    /// back pre-fired.
    pub fn send(&self, message: Message) -> Result<Waker, TrySendError> {
        if self.closed.get() {
            kdebug!("rendezvous: send on closed link dropped");
            let waker = Waker::new();
            waker.wake();
            return Ok(waker);
        }
        let mut slot = self.slot.borrow_mut();
        if slot.message.is_some() {
            return Err(TrySendError::full(message));
        }
        let waker = Waker::new();
        slot.message = Some(message);
        slot.handoff = Some(waker.clone());
        Ok(waker)
    }

    /// Check whether the link has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub(crate) fn close_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.closed)
    }
}

impl SyncReceiver {
    /// Take the in-flight message, releasing the parked sender
    ///
    /// Returns `MailboxEmpty` when no sender has rendezvoused yet.
    pub fn recv(&self) -> KernelResult<Message> {
        let mut slot = self.slot.borrow_mut();
        match slot.message.take() {
            Some(message) => {
                if let Some(waker) = slot.handoff.take() {
                    waker.wake();
                }
                Ok(message)
            }
            None => Err(KernelError::MailboxEmpty),
        }
    }

    /// Check whether a message is waiting
    pub fn data_ready(&self) -> bool {
        self.slot.borrow().message.is_some()
    }

    /// Check whether the link has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

fn close(slot: &RefCell<Slot>, closed: &Cell<bool>) {
    closed.set(true);
    let mut slot = slot.borrow_mut();
    slot.message = None;
    // Release a sender parked mid-handoff
    if let Some(waker) = slot.handoff.take() {
        waker.wake();
    }
}

impl Drop for SyncSender {
    fn drop(&mut self) {
        close(&self.slot, &self.closed);
    }
}

impl Drop for SyncReceiver {
    fn drop(&mut self) {
        close(&self.slot, &self.closed);
    }
}
