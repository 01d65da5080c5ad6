//! FIFO mailbox backing one inbox or outbox
//!
//! A mailbox is a plain ordered queue with an optional capacity bound.
//! It is not thread-safe: mailboxes live inside the cooperative domain
//! where tasks interleave only at explicit suspension points. Cross-thread
//! traffic goes through `ThreadedComponent` boxes instead.

use std::collections::VecDeque;

use crate::error::{KernelError, KernelResult};
use crate::message::Message;

/// Ordered message queue with an optional capacity bound
///
/// Invariant: `len() <= capacity` when bounded. A push that would exceed
/// capacity fails and hands the message back to the caller.
#[derive(Debug)]
pub struct Mailbox {
    queue: VecDeque<Message>,
    capacity: Option<usize>,
}

impl Mailbox {
    /// Create an unbounded mailbox
    pub fn unbounded() -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: None,
        }
    }

    /// Create a mailbox holding at most `capacity` messages
    pub fn bounded(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    /// Append a message, returning it on a full bounded box
    pub fn push(&mut self, message: Message) -> Result<(), Message> {
        if let Some(cap) = self.capacity {
            if self.queue.len() >= cap {
                return Err(message);
            }
        }
        self.queue.push_back(message);
        Ok(())
    }

    /// Pop the oldest message
    pub fn pop(&mut self) -> KernelResult<Message> {
        self.queue.pop_front().ok_or(KernelError::MailboxEmpty)
    }

    /// Number of messages currently queued
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the mailbox has no messages
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Capacity bound, if any
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Check if a push would currently fail
    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self.capacity, Some(cap) if self.queue.len() >= cap)
    }

    /// Re-bound the mailbox (used when a linkage declares a pipe width)
    ///
    /// Messages already queued beyond the new bound stay in place; the new
    /// bound applies to future pushes only.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::unbounded()
    }
}
