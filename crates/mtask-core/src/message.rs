//! Messages carried through mailboxes
//!
//! Payloads are opaque (`Box<dyn Any + Send>`); control traffic is a closed
//! enum so shutdown handling is matched exhaustively instead of sniffing
//! message types at runtime.

use core::fmt;
use std::any::Any;

/// Control messages, delivered on the reserved `control` inbox
///
/// A component that receives `Shutdown` is expected to finish or abandon
/// pending work and then forward the signal on its `signal` outbox, so that
/// shutdown propagates across a chain of linked components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Orderly shutdown: drain pending work first
    Shutdown,

    /// Immediate shutdown: abandon pending work
    ShutdownNow,

    /// Upstream producer has no more data to send
    ProducerFinished,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Shutdown => write!(f, "shutdown"),
            Control::ShutdownNow => write!(f, "shutdown-now"),
            Control::ProducerFinished => write!(f, "producer-finished"),
        }
    }
}

/// A single mailbox message: opaque payload or control signal
pub enum Message {
    /// Opaque payload
    Data(Box<dyn Any + Send>),

    /// Control signal (closed set, matched exhaustively)
    Control(Control),
}

impl Message {
    /// Wrap a payload value
    pub fn data<T: Any + Send>(value: T) -> Self {
        Message::Data(Box::new(value))
    }

    /// Shorthand for `Message::Control(Control::Shutdown)`
    pub fn shutdown() -> Self {
        Message::Control(Control::Shutdown)
    }

    /// Get the control variant, if this is a control message
    #[inline]
    pub fn as_control(&self) -> Option<Control> {
        match self {
            Message::Control(c) => Some(*c),
            Message::Data(_) => None,
        }
    }

    /// Check whether this message requests shutdown (orderly or immediate)
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            Message::Control(Control::Shutdown) | Message::Control(Control::ShutdownNow)
        )
    }

    /// Take the payload out as a concrete type
    ///
    /// Returns `None` (dropping the message) if this is a control message or
    /// the payload has a different type. Use [`Message::downcast_ref`] to
    /// peek without consuming.
    pub fn downcast<T: Any>(self) -> Option<T> {
        match self {
            Message::Data(payload) => payload.downcast::<T>().ok().map(|b| *b),
            Message::Control(_) => None,
        }
    }

    /// Borrow the payload as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Message::Data(payload) => payload.downcast_ref::<T>(),
            Message::Control(_) => None,
        }
    }
}

impl From<Control> for Message {
    fn from(c: Control) -> Self {
        Message::Control(c)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Data(_) => write!(f, "Message::Data(..)"),
            Message::Control(c) => write!(f, "Message::Control({:?})", c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_roundtrip() {
        let msg = Message::data("Hello World".to_string());
        assert!(msg.as_control().is_none());
        assert_eq!(msg.downcast::<String>().unwrap(), "Hello World");
    }

    #[test]
    fn test_downcast_wrong_type() {
        let msg = Message::data(1u32);
        assert!(msg.downcast_ref::<String>().is_none());
        assert!(msg.downcast::<String>().is_none());
    }

    #[test]
    fn test_control_predicates() {
        assert!(Message::shutdown().is_shutdown());
        assert!(Message::Control(Control::ShutdownNow).is_shutdown());
        assert!(!Message::Control(Control::ProducerFinished).is_shutdown());
        assert!(!Message::data(0u8).is_shutdown());
    }

    #[test]
    fn test_message_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Message>();
    }
}
