//! Error types for the component kernel

use core::fmt;

use crate::message::Message;

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors that can occur in kernel operations
///
/// Everything here is recoverable at the call site: a full mailbox means
/// back off and retry, an empty mailbox means the caller skipped its
/// `data_ready` check, and an STM conflict means rerun the transaction.
/// None of these should ever take the process down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Bounded mailbox is at capacity (back off and retry the send)
    MailboxFull,

    /// Mailbox has no message ready (caller should have checked `data_ready`)
    MailboxEmpty,

    /// No inbox/outbox registered under the given name
    NoSuchBox,

    /// Attempted to resume an exhausted MicroTask
    TaskTerminated,

    /// Transactional store error
    Stm(StmError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::MailboxFull => write!(f, "mailbox full"),
            KernelError::MailboxEmpty => write!(f, "mailbox empty"),
            KernelError::NoSuchBox => write!(f, "no such mailbox"),
            KernelError::TaskTerminated => write!(f, "task already terminated"),
            KernelError::Stm(e) => write!(f, "stm error: {}", e),
        }
    }
}

impl std::error::Error for KernelError {}

/// Transactional store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmError {
    /// A key's live version moved past the transaction's snapshot;
    /// the whole commit was aborted and the store is unchanged
    ConcurrentUpdate,

    /// Key was not named in `store.using(..)` for this transaction
    UnknownKey,
}

impl fmt::Display for StmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmError::ConcurrentUpdate => write!(f, "concurrent update, retry transaction"),
            StmError::UnknownKey => write!(f, "key not tracked by transaction"),
        }
    }
}

impl std::error::Error for StmError {}

impl From<StmError> for KernelError {
    fn from(e: StmError) -> Self {
        KernelError::Stm(e)
    }
}

/// Error returned from a failed send, handing the message back
///
/// Sends consume their message; when the destination box is full (or
/// missing) the caller gets the message back so it can retry on a later
/// resumption. This is the kernel's only backpressure mechanism.
#[derive(Debug)]
pub struct TrySendError {
    /// Why the send failed
    pub kind: KernelError,

    /// The undelivered message, returned to the caller
    pub message: Message,
}

impl TrySendError {
    /// Build a full-mailbox error around the returned message
    pub fn full(message: Message) -> Self {
        Self {
            kind: KernelError::MailboxFull,
            message,
        }
    }

    /// Build a no-such-box error around the returned message
    pub fn no_such_box(message: Message) -> Self {
        Self {
            kind: KernelError::NoSuchBox,
            message,
        }
    }
}

impl fmt::Display for TrySendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send failed: {}", self.kind)
    }
}

impl std::error::Error for TrySendError {}
