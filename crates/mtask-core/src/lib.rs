//! # mtask-core
//!
//! Core types for the mtask cooperative component kernel.
//!
//! This crate is platform-agnostic and contains no scheduling machinery.
//! The scheduler, linkages, STM store and timer heap live in
//! `mtask-runtime`.
//!
//! ## Modules
//!
//! - `id` - MicroTask identifier type
//! - `state` - task state, resume signal and cooperative waker
//! - `message` - opaque payloads and the closed control-message enum
//! - `mailbox` - FIFO queue backing one inbox or outbox
//! - `component` - named mailbox bundle and the component contract
//! - `error` - error taxonomy
//! - `klog` - printk-style leveled logging macros
//! - `env` - environment variable utilities

pub mod component;
pub mod env;
pub mod error;
pub mod id;
pub mod klog;
pub mod mailbox;
pub mod message;
pub mod state;

// Re-exports for convenience
pub use component::{Behavior, Component, ComponentRef, CONTROL, INBOX, OUTBOX, SIGNAL};
pub use env::{env_get, env_get_bool, env_get_opt};
pub use error::{KernelError, KernelResult, StmError, TrySendError};
pub use id::TaskId;
pub use klog::{init as init_logging, set_log_level, LogLevel};
pub use mailbox::Mailbox;
pub use message::{Control, Message};
pub use state::{Step, TaskState, Waker};
