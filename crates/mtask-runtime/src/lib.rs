//! # mtask-runtime
//!
//! Cooperative kernel runtime: the scheduler and everything that runs on it.
//!
//! This crate provides:
//! - MicroTasks (resumable step closures) and the round-robin scheduler
//! - Linkages and the Postman relay between component mailboxes
//! - Synchronous rendezvous channels for CSP-style handoff
//! - A versioned transactional store (optimistic STM)
//! - A deadline-ordered timer heap
//! - OS-thread components bridging into the cooperative domain

pub mod config;
pub mod task;
pub mod scheduler;
pub mod linkage;
pub mod rendezvous;
pub mod stm;
pub mod timer;
pub mod threaded;
pub mod pipeline;

// Re-exports
pub use config::{RunMode, SchedulerConfig};
pub use task::MicroTask;
pub use scheduler::{Scheduler, SchedulerStats, Spawner, StopHandle};
pub use linkage::{LinkMode, LinkageId, Links};
pub use rendezvous::{sync_link, SyncReceiver, SyncSender};
pub use stm::{retry, Store, StoreStats, Transaction};
pub use timer::{TimerEvent, TimerHandle, TimerHeap, TimerStats};
pub use threaded::{Remote, ThreadedComponent, ThreadedComponentBuilder, EVENT};
pub use pipeline::Pipeline;
