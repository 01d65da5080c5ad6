//! # mtask - Cooperative MicroTask Kernel
//!
//! Message-passing components on a cooperative round-robin scheduler.
//!
//! ## Features
//!
//! - **MicroTasks**: resumable step closures, one resumption per pass
//! - **Components**: named inboxes/outboxes with bounded backpressure
//! - **Linkages**: Postman relays between boxes, one message per turn
//! - **Rendezvous**: CSP-style synchronous handoff between tasks
//! - **STM**: optimistic versioned store with all-or-nothing commits
//! - **Timers**: deadline-ordered heap with lazy cancellation
//! - **Threaded components**: OS-thread peers that sleep until a message
//!   arrives or their next timer is due
//!
//! ## Quick Start
//!
//! ```
//! use mtask::{Component, Kernel, Message, MicroTask, RunMode, Step, OUTBOX, INBOX};
//! use std::rc::Rc;
//!
//! let mut kernel = Kernel::with_run_mode(RunMode::Passes(10));
//!
//! let src = Component::new("src").into_ref();
//! let dst = Component::new("dst").into_ref();
//!
//! let tx = Rc::clone(&src);
//! kernel.activate(MicroTask::new("producer", move || {
//!     let _ = tx.borrow_mut().send(Message::data(1u32), OUTBOX);
//!     Step::Terminate
//! }));
//! kernel.link(&src, OUTBOX, &dst, INBOX, None);
//!
//! kernel.run();
//! assert_eq!(dst.borrow_mut().recv(INBOX).unwrap().downcast::<u32>(), Some(1));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      User Code                          │
//! │        Behavior::main(), send(), recv(), Step           │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Scheduler                          │
//! │      round-robin passes, park/wake, Postman relays      │
//! └─────────────────────────────────────────────────────────┘
//!          │                 │                  │
//!          ▼                 ▼                  ▼
//!    ┌───────────┐    ┌───────────┐     ┌─────────────┐
//!    │ Component │    │ TimerHeap │     │  STM Store  │
//!    │ mailboxes │    │ deadlines │     │  versions   │
//!    └───────────┘    └───────────┘     └─────────────┘
//!                            ▲
//!                            │ Remote handles, condvar wakeups
//!                 ┌─────────────────────┐
//!                 │ ThreadedComponents  │
//!                 │   (OS threads)      │
//!                 └─────────────────────┘
//! ```

// Re-export core types
pub use mtask_core::{
    Behavior, Component, ComponentRef, Control, KernelError, KernelResult, Mailbox, Message,
    Step, StmError, TaskId, TaskState, TrySendError, Waker, CONTROL, INBOX, OUTBOX, SIGNAL,
};

// Re-export the klog macros and controls
pub use mtask_core::{kdebug, kerror, kinfo, ktrace, kwarn};
pub use mtask_core::{init_logging, set_log_level, LogLevel};

// Re-export env utilities
pub use mtask_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use mtask_runtime::{
    retry, sync_link, LinkMode, LinkageId, Links, MicroTask, Pipeline, Remote, RunMode,
    Scheduler, SchedulerConfig, SchedulerStats, Spawner, StopHandle, Store, StoreStats,
    SyncReceiver, SyncSender, ThreadedComponent, ThreadedComponentBuilder, TimerEvent,
    TimerHandle, TimerHeap, TimerStats, Transaction, EVENT,
};

/// Scheduler plus linkage registry bundled as one entry point
///
/// Most programs want both; the kernel keeps them together and forwards the
/// calls that cross between them.
pub struct Kernel {
    scheduler: Scheduler,
    links: Links,
}

impl Kernel {
    /// Kernel with configuration taken from the environment
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            scheduler: Scheduler::new(config),
            links: Links::new(),
        }
    }

    /// Kernel with an explicit run mode
    pub fn with_run_mode(mode: RunMode) -> Self {
        Self::new(SchedulerConfig::new().run_mode(mode))
    }

    /// Activate a task on the next pass
    pub fn activate(&mut self, task: MicroTask) -> TaskId {
        self.scheduler.activate(task)
    }

    /// Wire an asynchronous linkage between two components
    pub fn link(
        &mut self,
        src: &ComponentRef,
        src_box: &str,
        dst: &ComponentRef,
        dst_box: &str,
        capacity: Option<usize>,
    ) -> LinkageId {
        self.links
            .link(&mut self.scheduler, src, src_box, dst, dst_box, capacity)
    }

    /// Wire a synchronous rendezvous linkage
    pub fn link_sync(&mut self) -> (LinkageId, SyncSender, SyncReceiver) {
        self.links.link_sync()
    }

    /// Deregister a linkage
    pub fn unlink(&mut self, id: LinkageId) {
        self.links.unlink(id)
    }

    /// Activate a pipeline's stages and wiring in one call
    pub fn wire(&mut self, pipeline: Pipeline) -> Vec<LinkageId> {
        pipeline.wire(&mut self.scheduler, &mut self.links)
    }

    /// Handle for spawning tasks from inside a running pass
    pub fn spawner(&self) -> Spawner {
        self.scheduler.spawner()
    }

    /// Handle for ending a `RunMode::UntilStopped` run
    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// Run to completion per the configured run mode
    pub fn run(&mut self) {
        self.scheduler.run()
    }

    /// Run exactly `n` passes
    pub fn run_passes(&mut self, n: usize) {
        self.scheduler.run_passes(n)
    }

    /// Scheduler counters
    pub fn stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }

    /// Direct access to the scheduler
    pub fn scheduler(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Direct access to the linkage registry
    pub fn links(&mut self) -> &mut Links {
        &mut self.links
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Producer pushing one message per pass into its outbox until done,
    /// consumer draining its inbox, postman relaying in between. Activation
    /// order producer, consumer, postman over 100 passes yields exactly 99
    /// deliveries: the postman starts relaying one pass behind the producer.
    #[test]
    fn test_hello_world_pipeline_delivers_99_of_100() {
        let mut kernel = Kernel::with_run_mode(RunMode::Passes(100));

        let producer = Component::new("producer").into_ref();
        let consumer = Component::new("consumer").into_ref();

        let p = Rc::clone(&producer);
        let mut n = 0u32;
        kernel.activate(MicroTask::new("producer", move || {
            let _ = p.borrow_mut().send(Message::data(n), OUTBOX);
            n += 1;
            Step::Yield
        }));

        let received = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&received);
        let c = Rc::clone(&consumer);
        kernel.activate(MicroTask::new("consumer", move || {
            while c.borrow_mut().recv(INBOX).is_ok() {
                seen.set(seen.get() + 1);
            }
            Step::Yield
        }));

        kernel.link(&producer, OUTBOX, &consumer, INBOX, None);
        kernel.run();

        // Pass 1: producer sends, consumer sees nothing, postman relays the
        // first message after the consumer already ran. Every later pass the
        // consumer drains exactly one relayed message.
        assert_eq!(received.get(), 99);
        assert_eq!(kernel.stats().passes, 100);
    }

    #[test]
    fn test_kernel_unlink_stops_relay() {
        let mut kernel = Kernel::with_run_mode(RunMode::Passes(5));
        let a = Component::new("a").into_ref();
        let b = Component::new("b").into_ref();

        let id = kernel.link(&a, OUTBOX, &b, INBOX, None);
        kernel.unlink(id);

        a.borrow_mut().send(Message::data(1u8), OUTBOX).unwrap();
        kernel.run();
        assert_eq!(b.borrow().data_ready(INBOX), 0);
    }
}
