//! MicroTask: a resumable unit of cooperative work
//!
//! A MicroTask wraps an explicit state-machine step function. The scheduler
//! resumes it exactly once per pass; the returned [`Step`] decides whether
//! it runs again, parks on a waker, or is dropped.

use mtask_core::component::{Behavior, ComponentRef};
use mtask_core::error::{KernelError, KernelResult};
use mtask_core::id::TaskId;
use mtask_core::state::{Step, TaskState};

/// Resumable unit of cooperative work
///
/// Exclusively owned by the scheduler's run queue while active. A task that
/// fails to return from its step function promptly violates the cooperative
/// contract and stalls every sibling task; that hazard is documented, not
/// enforced.
pub struct MicroTask {
    id: TaskId,
    name: String,
    state: TaskState,
    step: Box<dyn FnMut() -> Step>,
}

impl MicroTask {
    /// Wrap a step closure into a task
    pub fn new(name: impl Into<String>, step: impl FnMut() -> Step + 'static) -> Self {
        Self {
            id: TaskId::fresh(),
            name: name.into(),
            state: TaskState::Runnable,
            step: Box::new(step),
        }
    }

    /// Drive a [`Behavior`] against its component, one slice per resumption
    pub fn from_behavior(
        name: impl Into<String>,
        mut behavior: impl Behavior + 'static,
        component: ComponentRef,
    ) -> Self {
        Self::new(name, move || behavior.main(&mut component.borrow_mut()))
    }

    /// Task identifier
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Task name (for logs)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Resume the task exactly once
    ///
    /// Resuming an already-terminated task is an idempotent no-op that
    /// reports `Terminate` again; it never runs the step function.
    pub fn resume(&mut self) -> Step {
        if self.state.is_terminated() {
            return Step::Terminate;
        }

        let step = (self.step)();
        self.state = match step {
            Step::Yield => TaskState::Runnable,
            Step::Wait(_) => TaskState::Suspended,
            Step::Terminate => TaskState::Terminated,
        };
        step
    }

    /// Resume, surfacing the exhausted-task case as a typed error
    ///
    /// For callers driving tasks by hand; the scheduler itself uses
    /// [`MicroTask::resume`] and treats exhaustion as a no-op.
    pub fn try_resume(&mut self) -> KernelResult<Step> {
        if self.state.is_terminated() {
            return Err(KernelError::TaskTerminated);
        }
        Ok(self.resume())
    }
}

impl std::fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
