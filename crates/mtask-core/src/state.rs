//! MicroTask state, resume signal and cooperative waker

use core::fmt;
use std::cell::Cell;
use std::rc::Rc;

/// State of a MicroTask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Ready to be resumed on the next scheduler pass
    Runnable = 0,

    /// Parked on a waker, not resumed until woken
    Suspended = 1,

    /// Computation exhausted, will never run again
    Terminated = 2,
}

impl TaskState {
    /// Check if this state allows the task to be scheduled
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, TaskState::Runnable)
    }

    /// Check if this task has terminated
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, TaskState::Terminated)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Runnable => write!(f, "RUNNABLE"),
            TaskState::Suspended => write!(f, "SUSPENDED"),
            TaskState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Signal returned from a single resumption of a MicroTask
///
/// Anything but `Terminate` keeps the task alive: `Yield` re-enqueues it for
/// the next pass, `Wait` parks it until the attached [`Waker`] fires.
pub enum Step {
    /// Run again on the next pass
    Yield,

    /// Park until the waker fires, then run on the following pass
    Wait(Waker),

    /// Computation exhausted, drop the task
    Terminate,
}

impl Step {
    /// Check if this is the terminal sentinel
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Terminate)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Yield => write!(f, "Yield"),
            Step::Wait(w) => write!(f, "Wait(woken={})", w.is_woken()),
            Step::Terminate => write!(f, "Terminate"),
        }
    }
}

/// One-shot wake flag shared between a parked task and whoever unblocks it
///
/// Lives entirely in the cooperative domain: cloning is cheap (`Rc`) and the
/// type is deliberately not `Send`. A task that returns `Step::Wait(waker)`
/// stays parked until some other task calls `wake()` on a clone.
#[derive(Clone, Default)]
pub struct Waker {
    woken: Rc<Cell<bool>>,
}

impl Waker {
    /// Create a new, unfired waker
    pub fn new() -> Self {
        Self {
            woken: Rc::new(Cell::new(false)),
        }
    }

    /// Fire the waker; the parked task becomes runnable on the next pass
    #[inline]
    pub fn wake(&self) {
        self.woken.set(true);
    }

    /// Check whether the waker has fired
    #[inline]
    pub fn is_woken(&self) -> bool {
        self.woken.get()
    }
}

impl fmt::Debug for Waker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Waker(woken={})", self.is_woken())
    }
}
