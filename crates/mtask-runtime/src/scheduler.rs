//! Round-robin cooperative scheduler
//!
//! One logical thread of control. Each pass resumes every active task
//! exactly once, in stable enqueue order; tasks activated (or woken) during
//! a pass join the *next* pass, never the current one, so a freshly spawned
//! task can never starve tasks that were already active. Total round latency
//! is O(active-task-count).
//!
//! A task that fails to yield promptly stalls all of its siblings. That is
//! the cooperative contract; it is documented, not runtime-enforced.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mtask_core::id::TaskId;
use mtask_core::state::{Step, Waker};
use mtask_core::{kdebug, ktrace, kwarn};

use crate::config::{RunMode, SchedulerConfig};
use crate::task::MicroTask;

/// Counters accumulated across passes
#[derive(Debug, Default, Clone)]
pub struct SchedulerStats {
    /// Completed passes
    pub passes: u64,
    /// Individual task resumptions
    pub resumptions: u64,
    /// Tasks accepted via `activate` or a `Spawner`
    pub activated: u64,
    /// Tasks dropped after returning the terminal sentinel
    pub terminated: u64,
}

/// Handle for requesting that `run()` return (RunMode::UntilStopped)
///
/// Clonable and usable from inside a task's step function.
#[derive(Clone, Default)]
pub struct StopHandle {
    stopped: Rc<Cell<bool>>,
}

impl StopHandle {
    /// Ask the scheduler to return after the current pass
    #[inline]
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    /// Check whether stop has been requested
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

/// Handle for activating tasks from inside a running pass
///
/// Spawned tasks are deferred to the next pass, like every activation.
#[derive(Clone)]
pub struct Spawner {
    injected: Rc<RefCell<Vec<MicroTask>>>,
}

impl Spawner {
    /// Enqueue a task for the next pass
    pub fn spawn(&self, task: MicroTask) -> TaskId {
        let id = task.id();
        self.injected.borrow_mut().push(task);
        id
    }
}

/// Round-robin executor over active MicroTasks
pub struct Scheduler {
    config: SchedulerConfig,

    /// Tasks that will run on the next pass, in enqueue order
    next: Vec<MicroTask>,

    /// Tasks parked on a waker
    parked: Vec<(Waker, MicroTask)>,

    /// Tasks spawned from inside a pass, drained at pass end
    injected: Rc<RefCell<Vec<MicroTask>>>,

    /// Stop flag shared with StopHandles
    stopped: Rc<Cell<bool>>,

    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler with the given configuration
    pub fn new(config: SchedulerConfig) -> Self {
        config.validate().expect("invalid scheduler configuration");
        Self {
            config,
            next: Vec::new(),
            parked: Vec::new(),
            injected: Rc::new(RefCell::new(Vec::new())),
            stopped: Rc::new(Cell::new(false)),
            stats: SchedulerStats::default(),
        }
    }

    /// Enqueue a task for the next pass, never the current one
    pub fn activate(&mut self, task: MicroTask) -> TaskId {
        let id = task.id();
        kdebug!("activate task {} '{}'", id, task.name());
        self.stats.activated += 1;
        self.next.push(task);
        id
    }

    /// Handle for activating tasks from inside a pass
    pub fn spawner(&self) -> Spawner {
        Spawner {
            injected: Rc::clone(&self.injected),
        }
    }

    /// Handle for stopping an `UntilStopped` run
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stopped: Rc::clone(&self.stopped),
        }
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Number of tasks enqueued for the next pass
    pub fn runnable_count(&self) -> usize {
        self.next.len()
    }

    /// Number of tasks parked on wakers
    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    /// Run one pass: resume every active task exactly once
    ///
    /// Returns the number of tasks resumed.
    pub fn pass(&mut self) -> usize {
        let current = std::mem::take(&mut self.next);
        let resumed = current.len();

        for mut task in current {
            if self.config.trace_tasks {
                ktrace!("resume task {} '{}'", task.id(), task.name());
            }
            self.stats.resumptions += 1;

            match task.resume() {
                Step::Yield => self.next.push(task),
                Step::Wait(waker) => {
                    // Wake could have fired before the task even parked
                    if waker.is_woken() {
                        self.next.push(task);
                    } else {
                        self.parked.push((waker, task));
                    }
                }
                Step::Terminate => {
                    kdebug!("task {} '{}' terminated", task.id(), task.name());
                    self.stats.terminated += 1;
                }
            }
        }

        // Tasks spawned during this pass join the next one
        let mut injected = self.injected.borrow_mut();
        self.stats.activated += injected.len() as u64;
        self.next.append(&mut injected);
        drop(injected);

        // Parked tasks woken during this pass join the next one,
        // in the order they were parked
        let mut still_parked = Vec::with_capacity(self.parked.len());
        for (waker, task) in self.parked.drain(..) {
            if waker.is_woken() {
                self.next.push(task);
            } else {
                still_parked.push((waker, task));
            }
        }
        self.parked = still_parked;

        self.stats.passes += 1;
        resumed
    }

    /// Drive the scheduler according to the configured [`RunMode`]
    ///
    /// `Passes(n)` runs exactly n passes. `UntilIdle` returns once no task
    /// is runnable. `UntilStopped` runs until a [`StopHandle`] fires, or the
    /// graph goes fully idle (nothing external can wake an idle cooperative
    /// domain).
    pub fn run(&mut self) {
        match self.config.run_mode {
            RunMode::Passes(n) => {
                for _ in 0..n {
                    self.pass();
                }
            }
            RunMode::UntilIdle | RunMode::UntilStopped => {
                while !self.stopped.get() && !self.next.is_empty() {
                    self.pass();
                }
            }
        }

        if self.next.is_empty() && !self.parked.is_empty() {
            kwarn!(
                "{} task(s) still parked at exit with nothing left to wake them",
                self.parked.len()
            );
        }
    }

    /// Run a bounded number of passes regardless of the configured mode
    pub fn run_passes(&mut self, n: usize) {
        for _ in 0..n {
            self.pass();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str, lives: usize) -> MicroTask {
        let log = Rc::clone(log);
        let mut remaining = lives;
        MicroTask::new(tag, move || {
            log.borrow_mut().push(tag);
            remaining -= 1;
            if remaining == 0 {
                Step::Terminate
            } else {
                Step::Yield
            }
        })
    }

    #[test]
    fn test_round_robin_order_is_stable() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new(SchedulerConfig::new().run_mode(RunMode::Passes(3)));

        sched.activate(recorder(&log, "a", 3));
        sched.activate(recorder(&log, "b", 3));
        sched.activate(recorder(&log, "c", 3));
        sched.run();

        assert_eq!(
            *log.borrow(),
            vec!["a", "b", "c", "a", "b", "c", "a", "b", "c"]
        );
        assert_eq!(sched.stats().passes, 3);
        assert_eq!(sched.stats().resumptions, 9);
    }

    #[test]
    fn test_spawned_task_defers_to_next_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new(SchedulerConfig::new().run_mode(RunMode::Passes(2)));
        let spawner = sched.spawner();

        let inner_log = Rc::clone(&log);
        let mut spawned = false;
        sched.activate(MicroTask::new("parent", move || {
            inner_log.borrow_mut().push("parent");
            if !spawned {
                spawned = true;
                let child_log = Rc::clone(&inner_log);
                spawner.spawn(MicroTask::new("child", move || {
                    child_log.borrow_mut().push("child");
                    Step::Terminate
                }));
            }
            Step::Yield
        }));

        sched.run();
        // Child never runs in the pass that spawned it
        assert_eq!(*log.borrow(), vec!["parent", "parent", "child"]);
    }

    #[test]
    fn test_until_idle_stops_when_exhausted() {
        let mut sched = Scheduler::new(SchedulerConfig::new().run_mode(RunMode::UntilIdle));
        sched.activate(MicroTask::new("brief", {
            let mut n = 0;
            move || {
                n += 1;
                if n < 5 {
                    Step::Yield
                } else {
                    Step::Terminate
                }
            }
        }));
        sched.run();
        assert_eq!(sched.stats().resumptions, 5);
        assert_eq!(sched.runnable_count(), 0);
    }

    #[test]
    fn test_stop_handle_ends_run() {
        let mut sched = Scheduler::new(SchedulerConfig::new().run_mode(RunMode::UntilStopped));
        let stop = sched.stop_handle();

        let mut n = 0u32;
        sched.activate(MicroTask::new("spinner", move || {
            n += 1;
            if n == 10 {
                stop.stop();
            }
            Step::Yield
        }));
        sched.run();
        assert_eq!(sched.stats().passes, 10);
        assert_eq!(sched.runnable_count(), 1); // spinner still alive
    }

    #[test]
    fn test_parked_task_resumes_pass_after_wake() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let waker = Waker::new();
        let mut sched = Scheduler::new(SchedulerConfig::new().run_mode(RunMode::Passes(4)));

        let sleeper_log = Rc::clone(&log);
        let w = waker.clone();
        let mut parked_once = false;
        sched.activate(MicroTask::new("sleeper", move || {
            sleeper_log.borrow_mut().push("sleeper");
            if parked_once {
                Step::Terminate
            } else {
                parked_once = true;
                Step::Wait(w.clone())
            }
        }));

        let waking_log = Rc::clone(&log);
        let mut turn = 0;
        sched.activate(MicroTask::new("waking", move || {
            turn += 1;
            waking_log.borrow_mut().push("waking");
            if turn == 2 {
                waker.wake();
            }
            Step::Yield
        }));

        sched.run();
        // Pass 1: both run, sleeper parks. Pass 2: waker fires, sleeper
        // rejoins behind the yielding task. Pass 3: sleeper runs again and
        // terminates. Pass 4: only the waking task remains.
        assert_eq!(
            *log.borrow(),
            vec!["sleeper", "waking", "waking", "waking", "sleeper", "waking"]
        );
    }
}
