//! Scheduler configuration

use mtask_core::env::{env_get, env_get_bool};

/// Top-level termination condition for [`Scheduler::run`]
///
/// The substrate does not hardwire one behavior; toy graphs want a bounded
/// pass count, services want to run until told to stop.
///
/// [`Scheduler::run`]: crate::scheduler::Scheduler::run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run exactly this many passes, then return
    Passes(usize),

    /// Run until no task is runnable or wakeable
    UntilIdle,

    /// Run until `stop()` is called (or the graph goes idle, since nothing
    /// external can wake a fully idle cooperative domain)
    UntilStopped,
}

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Termination condition for `run()`
    pub run_mode: RunMode,

    /// Enable per-resumption trace logging
    pub trace_tasks: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let run_mode = match env_get::<usize>("MTK_MAX_PASSES", 0) {
            0 => RunMode::UntilIdle,
            n => RunMode::Passes(n),
        };

        Self {
            run_mode,
            trace_tasks: env_get_bool("MTK_TRACE_TASKS", false),
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the termination condition
    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = mode;
        self
    }

    /// Enable per-resumption trace logging
    pub fn trace_tasks(mut self, enable: bool) -> Self {
        self.trace_tasks = enable;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if let RunMode::Passes(0) = self.run_mode {
            return Err("RunMode::Passes requires at least one pass");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_until_idle() {
        assert_eq!(SchedulerConfig::default().run_mode, RunMode::UntilIdle);
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::new()
            .run_mode(RunMode::Passes(100))
            .trace_tasks(true);
        assert_eq!(config.run_mode, RunMode::Passes(100));
        assert!(config.trace_tasks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_passes_rejected() {
        let config = SchedulerConfig::new().run_mode(RunMode::Passes(0));
        assert!(config.validate().is_err());
    }
}
