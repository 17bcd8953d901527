//! Task abstraction and the common run loop
//!
//! Producers and workers share one lifecycle:
//!
//! 1. Loop while the global and local flags are both set, calling
//!    [`PipelineTask::step`].
//! 2. The first error leaves the loop and goes to
//!    [`PipelineTask::handle_error`].
//! 3. [`PipelineTask::stop`] with [`StopScope::Local`] runs on every exit
//!    path, including a panic inside `step`.

use super::flags::{RunFlags, StopScope};
use crate::error::{PipelineError, Result};

/// One long-running pipeline stage instance
pub trait PipelineTask: Send {
    /// Name for logs, e.g. `worker:video#3`
    fn name(&self) -> String;

    fn flags(&self) -> &RunFlags;

    /// One iteration of the task loop
    fn step(&mut self) -> Result<()>;

    /// Clear the running flag for `scope` and release held resources.
    ///
    /// Must be idempotent: it runs once more when the loop exits.
    fn stop(&mut self, scope: StopScope);

    /// Report the error that ended the loop
    fn handle_error(&self, err: &PipelineError) {
        log_task_error(&self.name(), err);
    }
}

/// Log an error that ended a task
///
/// Operator interrupts and end of stream are expected and logged at info.
pub fn log_task_error(task: &str, err: &PipelineError) {
    if err.is_graceful() {
        tracing::info!(task, reason = %err, "Task ending, graceful shutdown");
    } else {
        tracing::error!(task, error = %err, "Task failed");
    }
}

struct StopOnExit<'a>(&'a mut dyn PipelineTask);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.stop(StopScope::Local);
    }
}

/// Run `task` until its flags clear or a step fails
///
/// Returns the error that ended the loop, if any.
pub fn run_task(task: &mut dyn PipelineTask) -> Option<PipelineError> {
    let guard = StopOnExit(task);
    let task = &mut *guard.0;
    let name = task.name();
    tracing::debug!(task = %name, "Task started");

    let mut failure = None;
    while task.flags().is_running() {
        if let Err(e) = task.step() {
            task.handle_error(&e);
            failure = Some(e);
            break;
        }
    }

    tracing::debug!(task = %name, "Task finished");
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTask {
        flags: RunFlags,
        steps: usize,
        fail_at: Option<usize>,
        stops: Arc<AtomicUsize>,
    }

    impl CountingTask {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                flags: RunFlags::standalone(),
                steps: 0,
                fail_at,
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl PipelineTask for CountingTask {
        fn name(&self) -> String {
            "counting".to_string()
        }

        fn flags(&self) -> &RunFlags {
            &self.flags
        }

        fn step(&mut self) -> Result<()> {
            self.steps += 1;
            if Some(self.steps) == self.fail_at {
                return Err(PipelineError::Processing("boom".into()));
            }
            if self.steps == 5 {
                self.flags.stop(StopScope::Local);
            }
            Ok(())
        }

        fn stop(&mut self, scope: StopScope) {
            self.flags.stop(scope);
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_runs_until_flag_clears() {
        let mut task = CountingTask::new(None);
        assert!(run_task(&mut task).is_none());
        assert_eq!(task.steps, 5);
        assert_eq!(task.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_ends_loop_and_still_stops() {
        let mut task = CountingTask::new(Some(2));
        let err = run_task(&mut task).unwrap();
        assert!(matches!(err, PipelineError::Processing(_)));
        assert_eq!(task.steps, 2);
        assert!(!task.flags.is_running());
        assert_eq!(task.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stopped_task_does_not_step() {
        let mut task = CountingTask::new(None);
        task.flags.stop(StopScope::All);
        run_task(&mut task);
        assert_eq!(task.steps, 0);
    }

    #[test]
    fn test_stop_runs_on_panic() {
        struct PanickingTask {
            flags: RunFlags,
            stops: Arc<AtomicUsize>,
        }

        impl PipelineTask for PanickingTask {
            fn name(&self) -> String {
                "panicking".to_string()
            }
            fn flags(&self) -> &RunFlags {
                &self.flags
            }
            fn step(&mut self) -> Result<()> {
                panic!("step panicked");
            }
            fn stop(&mut self, scope: StopScope) {
                self.flags.stop(scope);
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
        }

        let stops = Arc::new(AtomicUsize::new(0));
        let mut task = PanickingTask {
            flags: RunFlags::standalone(),
            stops: stops.clone(),
        };
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run_task(&mut task)));

        assert!(result.is_err());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
