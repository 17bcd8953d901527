//! Pool manager: registry and lifecycle of task threads
//!
//! The manager keeps one entry per task kind:
//!
//! ```text
//! kind ──► { desired_count, global flag, [handle 0, handle 1, ...] }
//!                               │
//!                               └─ shared by every instance of the kind
//! ```
//!
//! - [`PoolManager::add`] creates instances through a spawner closure and can
//!   be called repeatedly to scale a kind up
//! - [`PoolManager::start`] starts every instance that has not run yet
//! - [`PoolManager::stop`] clears the kind's global flag and signals each
//!   instance's local flag as well
//! - [`PoolManager::shutdown`] stops everything, joins the threads and closes
//!   the attached process pool
//!
//! Unknown kinds are logged and ignored.

use super::flags::{RunFlags, StopScope};
use super::task::{run_task, PipelineTask};
use crate::error::Result;
use crate::pool::ProcessPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Which kinds an operation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Kind(String),
}

impl Target {
    pub fn kind(name: impl Into<String>) -> Self {
        Target::Kind(name.into())
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Target::All => true,
            Target::Kind(kind) => kind == name,
        }
    }
}

enum TaskState {
    /// Created but not started
    Ready(Box<dyn PipelineTask>),
    Running(JoinHandle<()>),
    /// Joined, or stopped before it ever ran
    Finished,
}

struct TaskHandle {
    index: usize,
    flags: RunFlags,
    state: TaskState,
}

impl TaskHandle {
    fn is_running(&self) -> bool {
        matches!(&self.state, TaskState::Running(handle) if !handle.is_finished())
    }

    /// Signal the instance, stopping it directly if it never started
    fn signal(&mut self, scope: StopScope) {
        self.flags.stop(StopScope::Local);
        if let TaskState::Ready(task) = &mut self.state {
            task.stop(scope);
            self.state = TaskState::Finished;
        }
    }
}

struct KindEntry {
    name: String,
    desired_count: usize,
    global: Arc<AtomicBool>,
    handles: Vec<TaskHandle>,
}

/// Cloneable handle that globally stops every kind known when it was created
///
/// Safe to move into a signal handler. Also puts the attached process pool
/// into shutdown so no child is respawned after the stop.
#[derive(Clone)]
pub struct StopHandle {
    globals: Vec<(String, Arc<AtomicBool>)>,
    process_pool: Option<Arc<ProcessPool>>,
}

impl StopHandle {
    pub fn stop_all(&self) {
        for (name, global) in &self.globals {
            tracing::info!(kind = %name, "Stop requested");
            global.store(false, Ordering::Relaxed);
        }
        if let Some(pool) = &self.process_pool {
            pool.begin_shutdown();
        }
    }
}

/// Registry of task kinds and their running instances
#[derive(Default)]
pub struct PoolManager {
    kinds: Vec<KindEntry>,
    process_pool: Option<Arc<ProcessPool>>,
    /// Stack size for task threads; `None` keeps the platform default
    stack_size: Option<usize>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `stack_size` bytes for threads started from now on
    pub fn with_stack_size(mut self, stack_size: Option<usize>) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }

    fn entry(&self, kind: &str) -> Option<&KindEntry> {
        self.kinds.iter().find(|e| e.name == kind)
    }

    fn entry_mut(&mut self, kind: &str) -> Option<&mut KindEntry> {
        self.kinds.iter_mut().find(|e| e.name == kind)
    }

    fn entries_mut<'a>(
        &'a mut self,
        target: &'a Target,
    ) -> impl Iterator<Item = &'a mut KindEntry> + 'a {
        self.kinds.iter_mut().filter(move |e| target.matches(&e.name))
    }

    fn is_known(&self, target: &Target, operation: &str) -> bool {
        match target {
            Target::All => true,
            Target::Kind(kind) if self.entry(kind).is_some() => true,
            Target::Kind(kind) => {
                tracing::error!(kind = %kind, operation, "Unknown task kind");
                false
            }
        }
    }

    /// Create `count` instances of `kind` with `spawner`.
    ///
    /// The spawner receives the instance index and the instance's flags. A
    /// new kind gets a fresh global flag; an existing kind grows by `count`.
    /// If the spawner fails, instances created before the failure stay
    /// registered.
    pub fn add<F>(&mut self, kind: &str, count: usize, mut spawner: F) -> Result<()>
    where
        F: FnMut(usize, RunFlags) -> Result<Box<dyn PipelineTask>>,
    {
        if self.entry(kind).is_none() {
            self.kinds.push(KindEntry {
                name: kind.to_string(),
                desired_count: 0,
                global: Arc::new(AtomicBool::new(true)),
                handles: Vec::new(),
            });
        }
        let Some(entry) = self.entry_mut(kind) else {
            return Ok(());
        };

        for _ in 0..count {
            let index = entry.handles.len();
            let flags = RunFlags::new(entry.global.clone());
            let task = spawner(index, flags.clone())?;
            entry.handles.push(TaskHandle {
                index,
                flags,
                state: TaskState::Ready(task),
            });
            entry.desired_count += 1;
        }

        tracing::info!(
            kind,
            added = count,
            desired = entry.desired_count,
            "Registered task instances"
        );
        Ok(())
    }

    /// Start every registered instance that has not started yet.
    ///
    /// Returns the number of threads started.
    pub fn start(&mut self, target: &Target) -> usize {
        if !self.is_known(target, "start") {
            return 0;
        }

        let stack_size = self.stack_size;
        let mut started = 0;
        for entry in self.entries_mut(target) {
            for handle in &mut entry.handles {
                let mut task = match std::mem::replace(&mut handle.state, TaskState::Finished) {
                    TaskState::Ready(task) => task,
                    other => {
                        handle.state = other;
                        continue;
                    }
                };

                let mut builder =
                    std::thread::Builder::new().name(format!("{}#{}", entry.name, handle.index));
                if let Some(size) = stack_size {
                    builder = builder.stack_size(size);
                }
                let spawned = builder.spawn(move || {
                    run_task(task.as_mut());
                });
                match spawned {
                    Ok(join) => {
                        handle.state = TaskState::Running(join);
                        started += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            kind = %entry.name,
                            instance = handle.index,
                            error = %e,
                            "Failed to spawn task thread"
                        );
                    }
                }
            }
            tracing::debug!(kind = %entry.name, "Kind started");
        }

        started
    }

    /// Globally stop the target kinds and signal each of their instances
    pub fn stop(&mut self, target: &Target) {
        if !self.is_known(target, "stop") {
            return;
        }

        if *target == Target::All {
            if let Some(pool) = &self.process_pool {
                pool.begin_shutdown();
            }
        }
        for entry in self.entries_mut(target) {
            tracing::info!(kind = %entry.name, "Stopping all instances");
            entry.global.store(false, Ordering::Relaxed);
            for handle in &mut entry.handles {
                handle.signal(StopScope::All);
            }
        }
    }

    /// Locally stop one instance; its siblings keep running
    pub fn stop_instance(&mut self, kind: &str, index: usize) {
        let Some(entry) = self.entry_mut(kind) else {
            tracing::error!(kind, operation = "stop_instance", "Unknown task kind");
            return;
        };
        match entry.handles.get_mut(index) {
            Some(handle) => {
                tracing::info!(kind, instance = index, "Stopping instance");
                handle.signal(StopScope::Local);
            }
            None => tracing::error!(kind, instance = index, "No such task instance"),
        }
    }

    /// Wait for the target's threads to finish, up to `timeout`.
    ///
    /// Returns `true` if every thread was joined.
    pub fn join(&mut self, target: &Target, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let mut pending = 0;
            for entry in self.entries_mut(target) {
                for handle in &mut entry.handles {
                    let finished =
                        matches!(&handle.state, TaskState::Running(join) if join.is_finished());
                    if finished {
                        if let TaskState::Running(join) =
                            std::mem::replace(&mut handle.state, TaskState::Finished)
                        {
                            if join.join().is_err() {
                                tracing::error!(
                                    kind = %entry.name,
                                    instance = handle.index,
                                    "Task thread panicked"
                                );
                            }
                        }
                    } else if matches!(handle.state, TaskState::Running(_)) {
                        pending += 1;
                    }
                }
            }

            if pending == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(pending, "Timed out waiting for tasks to finish");
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Number of instances of `kind` whose thread is still running
    pub fn running_count(&self, kind: &str) -> usize {
        self.entry(kind)
            .map(|e| e.handles.iter().filter(|h| h.is_running()).count())
            .unwrap_or(0)
    }

    /// Number of instances registered for `kind`
    pub fn desired_count(&self, kind: &str) -> usize {
        self.entry(kind).map(|e| e.desired_count).unwrap_or(0)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            globals: self
                .kinds
                .iter()
                .map(|e| (e.name.clone(), e.global.clone()))
                .collect(),
            process_pool: self.process_pool.clone(),
        }
    }

    /// Hand the process pool to the manager; it is closed on shutdown
    pub fn attach_process_pool(&mut self, pool: Arc<ProcessPool>) {
        self.process_pool = Some(pool);
    }

    pub fn process_pool(&self) -> Option<&Arc<ProcessPool>> {
        self.process_pool.as_ref()
    }

    /// Stop every kind, join the threads, then close the process pool
    pub fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        tracing::info!("Shutting down pool manager");
        self.stop(&Target::All);
        if !self.join(&Target::All, timeout) {
            tracing::warn!("Some tasks did not finish before the shutdown timeout");
        }

        match &self.process_pool {
            Some(pool) => pool.close(),
            None => Ok(()),
        }
    }
}
