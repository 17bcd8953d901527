//! Process pool for CPU-bound frame analysis.
//!
//! Workers that delegate their analysis hand each frame to a fixed set of
//! child processes. The children are this same binary re-executed with
//! `--internal-worker`, talking over stdin/stdout.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  worker threads (many)                              │
//! │    apply(analysis, frame)                           │
//! │         │                                           │
//! │         ▼                                           │
//! │  idle slot channel ──► slot 0 ──► child process 0   │
//! │                    ──► slot 1 ──► child process 1   │
//! │                    ──► ...                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! A call takes an idle slot index, runs the request on that slot's child and
//! returns the index when done, so at most `process_count` analyses run at
//! once. A child that dies mid-request is respawned on the slot's next use;
//! the request it was running fails.
//!
//! # Lifecycle
//!
//! - [`ProcessPool::new`] only records the configuration
//! - [`ProcessPool::start`] spawns the children once; later calls keep them
//! - [`ProcessPool::begin_shutdown`] refuses new requests and stops
//!   respawning; requests already running finish
//! - [`ProcessPool::close`] stops every child; repeated calls are no-ops

mod proc;
pub mod protocol;
mod worker_main;

pub use proc::INTERNAL_WORKER_FLAG;
pub use worker_main::run_worker_main;

use crate::analysis::Analysis;
use crate::config::ProcessPoolConfig;
use crate::error::{PipelineError, Result};
use crate::types::Frame;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use proc::PoolProcess;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

/// How often a caller waiting for an idle process re-checks for close
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

const POOL_NAME: &str = "process pool";

/// Counters for pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Analyses that returned a frame
    pub applied: u64,
    /// Analyses that failed (analysis error or child crash)
    pub failed: u64,
    /// Children respawned after a crash
    pub restarts: u64,
}

/// One child process and its bookkeeping
struct Slot {
    id: usize,
    program: PathBuf,
    /// None after a crash or after close
    proc: Option<PoolProcess>,
}

impl Slot {
    fn spawn(id: usize, program: PathBuf) -> Result<Self> {
        let mut slot = Self {
            id,
            program,
            proc: None,
        };
        slot.respawn()?;
        Ok(slot)
    }

    fn respawn(&mut self) -> Result<()> {
        let mut proc = PoolProcess::spawn(&self.program)?;
        proc.wait_for_ready()
            .map_err(|e| e.with_context(format!("Pool process {} failed to start", self.id)))?;
        tracing::debug!(slot = self.id, pid = proc.pid(), "Pool process ready");
        self.proc = Some(proc);
        Ok(())
    }

    fn apply(&mut self, analysis: &Analysis, frame: &Frame) -> Result<Frame> {
        let proc = self.proc.as_mut().ok_or_else(|| {
            PipelineError::ProcessPool(format!("Pool process {} not available", self.id))
        })?;
        let pid = proc.pid();

        match proc.apply(analysis, frame) {
            Ok(Some(result)) => result,
            Ok(None) => {
                self.discard(pid);
                Err(PipelineError::ProcessPool(format!(
                    "Pool process {} (pid {}) exited during request",
                    self.id, pid
                )))
            }
            Err(e) => {
                self.discard(pid);
                Err(e.with_context(format!("Pool process {} (pid {})", self.id, pid)))
            }
        }
    }

    /// Drop a broken child so the next request respawns it.
    fn discard(&mut self, pid: u32) {
        tracing::warn!(slot = self.id, pid, "Pool process died unexpectedly");
        if let Some(mut proc) = self.proc.take() {
            let _ = proc.kill();
        }
    }
}

/// Returns a slot index to the idle set when the request finishes
struct SlotLease<'a> {
    idle: &'a Sender<usize>,
    index: usize,
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        let _ = self.idle.send(self.index);
    }
}

/// Fixed-size pool of analysis child processes
pub struct ProcessPool {
    config: ProcessPoolConfig,
    slots: OnceLock<Vec<Mutex<Slot>>>,
    /// Serializes `start()` so only one caller spawns children
    start_lock: Mutex<()>,
    idle_tx: Sender<usize>,
    idle_rx: Receiver<usize>,
    closed: AtomicBool,
    shutting_down: AtomicBool,
    applied: AtomicU64,
    failed: AtomicU64,
    restarts: AtomicU64,
}

impl ProcessPool {
    /// Create an unstarted pool
    pub fn new(config: ProcessPoolConfig) -> Self {
        let (idle_tx, idle_rx) = bounded(config.process_count.max(1));
        Self {
            config,
            slots: OnceLock::new(),
            start_lock: Mutex::new(()),
            idle_tx,
            idle_rx,
            closed: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            applied: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    /// Spawn every child process and wait until each reports ready.
    ///
    /// Calling `start` on a started pool keeps the existing processes.
    pub fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(PipelineError::Closed(POOL_NAME));
        }

        let _guard = self.start_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.slots.get().is_some() {
            tracing::debug!("Process pool already started, keeping existing processes");
            return Ok(());
        }
        if self.config.process_count == 0 {
            return Err(PipelineError::Config(
                "process pool needs at least one process".to_string(),
            ));
        }

        let program = self.program()?;
        tracing::info!(
            process_count = self.config.process_count,
            program = %program.display(),
            "Starting process pool"
        );

        // Partially started pools are dropped here; PoolProcess kills its child on drop
        let slots = (0..self.config.process_count)
            .map(|id| Slot::spawn(id, program.clone()).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;

        if self.slots.set(slots).is_err() {
            return Err(PipelineError::ProcessPool(
                "pool initialized concurrently".to_string(),
            ));
        }
        for index in 0..self.config.process_count {
            self.idle_tx
                .send(index)
                .map_err(|_| PipelineError::ProcessPool("idle channel closed".to_string()))?;
        }

        tracing::info!("Process pool ready");
        Ok(())
    }

    /// Run `analysis` on `frame` in an idle child, blocking until one is free.
    ///
    /// After [`begin_shutdown`](Self::begin_shutdown) new requests fail with
    /// `Interrupted`, as does a request whose child dies during shutdown.
    pub fn apply(&self, analysis: &Analysis, frame: Frame) -> Result<Frame> {
        if self.is_closed() {
            return Err(PipelineError::Closed(POOL_NAME));
        }
        if self.is_shutting_down() {
            return Err(PipelineError::Interrupted);
        }
        let slots = self
            .slots
            .get()
            .ok_or(PipelineError::NotInitialized(POOL_NAME))?;

        let lease = SlotLease {
            idle: &self.idle_tx,
            index: self.next_idle()?,
        };
        let mut slot = slots[lease.index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // close() may have run while we waited for the slot
        if self.is_closed() {
            return Err(PipelineError::Closed(POOL_NAME));
        }
        if self.is_shutting_down() {
            return Err(PipelineError::Interrupted);
        }
        if slot.proc.is_none() {
            tracing::info!(slot = slot.id, "Respawning pool process");
            slot.respawn()?;
            self.restarts.fetch_add(1, Ordering::Relaxed);
        }

        let result = slot.apply(analysis, &frame);
        match &result {
            Ok(_) => self.applied.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };

        // A child lost while stopping is part of the shutdown, not a fault
        if result.is_err() && slot.proc.is_none() && self.is_shutting_down() {
            tracing::info!(slot = slot.id, "Pool process lost during shutdown, not respawning");
            return Err(PipelineError::Interrupted);
        }
        result
    }

    /// Refuse new requests and stop respawning children.
    ///
    /// Requests already running in a child finish normally. [`close`](Self::close)
    /// still stops the children afterwards.
    pub fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::info!("Process pool shutting down, refusing new requests");
        }
    }

    /// Stop every child process.
    ///
    /// The first call sends each child the exit request and waits up to the
    /// configured stop timeout before killing it. Later calls do nothing.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(slots) = self.slots.get() else {
            tracing::debug!("Closing process pool that was never started");
            return Ok(());
        };

        let timeout = self.config.stop_timeout();
        let mut first_error = None;
        for slot in slots {
            // Waits for an in-flight request on this slot to finish
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(mut proc) = slot.proc.take() {
                if let Err(e) = proc.stop(timeout) {
                    tracing::warn!(slot = slot.id, error = %e, "Failed to stop pool process");
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::info!(stats = ?self.stats(), "Process pool closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn process_count(&self) -> usize {
        self.config.process_count
    }

    pub fn is_started(&self) -> bool {
        self.slots.get().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Child pid per slot, `None` where the child is gone.
    ///
    /// Waits for in-flight requests on each slot.
    pub fn process_ids(&self) -> Vec<Option<u32>> {
        let Some(slots) = self.slots.get() else {
            return Vec::new();
        };
        slots
            .iter()
            .map(|slot| {
                let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                slot.proc.as_ref().map(PoolProcess::pid)
            })
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }

    fn program(&self) -> Result<PathBuf> {
        match &self.config.program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe().map_err(|e| {
                PipelineError::ProcessPool(format!("Cannot locate current executable: {}", e))
            }),
        }
    }

    fn next_idle(&self) -> Result<usize> {
        loop {
            if self.is_closed() {
                return Err(PipelineError::Closed(POOL_NAME));
            }
            if self.is_shutting_down() {
                return Err(PipelineError::Interrupted);
            }
            match self.idle_rx.recv_timeout(IDLE_POLL_INTERVAL) {
                Ok(index) => return Ok(index),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PipelineError::Closed(POOL_NAME))
                }
            }
        }
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
