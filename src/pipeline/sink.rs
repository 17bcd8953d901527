//! Reordering sink
//!
//! Workers finish units out of order. The sink buffers completed units in a
//! bounded min-heap keyed by sequence number, and [`ReorderingSink::get`]
//! always hands out the smallest sequence currently buffered.
//!
//! Only "smallest of what is buffered" is guaranteed. If a slow worker still
//! holds sequence 5 while 6..=9 wait in the sink, the consumer receives 6
//! first. Keeping the sink capacity at or above the worker count makes this
//! rare; [`OrderedConsumer`](super::OrderedConsumer) counts it when it happens.
//!
//! # End of stream
//!
//! Workers register through [`ReorderingSink::writer`]. Once at least one
//! writer has registered and every writer has been dropped, `get` drains the
//! heap and then returns `None`.

use super::flags::RunFlags;
use super::queue::POLL_INTERVAL;
use crate::error::{PipelineError, Result};
use crate::types::TaggedUnit;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct SinkState<T> {
    heap: BinaryHeap<Reverse<TaggedUnit<T>>>,
    writers: usize,
    had_writers: bool,
    closed: bool,
}

impl<T> SinkState<T> {
    fn is_finished(&self) -> bool {
        self.closed || (self.had_writers && self.writers == 0)
    }
}

/// Bounded min-priority queue of tagged units
pub struct ReorderingSink<T> {
    state: Mutex<SinkState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> ReorderingSink<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SinkState {
                heap: BinaryHeap::with_capacity(capacity),
                writers: 0,
                had_writers: false,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a writer. The sink ends once all registered writers are dropped.
    pub fn writer(self: &Arc<Self>) -> SinkWriter<T> {
        let mut state = self.lock();
        state.writers += 1;
        state.had_writers = true;
        SinkWriter {
            sink: Arc::clone(self),
        }
    }

    /// Insert a unit, blocking while the sink is full
    pub fn put(&self, unit: TaggedUnit<T>) -> Result<()> {
        self.insert(unit, None)
    }

    /// Insert a unit, blocking while the sink is full and `flags` stay set
    pub fn put_while(&self, unit: TaggedUnit<T>, flags: &RunFlags) -> Result<()> {
        self.insert(unit, Some(flags))
    }

    fn insert(&self, unit: TaggedUnit<T>, flags: Option<&RunFlags>) -> Result<()> {
        let mut state = self.lock();
        while state.heap.len() >= self.capacity {
            if state.closed {
                return Err(PipelineError::Closed("reordering sink"));
            }
            if flags.is_some_and(|f| !f.is_running()) {
                return Err(PipelineError::Interrupted);
            }
            state = self
                .not_full
                .wait_timeout(state, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if state.closed {
            return Err(PipelineError::Closed("reordering sink"));
        }

        state.heap.push(Reverse(unit));
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the smallest buffered sequence, blocking while the sink is empty.
    ///
    /// Returns `None` at end of stream.
    pub fn get(&self) -> Option<TaggedUnit<T>> {
        let mut state = self.lock();
        loop {
            if let Some(unit) = self.pop(&mut state) {
                return Some(unit);
            }
            if state.is_finished() {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`get`](Self::get), giving up after `timeout`
    pub fn get_timeout(&self, timeout: Duration) -> Option<TaggedUnit<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(unit) = self.pop(&mut state) {
                return Some(unit);
            }
            let now = Instant::now();
            if state.is_finished() || now >= deadline {
                return None;
            }
            state = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Remove the smallest buffered sequence without blocking
    pub fn try_get(&self) -> Option<TaggedUnit<T>> {
        let mut state = self.lock();
        self.pop(&mut state)
    }

    fn pop(&self, state: &mut SinkState<T>) -> Option<TaggedUnit<T>> {
        let Reverse(unit) = state.heap.pop()?;
        self.not_full.notify_one();
        Some(unit)
    }

    /// Smallest buffered sequence, if any
    pub fn peek_sequence(&self) -> Option<u64> {
        self.lock().heap.peek().map(|r| r.0.sequence)
    }

    /// Stop accepting units. Buffered units can still be drained.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// No more units will arrive and the heap is empty
    pub fn is_finished(&self) -> bool {
        let state = self.lock();
        state.is_finished() && state.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn writer_count(&self) -> usize {
        self.lock().writers
    }
}

/// Registered handle for inserting into a [`ReorderingSink`]
///
/// Dropping the last writer ends the stream.
pub struct SinkWriter<T> {
    sink: Arc<ReorderingSink<T>>,
}

impl<T> SinkWriter<T> {
    pub fn put(&self, unit: TaggedUnit<T>) -> Result<()> {
        self.sink.put(unit)
    }

    pub fn put_while(&self, unit: TaggedUnit<T>, flags: &RunFlags) -> Result<()> {
        self.sink.put_while(unit, flags)
    }

    pub fn sink(&self) -> &Arc<ReorderingSink<T>> {
        &self.sink
    }
}

impl<T> Clone for SinkWriter<T> {
    fn clone(&self) -> Self {
        self.sink.writer()
    }
}

impl<T> Drop for SinkWriter<T> {
    fn drop(&mut self) {
        let mut state = self.sink.lock();
        state.writers = state.writers.saturating_sub(1);
        if state.writers == 0 {
            self.sink.not_empty.notify_all();
        }
    }
}
