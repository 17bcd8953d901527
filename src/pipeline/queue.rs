//! Bounded ingress queue between producers and workers
//!
//! A thin layer over a bounded crossbeam channel. Blocking operations wake up
//! every [`POLL_INTERVAL`] to check the caller's [`RunFlags`], so a stopped
//! task never hangs on a full or empty queue.

use super::flags::RunFlags;
use crate::error::{PipelineError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::time::Duration;

/// How often blocked queue operations re-check the running flags
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Create a bounded ingress queue
pub fn ingress_queue<T>(capacity: usize) -> (IngressSender<T>, IngressReceiver<T>) {
    let (tx, rx) = bounded(capacity);
    (IngressSender { tx }, IngressReceiver { rx })
}

/// Producer end of the ingress queue
///
/// Workers see end-of-stream once every sender has been dropped.
pub struct IngressSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for IngressSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> IngressSender<T> {
    /// Push an item, blocking while the queue is full.
    ///
    /// Fails with `Interrupted` if `flags` are cleared while waiting.
    pub fn put(&self, item: T, flags: &RunFlags) -> Result<()> {
        let mut item = item;
        loop {
            match self.tx.send_timeout(item, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => {
                    if !flags.is_running() {
                        return Err(PipelineError::Interrupted);
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(PipelineError::Closed("ingress queue"))
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}

/// Worker end of the ingress queue
pub struct IngressReceiver<T> {
    rx: Receiver<T>,
}

impl<T> Clone for IngressReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> IngressReceiver<T> {
    /// Pull the next item in FIFO order, blocking while the queue is empty.
    ///
    /// Fails with `Interrupted` if `flags` are cleared while waiting and with
    /// `EndOfStream` once the queue is drained and every sender is gone.
    pub fn get(&self, flags: &RunFlags) -> Result<T> {
        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Timeout) => {
                    if !flags.is_running() {
                        return Err(PipelineError::Interrupted);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PipelineError::EndOfStream("ingress queue"))
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::flags::StopScope;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = ingress_queue(4);
        let flags = RunFlags::standalone();
        for i in 0..4 {
            tx.put(i, &flags).unwrap();
        }
        assert!(tx.is_full());
        let items: Vec<_> = (0..4).map(|_| rx.get(&flags).unwrap()).collect();
        assert_eq!(items, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_full_queue_blocks_until_drained() {
        let (tx, rx) = ingress_queue(2);
        let flags = RunFlags::standalone();
        let pushed = Arc::new(AtomicUsize::new(0));

        let producer = {
            let flags = flags.clone();
            let pushed = pushed.clone();
            thread::spawn(move || {
                for i in 0..3 {
                    tx.put(i, &flags).unwrap();
                    pushed.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert_eq!(pushed.load(Ordering::SeqCst), 2);
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.get(&flags).unwrap(), 0);
        producer.join().unwrap();
        assert_eq!(pushed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stop_interrupts_blocked_put() {
        let (tx, _rx) = ingress_queue(1);
        let flags = RunFlags::standalone();
        tx.put(1, &flags).unwrap();

        let stopper = flags.clone();
        let handle = thread::spawn(move || tx.put(2, &flags));
        thread::sleep(Duration::from_millis(50));
        stopper.stop(StopScope::Local);

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Interrupted)));
    }

    #[test]
    fn test_stop_interrupts_blocked_get() {
        let (_tx, rx) = ingress_queue::<u32>(1);
        let flags = RunFlags::standalone();
        flags.stop(StopScope::All);
        assert!(matches!(rx.get(&flags), Err(PipelineError::Interrupted)));
    }

    #[test]
    fn test_end_of_stream_after_senders_drop() {
        let (tx, rx) = ingress_queue(4);
        let flags = RunFlags::standalone();
        tx.put(7, &flags).unwrap();
        drop(tx);

        // Buffered items are still delivered before end-of-stream
        assert_eq!(rx.get(&flags).unwrap(), 7);
        assert!(matches!(rx.get(&flags), Err(PipelineError::EndOfStream(_))));
    }
}
