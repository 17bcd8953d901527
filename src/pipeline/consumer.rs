//! In-order consumer over the reordering sink

use super::sink::ReorderingSink;
use crate::types::{Sequence, TaggedUnit};
use std::sync::Arc;
use std::time::Duration;

/// Delivery statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Units handed to the consumer
    pub delivered: u64,
    /// Units that arrived after a larger sequence had been delivered
    pub out_of_order: u64,
    /// Sequence numbers skipped between consecutive deliveries
    pub gaps: u64,
    /// Largest sequence delivered so far
    pub last_sequence: Option<Sequence>,
}

/// Drains a [`ReorderingSink`] and tracks how well ordering held up
///
/// Iterating yields units until the sink reaches end of stream.
pub struct OrderedConsumer<T> {
    sink: Arc<ReorderingSink<T>>,
    stats: ConsumerStats,
}

impl<T> OrderedConsumer<T> {
    pub fn new(sink: Arc<ReorderingSink<T>>) -> Self {
        Self {
            sink,
            stats: ConsumerStats::default(),
        }
    }

    /// Wait up to `timeout` for the next unit
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<TaggedUnit<T>> {
        let unit = self.sink.get_timeout(timeout)?;
        self.record(unit.sequence);
        Some(unit)
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// The sink has ended and is empty
    pub fn is_finished(&self) -> bool {
        self.sink.is_finished()
    }

    fn record(&mut self, sequence: Sequence) {
        let stats = &mut self.stats;
        stats.delivered += 1;
        match stats.last_sequence {
            None => {
                stats.gaps += sequence;
                stats.last_sequence = Some(sequence);
            }
            Some(last) if sequence < last => {
                stats.out_of_order += 1;
                tracing::warn!(sequence, last, "Unit delivered out of order");
            }
            Some(last) => {
                stats.gaps += sequence.saturating_sub(last + 1);
                stats.last_sequence = Some(sequence);
            }
        }
    }
}

impl<T> Iterator for OrderedConsumer<T> {
    type Item = TaggedUnit<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let unit = self.sink.get()?;
        self.record(unit.sequence);
        Some(unit)
    }
}
