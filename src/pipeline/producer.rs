//! Producer: data source to ingress queue

use super::flags::{RunFlags, StopScope};
use super::queue::IngressSender;
use super::task::PipelineTask;
use crate::error::{PipelineError, Result};
use crate::source::DataSource;
use crate::types::{Frame, Sequence, TaggedUnit};

/// Pulls frames from a [`DataSource`], numbers them and queues them for workers
///
/// Sequence numbers start at 0 for each producer instance and increase by one
/// per frame, with no gaps.
pub struct Producer {
    kind: String,
    index: usize,
    source: Box<dyn DataSource>,
    queue: IngressSender<TaggedUnit<Frame>>,
    flags: RunFlags,
    next_sequence: Sequence,
    released: bool,
}

impl Producer {
    pub fn new(
        kind: impl Into<String>,
        index: usize,
        source: Box<dyn DataSource>,
        queue: IngressSender<TaggedUnit<Frame>>,
        flags: RunFlags,
    ) -> Self {
        Self {
            kind: kind.into(),
            index,
            source,
            queue,
            flags,
            next_sequence: 0,
            released: false,
        }
    }

    /// Tag a raw frame with the next sequence number
    pub fn process(&mut self, raw: Frame) -> TaggedUnit<Frame> {
        let unit = TaggedUnit::new(self.next_sequence, raw);
        self.next_sequence += 1;
        unit
    }

    /// Sequence number the next frame will receive
    pub fn next_sequence(&self) -> Sequence {
        self.next_sequence
    }
}

impl PipelineTask for Producer {
    fn name(&self) -> String {
        format!("producer:{}#{}", self.kind, self.index)
    }

    fn flags(&self) -> &RunFlags {
        &self.flags
    }

    fn step(&mut self) -> Result<()> {
        let frame = self.source.acquire()?.ok_or_else(|| {
            PipelineError::Acquisition(format!("{} returned no frame", self.source.describe()))
        })?;

        let unit = self.process(frame);
        tracing::trace!(producer = self.index, sequence = unit.sequence, "Frame acquired");
        self.queue.put(unit, &self.flags)
    }

    fn stop(&mut self, scope: StopScope) {
        self.flags.stop(scope);
        if !self.released {
            self.source.release();
            self.released = true;
            tracing::debug!(
                producer = %self.name(),
                frames = self.next_sequence,
                "Producer released its data source"
            );
        }
    }
}
