//! Worker: ingress queue to reordering sink

use super::flags::{RunFlags, StopScope};
use super::queue::IngressReceiver;
use super::sink::SinkWriter;
use super::task::PipelineTask;
use crate::analysis::FrameProcessor;
use crate::error::Result;
use crate::types::{Frame, TaggedUnit};
use std::sync::Arc;

/// Pulls tagged frames, processes them and pushes results to the sink
///
/// The sequence number travels with the result unchanged. A processing error
/// drops the unit and ends this worker; siblings keep running.
pub struct Worker {
    kind: String,
    index: usize,
    input: IngressReceiver<TaggedUnit<Frame>>,
    output: SinkWriter<Frame>,
    processor: Arc<dyn FrameProcessor>,
    flags: RunFlags,
    processed: u64,
}

impl Worker {
    pub fn new(
        kind: impl Into<String>,
        index: usize,
        input: IngressReceiver<TaggedUnit<Frame>>,
        output: SinkWriter<Frame>,
        processor: Arc<dyn FrameProcessor>,
        flags: RunFlags,
    ) -> Self {
        Self {
            kind: kind.into(),
            index,
            input,
            output,
            processor,
            flags,
            processed: 0,
        }
    }

    /// Process one unit, keeping its sequence number
    pub fn process(&self, unit: TaggedUnit<Frame>) -> Result<TaggedUnit<Frame>> {
        let sequence = unit.sequence;
        unit.try_map(|frame| self.processor.process(frame))
            .map_err(|e| e.with_context(format!("sequence {}", sequence)))
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }
}

impl PipelineTask for Worker {
    fn name(&self) -> String {
        format!("worker:{}#{}", self.kind, self.index)
    }

    fn flags(&self) -> &RunFlags {
        &self.flags
    }

    fn step(&mut self) -> Result<()> {
        let unit = self.input.get(&self.flags)?;
        let result = self.process(unit)?;
        tracing::trace!(worker = self.index, sequence = result.sequence, "Frame processed");
        self.output.put_while(result, &self.flags)?;
        self.processed += 1;
        Ok(())
    }

    // The process pool is shared and closed by the pool manager
    fn stop(&mut self, scope: StopScope) {
        self.flags.stop(scope);
    }
}
