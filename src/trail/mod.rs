pub mod entry;
pub mod writer;

pub use entry::TrailEntry;
pub use writer::TrailWriter;

use crate::models::Sample;
use crate::selection::SampleConsumer;

/// Selector consumer that appends every emitted sample to the open trail.
pub struct TrailConsumer {
    writer: TrailWriter,
}

impl TrailConsumer {
    pub fn new(writer: TrailWriter) -> Self {
        Self { writer }
    }
}

impl SampleConsumer for TrailConsumer {
    fn consume(&self, sample: &Sample, is_stopped: bool) {
        self.writer.write(sample, is_stopped);
    }
}
