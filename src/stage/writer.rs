//! The sink end of a pipeline.

use std::fmt;
use std::time::Instant;

use crate::buffer::PointBuffer;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::Result;
use crate::options::Options;
use crate::schema::Schema;

use super::{chunk_capacity, PointSource, Stage, StageBase, StageKind, StageState};

/// Destination for the points a [`Writer`] pulls.
pub trait PointSink {
    /// Called once before the first buffer with the schema of every buffer
    /// that follows.
    fn begin(&mut self, schema: &Schema) -> Result<()>;

    /// Consume the valid points of `buffer`. Returns the number written.
    fn write_buffer(&mut self, buffer: &PointBuffer) -> Result<usize>;

    /// Called once after the last buffer, also when nothing was written.
    fn end(&mut self) -> Result<()>;
}

/// Statistics from one [`Writer::write`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct WriteStats {
    pub points_written: u64,
    pub chunks: u64,
    pub elapsed_secs: f64,
}

impl fmt::Display for WriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Written: {}, Chunks: {}, Time: {:.3}s",
            self.points_written, self.chunks, self.elapsed_secs
        )
    }
}

/// Writer stage: drives an upstream source into a [`PointSink`].
pub struct Writer<S: PointSink> {
    base: StageBase,
    upstream: Box<dyn PointSource>,
    sink: S,
    chunk_size: usize,
}

impl<S: PointSink> Writer<S> {
    /// Options: `chunk_size` (points per pull).
    pub fn new(upstream: Box<dyn PointSource>, sink: S, options: Options) -> Self {
        Self {
            base: StageBase::new(options),
            upstream,
            sink,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Pull points from upstream until it is exhausted or `limit` points
    /// have been written.
    pub fn write(&mut self, limit: Option<u64>) -> Result<WriteStats> {
        self.initialize()?;
        let schema = self.upstream.schema().clone();
        let capacity = chunk_capacity(self.chunk_size, self.upstream.point_count());
        let mut buffer = PointBuffer::new(&schema, capacity)?;
        self.base.set_state(StageState::Executing);

        let start = Instant::now();
        let mut stats = WriteStats::default();

        self.sink.begin(&schema)?;
        {
            let mut iter = self.upstream.create_sequential_iterator()?;
            loop {
                let want = match limit {
                    Some(limit) => {
                        let left = limit - stats.points_written;
                        if left == 0 {
                            break;
                        }
                        left.min(self.chunk_size as u64) as usize
                    }
                    None => self.chunk_size,
                };
                let n = iter.read_up_to(&mut buffer, want)?;
                if n == 0 {
                    break;
                }
                let written = self.sink.write_buffer(&buffer)?;
                stats.points_written += written as u64;
                stats.chunks += 1;
                log::debug!("{}: chunk {} wrote {} points", self.name(), stats.chunks, written);
            }
        }
        self.sink.end()?;

        stats.elapsed_secs = start.elapsed().as_secs_f64();
        self.base.set_state(StageState::Done);
        log::info!("{}: {}", self.name(), stats);
        Ok(stats)
    }
}

impl<S: PointSink> Stage for Writer<S> {
    fn name(&self) -> &'static str {
        "writer"
    }

    fn kind(&self) -> StageKind {
        StageKind::Writer
    }

    fn base(&self) -> &StageBase {
        &self.base
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.add("chunk_size", DEFAULT_CHUNK_SIZE, "points pulled per read");
        options
    }

    fn initialize(&mut self) -> Result<()> {
        if self.base.is_initialized() {
            return Ok(());
        }
        self.upstream.initialize()?;
        let chunk_size: usize = self.resolved_options().value("chunk_size")?;
        if chunk_size == 0 {
            return Err(crate::error::PipelineError::InvalidOption {
                name: "chunk_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        self.chunk_size = chunk_size;

        self.base.set_schema(self.upstream.schema().clone());
        self.base.set_point_count(self.upstream.point_count());
        self.base.set_bounds(self.upstream.bounds().clone());
        self.base.set_state(StageState::Initialized);
        Ok(())
    }
}
