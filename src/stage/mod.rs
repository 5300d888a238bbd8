//! Pipeline stages and the pull-based iterator protocol.
//!
//! Every node implements [`Stage`]. Readers and filters are also
//! [`PointSource`]s: they hand out iterators that fill caller-supplied
//! [`PointBuffer`]s. A filter owns exactly one upstream source and pulls
//! from it inside its own iterator, so a single `read` at the end of the
//! chain drives the whole pipeline. There is no scheduler and no
//! background work.
//!
//! # Lifecycle
//!
//! `Uninitialized -> Initialized -> Executing -> Done`. `initialize` must
//! succeed before any iterator is created and is idempotent. Only writers
//! move through `Executing` and `Done`.

pub mod writer;

use std::fmt;

use crate::bounds::Bounds;
use crate::buffer::PointBuffer;
use crate::error::{PipelineError, Result};
use crate::options::Options;
use crate::schema::Schema;

pub use writer::{PointSink, WriteStats, Writer};

/// Role of a stage in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Reader,
    Filter,
    Writer,
}

/// Lifecycle state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    #[default]
    Uninitialized,
    Initialized,
    Executing,
    Done,
}

/// Number of points a stage expects to produce.
///
/// Only a sizing hint for downstream buffers, never a guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointCount {
    Exact(u64),
    #[default]
    Unknown,
}

impl PointCount {
    pub fn exact(self) -> Option<u64> {
        match self {
            PointCount::Exact(n) => Some(n),
            PointCount::Unknown => None,
        }
    }
}

impl fmt::Display for PointCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointCount::Exact(n) => write!(f, "{}", n),
            PointCount::Unknown => f.write_str("unknown"),
        }
    }
}

/// State every stage carries: options, lifecycle, declared output schema,
/// point-count estimate and spatial extent.
#[derive(Debug, Clone, Default)]
pub struct StageBase {
    options: Options,
    state: StageState,
    schema: Schema,
    point_count: PointCount,
    bounds: Bounds,
}

impl StageBase {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[inline]
    pub fn state(&self) -> StageState {
        self.state
    }

    /// True once `initialize` has completed, whatever happened after.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state != StageState::Uninitialized
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn point_count(&self) -> PointCount {
        self.point_count
    }

    #[inline]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn set_schema(&mut self, schema: Schema) {
        self.schema = schema;
    }

    pub fn set_point_count(&mut self, count: PointCount) {
        self.point_count = count;
    }

    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    pub fn set_state(&mut self, state: StageState) {
        self.state = state;
    }

    /// Error out unless `initialize` has run.
    pub fn ensure_initialized(&self, stage: &str) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(PipelineError::Uninitialized(stage.to_string()))
        }
    }
}

/// Behavior shared by readers, filters and writers.
pub trait Stage {
    /// Short driver name, e.g. `filters.crop`.
    fn name(&self) -> &'static str;

    fn kind(&self) -> StageKind;

    fn base(&self) -> &StageBase;

    /// Defaults of the optional keys this stage recognizes. Required keys
    /// have no default and are left out.
    fn default_options(&self) -> Options;

    /// Options as given, with defaults filled in for every unset key.
    fn resolved_options(&self) -> Options {
        self.base().options().merged_with(&self.default_options())
    }

    /// Validate and apply options and establish the output schema.
    /// Calling it again after success is a no-op.
    fn initialize(&mut self) -> Result<()>;

    fn state(&self) -> StageState {
        self.base().state()
    }

    fn options(&self) -> &Options {
        self.base().options()
    }

    /// Schema of the points this stage produces.
    fn schema(&self) -> &Schema {
        self.base().schema()
    }

    fn point_count(&self) -> PointCount {
        self.base().point_count()
    }

    fn bounds(&self) -> &Bounds {
        self.base().bounds()
    }
}

/// A stage that produces points: a reader or a filter.
pub trait PointSource: Stage {
    /// Fresh cursor positioned at the first point. Cursors are independent
    /// of one another.
    fn create_sequential_iterator(&self) -> Result<Box<dyn StageIterator + '_>>;

    /// Cursor that can also seek. Only some readers support it.
    fn create_random_iterator(&self) -> Result<Box<dyn RandomIterator + '_>> {
        Err(PipelineError::Unsupported(format!(
            "{} does not support random access",
            self.name()
        )))
    }
}

/// Pull-based cursor over the points of a stage.
///
/// Not thread-safe; each cursor serves one consumer.
pub trait StageIterator {
    /// Reset `buffer` and fill it with at most `max` points (and at most
    /// its capacity). Returns the number read; 0 means end of stream.
    fn read_up_to(&mut self, buffer: &mut PointBuffer, max: usize) -> Result<usize>;

    /// Skip up to `count` points without handing them out. Returns the
    /// number actually skipped, short only at end of stream.
    fn skip(&mut self, count: u64) -> Result<u64>;

    /// Whether the stream is known to be exhausted.
    fn at_end(&self) -> bool;

    /// Number of points read or skipped so far.
    fn index(&self) -> u64;

    /// Reset `buffer` and fill it up to its capacity.
    fn read(&mut self, buffer: &mut PointBuffer) -> Result<usize> {
        let capacity = buffer.capacity();
        self.read_up_to(buffer, capacity)
    }
}

/// A cursor that can be repositioned.
pub trait RandomIterator: StageIterator {
    /// Move to `position`, clamped to the end of the stream. Returns the new
    /// position.
    fn seek(&mut self, position: u64) -> Result<u64>;
}

/// Reject buffers whose layout does not match what a stage produces.
pub(crate) fn check_buffer_schema(
    stage: &str,
    schema: &Schema,
    buffer: &PointBuffer,
) -> Result<()> {
    if !buffer.schema().is_layout_compatible(schema) {
        return Err(PipelineError::Schema(format!(
            "buffer layout does not match the schema produced by {}",
            stage
        )));
    }
    Ok(())
}

/// Capacity for a buffer that pulls `chunk_size` points at a time from a
/// source expecting `count` points. The estimate only ever shrinks the
/// chunk, never below one point.
pub(crate) fn chunk_capacity(chunk_size: usize, count: PointCount) -> usize {
    let capped = match count.exact() {
        Some(n) => usize::try_from(n).map_or(chunk_size, |n| n.min(chunk_size)),
        None => chunk_size,
    };
    capped.max(1)
}

/// Drain a source into a single buffer that grows as needed.
pub fn collect_points(source: &dyn PointSource, chunk_size: usize) -> Result<PointBuffer> {
    let chunk_size = chunk_capacity(chunk_size, source.point_count());
    let mut iter = source.create_sequential_iterator()?;
    let mut chunk = PointBuffer::new(source.schema(), chunk_size)?;
    let mut all = PointBuffer::new(source.schema(), chunk_size)?;

    loop {
        let n = iter.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let start = all.num_points();
        if all.remaining_capacity() < n {
            let grown = (all.capacity() * 2).max(start + n);
            all.resize(grown)?;
        }
        all.copy_points_fast(start, 0, &chunk, n)?;
        all.set_num_points(start + n)?;
    }
    log::debug!("{}: collected {} points", source.name(), all.num_points());
    Ok(all)
}
