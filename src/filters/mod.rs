//! Filter stages.
//!
//! A filter owns one upstream [`PointSource`] and transforms the chunks it
//! pulls from it. Filters implement [`BufferFilter`]; the shared
//! [`FilterIterator`] does the pulling, so a filter only has to say what
//! happens to one chunk.

pub mod crop;
pub mod decimation;
pub mod scaling;

pub use crop::CropFilter;
pub use decimation::DecimationFilter;
pub use scaling::{ScalingFilter, ScalingMode};

use crate::buffer::PointBuffer;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::Result;
use crate::stage::{check_buffer_schema, PointSource, Stage, StageIterator};

/// A filter that maps each input point to at most one output point.
pub trait BufferFilter: PointSource {
    fn upstream(&self) -> &dyn PointSource;

    /// Append the output for the valid points of `src` to `dst`, starting at
    /// `dst.num_points()`. `first_index` is the stream position of the first
    /// point in `src`. Returns the number of points appended.
    fn process_chunk(
        &self,
        dst: &mut PointBuffer,
        src: &PointBuffer,
        first_index: u64,
    ) -> Result<usize>;
}

/// Sequential cursor over a [`BufferFilter`].
///
/// Each pull from upstream asks for no more points than `dst` still has
/// room for, so a chunk never overflows the destination.
pub struct FilterIterator<'a, F: BufferFilter + ?Sized> {
    filter: &'a F,
    upstream: Box<dyn StageIterator + 'a>,
    scratch: Option<PointBuffer>,
    upstream_index: u64,
    index: u64,
    exhausted: bool,
}

impl<'a, F: BufferFilter + ?Sized> FilterIterator<'a, F> {
    /// Fails when the filter or its upstream has not been initialized.
    pub fn new(filter: &'a F) -> Result<Self> {
        filter.base().ensure_initialized(filter.name())?;
        let upstream = filter.upstream().create_sequential_iterator()?;
        Ok(Self {
            filter,
            upstream,
            scratch: None,
            upstream_index: 0,
            index: 0,
            exhausted: false,
        })
    }
}

impl<F: BufferFilter + ?Sized> StageIterator for FilterIterator<'_, F> {
    fn read_up_to(&mut self, buffer: &mut PointBuffer, max: usize) -> Result<usize> {
        check_buffer_schema(self.filter.name(), self.filter.schema(), buffer)?;
        buffer.clear();
        let target = max.min(buffer.capacity());

        while !self.exhausted && buffer.num_points() < target {
            let room = target - buffer.num_points();
            let filter = self.filter;
            let scratch = match &mut self.scratch {
                Some(scratch) if scratch.capacity() >= room => scratch,
                slot => slot.insert(PointBuffer::new(filter.upstream().schema(), room)?),
            };

            let n = self.upstream.read_up_to(scratch, room)?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
            filter.process_chunk(buffer, scratch, self.upstream_index)?;
            self.upstream_index += n as u64;
        }

        let produced = buffer.num_points();
        self.index += produced as u64;
        Ok(produced)
    }

    fn skip(&mut self, count: u64) -> Result<u64> {
        let chunk = count.min(DEFAULT_CHUNK_SIZE as u64) as usize;
        if chunk == 0 {
            return Ok(0);
        }
        let mut discard = PointBuffer::new(self.filter.schema(), chunk)?;
        let mut skipped = 0u64;
        while skipped < count {
            let want = (count - skipped).min(chunk as u64) as usize;
            let n = self.read_up_to(&mut discard, want)?;
            if n == 0 {
                break;
            }
            skipped += n as u64;
        }
        Ok(skipped)
    }

    fn at_end(&self) -> bool {
        self.exhausted || self.upstream.at_end()
    }

    fn index(&self) -> u64 {
        self.index
    }
}
