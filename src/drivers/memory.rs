//! In-memory reader and writer.

use crate::buffer::PointBuffer;
use crate::error::Result;
use crate::options::Options;
use crate::schema::Schema;
use crate::stage::{
    check_buffer_schema, PointCount, PointSink, PointSource, RandomIterator, Stage, StageBase,
    StageIterator, StageKind, StageState,
};

/// Serves the points of an owned buffer.
#[derive(Debug)]
pub struct MemoryReader {
    base: StageBase,
    points: PointBuffer,
}

impl MemoryReader {
    pub fn new(points: PointBuffer) -> Self {
        Self {
            base: StageBase::new(Options::none()),
            points,
        }
    }

    pub fn points(&self) -> &PointBuffer {
        &self.points
    }
}

impl Stage for MemoryReader {
    fn name(&self) -> &'static str {
        "readers.memory"
    }

    fn kind(&self) -> StageKind {
        StageKind::Reader
    }

    fn base(&self) -> &StageBase {
        &self.base
    }

    fn default_options(&self) -> Options {
        Options::none()
    }

    fn initialize(&mut self) -> Result<()> {
        if self.base.is_initialized() {
            return Ok(());
        }
        self.base.set_schema(self.points.schema().clone());
        self.base
            .set_point_count(PointCount::Exact(self.points.num_points() as u64));
        if let Some(bounds) = self.points.calculate_bounds()? {
            self.base.set_bounds(bounds);
        }
        self.base.set_state(StageState::Initialized);
        Ok(())
    }
}

impl PointSource for MemoryReader {
    fn create_sequential_iterator(&self) -> Result<Box<dyn StageIterator + '_>> {
        self.base.ensure_initialized(self.name())?;
        Ok(Box::new(MemoryIterator {
            reader: self,
            index: 0,
        }))
    }

    fn create_random_iterator(&self) -> Result<Box<dyn RandomIterator + '_>> {
        self.base.ensure_initialized(self.name())?;
        Ok(Box::new(MemoryIterator {
            reader: self,
            index: 0,
        }))
    }
}

struct MemoryIterator<'a> {
    reader: &'a MemoryReader,
    index: u64,
}

impl MemoryIterator<'_> {
    fn total(&self) -> u64 {
        self.reader.points.num_points() as u64
    }
}

impl StageIterator for MemoryIterator<'_> {
    fn read_up_to(&mut self, buffer: &mut PointBuffer, max: usize) -> Result<usize> {
        check_buffer_schema(self.reader.name(), self.reader.schema(), buffer)?;
        buffer.clear();

        let available = (self.total() - self.index) as usize;
        let n = max.min(buffer.capacity()).min(available);
        if n == 0 {
            return Ok(0);
        }
        buffer.copy_points_fast(0, self.index as usize, &self.reader.points, n)?;
        buffer.set_num_points(n)?;
        self.index += n as u64;
        Ok(n)
    }

    fn skip(&mut self, count: u64) -> Result<u64> {
        let skipped = count.min(self.total() - self.index);
        self.index += skipped;
        Ok(skipped)
    }

    fn at_end(&self) -> bool {
        self.index >= self.total()
    }

    fn index(&self) -> u64 {
        self.index
    }
}

impl RandomIterator for MemoryIterator<'_> {
    fn seek(&mut self, position: u64) -> Result<u64> {
        self.index = position.min(self.total());
        Ok(self.index)
    }
}

/// Collects every written point into one growing buffer.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    points: Option<PointBuffer>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points collected so far; `None` before the first `begin`.
    pub fn points(&self) -> Option<&PointBuffer> {
        self.points.as_ref()
    }

    pub fn into_points(self) -> Option<PointBuffer> {
        self.points
    }
}

impl PointSink for MemoryWriter {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        self.points = Some(PointBuffer::new(schema, 0)?);
        Ok(())
    }

    fn write_buffer(&mut self, buffer: &PointBuffer) -> Result<usize> {
        let points = match &mut self.points {
            Some(points) => points,
            slot => slot.insert(PointBuffer::new(buffer.schema(), 0)?),
        };
        let n = buffer.num_points();
        let start = points.num_points();
        if points.remaining_capacity() < n {
            let grown = (points.capacity() * 2).max(start + n);
            points.resize(grown)?;
        }
        points.copy_points_fast(start, 0, buffer, n)?;
        points.set_num_points(start + n)?;
        Ok(n)
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}
