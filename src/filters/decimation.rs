//! Keep every n-th point.

use crate::buffer::PointBuffer;
use crate::error::{PipelineError, Result};
use crate::options::Options;
use crate::stage::{
    PointCount, PointSource, Stage, StageBase, StageIterator, StageKind, StageState,
};

use super::{BufferFilter, FilterIterator};

/// Keeps the points at stream positions `offset`, `offset + step`,
/// `offset + 2 * step`, ...
pub struct DecimationFilter {
    base: StageBase,
    upstream: Box<dyn PointSource>,
    step: u64,
    offset: u64,
}

impl DecimationFilter {
    /// Options: `step` (default 1, at least 1) and `offset` (default 0).
    pub fn new(upstream: Box<dyn PointSource>, options: Options) -> Self {
        Self {
            base: StageBase::new(options),
            upstream,
            step: 1,
            offset: 0,
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    fn keeps(&self, position: u64) -> bool {
        position >= self.offset && (position - self.offset) % self.step == 0
    }

    /// Number of points kept out of a stream of `total`.
    fn kept_of(&self, total: u64) -> u64 {
        if total <= self.offset {
            0
        } else {
            (total - self.offset).div_ceil(self.step)
        }
    }
}

impl Stage for DecimationFilter {
    fn name(&self) -> &'static str {
        "filters.decimation"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn base(&self) -> &StageBase {
        &self.base
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.add("step", 1, "keep every step-th point");
        options.add("offset", 0, "position of the first kept point");
        options
    }

    fn initialize(&mut self) -> Result<()> {
        if self.base.is_initialized() {
            return Ok(());
        }
        self.upstream.initialize()?;

        let options = self.resolved_options();
        let step: u64 = options.value("step")?;
        if step == 0 {
            return Err(PipelineError::InvalidOption {
                name: "step".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        self.step = step;
        self.offset = options.value("offset")?;

        let count = match self.upstream.point_count() {
            PointCount::Exact(n) => PointCount::Exact(self.kept_of(n)),
            PointCount::Unknown => PointCount::Unknown,
        };
        self.base.set_schema(self.upstream.schema().clone());
        self.base.set_point_count(count);
        self.base.set_bounds(self.upstream.bounds().clone());
        self.base.set_state(StageState::Initialized);
        Ok(())
    }
}

impl PointSource for DecimationFilter {
    fn create_sequential_iterator(&self) -> Result<Box<dyn StageIterator + '_>> {
        Ok(Box::new(FilterIterator::new(self)?))
    }
}

impl BufferFilter for DecimationFilter {
    fn upstream(&self) -> &dyn PointSource {
        self.upstream.as_ref()
    }

    fn process_chunk(
        &self,
        dst: &mut PointBuffer,
        src: &PointBuffer,
        first_index: u64,
    ) -> Result<usize> {
        let mut added = 0;
        for i in 0..src.num_points() {
            if !self.keeps(first_index + i as u64) {
                continue;
            }
            if dst.is_full() {
                return Err(PipelineError::BufferTooSmall(format!(
                    "decimation destination holds {} points",
                    dst.capacity()
                )));
            }
            let at = dst.num_points();
            dst.copy_point_fast(at, i, src)?;
            dst.set_num_points(at + 1)?;
            added += 1;
        }
        Ok(added)
    }
}
