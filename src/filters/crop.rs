//! Spatial crop: keep the points that fall inside a bounding box.

use crate::bounds::Bounds;
use crate::buffer::{coordinate_fields, CoordinateKind, PointBuffer};
use crate::dimension::Dimension;
use crate::error::{PipelineError, Result};
use crate::layout::SchemaLayout;
use crate::options::Options;
use crate::stage::{
    PointCount, PointSource, Stage, StageBase, StageIterator, StageKind, StageState,
};

use super::{BufferFilter, FilterIterator};

/// How a buffer stores the coordinates the crop tests.
enum Coordinates<'a> {
    /// Native f64 X/Y/Z fields.
    Float(Vec<usize>),
    /// Scaled i32 fields, each with the dimension that carries its own
    /// scale and offset.
    Scaled(Vec<(usize, &'a Dimension)>),
}

impl<'a> Coordinates<'a> {
    fn resolve(layout: &'a SchemaLayout) -> Result<Self> {
        let (kind, fields) = coordinate_fields(layout).ok_or_else(|| {
            PipelineError::Schema("crop needs X and Y coordinate dimensions".to_string())
        })?;
        if kind == CoordinateKind::Float {
            return Ok(Coordinates::Float(fields));
        }
        let mut scaled = Vec::with_capacity(fields.len());
        for field in fields {
            let entry = layout.dimension_layout(field).ok_or_else(|| {
                PipelineError::Schema(format!("field index {} missing from layout", field))
            })?;
            scaled.push((field, entry.dimension()));
        }
        Ok(Coordinates::Scaled(scaled))
    }

    #[inline]
    fn read(&self, src: &PointBuffer, point: usize, out: &mut [f64; 3]) -> Result<usize> {
        match self {
            Coordinates::Float(fields) => {
                for (slot, &field) in out.iter_mut().zip(fields) {
                    *slot = src.get::<f64>(point, field)?;
                }
                Ok(fields.len())
            }
            Coordinates::Scaled(fields) => {
                for (slot, &(field, dim)) in out.iter_mut().zip(fields) {
                    let raw = src.get::<i32>(point, field)?;
                    *slot = if dim.is_finite_precision() {
                        dim.apply_scaling(raw)
                    } else {
                        f64::from(raw)
                    };
                }
                Ok(fields.len())
            }
        }
    }
}

/// Keeps points inside a bounding box, in their original order.
///
/// 2D bounds test X and Y only. Points exactly on a face are kept.
pub struct CropFilter {
    base: StageBase,
    upstream: Box<dyn PointSource>,
    bounds: Option<Bounds>,
}

impl CropFilter {
    /// Options: `bounds` (required), e.g. `([0, 6], [0, 6], [0, 6])`.
    pub fn new(upstream: Box<dyn PointSource>, options: Options) -> Self {
        Self {
            base: StageBase::new(options),
            upstream,
            bounds: None,
        }
    }

    /// Crop to `bounds` without going through options.
    pub fn with_bounds(upstream: Box<dyn PointSource>, bounds: Bounds) -> Self {
        Self {
            base: StageBase::new(Options::none()),
            upstream,
            bounds: Some(bounds),
        }
    }

    /// The crop box, once known.
    pub fn crop_bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Append every point of `src` inside the crop box to `dst`.
    ///
    /// Points go to `dst` at its current `num_points` by raw copy, so both
    /// buffers must be layout-compatible. Running out of room in `dst` is
    /// a `BufferTooSmall` error. Returns the number of points appended.
    pub fn process_buffer(&self, dst: &mut PointBuffer, src: &PointBuffer) -> Result<usize> {
        let bounds = self
            .bounds
            .as_ref()
            .ok_or_else(|| PipelineError::Uninitialized(self.name().to_string()))?;
        let coordinates = Coordinates::resolve(src.layout())?;

        let mut point = [0.0f64; 3];
        let mut added = 0;
        for i in 0..src.num_points() {
            let n = coordinates.read(src, i, &mut point)?;
            if !bounds.contains(&point[..n]) {
                continue;
            }
            if dst.is_full() {
                return Err(PipelineError::BufferTooSmall(format!(
                    "crop destination holds {} points, source point {} does not fit",
                    dst.capacity(),
                    i
                )));
            }
            let at = dst.num_points();
            dst.copy_point_fast(at, i, src)?;
            dst.set_num_points(at + 1)?;
            added += 1;
        }

        debug_assert!(dst.num_points() <= dst.capacity());
        Ok(added)
    }
}

impl Stage for CropFilter {
    fn name(&self) -> &'static str {
        "filters.crop"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn base(&self) -> &StageBase {
        &self.base
    }

    fn default_options(&self) -> Options {
        Options::new()
    }

    fn initialize(&mut self) -> Result<()> {
        if self.base.is_initialized() {
            return Ok(());
        }
        self.upstream.initialize()?;

        let bounds = match &self.bounds {
            Some(bounds) => bounds.clone(),
            None => self.resolved_options().value::<Bounds>("bounds")?,
        };
        if bounds.is_empty() {
            return Err(PipelineError::InvalidOption {
                name: "bounds".to_string(),
                message: "crop bounds are empty".to_string(),
            });
        }
        let layout = SchemaLayout::new(self.upstream.schema());
        Coordinates::resolve(&layout)?;

        log::debug!("{}: cropping to {}", self.name(), bounds);
        let extent = self
            .upstream
            .bounds()
            .intersection(&bounds)
            .unwrap_or_else(|| bounds.clone());
        self.bounds = Some(bounds);
        self.base.set_schema(self.upstream.schema().clone());
        self.base.set_point_count(PointCount::Unknown);
        self.base.set_bounds(extent);
        self.base.set_state(StageState::Initialized);
        Ok(())
    }
}

impl PointSource for CropFilter {
    fn create_sequential_iterator(&self) -> Result<Box<dyn StageIterator + '_>> {
        Ok(Box::new(FilterIterator::new(self)?))
    }
}

impl BufferFilter for CropFilter {
    fn upstream(&self) -> &dyn PointSource {
        self.upstream.as_ref()
    }

    fn process_chunk(
        &self,
        dst: &mut PointBuffer,
        src: &PointBuffer,
        _first_index: u64,
    ) -> Result<usize> {
        self.process_buffer(dst, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionId;
    use crate::drivers::MemoryReader;
    use crate::filters::test_support::float_reader;
    use crate::schema::Schema;
    use crate::stage::collect_points;

    const POINTS: [[f64; 3]; 5] = [
        [0.0, 0.0, 0.0],
        [5.0, 5.0, 5.0],
        [-1.0, -1.0, -1.0],
        [10.0, 0.0, 0.0],
        [3.0, 3.0, 3.0],
    ];

    fn cube() -> Bounds {
        Bounds::new_3d(0.0, 0.0, 0.0, 6.0, 6.0, 6.0)
    }

    fn scaled_reader(raw: &[[i32; 3]], scale: f64) -> Box<MemoryReader> {
        let mut schema =
            Schema::from_ids(&[DimensionId::XI32, DimensionId::YI32, DimensionId::ZI32]).unwrap();
        for id in [DimensionId::XI32, DimensionId::YI32, DimensionId::ZI32] {
            schema.dimension_mut(id).unwrap().set_numeric_scale(scale);
        }
        let mut buf = PointBuffer::new(&schema, raw.len()).unwrap();
        for (i, p) in raw.iter().enumerate() {
            for (axis, &v) in p.iter().enumerate() {
                buf.set::<i32>(i, axis, v).unwrap();
            }
        }
        buf.set_num_points(raw.len()).unwrap();
        let mut reader = Box::new(MemoryReader::new(buf));
        reader.initialize().unwrap();
        reader
    }

    fn crop_all(filter: &CropFilter) -> (usize, PointBuffer) {
        let src = collect_points(filter.upstream(), 16).unwrap();
        let mut dst = PointBuffer::new(filter.schema(), src.num_points()).unwrap();
        let added = filter.process_buffer(&mut dst, &src).unwrap();
        (added, dst)
    }

    #[test]
    fn test_float_crop() {
        let mut filter = CropFilter::with_bounds(float_reader(&POINTS), cube());
        filter.initialize().unwrap();
        let (added, dst) = crop_all(&filter);

        assert_eq!(added, 3);
        assert_eq!(dst.num_points(), 3);
        let xs: Vec<f64> = (0..3).map(|i| dst.get::<f64>(i, 0).unwrap()).collect();
        assert_eq!(xs, vec![0.0, 5.0, 3.0]);
        assert_eq!(dst.get::<f64>(1, 2).unwrap(), 5.0);
    }

    #[test]
    fn test_scaled_crop_matches_float_crop() {
        let raw = [
            [0, 0, 0],
            [500, 500, 500],
            [-100, -100, -100],
            [1000, 0, 0],
            [300, 300, 300],
        ];
        let mut filter = CropFilter::with_bounds(scaled_reader(&raw, 0.01), cube());
        filter.initialize().unwrap();
        let (added, dst) = crop_all(&filter);

        assert_eq!(added, 3);
        let xs: Vec<i32> = (0..3).map(|i| dst.get::<i32>(i, 0).unwrap()).collect();
        assert_eq!(xs, vec![0, 500, 300]);
        let scaled: Vec<f64> = (0..3).map(|i| dst.get_scaled(i, 1).unwrap()).collect();
        assert_eq!(scaled, vec![0.0, 5.0, 3.0]);
    }

    #[test]
    fn test_scaled_crop_uses_each_axis_dimension() {
        let mut schema =
            Schema::from_ids(&[DimensionId::XI32, DimensionId::YI32, DimensionId::ZI32]).unwrap();
        schema.dimension_mut(DimensionId::XI32).unwrap().set_numeric_scale(0.01);
        schema.dimension_mut(DimensionId::YI32).unwrap().set_numeric_scale(0.1);
        schema.dimension_mut(DimensionId::ZI32).unwrap().set_numeric_scale(1.0);
        let mut buf = PointBuffer::new(&schema, 2).unwrap();
        // (5, 5, 5) and (5, 50, 5) in real coordinates
        for (i, y) in [(0, 50), (1, 500)] {
            buf.set::<i32>(i, 0, 500).unwrap();
            buf.set::<i32>(i, 1, y).unwrap();
            buf.set::<i32>(i, 2, 5).unwrap();
        }
        buf.set_num_points(2).unwrap();
        let mut reader = Box::new(MemoryReader::new(buf));
        reader.initialize().unwrap();

        let mut filter = CropFilter::with_bounds(reader, cube());
        filter.initialize().unwrap();
        let (added, dst) = crop_all(&filter);
        assert_eq!(added, 1);
        assert_eq!(dst.get::<i32>(0, 1).unwrap(), 50);
    }

    #[test]
    fn test_scaled_crop_with_stray_float_x() {
        // a lone f64 X does not make a float coordinate set
        let mut schema = Schema::from_ids(&[
            DimensionId::XF64,
            DimensionId::XI32,
            DimensionId::YI32,
            DimensionId::ZI32,
        ])
        .unwrap();
        for id in [DimensionId::XI32, DimensionId::YI32, DimensionId::ZI32] {
            schema.dimension_mut(id).unwrap().set_numeric_scale(0.01);
        }
        let mut buf = PointBuffer::new(&schema, 2).unwrap();
        for (i, raw) in [(0, 300), (1, 900)] {
            buf.set::<f64>(i, 0, 99.0).unwrap();
            for field in 1..4 {
                buf.set::<i32>(i, field, raw).unwrap();
            }
        }
        buf.set_num_points(2).unwrap();
        let mut reader = Box::new(MemoryReader::new(buf));
        reader.initialize().unwrap();

        let mut filter = CropFilter::with_bounds(reader, cube());
        filter.initialize().unwrap();
        let (added, dst) = crop_all(&filter);
        assert_eq!(added, 1);
        assert_eq!(dst.get::<i32>(0, 1).unwrap(), 300);
    }

    #[test]
    fn test_two_dimensional_bounds() {
        let mut filter = CropFilter::with_bounds(
            float_reader(&POINTS),
            Bounds::new_2d(-1.0, -1.0, 4.0, 4.0),
        );
        filter.initialize().unwrap();
        let (added, _) = crop_all(&filter);
        assert_eq!(added, 3);
    }

    #[test]
    fn test_destination_too_small() {
        let mut filter = CropFilter::with_bounds(float_reader(&POINTS), cube());
        filter.initialize().unwrap();
        let src = collect_points(filter.upstream(), 8).unwrap();
        let mut dst = PointBuffer::new(filter.schema(), 2).unwrap();
        assert!(matches!(
            filter.process_buffer(&mut dst, &src),
            Err(PipelineError::BufferTooSmall(_))
        ));
        assert_eq!(dst.num_points(), 2);
    }

    #[test]
    fn test_missing_bounds_option() {
        let mut filter = CropFilter::new(float_reader(&POINTS), Options::new());
        assert!(matches!(
            filter.initialize(),
            Err(PipelineError::MissingOption(ref name)) if name == "bounds"
        ));
        assert_eq!(filter.state(), StageState::Uninitialized);
        assert!(matches!(
            filter.create_sequential_iterator(),
            Err(PipelineError::Uninitialized(_))
        ));
    }

    #[test]
    fn test_bounds_from_options() {
        let options = Options::new().with("bounds", "([0, 6], [0, 6], [0, 6])");
        let mut filter = CropFilter::new(float_reader(&POINTS), options);
        filter.initialize().unwrap();
        assert_eq!(filter.crop_bounds(), Some(&cube()));
        assert_eq!(filter.point_count(), PointCount::Unknown);
    }

    #[test]
    fn test_defaults_leave_bounds_required() {
        let unset = CropFilter::new(float_reader(&POINTS), Options::new());
        assert!(unset.default_options().is_empty());

        let options = Options::new().merged_with(&unset.default_options());
        let mut filter = CropFilter::new(float_reader(&POINTS), options);
        assert!(matches!(
            filter.initialize(),
            Err(PipelineError::MissingOption(ref name)) if name == "bounds"
        ));
    }

    #[test]
    fn test_iterate_in_small_chunks() {
        let mut filter = CropFilter::with_bounds(float_reader(&POINTS), cube());
        filter.initialize().unwrap();
        let mut iter = filter.create_sequential_iterator().unwrap();
        let mut buf = PointBuffer::new(filter.schema(), 2).unwrap();

        assert_eq!(iter.read(&mut buf).unwrap(), 2);
        assert_eq!(buf.get::<f64>(1, 0).unwrap(), 5.0);
        assert_eq!(iter.read(&mut buf).unwrap(), 1);
        assert_eq!(buf.get::<f64>(0, 0).unwrap(), 3.0);
        assert_eq!(iter.read(&mut buf).unwrap(), 0);
        assert!(iter.at_end());
        assert_eq!(iter.index(), 3);
    }

    #[test]
    fn test_skip_counts_output_points() {
        let mut filter = CropFilter::with_bounds(float_reader(&POINTS), cube());
        filter.initialize().unwrap();
        let mut iter = filter.create_sequential_iterator().unwrap();
        assert_eq!(iter.skip(2).unwrap(), 2);

        let mut buf = PointBuffer::new(filter.schema(), 4).unwrap();
        assert_eq!(iter.read(&mut buf).unwrap(), 1);
        assert_eq!(buf.get::<f64>(0, 0).unwrap(), 3.0);
        assert_eq!(iter.skip(5).unwrap(), 0);
    }

    #[test]
    fn test_no_random_access() {
        let mut filter = CropFilter::with_bounds(float_reader(&POINTS), cube());
        filter.initialize().unwrap();
        assert!(matches!(
            filter.create_random_iterator(),
            Err(PipelineError::Unsupported(_))
        ));
    }
}
