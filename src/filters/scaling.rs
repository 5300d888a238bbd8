//! Conversion between real-valued and fixed-point coordinates.

use std::fmt;
use std::str::FromStr;

use crate::buffer::PointBuffer;
use crate::dimension::{Dimension, DimensionId};
use crate::error::{PipelineError, Result};
use crate::options::Options;
use crate::schema::Schema;
use crate::stage::{PointSource, Stage, StageBase, StageIterator, StageKind, StageState};

use super::{BufferFilter, FilterIterator};

const FLOAT_AXES: [DimensionId; 3] = [DimensionId::XF64, DimensionId::YF64, DimensionId::ZF64];
const SCALED_AXES: [DimensionId; 3] = [DimensionId::XI32, DimensionId::YI32, DimensionId::ZI32];
const AXIS_NAMES: [&str; 3] = ["x", "y", "z"];

/// Direction of a [`ScalingFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingMode {
    /// f64 X/Y/Z to scaled i32.
    #[default]
    Compress,
    /// Scaled i32 X/Y/Z to f64.
    Expand,
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingMode::Compress => f.write_str("compress"),
            ScalingMode::Expand => f.write_str("expand"),
        }
    }
}

impl FromStr for ScalingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compress" => Ok(ScalingMode::Compress),
            "expand" => Ok(ScalingMode::Expand),
            other => Err(format!("unknown scaling mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldMap {
    Copy { src: usize, dst: usize },
    Compress { src: usize, dst: usize },
    Expand { src: usize, dst: usize },
}

/// Rewrites the coordinate dimensions of its upstream, leaving every other
/// dimension as it is.
pub struct ScalingFilter {
    base: StageBase,
    upstream: Box<dyn PointSource>,
    mode: ScalingMode,
}

impl ScalingFilter {
    /// Options: `mode` (`compress` or `expand`), and for compression
    /// `scale_x`, `scale_y`, `scale_z` (default 0.01) and `offset_x`,
    /// `offset_y`, `offset_z` (default 0).
    pub fn new(upstream: Box<dyn PointSource>, options: Options) -> Self {
        Self {
            base: StageBase::new(options),
            upstream,
            mode: ScalingMode::default(),
        }
    }

    pub fn mode(&self) -> ScalingMode {
        self.mode
    }

    fn output_schema(&self, input: &Schema, options: &Options) -> Result<Schema> {
        let (from, to) = match self.mode {
            ScalingMode::Compress => (FLOAT_AXES, SCALED_AXES),
            ScalingMode::Expand => (SCALED_AXES, FLOAT_AXES),
        };
        for id in &from[..2] {
            if !input.has_dimension(*id) {
                return Err(PipelineError::Schema(format!(
                    "{} needs dimension {} to {}",
                    self.name(),
                    id,
                    self.mode
                )));
            }
        }

        let mut output = input.clone();
        for (axis, (&src_id, &dst_id)) in from.iter().zip(&to).enumerate() {
            if !input.has_dimension(src_id) {
                continue;
            }
            if input.has_dimension(dst_id) {
                return Err(PipelineError::Schema(format!(
                    "dimension {} is already present",
                    dst_id
                )));
            }
            let mut dim = Dimension::new(dst_id)?;
            if self.mode == ScalingMode::Compress {
                let scale: f64 = options.value(&format!("scale_{}", AXIS_NAMES[axis]))?;
                let offset: f64 = options.value(&format!("offset_{}", AXIS_NAMES[axis]))?;
                if scale == 0.0 || !scale.is_finite() {
                    return Err(PipelineError::InvalidOption {
                        name: format!("scale_{}", AXIS_NAMES[axis]),
                        message: "must be a non-zero number".to_string(),
                    });
                }
                dim.set_numeric_scale(scale);
                dim.set_numeric_offset(offset);
            }
            output.replace_dimension(src_id, dim)?;
        }
        Ok(output)
    }

    fn field_map(&self, src: &PointBuffer, dst: &PointBuffer) -> Result<Vec<FieldMap>> {
        let (from, to) = match self.mode {
            ScalingMode::Compress => (FLOAT_AXES, SCALED_AXES),
            ScalingMode::Expand => (SCALED_AXES, FLOAT_AXES),
        };
        let mut map = Vec::with_capacity(src.layout().num_fields());
        for entry in src.layout().dimension_layouts() {
            let id = entry.dimension().id();
            let src_field = entry.position();
            let converted = from.iter().position(|&f| f == id);
            map.push(match converted {
                Some(axis) => {
                    let dst_field = dst.field_index(to[axis])?;
                    match self.mode {
                        ScalingMode::Compress => FieldMap::Compress {
                            src: src_field,
                            dst: dst_field,
                        },
                        ScalingMode::Expand => FieldMap::Expand {
                            src: src_field,
                            dst: dst_field,
                        },
                    }
                }
                None => FieldMap::Copy {
                    src: src_field,
                    dst: dst.field_index(id)?,
                },
            });
        }
        Ok(map)
    }
}

impl Stage for ScalingFilter {
    fn name(&self) -> &'static str {
        "filters.scaling"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn base(&self) -> &StageBase {
        &self.base
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.add("mode", ScalingMode::default(), "compress or expand");
        for axis in AXIS_NAMES {
            options.add(format!("scale_{}", axis), 0.01, "fixed-point scale");
            options.add(format!("offset_{}", axis), 0.0, "fixed-point offset");
        }
        options
    }

    fn initialize(&mut self) -> Result<()> {
        if self.base.is_initialized() {
            return Ok(());
        }
        self.upstream.initialize()?;
        let options = self.resolved_options();
        self.mode = options.value("mode")?;

        let schema = self.output_schema(self.upstream.schema(), &options)?;
        log::debug!("{}: {} to {}", self.name(), self.mode, schema);
        self.base.set_schema(schema);
        self.base.set_point_count(self.upstream.point_count());
        self.base.set_bounds(self.upstream.bounds().clone());
        self.base.set_state(StageState::Initialized);
        Ok(())
    }
}

impl PointSource for ScalingFilter {
    fn create_sequential_iterator(&self) -> Result<Box<dyn StageIterator + '_>> {
        Ok(Box::new(FilterIterator::new(self)?))
    }
}

impl BufferFilter for ScalingFilter {
    fn upstream(&self) -> &dyn PointSource {
        self.upstream.as_ref()
    }

    fn process_chunk(
        &self,
        dst: &mut PointBuffer,
        src: &PointBuffer,
        _first_index: u64,
    ) -> Result<usize> {
        let n = src.num_points();
        let start = dst.num_points();
        if dst.remaining_capacity() < n {
            return Err(PipelineError::BufferTooSmall(format!(
                "{} points do not fit in {} free slots",
                n,
                dst.remaining_capacity()
            )));
        }
        let map = self.field_map(src, dst)?;

        for i in 0..n {
            let at = start + i;
            for field in &map {
                match *field {
                    FieldMap::Copy { src: s, dst: d } => {
                        let bytes = src.raw_field(i, s)?;
                        dst.raw_field_mut(at, d)?.copy_from_slice(bytes);
                    }
                    FieldMap::Compress { src: s, dst: d } => {
                        let value = src.get::<f64>(i, s)?;
                        let dim = dst
                            .layout()
                            .dimension_layout(d)
                            .map(|entry| entry.dimension())
                            .ok_or_else(|| PipelineError::Schema(format!("no field {}", d)))?;
                        let raw: i32 = dim.remove_scaling(value)?;
                        dst.set::<i32>(at, d, raw)?;
                    }
                    FieldMap::Expand { src: s, dst: d } => {
                        let value = src.get_scaled(i, s)?;
                        dst.set::<f64>(at, d, value)?;
                    }
                }
            }
        }
        dst.set_num_points(start + n)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MemoryReader;
    use crate::filters::test_support::float_reader;
    use crate::stage::collect_points;

    #[test]
    fn test_compress_then_expand() {
        let points = [[1.234, -5.5, 100.0], [0.0, 0.004, -0.006]];
        let compress = Options::new()
            .with("mode", "compress")
            .with("scale_z", 0.1)
            .with("offset_x", 1.0);
        let mut filter = ScalingFilter::new(float_reader(&points), compress);
        filter.initialize().unwrap();

        let schema = filter.schema();
        assert!(schema.has_dimension(DimensionId::XI32));
        assert!(!schema.has_dimension(DimensionId::XF64));
        let x = schema.dimension(DimensionId::XI32).unwrap();
        assert!(x.is_finite_precision());
        assert_eq!(x.numeric_offset(), 1.0);

        let out = collect_points(&filter, 8).unwrap();
        assert_eq!(out.get::<i32>(0, 0).unwrap(), 23);
        assert_eq!(out.get::<i32>(0, 1).unwrap(), -550);
        assert_eq!(out.get::<i32>(0, 2).unwrap(), 1000);
        assert_eq!(out.get::<i32>(1, 0).unwrap(), -100);
        assert_eq!(out.get::<i32>(1, 1).unwrap(), 0);
        // -0.006 / 0.1 rounds to -0
        assert_eq!(out.get::<i32>(1, 2).unwrap(), 0);

        let mut reader = Box::new(MemoryReader::new(out));
        reader.initialize().unwrap();
        let mut expand = ScalingFilter::new(reader, Options::new().with("mode", "expand"));
        expand.initialize().unwrap();
        let back = collect_points(&expand, 8).unwrap();
        assert!(back.schema().has_dimension(DimensionId::XF64));
        assert!((back.get::<f64>(0, 0).unwrap() - 1.23).abs() < 1e-9);
        assert!((back.get::<f64>(0, 1).unwrap() + 5.5).abs() < 1e-9);
        assert!((back.get::<f64>(0, 2).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_compress_out_of_range() {
        let points = [[1.0e9, 0.0, 0.0]];
        let mut filter = ScalingFilter::new(float_reader(&points), Options::new());
        filter.initialize().unwrap();
        assert!(matches!(
            collect_points(&filter, 8),
            Err(PipelineError::Range(_))
        ));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let options = Options::new().with("scale_y", 0.0);
        let mut filter = ScalingFilter::new(float_reader(&[[0.0; 3]]), options);
        assert!(matches!(
            filter.initialize(),
            Err(PipelineError::InvalidOption { ref name, .. }) if name == "scale_y"
        ));
    }

    #[test]
    fn test_expand_needs_scaled_input() {
        let options = Options::new().with("mode", "expand");
        let mut filter = ScalingFilter::new(float_reader(&[[0.0; 3]]), options);
        assert!(matches!(filter.initialize(), Err(PipelineError::Schema(_))));
    }

    #[test]
    fn test_unknown_mode() {
        let options = Options::new().with("mode", "squash");
        let mut filter = ScalingFilter::new(float_reader(&[[0.0; 3]]), options);
        assert!(matches!(
            filter.initialize(),
            Err(PipelineError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_default_options() {
        let mut filter = ScalingFilter::new(float_reader(&[[1.5, 2.5, 3.5]]), Options::new());
        let defaults = filter.default_options();
        assert_eq!(defaults.value::<ScalingMode>("mode").unwrap(), ScalingMode::Compress);
        for axis in AXIS_NAMES {
            assert_eq!(defaults.value::<f64>(&format!("scale_{}", axis)).unwrap(), 0.01);
            assert_eq!(defaults.value::<f64>(&format!("offset_{}", axis)).unwrap(), 0.0);
        }

        filter.initialize().unwrap();
        let z = filter.schema().dimension(DimensionId::ZI32).unwrap();
        assert_eq!(z.numeric_scale(), 0.01);
        let out = collect_points(&filter, 4).unwrap();
        assert_eq!(out.get::<i32>(0, 2).unwrap(), 350);
    }
}
