//! Synthetic point source for tests and benchmarks.

use std::fmt;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::bounds::Bounds;
use crate::buffer::PointBuffer;
use crate::dimension::DimensionId;
use crate::error::{PipelineError, Result};
use crate::options::Options;
use crate::schema::Schema;
use crate::stage::{
    check_buffer_schema, PointCount, PointSource, Stage, StageBase, StageIterator, StageKind,
    StageState,
};

/// How [`FauxReader`] places points inside its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FauxMode {
    /// Every point at the minimum corner.
    Constant,
    /// Uniformly distributed, reproducible from the seed.
    #[default]
    Random,
    /// Evenly spaced from the minimum to the maximum corner.
    Ramp,
}

impl fmt::Display for FauxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FauxMode::Constant => f.write_str("constant"),
            FauxMode::Random => f.write_str("random"),
            FauxMode::Ramp => f.write_str("ramp"),
        }
    }
}

impl FromStr for FauxMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" => Ok(FauxMode::Constant),
            "random" => Ok(FauxMode::Random),
            "ramp" => Ok(FauxMode::Ramp),
            other => Err(format!("unknown faux mode '{}'", other)),
        }
    }
}

/// Generates X/Y/Z/Time points. Time is the point's stream position.
pub struct FauxReader {
    base: StageBase,
    mode: FauxMode,
    num_points: u64,
    seed: u64,
    extent: [(f64, f64); 3],
}

impl FauxReader {
    /// Options: `bounds` and `num_points` (both required), `mode`
    /// (`constant`, `random` or `ramp`, default `random`) and `seed`.
    pub fn new(options: Options) -> Self {
        Self {
            base: StageBase::new(options),
            mode: FauxMode::default(),
            num_points: 0,
            seed: 0,
            extent: [(0.0, 0.0); 3],
        }
    }

    pub fn mode(&self) -> FauxMode {
        self.mode
    }

    pub fn num_points(&self) -> u64 {
        self.num_points
    }

    fn point_at(&self, index: u64, rng: &mut SmallRng) -> [f64; 3] {
        let mut point = [0.0; 3];
        for (slot, &(min, max)) in point.iter_mut().zip(&self.extent) {
            *slot = match self.mode {
                FauxMode::Constant => min,
                FauxMode::Random => {
                    if max > min {
                        rng.gen_range(min..=max)
                    } else {
                        min
                    }
                }
                FauxMode::Ramp => {
                    if self.num_points > 1 {
                        min + (max - min) * index as f64 / (self.num_points - 1) as f64
                    } else {
                        min
                    }
                }
            };
        }
        point
    }
}

impl Stage for FauxReader {
    fn name(&self) -> &'static str {
        "readers.faux"
    }

    fn kind(&self) -> StageKind {
        StageKind::Reader
    }

    fn base(&self) -> &StageBase {
        &self.base
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.add("mode", FauxMode::default(), "constant, random or ramp");
        options.add("seed", 0, "random seed");
        options
    }

    fn initialize(&mut self) -> Result<()> {
        if self.base.is_initialized() {
            return Ok(());
        }
        let options = self.resolved_options();
        let bounds: Bounds = options.value("bounds")?;
        let num_points: u64 = options.value("num_points")?;
        let mode: FauxMode = options.value("mode")?;
        let seed: u64 = options.value("seed")?;

        if bounds.dimensions() < 2 {
            return Err(PipelineError::InvalidOption {
                name: "bounds".to_string(),
                message: "need at least X and Y ranges".to_string(),
            });
        }
        for (axis, slot) in self.extent.iter_mut().enumerate() {
            *slot = bounds
                .range(axis)
                .map(|r| (r.min, r.max))
                .unwrap_or((0.0, 0.0));
        }
        self.mode = mode;
        self.num_points = num_points;
        self.seed = seed;

        let schema = Schema::from_ids(&[
            DimensionId::XF64,
            DimensionId::YF64,
            DimensionId::ZF64,
            DimensionId::Time,
        ])?;
        log::debug!(
            "{}: {} {} points in {}",
            self.name(),
            num_points,
            mode,
            bounds
        );
        self.base.set_schema(schema);
        self.base.set_point_count(PointCount::Exact(num_points));
        self.base.set_bounds(bounds);
        self.base.set_state(StageState::Initialized);
        Ok(())
    }
}

impl PointSource for FauxReader {
    fn create_sequential_iterator(&self) -> Result<Box<dyn StageIterator + '_>> {
        self.base.ensure_initialized(self.name())?;
        Ok(Box::new(FauxIterator {
            reader: self,
            rng: SmallRng::seed_from_u64(self.seed),
            index: 0,
        }))
    }
}

struct FauxIterator<'a> {
    reader: &'a FauxReader,
    rng: SmallRng,
    index: u64,
}

impl StageIterator for FauxIterator<'_> {
    fn read_up_to(&mut self, buffer: &mut PointBuffer, max: usize) -> Result<usize> {
        check_buffer_schema(self.reader.name(), self.reader.schema(), buffer)?;
        buffer.clear();

        let left = self.reader.num_points - self.index;
        let n = (max.min(buffer.capacity()) as u64).min(left) as usize;
        let fields = [
            buffer.field_index(DimensionId::XF64)?,
            buffer.field_index(DimensionId::YF64)?,
            buffer.field_index(DimensionId::ZF64)?,
        ];
        let time = buffer.field_index(DimensionId::Time)?;

        for i in 0..n {
            let point = self.reader.point_at(self.index, &mut self.rng);
            for (&field, &v) in fields.iter().zip(&point) {
                buffer.set::<f64>(i, field, v)?;
            }
            buffer.set::<f64>(i, time, self.index as f64)?;
            self.index += 1;
        }
        buffer.set_num_points(n)?;
        Ok(n)
    }

    fn skip(&mut self, count: u64) -> Result<u64> {
        let skipped = count.min(self.reader.num_points - self.index);
        // keep the random sequence aligned with what a full read would give
        if self.reader.mode == FauxMode::Random {
            for k in 0..skipped {
                self.reader.point_at(self.index + k, &mut self.rng);
            }
        }
        self.index += skipped;
        Ok(skipped)
    }

    fn at_end(&self) -> bool {
        self.index >= self.reader.num_points
    }

    fn index(&self) -> u64 {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::collect_points;

    fn faux(mode: &str, n: u64) -> FauxReader {
        let options = Options::new()
            .with("bounds", "([0, 10], [-5, 5], [100, 200])")
            .with("num_points", n)
            .with("mode", mode)
            .with("seed", 42);
        let mut reader = FauxReader::new(options);
        reader.initialize().unwrap();
        reader
    }

    #[test]
    fn test_requires_bounds_and_count() {
        let mut reader = FauxReader::new(Options::new().with("num_points", 10));
        assert!(matches!(
            reader.initialize(),
            Err(PipelineError::MissingOption(ref name)) if name == "bounds"
        ));
        let mut reader = FauxReader::new(Options::new().with("bounds", "([0, 1], [0, 1])"));
        assert!(matches!(
            reader.initialize(),
            Err(PipelineError::MissingOption(ref name)) if name == "num_points"
        ));
        assert!(reader.create_sequential_iterator().is_err());
    }

    #[test]
    fn test_constant() {
        let reader = faux("constant", 3);
        let points = collect_points(&reader, 2).unwrap();
        assert_eq!(points.num_points(), 3);
        for i in 0..3 {
            assert_eq!(points.get::<f64>(i, 0).unwrap(), 0.0);
            assert_eq!(points.get::<f64>(i, 2).unwrap(), 100.0);
            assert_eq!(points.get::<f64>(i, 3).unwrap(), i as f64);
        }
    }

    #[test]
    fn test_ramp_hits_both_corners() {
        let reader = faux("ramp", 11);
        let points = collect_points(&reader, 4).unwrap();
        assert_eq!(points.get::<f64>(0, 1).unwrap(), -5.0);
        assert_eq!(points.get::<f64>(5, 0).unwrap(), 5.0);
        assert_eq!(points.get::<f64>(10, 0).unwrap(), 10.0);
        assert_eq!(points.get::<f64>(10, 2).unwrap(), 200.0);
    }

    #[test]
    fn test_random_within_bounds_and_reproducible() {
        let reader = faux("random", 500);
        let a = collect_points(&reader, 64).unwrap();
        let b = collect_points(&reader, 100).unwrap();
        assert_eq!(a.raw_points(), b.raw_points());

        let bounds = reader.bounds();
        for i in 0..a.num_points() {
            let p = [
                a.get::<f64>(i, 0).unwrap(),
                a.get::<f64>(i, 1).unwrap(),
                a.get::<f64>(i, 2).unwrap(),
            ];
            assert!(bounds.contains(&p), "{:?} outside {}", p, bounds);
        }
    }

    #[test]
    fn test_skip_matches_read() {
        let reader = faux("random", 20);
        let all = collect_points(&reader, 20).unwrap();

        let mut iter = reader.create_sequential_iterator().unwrap();
        assert_eq!(iter.skip(7).unwrap(), 7);
        let mut buf = PointBuffer::new(reader.schema(), 20).unwrap();
        assert_eq!(iter.read(&mut buf).unwrap(), 13);
        assert_eq!(buf.raw_point(0).unwrap(), all.raw_point(7).unwrap());
        assert!(iter.at_end());
    }

    #[test]
    fn test_two_dimensional_bounds() {
        let options = Options::new()
            .with("bounds", "([1, 2], [3, 4])")
            .with("num_points", 4)
            .with("mode", "ramp");
        let mut reader = FauxReader::new(options);
        reader.initialize().unwrap();
        let points = collect_points(&reader, 4).unwrap();
        assert_eq!(points.get::<f64>(3, 1).unwrap(), 4.0);
        assert_eq!(points.get::<f64>(3, 2).unwrap(), 0.0);
    }

    #[test]
    fn test_default_options() {
        let reader = FauxReader::new(Options::new());
        let defaults = reader.default_options();
        let keys: Vec<&str> = defaults.iter().map(|o| o.name()).collect();
        assert_eq!(keys, vec!["mode", "seed"]);
        assert_eq!(defaults.value::<FauxMode>("mode").unwrap(), FauxMode::Random);
        assert_eq!(defaults.value::<u64>("seed").unwrap(), 0);

        let options = Options::new()
            .with("bounds", "([0, 1], [0, 1])")
            .merged_with(&defaults);
        let mut reader = FauxReader::new(options);
        assert!(matches!(
            reader.initialize(),
            Err(PipelineError::MissingOption(ref name)) if name == "num_points"
        ));
    }
}
