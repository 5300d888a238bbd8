//! Axis-aligned spatial bounds.

use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Closed interval `[min, max]` along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    #[inline]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive on both ends.
    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

/// An axis-aligned box in 2 or 3 dimensions.
///
/// A default-constructed `Bounds` has no axes and contains nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bounds {
    ranges: Vec<AxisRange>,
}

impl Bounds {
    /// Bounds without any axis.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new_2d(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            ranges: vec![AxisRange::new(minx, maxx), AxisRange::new(miny, maxy)],
        }
    }

    pub fn new_3d(minx: f64, miny: f64, minz: f64, maxx: f64, maxy: f64, maxz: f64) -> Self {
        Self {
            ranges: vec![
                AxisRange::new(minx, maxx),
                AxisRange::new(miny, maxy),
                AxisRange::new(minz, maxz),
            ],
        }
    }

    pub fn from_ranges(ranges: Vec<AxisRange>) -> Self {
        Self { ranges }
    }

    /// Bounds covering exactly one point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            ranges: point.iter().map(|&v| AxisRange::new(v, v)).collect(),
        }
    }

    /// Number of axes.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|r| r.is_empty())
    }

    pub fn ranges(&self) -> &[AxisRange] {
        &self.ranges
    }

    pub fn range(&self, axis: usize) -> Option<&AxisRange> {
        self.ranges.get(axis)
    }

    pub fn minimum(&self, axis: usize) -> Option<f64> {
        self.ranges.get(axis).map(|r| r.min)
    }

    pub fn maximum(&self, axis: usize) -> Option<f64> {
        self.ranges.get(axis).map(|r| r.max)
    }

    /// True iff every axis of the bounds contains the matching coordinate.
    ///
    /// Points with more coordinates than the bounds have axes are tested on
    /// the leading axes only, so 2D bounds can crop 3D points. Points with
    /// fewer coordinates are never contained.
    #[inline]
    pub fn contains(&self, point: &[f64]) -> bool {
        if self.ranges.is_empty() || point.len() < self.ranges.len() {
            return false;
        }
        self.ranges
            .iter()
            .zip(point)
            .all(|(range, &v)| range.contains(v))
    }

    /// Whether `other` lies entirely inside these bounds.
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        self.dimensions() == other.dimensions()
            && self
                .ranges
                .iter()
                .zip(&other.ranges)
                .all(|(a, b)| a.min <= b.min && b.max <= a.max)
    }

    /// Extend these bounds to include `point`. Empty bounds take the
    /// dimensionality of the first point.
    pub fn grow(&mut self, point: &[f64]) {
        if self.ranges.is_empty() {
            *self = Self::from_point(point);
            return;
        }
        for (range, &v) in self.ranges.iter_mut().zip(point) {
            range.min = range.min.min(v);
            range.max = range.max.max(v);
        }
    }

    /// Overlap of two bounds with the same number of axes.
    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        if self.dimensions() != other.dimensions() || self.ranges.is_empty() {
            return None;
        }
        let ranges: Vec<AxisRange> = self
            .ranges
            .iter()
            .zip(&other.ranges)
            .map(|(a, b)| AxisRange::new(a.min.max(b.min), a.max.min(b.max)))
            .collect();
        if ranges.iter().any(|r| r.is_empty()) {
            None
        } else {
            Some(Bounds { ranges })
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "[{}, {}]", range.min, range.max)?;
        }
        f.write_str(")")
    }
}

/// Parses `([minx, maxx], [miny, maxy][, [minz, maxz]])`. The outer
/// parentheses are optional and an empty string gives empty bounds.
impl FromStr for Bounds {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| PipelineError::InvalidOption {
            name: "bounds".to_string(),
            message,
        };

        let mut text = s.trim();
        if text.starts_with('(') && text.ends_with(')') {
            text = text[1..text.len() - 1].trim();
        }
        if text.is_empty() {
            return Ok(Bounds::empty());
        }

        let mut ranges = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let open = rest
                .find('[')
                .ok_or_else(|| invalid(format!("expected '[' in '{}'", s)))?;
            let close = rest[open..]
                .find(']')
                .map(|i| open + i)
                .ok_or_else(|| invalid(format!("unterminated range in '{}'", s)))?;

            let inner = &rest[open + 1..close];
            let mut parts = inner.split(',').map(str::trim);
            let (min, max) = match (parts.next(), parts.next(), parts.next()) {
                (Some(a), Some(b), None) => (a, b),
                _ => return Err(invalid(format!("range '[{}]' needs two values", inner))),
            };
            let min: f64 = min
                .parse()
                .map_err(|_| invalid(format!("'{}' is not a number", min)))?;
            let max: f64 = max
                .parse()
                .map_err(|_| invalid(format!("'{}' is not a number", max)))?;
            if min > max {
                return Err(invalid(format!("minimum {} exceeds maximum {}", min, max)));
            }
            ranges.push(AxisRange::new(min, max));

            rest = rest[close + 1..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        }

        if ranges.len() < 2 || ranges.len() > 3 {
            return Err(invalid(format!(
                "expected 2 or 3 axes, found {}",
                ranges.len()
            )));
        }
        Ok(Bounds { ranges })
    }
}
