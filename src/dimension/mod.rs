//! Dimension descriptors.
//!
//! A [`Dimension`] names one field of a point record: its storage type,
//! byte order, usage flags and, for fixed-point fields, the scale and
//! offset that turn a stored integer into a real value.

pub mod datatype;
pub mod id;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

pub use datatype::{read_as_f64, write_from_f64, DataType, Endianness, Field};
pub use id::{DimensionId, DimensionInfo};

/// Usage flags of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DimensionFlags(u32);

impl DimensionFlags {
    pub const INVALID: DimensionFlags = DimensionFlags(0x0);
    pub const ADDED: DimensionFlags = DimensionFlags(0x1);
    pub const READ: DimensionFlags = DimensionFlags(0x2);
    pub const WRITTEN: DimensionFlags = DimensionFlags(0x4);
    pub const IGNORED: DimensionFlags = DimensionFlags(0x8);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        DimensionFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: DimensionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: DimensionFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: DimensionFlags) {
        self.0 &= !other.0;
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DimensionFlags {
    type Output = DimensionFlags;

    fn bitor(self, rhs: DimensionFlags) -> DimensionFlags {
        DimensionFlags(self.0 | rhs.0)
    }
}

#[inline]
fn approx_zero(v: f64) -> bool {
    v.abs() <= f64::MIN_POSITIVE
}

/// A named, typed field of a point record.
#[derive(Debug, Clone)]
pub struct Dimension {
    id: DimensionId,
    name: String,
    datatype: DataType,
    byte_size: usize,
    description: String,
    endianness: Endianness,
    flags: DimensionFlags,
    min: f64,
    max: f64,
    finite_precision: bool,
    numeric_scale: f64,
    numeric_offset: f64,
}

impl Dimension {
    /// Build a dimension from the master table.
    pub fn new(id: DimensionId) -> Result<Self> {
        let info = id.info().ok_or_else(|| {
            PipelineError::Schema(format!("dimension {} is not in the master table", id))
        })?;
        Ok(Self::with_type(
            id,
            info.datatype,
            info.name,
            info.description,
        ))
    }

    /// Build a dimension that is not described by the master table.
    pub fn with_type(
        id: DimensionId,
        datatype: DataType,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            datatype,
            byte_size: datatype.size(),
            description: description.into(),
            endianness: Endianness::Little,
            flags: DimensionFlags::INVALID,
            min: 0.0,
            max: 0.0,
            finite_precision: false,
            numeric_scale: 0.0,
            numeric_offset: 0.0,
        }
    }

    #[inline]
    pub fn id(&self) -> DimensionId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    /// Number of bytes this dimension occupies in a record.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    #[inline]
    pub fn flags(&self) -> DimensionFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: DimensionFlags) {
        self.flags = flags;
    }

    /// A dimension is valid once any usage flag has been set.
    pub fn is_valid(&self) -> bool {
        !self.flags.is_empty()
    }

    pub fn is_read(&self) -> bool {
        self.flags.contains(DimensionFlags::READ)
    }

    pub fn is_written(&self) -> bool {
        self.flags.contains(DimensionFlags::WRITTEN)
    }

    /// Ignored dimensions take no space in a record layout.
    #[inline]
    pub fn is_ignored(&self) -> bool {
        self.flags.contains(DimensionFlags::IGNORED)
    }

    pub fn is_numeric(&self) -> bool {
        self.datatype.is_numeric()
    }

    pub fn is_signed(&self) -> bool {
        self.datatype.is_signed()
    }

    pub fn is_integer(&self) -> bool {
        self.datatype.is_integer()
    }

    /// Informational lower bound; usually 0.0.
    pub fn minimum(&self) -> f64 {
        self.min
    }

    pub fn set_minimum(&mut self, min: f64) {
        self.min = min;
    }

    /// Informational upper bound; usually 0.0.
    pub fn maximum(&self) -> f64 {
        self.max
    }

    pub fn set_maximum(&mut self, max: f64) {
        self.max = max;
    }

    #[inline]
    pub fn numeric_scale(&self) -> f64 {
        self.numeric_scale
    }

    #[inline]
    pub fn numeric_offset(&self) -> f64 {
        self.numeric_offset
    }

    /// Set the scale. Setting scale or offset to a non-zero value enables
    /// finite-precision mode; with both at zero it is disabled.
    pub fn set_numeric_scale(&mut self, scale: f64) {
        self.numeric_scale = scale;
        self.refresh_precision();
    }

    /// Set the offset. Same finite-precision rule as
    /// [`set_numeric_scale`](Self::set_numeric_scale).
    pub fn set_numeric_offset(&mut self, offset: f64) {
        self.numeric_offset = offset;
        self.refresh_precision();
    }

    /// Reset scale and offset to zero, leaving finite-precision mode.
    pub fn clear_scaling(&mut self) {
        self.numeric_scale = 0.0;
        self.numeric_offset = 0.0;
        self.refresh_precision();
    }

    fn refresh_precision(&mut self) {
        self.finite_precision =
            !approx_zero(self.numeric_scale) || !approx_zero(self.numeric_offset);
    }

    /// Whether stored values are fixed-point and need scale/offset applied.
    #[inline]
    pub fn is_finite_precision(&self) -> bool {
        self.finite_precision
    }

    /// `raw * scale + offset`.
    #[inline]
    pub fn apply_scaling<T: Field>(&self, raw: T) -> f64 {
        raw.to_f64() * self.numeric_scale + self.numeric_offset
    }

    /// Inverse of [`apply_scaling`](Self::apply_scaling): round
    /// `(value - offset) / scale` half away from zero and convert to `T`.
    ///
    /// Fails with a range error when the result does not fit `T`, which
    /// includes a zero scale.
    pub fn remove_scaling<T: Field>(&self, value: f64) -> Result<T> {
        let rounded = ((value - self.numeric_offset) / self.numeric_scale).round();
        T::from_f64_checked(rounded).ok_or_else(|| {
            PipelineError::Range(format!(
                "descaling {} with scale {} and offset {} gives {}, outside the range of {} for {}",
                value,
                self.numeric_scale,
                self.numeric_offset,
                rounded,
                T::DATA_TYPE,
                self.name
            ))
        })
    }

    /// Structured diagnostic view of this dimension.
    pub fn summary(&self) -> DimensionSummary {
        DimensionSummary {
            name: self.name.clone(),
            datatype: self.datatype.name().to_string(),
            description: self.description.clone(),
            bytesize: self.byte_size,
            endianness: self.endianness.name().to_string(),
            scale: self.numeric_scale,
            is_valid: self.is_valid(),
            offset: self.numeric_offset,
            flags: self.flags.bits(),
        }
    }

    /// Diagnostic tree as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.summary())?)
    }

    /// Rebuild a dimension from its diagnostic view.
    pub fn from_summary(id: DimensionId, summary: &DimensionSummary) -> Result<Self> {
        let datatype: DataType = summary.datatype.parse()?;
        if datatype.size() != summary.bytesize {
            return Err(PipelineError::SchemaValidation(format!(
                "dimension '{}' declares {} bytes but {} is {} bytes",
                summary.name,
                summary.bytesize,
                datatype,
                datatype.size()
            )));
        }
        let mut dim = Self::with_type(
            id,
            datatype,
            summary.name.clone(),
            summary.description.clone(),
        );
        dim.set_endianness(summary.endianness.parse()?);
        dim.set_flags(DimensionFlags::from_bits(summary.flags));
        dim.set_numeric_scale(summary.scale);
        dim.set_numeric_offset(summary.offset);
        if dim.is_valid() != summary.is_valid {
            return Err(PipelineError::SchemaValidation(format!(
                "dimension '{}' validity flag disagrees with flags {:#x}",
                summary.name, summary.flags
            )));
        }
        Ok(dim)
    }
}

impl PartialEq for Dimension {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.datatype == other.datatype
            && self.name == other.name
            && self.flags == other.flags
            && self.endianness == other.endianness
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} bytes, {} endian)",
            self.name, self.datatype, self.byte_size, self.endianness
        )?;
        if self.finite_precision {
            write!(
                f,
                " scale={} offset={}",
                self.numeric_scale, self.numeric_offset
            )?;
        }
        if self.is_ignored() {
            f.write_str(" [ignored]")?;
        }
        Ok(())
    }
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Diagnostic tree of a [`Dimension`].
///
/// Field order is stable: name, datatype, description, bytesize,
/// endianness, scale, isValid. `offset` and `flags` follow only when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub name: String,
    pub datatype: String,
    pub description: String,
    pub bytesize: usize,
    pub endianness: String,
    pub scale: f64,
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub offset: f64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub flags: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctor_and_equality() {
        let d1 = Dimension::new(DimensionId::XI32).unwrap();
        assert_eq!(d1.id(), DimensionId::XI32);
        assert_eq!(d1.name(), "X");
        assert_eq!(d1.datatype(), DataType::Int32);
        assert_eq!(d1.byte_size(), 4);

        let d2 = d1.clone();
        assert_eq!(d1, d2);

        let mut d3 = Dimension::new(DimensionId::YI32).unwrap();
        d3.set_endianness(Endianness::Big);
        assert_ne!(d1, d3);

        // min/max/description do not take part in equality
        let mut d4 = d1.clone();
        d4.set_minimum(-5.0);
        d4.set_maximum(5.0);
        d4.set_description("something else");
        assert_eq!(d1, d4);

        let mut d5 = d1.clone();
        d5.set_flags(DimensionFlags::READ);
        assert_ne!(d1, d5);
    }

    #[test]
    fn test_custom_id_needs_explicit_type() {
        assert!(matches!(
            Dimension::new(DimensionId::Custom(1)),
            Err(PipelineError::Schema(_))
        ));
        let d = Dimension::with_type(DimensionId::Custom(1), DataType::Uint16, "Flags", "");
        assert_eq!(d.byte_size(), 2);
    }

    #[test]
    fn test_scale_setter_enables_precision() {
        let mut d = Dimension::new(DimensionId::XI32).unwrap();
        assert!(!d.is_finite_precision());

        d.set_numeric_scale(0.01);
        assert!(d.is_finite_precision());

        d.set_numeric_scale(0.0);
        assert!(!d.is_finite_precision());

        d.set_numeric_offset(100.0);
        assert!(d.is_finite_precision());

        d.clear_scaling();
        assert!(!d.is_finite_precision());
    }

    #[test]
    fn test_scaling_round_trip() {
        let cases = [(0.01, 0.0), (0.001, 500000.0), (0.25, -12.5), (3.0, 1.0)];
        let raws = [0i32, 1, -1, 12345, -98765, 2_000_000, -2_000_000];
        for (scale, offset) in cases {
            let mut d = Dimension::new(DimensionId::XI32).unwrap();
            d.set_numeric_scale(scale);
            d.set_numeric_offset(offset);
            for raw in raws {
                let real = d.apply_scaling(raw);
                assert_eq!(d.remove_scaling::<i32>(real).unwrap(), raw);
            }
        }
    }

    #[test]
    fn test_remove_scaling_rounds_half_away_from_zero() {
        let mut d = Dimension::new(DimensionId::XI32).unwrap();
        d.set_numeric_scale(1.0);
        assert_eq!(d.remove_scaling::<i32>(2.5).unwrap(), 3);
        assert_eq!(d.remove_scaling::<i32>(-2.5).unwrap(), -3);
        assert_eq!(d.remove_scaling::<i32>(2.4).unwrap(), 2);
    }

    #[test]
    fn test_remove_scaling_range_errors() {
        let mut d = Dimension::new(DimensionId::XI32).unwrap();
        d.set_numeric_scale(0.01);

        // 21474836.47 is the largest representable value
        assert_eq!(d.remove_scaling::<i32>(21474836.47).unwrap(), i32::MAX);
        assert!(matches!(
            d.remove_scaling::<i32>(21474836.48),
            Err(PipelineError::Range(_))
        ));
        assert!(matches!(
            d.remove_scaling::<i32>(-21474836.49),
            Err(PipelineError::Range(_))
        ));
        assert!(matches!(
            d.remove_scaling::<u8>(-0.01),
            Err(PipelineError::Range(_))
        ));
        assert!(matches!(
            d.remove_scaling::<u8>(2.56),
            Err(PipelineError::Range(_))
        ));
        assert_eq!(d.remove_scaling::<u8>(2.55).unwrap(), 255);
    }

    #[test]
    fn test_remove_scaling_with_zero_scale_fails() {
        let d = Dimension::new(DimensionId::XI32).unwrap();
        assert!(d.remove_scaling::<i32>(1.0).is_err());
    }

    #[test]
    fn test_default_x_summary() {
        let d = Dimension::new(DimensionId::XI32).unwrap();
        let json: serde_json::Value = serde_json::from_str(&d.to_json().unwrap()).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj.len(), 7);
        assert_eq!(obj["name"], "X");
        assert_eq!(obj["datatype"], "Int32");
        assert_eq!(obj["bytesize"], 4);
        assert_eq!(obj["endianness"], "little");
        assert_eq!(obj["scale"].as_f64(), Some(0.0));
        assert_eq!(obj["isValid"], false);
        assert!(obj["description"]
            .as_str()
            .unwrap()
            .starts_with("x coordinate as a scaled integer"));
    }

    #[test]
    fn test_summary_field_order() {
        let d = Dimension::new(DimensionId::XI32).unwrap();
        let text = d.to_json().unwrap();
        let keys = [
            "\"name\"",
            "\"datatype\"",
            "\"description\"",
            "\"bytesize\"",
            "\"endianness\"",
            "\"scale\"",
            "\"isValid\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_summary_round_trip() {
        let mut d = Dimension::new(DimensionId::ZI32).unwrap();
        d.set_numeric_scale(0.001);
        d.set_numeric_offset(-250.0);
        d.set_flags(DimensionFlags::READ | DimensionFlags::WRITTEN);
        d.set_endianness(Endianness::Big);

        let text = d.to_json().unwrap();
        let summary: DimensionSummary = serde_json::from_str(&text).unwrap();
        let back = Dimension::from_summary(DimensionId::ZI32, &summary).unwrap();

        assert_eq!(back, d);
        assert_eq!(back.numeric_scale(), 0.001);
        assert_eq!(back.numeric_offset(), -250.0);
        assert!(back.is_finite_precision());
        assert_eq!(back.flags(), d.flags());
    }

    #[test]
    fn test_summary_bytesize_mismatch() {
        let mut summary = Dimension::new(DimensionId::Intensity).unwrap().summary();
        summary.bytesize = 4;
        assert!(matches!(
            Dimension::from_summary(DimensionId::Intensity, &summary),
            Err(PipelineError::SchemaValidation(_))
        ));
    }

    #[test]
    fn test_display() {
        let mut d = Dimension::new(DimensionId::XI32).unwrap();
        d.set_numeric_scale(0.5);
        let text = d.to_string();
        assert!(text.starts_with("X (Int32, 4 bytes, little endian)"));
        assert!(text.contains("scale=0.5"));
    }
}
