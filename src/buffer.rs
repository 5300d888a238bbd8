//! Fixed-capacity storage for packed point records.

use std::fmt;

use crate::bounds::Bounds;
use crate::dimension::{read_as_f64, write_from_f64, DimensionId, Field};
use crate::error::{PipelineError, Result};
use crate::layout::{DimensionLayout, SchemaLayout};
use crate::schema::Schema;

/// A contiguous array of `capacity` records laid out by a [`SchemaLayout`].
///
/// Fields are addressed by point index and field index (the position of
/// the dimension in the layout). Reads are checked against `num_points`,
/// writes against `capacity`.
#[derive(Clone)]
pub struct PointBuffer {
    layout: SchemaLayout,
    capacity: usize,
    num_points: usize,
    data: Vec<u8>,
}

impl PointBuffer {
    /// Allocate a zeroed buffer for `capacity` points of `schema`.
    ///
    /// Fails with `BufferTooSmall` when the storage size overflows or
    /// cannot be allocated.
    pub fn new(schema: &Schema, capacity: usize) -> Result<Self> {
        Self::with_layout(SchemaLayout::new(schema), capacity)
    }

    pub fn with_layout(layout: SchemaLayout, capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        grow_storage(&mut data, capacity, layout.record_size())?;
        Ok(Self {
            layout,
            capacity,
            num_points: 0,
            data,
        })
    }

    #[inline]
    pub fn layout(&self) -> &SchemaLayout {
        &self.layout
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        self.layout.schema()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Points that can still be appended.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.num_points
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.num_points == self.capacity
    }

    /// Set the number of valid points. Fails if `n` exceeds the capacity.
    pub fn set_num_points(&mut self, n: usize) -> Result<()> {
        if n > self.capacity {
            return Err(PipelineError::BufferTooSmall(format!(
                "cannot hold {} points, capacity is {}",
                n, self.capacity
            )));
        }
        self.num_points = n;
        Ok(())
    }

    /// Forget every point without touching the storage.
    pub fn clear(&mut self) {
        self.num_points = 0;
    }

    /// Change the capacity, reallocating the storage. Shrinking below
    /// `num_points` truncates. Slices taken before the call are invalid.
    /// On failure the buffer is left unchanged.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        grow_storage(&mut self.data, capacity, self.layout.record_size())?;
        self.capacity = capacity;
        self.num_points = self.num_points.min(capacity);
        Ok(())
    }

    /// Field index of a dimension in this buffer's layout.
    pub fn field_index(&self, id: DimensionId) -> Result<usize> {
        self.layout.require_dimension_index(id)
    }

    #[inline]
    fn field(&self, field: usize) -> Result<&DimensionLayout> {
        self.layout.dimension_layout(field).ok_or_else(|| {
            PipelineError::Schema(format!(
                "field index {} out of range, layout has {} fields",
                field,
                self.layout.num_fields()
            ))
        })
    }

    #[inline]
    fn check_index(index: usize, limit: usize) -> Result<()> {
        if index >= limit {
            return Err(PipelineError::PointIndexOutOfRange { index, limit });
        }
        Ok(())
    }

    #[inline]
    fn field_start(&self, point: usize, entry: &DimensionLayout) -> usize {
        point * self.layout.record_size() + entry.byte_offset()
    }

    fn check_width<T: Field>(entry: &DimensionLayout) -> Result<()> {
        if T::SIZE != entry.byte_size() {
            return Err(PipelineError::Schema(format!(
                "cannot access {} ({} bytes) as {} ({} bytes)",
                entry.dimension().name(),
                entry.byte_size(),
                T::DATA_TYPE,
                T::SIZE
            )));
        }
        Ok(())
    }

    /// Read a field of a stored point.
    #[inline]
    pub fn get<T: Field>(&self, point: usize, field: usize) -> Result<T> {
        Self::check_index(point, self.num_points)?;
        let entry = self.field(field)?;
        Self::check_width::<T>(entry)?;
        let start = self.field_start(point, entry);
        Ok(T::read_from(
            &self.data[start..start + T::SIZE],
            entry.dimension().endianness(),
        ))
    }

    /// Write a field of any point slot below the capacity.
    #[inline]
    pub fn set<T: Field>(&mut self, point: usize, field: usize, value: T) -> Result<()> {
        Self::check_index(point, self.capacity)?;
        let entry = self.field(field)?;
        Self::check_width::<T>(entry)?;
        let endian = entry.dimension().endianness();
        let start = self.field_start(point, entry);
        value.write_to(&mut self.data[start..start + T::SIZE], endian);
        Ok(())
    }

    /// Read any numeric field as a real value, applying the dimension's
    /// scale and offset when it is finite precision.
    pub fn get_scaled(&self, point: usize, field: usize) -> Result<f64> {
        Self::check_index(point, self.num_points)?;
        let entry = self.field(field)?;
        let dim = entry.dimension();
        let start = self.field_start(point, entry);
        let raw = read_as_f64(
            dim.datatype(),
            &self.data[start..start + entry.byte_size()],
            dim.endianness(),
        )
        .ok_or_else(|| {
            PipelineError::Schema(format!("dimension {} is not numeric", dim.name()))
        })?;
        if dim.is_finite_precision() {
            Ok(raw * dim.numeric_scale() + dim.numeric_offset())
        } else {
            Ok(raw)
        }
    }

    /// Store a real value into any numeric field, removing the dimension's
    /// scale and offset when it is finite precision.
    pub fn set_scaled(&mut self, point: usize, field: usize, value: f64) -> Result<()> {
        Self::check_index(point, self.capacity)?;
        let entry = self.field(field)?.clone();
        let dim = entry.dimension();
        let stored = if dim.is_finite_precision() {
            (value - dim.numeric_offset()) / dim.numeric_scale()
        } else {
            value
        };
        let stored = if dim.is_integer() { stored.round() } else { stored };
        let start = self.field_start(point, &entry);
        write_from_f64(
            dim.datatype(),
            stored,
            &mut self.data[start..start + entry.byte_size()],
            dim.endianness(),
        )
        .ok_or_else(|| {
            PipelineError::Range(format!(
                "value {} does not fit dimension {} ({})",
                value,
                dim.name(),
                dim.datatype()
            ))
        })
    }

    /// Raw bytes of one field of a stored point.
    pub fn raw_field(&self, point: usize, field: usize) -> Result<&[u8]> {
        Self::check_index(point, self.num_points)?;
        let entry = self.field(field)?;
        let start = self.field_start(point, entry);
        Ok(&self.data[start..start + entry.byte_size()])
    }

    pub fn raw_field_mut(&mut self, point: usize, field: usize) -> Result<&mut [u8]> {
        Self::check_index(point, self.capacity)?;
        let entry = self.field(field)?;
        let start = self.field_start(point, entry);
        let end = start + entry.byte_size();
        Ok(&mut self.data[start..end])
    }

    /// Raw bytes of one stored record.
    pub fn raw_point(&self, point: usize) -> Result<&[u8]> {
        Self::check_index(point, self.num_points)?;
        let size = self.layout.record_size();
        Ok(&self.data[point * size..(point + 1) * size])
    }

    /// Raw bytes of every stored record.
    pub fn raw_points(&self) -> &[u8] {
        &self.data[..self.num_points * self.layout.record_size()]
    }

    /// Copy one record from `src` byte-for-byte.
    ///
    /// Both buffers must have layout-compatible schemas; a mismatch is a
    /// schema error. `num_points` is not changed.
    pub fn copy_point_fast(
        &mut self,
        dst_index: usize,
        src_index: usize,
        src: &PointBuffer,
    ) -> Result<()> {
        self.copy_points_fast(dst_index, src_index, src, 1)
    }

    /// Copy `count` consecutive records from `src`, same rules as
    /// [`copy_point_fast`](Self::copy_point_fast).
    pub fn copy_points_fast(
        &mut self,
        dst_index: usize,
        src_index: usize,
        src: &PointBuffer,
        count: usize,
    ) -> Result<()> {
        if !self.layout.is_compatible(&src.layout) {
            return Err(PipelineError::Schema(
                "raw point copy between buffers with incompatible layouts".to_string(),
            ));
        }
        if count == 0 {
            return Ok(());
        }
        Self::check_index(src_index + count - 1, src.num_points)?;
        Self::check_index(dst_index + count - 1, self.capacity)?;
        self.copy_records_unchecked(dst_index, src_index, src, count);
        Ok(())
    }

    /// Callers have already checked compatibility and both index ranges.
    #[inline]
    pub(crate) fn copy_records_unchecked(
        &mut self,
        dst_index: usize,
        src_index: usize,
        src: &PointBuffer,
        count: usize,
    ) {
        let size = self.layout.record_size();
        let from = src_index * size;
        let to = dst_index * size;
        self.data[to..to + count * size].copy_from_slice(&src.data[from..from + count * size]);
    }

    /// Bounding box of the stored points over X/Y/Z (or X/Y when there is
    /// no Z), using whichever coordinate representation the schema holds.
    /// `None` when the schema has no usable coordinates or the buffer is
    /// empty.
    pub fn calculate_bounds(&self) -> Result<Option<Bounds>> {
        let fields = match coordinate_fields(&self.layout) {
            Some((_, fields)) => fields,
            None => return Ok(None),
        };
        if self.num_points == 0 {
            return Ok(None);
        }
        let mut bounds = Bounds::empty();
        let mut point = Vec::with_capacity(fields.len());
        for i in 0..self.num_points {
            point.clear();
            for &field in &fields {
                point.push(self.get_scaled(i, field)?);
            }
            bounds.grow(&point);
        }
        Ok(Some(bounds))
    }
}

/// Size `data` to hold `capacity` records of `record_size` bytes, zero-filling
/// new space.
fn grow_storage(data: &mut Vec<u8>, capacity: usize, record_size: usize) -> Result<()> {
    let len = capacity.checked_mul(record_size).ok_or_else(|| {
        PipelineError::BufferTooSmall(format!(
            "{} points of {} bytes overflow the address space",
            capacity, record_size
        ))
    })?;
    if len > data.len() {
        data.try_reserve_exact(len - data.len()).map_err(|e| {
            PipelineError::BufferTooSmall(format!(
                "cannot allocate {} points of {} bytes: {}",
                capacity, record_size, e
            ))
        })?;
    }
    data.resize(len, 0);
    Ok(())
}

/// Which X/Y/Z representation a layout carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CoordinateKind {
    /// f64 X/Y/Z.
    Float,
    /// i32 X/Y/Z, possibly scaled.
    Scaled,
}

/// Field indices of X, Y and (when present) Z, all of one representation,
/// preferring real-valued coordinates over scaled integers.
pub(crate) fn coordinate_fields(layout: &SchemaLayout) -> Option<(CoordinateKind, Vec<usize>)> {
    let sets = [
        (
            CoordinateKind::Float,
            [DimensionId::XF64, DimensionId::YF64, DimensionId::ZF64],
        ),
        (
            CoordinateKind::Scaled,
            [DimensionId::XI32, DimensionId::YI32, DimensionId::ZI32],
        ),
    ];
    for (kind, [x, y, z]) in sets {
        if let (Some(xi), Some(yi)) = (layout.dimension_index(x), layout.dimension_index(y)) {
            let mut fields = vec![xi, yi];
            if let Some(zi) = layout.dimension_index(z) {
                fields.push(zi);
            }
            return Some((kind, fields));
        }
    }
    None
}

impl fmt::Debug for PointBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointBuffer")
            .field("capacity", &self.capacity)
            .field("num_points", &self.num_points)
            .field("record_size", &self.layout.record_size())
            .field("fields", &self.layout.num_fields())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Dimension, DimensionFlags, Endianness};

    fn xyz_i32_schema(scale: f64) -> Schema {
        let mut schema = Schema::new();
        for id in [DimensionId::XI32, DimensionId::YI32, DimensionId::ZI32] {
            let mut dim = Dimension::new(id).unwrap();
            dim.set_numeric_scale(scale);
            schema.add_dimension(dim).unwrap();
        }
        schema
            .add_dimension(Dimension::new(DimensionId::Intensity).unwrap())
            .unwrap();
        schema
    }

    #[test]
    fn test_get_set() {
        let schema = xyz_i32_schema(0.01);
        let mut buf = PointBuffer::new(&schema, 4).unwrap();
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.layout().record_size(), 14);

        let intensity = buf.field_index(DimensionId::Intensity).unwrap();
        buf.set::<i32>(0, 0, 150).unwrap();
        buf.set::<u16>(0, intensity, 999).unwrap();
        buf.set_num_points(1).unwrap();

        assert_eq!(buf.get::<i32>(0, 0).unwrap(), 150);
        assert_eq!(buf.get::<u16>(0, intensity).unwrap(), 999);
        assert!((buf.get_scaled(0, 0).unwrap() - 1.5).abs() < 1e-12);
        assert_eq!(buf.get_scaled(0, intensity).unwrap(), 999.0);
    }

    #[test]
    fn test_index_checks() {
        let schema = xyz_i32_schema(0.01);
        let mut buf = PointBuffer::new(&schema, 2).unwrap();

        // slot 1 is writable but not yet readable
        buf.set::<i32>(1, 0, 5).unwrap();
        assert!(matches!(
            buf.get::<i32>(1, 0),
            Err(PipelineError::PointIndexOutOfRange { index: 1, limit: 0 })
        ));
        assert!(matches!(
            buf.set::<i32>(2, 0, 5),
            Err(PipelineError::PointIndexOutOfRange { index: 2, limit: 2 })
        ));
        assert!(buf.set::<i32>(0, 9, 5).is_err());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let schema = xyz_i32_schema(0.01);
        let mut buf = PointBuffer::new(&schema, 1).unwrap();
        assert!(matches!(buf.set::<i16>(0, 0, 5), Err(PipelineError::Schema(_))));
        assert!(matches!(buf.set::<f64>(0, 0, 5.0), Err(PipelineError::Schema(_))));
        // same width, different signedness is allowed
        buf.set::<u32>(0, 0, 7).unwrap();
    }

    #[test]
    fn test_coordinate_fields_never_mix_representations() {
        let full = Schema::from_ids(&[
            DimensionId::XI32,
            DimensionId::YI32,
            DimensionId::XF64,
            DimensionId::YF64,
        ])
        .unwrap();
        assert_eq!(
            coordinate_fields(&SchemaLayout::new(&full)),
            Some((CoordinateKind::Float, vec![2, 3]))
        );

        let mixed = Schema::from_ids(&[
            DimensionId::XF64,
            DimensionId::XI32,
            DimensionId::YI32,
            DimensionId::ZI32,
        ])
        .unwrap();
        assert_eq!(
            coordinate_fields(&SchemaLayout::new(&mixed)),
            Some((CoordinateKind::Scaled, vec![1, 2, 3]))
        );

        let lone = Schema::from_ids(&[DimensionId::XF64, DimensionId::YI32]).unwrap();
        assert_eq!(coordinate_fields(&SchemaLayout::new(&lone)), None);
    }

    #[test]
    fn test_oversized_allocation_is_an_error() {
        let schema = Schema::from_ids(&[DimensionId::XF64, DimensionId::YF64]).unwrap();
        assert!(matches!(
            PointBuffer::new(&schema, usize::MAX / 8),
            Err(PipelineError::BufferTooSmall(_))
        ));

        let mut buf = PointBuffer::new(&schema, 2).unwrap();
        buf.set_num_points(1).unwrap();
        assert!(matches!(
            buf.resize(usize::MAX / 4),
            Err(PipelineError::BufferTooSmall(_))
        ));
        assert_eq!(buf.capacity(), 2);
        assert_eq!(buf.num_points(), 1);
    }

    #[test]
    fn test_set_num_points_beyond_capacity() {
        let schema = xyz_i32_schema(0.01);
        let mut buf = PointBuffer::new(&schema, 3).unwrap();
        assert!(buf.set_num_points(3).is_ok());
        assert!(matches!(
            buf.set_num_points(4),
            Err(PipelineError::BufferTooSmall(_))
        ));
        assert_eq!(buf.num_points(), 3);
    }

    #[test]
    fn test_big_endian_storage() {
        let mut dim = Dimension::new(DimensionId::PointSourceId).unwrap();
        dim.set_endianness(Endianness::Big);
        let schema = Schema::from_dimensions([dim]).unwrap();
        let mut buf = PointBuffer::new(&schema, 1).unwrap();
        buf.set::<u16>(0, 0, 0x0102).unwrap();
        buf.set_num_points(1).unwrap();
        assert_eq!(buf.raw_point(0).unwrap(), &[0x01, 0x02]);
        assert_eq!(buf.get::<u16>(0, 0).unwrap(), 0x0102);
    }

    #[test]
    fn test_set_scaled_range() {
        let schema = xyz_i32_schema(0.01);
        let mut buf = PointBuffer::new(&schema, 1).unwrap();
        buf.set_scaled(0, 0, 12.34).unwrap();
        buf.set_num_points(1).unwrap();
        assert_eq!(buf.get::<i32>(0, 0).unwrap(), 1234);
        assert!(matches!(
            buf.set_scaled(0, 0, 1e12),
            Err(PipelineError::Range(_))
        ));
    }

    #[test]
    fn test_copy_point_fast_reproduces_bytes() {
        let schema = xyz_i32_schema(0.01);
        let mut src = PointBuffer::new(&schema, 3).unwrap();
        for i in 0..3 {
            src.set::<i32>(i, 0, i as i32 * 10).unwrap();
            src.set::<i32>(i, 1, -(i as i32)).unwrap();
            src.set::<i32>(i, 2, 12345).unwrap();
            src.set::<u16>(i, 3, 40 + i as u16).unwrap();
        }
        src.set_num_points(3).unwrap();

        let mut dst = PointBuffer::new(&schema, 5).unwrap();
        dst.copy_point_fast(4, 2, &src).unwrap();
        dst.copy_point_fast(0, 1, &src).unwrap();
        dst.set_num_points(5).unwrap();

        assert_eq!(dst.raw_point(4).unwrap(), src.raw_point(2).unwrap());
        assert_eq!(dst.raw_point(0).unwrap(), src.raw_point(1).unwrap());
        assert_eq!(dst.get::<u16>(4, 3).unwrap(), 42);
    }

    #[test]
    fn test_copy_point_fast_rejects_incompatible_layouts() {
        let a = xyz_i32_schema(0.01);
        let b =
            Schema::from_ids(&[DimensionId::XF64, DimensionId::YF64, DimensionId::ZF64]).unwrap();
        let mut src = PointBuffer::new(&a, 1).unwrap();
        src.set_num_points(1).unwrap();
        let mut dst = PointBuffer::new(&b, 1).unwrap();
        assert!(matches!(
            dst.copy_point_fast(0, 0, &src),
            Err(PipelineError::Schema(_))
        ));
    }

    #[test]
    fn test_copy_points_fast_range_checks() {
        let schema = xyz_i32_schema(0.01);
        let mut src = PointBuffer::new(&schema, 4).unwrap();
        src.set_num_points(4).unwrap();
        let mut dst = PointBuffer::new(&schema, 2).unwrap();
        assert!(dst.copy_points_fast(0, 0, &src, 2).is_ok());
        assert!(dst.copy_points_fast(1, 0, &src, 2).is_err());
        assert!(dst.copy_points_fast(0, 3, &src, 2).is_err());
    }

    #[test]
    fn test_ignored_dimension_not_addressable() {
        let mut schema = xyz_i32_schema(0.01);
        schema
            .dimension_mut(DimensionId::Intensity)
            .unwrap()
            .set_flags(DimensionFlags::IGNORED);
        let buf = PointBuffer::new(&schema, 1).unwrap();
        assert_eq!(buf.layout().record_size(), 12);
        assert!(buf.field_index(DimensionId::Intensity).is_err());
    }

    #[test]
    fn test_resize() {
        let schema = xyz_i32_schema(0.01);
        let mut buf = PointBuffer::new(&schema, 2).unwrap();
        buf.set::<i32>(1, 0, 77).unwrap();
        buf.set_num_points(2).unwrap();

        buf.resize(10).unwrap();
        assert_eq!(buf.capacity(), 10);
        assert_eq!(buf.get::<i32>(1, 0).unwrap(), 77);
        buf.set::<i32>(9, 0, 1).unwrap();

        buf.resize(1).unwrap();
        assert_eq!(buf.num_points(), 1);
    }

    #[test]
    fn test_calculate_bounds() {
        let schema = xyz_i32_schema(0.5);
        let mut buf = PointBuffer::new(&schema, 2).unwrap();
        assert!(buf.calculate_bounds().unwrap().is_none());

        buf.set::<i32>(0, 0, 2).unwrap();
        buf.set::<i32>(0, 1, -2).unwrap();
        buf.set::<i32>(0, 2, 0).unwrap();
        buf.set::<i32>(1, 0, 10).unwrap();
        buf.set::<i32>(1, 1, 4).unwrap();
        buf.set::<i32>(1, 2, 6).unwrap();
        buf.set_num_points(2).unwrap();

        let bounds = buf.calculate_bounds().unwrap().unwrap();
        assert_eq!(bounds, Bounds::new_3d(1.0, -1.0, 0.0, 5.0, 2.0, 3.0));
    }
}
