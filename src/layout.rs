//! Byte layout of packed point records.

use rustc_hash::FxHashMap;

use crate::dimension::{DataType, Dimension, DimensionId, Endianness};
use crate::error::{PipelineError, Result};
use crate::schema::Schema;

/// Placement of one active dimension inside a record.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionLayout {
    dimension: Dimension,
    byte_offset: usize,
    position: usize,
}

impl DimensionLayout {
    #[inline]
    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    /// Offset of the field from the start of the record.
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Field index of this dimension within the layout.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.dimension.byte_size()
    }
}

/// Offsets of every active dimension of a schema snapshot.
///
/// Ignored dimensions take no space. Offsets are packed without padding in
/// schema order, so they tile `[0, record_size)` exactly.
#[derive(Debug, Clone)]
pub struct SchemaLayout {
    schema: Schema,
    dimensions: Vec<DimensionLayout>,
    index: FxHashMap<DimensionId, usize>,
    /// (id, datatype, endianness) of every active dimension, in order.
    signature: Vec<(DimensionId, DataType, Endianness)>,
    record_size: usize,
}

impl SchemaLayout {
    /// Compute the layout of a schema. The schema is copied; later edits to
    /// the original do not reach this layout.
    pub fn new(schema: &Schema) -> Self {
        let mut dimensions = Vec::with_capacity(schema.len());
        let mut index = FxHashMap::default();
        let mut signature = Vec::with_capacity(schema.len());
        let mut offset = 0usize;

        for dim in schema.active_dimensions() {
            let position = dimensions.len();
            index.insert(dim.id(), position);
            signature.push((dim.id(), dim.datatype(), dim.endianness()));
            dimensions.push(DimensionLayout {
                dimension: dim.clone(),
                byte_offset: offset,
                position,
            });
            offset += dim.byte_size();
        }

        Self {
            schema: schema.clone(),
            dimensions,
            index,
            signature,
            record_size: offset,
        }
    }

    /// The schema snapshot this layout was computed from.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Number of active dimensions.
    #[inline]
    pub fn num_fields(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimension_layouts(&self) -> &[DimensionLayout] {
        &self.dimensions
    }

    #[inline]
    pub fn dimension_layout(&self, field: usize) -> Option<&DimensionLayout> {
        self.dimensions.get(field)
    }

    /// Field index of an active dimension.
    #[inline]
    pub fn dimension_index(&self, id: DimensionId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Field index of an active dimension, or a schema error.
    pub fn require_dimension_index(&self, id: DimensionId) -> Result<usize> {
        self.dimension_index(id).ok_or_else(|| {
            PipelineError::Schema(format!("dimension {} is not active in this layout", id))
        })
    }

    /// Whether raw records built with `other` can be copied into records
    /// built with this layout.
    #[inline]
    pub fn is_compatible(&self, other: &SchemaLayout) -> bool {
        self.signature == other.signature
    }

    /// Whether this layout still describes `schema`. A layout is stale as
    /// soon as the active dimension set, order or types change.
    pub fn is_current_for(&self, schema: &Schema) -> bool {
        let mut active = schema.active_dimensions();
        for entry in &self.dimensions {
            match active.next() {
                Some(dim)
                    if dim.id() == entry.dimension.id()
                        && dim.datatype() == entry.dimension.datatype()
                        && dim.endianness() == entry.dimension.endianness() => {}
                _ => return false,
            }
        }
        active.next().is_none()
    }
}

impl PartialEq for SchemaLayout {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.dimensions == other.dimensions
    }
}
