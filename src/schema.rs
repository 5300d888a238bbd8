//! Ordered dimension sets describing one point record.

use rustc_hash::FxHashMap;
use std::fmt;

use crate::dimension::{Dimension, DimensionFlags, DimensionId};
use crate::error::{PipelineError, Result};

/// An ordered collection of dimensions, unique by id.
///
/// Insertion order is the default layout order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    dimensions: Vec<Dimension>,
    /// id -> position in `dimensions`
    index: FxHashMap<DimensionId, usize>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from master-table ids, in the given order.
    pub fn from_ids(ids: &[DimensionId]) -> Result<Self> {
        let mut schema = Self::new();
        for &id in ids {
            schema.add_dimension(Dimension::new(id)?)?;
        }
        Ok(schema)
    }

    /// Build a schema from explicit dimensions, in the given order.
    pub fn from_dimensions<I>(dimensions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Dimension>,
    {
        let mut schema = Self::new();
        for dim in dimensions {
            schema.add_dimension(dim)?;
        }
        Ok(schema)
    }

    /// Append a dimension. Ids must be unique.
    pub fn add_dimension(&mut self, mut dimension: Dimension) -> Result<()> {
        let id = dimension.id();
        if self.index.contains_key(&id) {
            return Err(PipelineError::Schema(format!(
                "dimension {} is already part of the schema",
                id
            )));
        }
        let mut flags = dimension.flags();
        flags.insert(DimensionFlags::ADDED);
        dimension.set_flags(flags);

        self.index.insert(id, self.dimensions.len());
        self.dimensions.push(dimension);
        Ok(())
    }

    /// Remove a dimension, returning it.
    pub fn remove_dimension(&mut self, id: DimensionId) -> Result<Dimension> {
        let position = self.position(id)?;
        let removed = self.dimensions.remove(position);
        self.rebuild_index();
        Ok(removed)
    }

    /// Replace the dimension at the position of `id`, keeping the order.
    pub fn replace_dimension(&mut self, id: DimensionId, dimension: Dimension) -> Result<()> {
        let position = self.position(id)?;
        if dimension.id() != id && self.index.contains_key(&dimension.id()) {
            return Err(PipelineError::Schema(format!(
                "dimension {} is already part of the schema",
                dimension.id()
            )));
        }
        self.dimensions[position] = dimension;
        self.rebuild_index();
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, dim) in self.dimensions.iter().enumerate() {
            self.index.insert(dim.id(), i);
        }
    }

    fn position(&self, id: DimensionId) -> Result<usize> {
        self.index.get(&id).copied().ok_or_else(|| {
            PipelineError::Schema(format!("dimension {} not found in schema", id))
        })
    }

    #[inline]
    pub fn has_dimension(&self, id: DimensionId) -> bool {
        self.index.contains_key(&id)
    }

    /// Look up a dimension by id.
    pub fn dimension(&self, id: DimensionId) -> Result<&Dimension> {
        let position = self.position(id)?;
        Ok(&self.dimensions[position])
    }

    pub fn dimension_mut(&mut self, id: DimensionId) -> Result<&mut Dimension> {
        let position = self.position(id)?;
        Ok(&mut self.dimensions[position])
    }

    /// All dimensions in schema order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Dimensions that occupy space in a record (not flagged ignored).
    pub fn active_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter().filter(|d| !d.is_ignored())
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Packed size of one record built from this schema.
    pub fn record_size(&self) -> usize {
        self.active_dimensions().map(|d| d.byte_size()).sum()
    }

    /// Two schemas are layout-compatible when their active dimensions have
    /// the same ids, datatypes and byte order in the same order. Raw record
    /// copies are only valid between layout-compatible schemas.
    pub fn is_layout_compatible(&self, other: &Schema) -> bool {
        let mut a = self.active_dimensions();
        let mut b = other.active_dimensions();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if x.id() != y.id()
                        || x.datatype() != y.datatype()
                        || x.endianness() != y.endianness()
                    {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions == other.dimensions
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema ({} dimensions, {} bytes/point)", self.len(), self.record_size())?;
        for dim in &self.dimensions {
            writeln!(f, "  {}", dim)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DataType;

    #[test]
    fn test_add_and_lookup() {
        let schema =
            Schema::from_ids(&[DimensionId::XF64, DimensionId::YF64, DimensionId::ZF64]).unwrap();
        assert_eq!(schema.len(), 3);
        assert!(schema.has_dimension(DimensionId::YF64));
        assert!(!schema.has_dimension(DimensionId::XI32));
        assert_eq!(schema.dimension(DimensionId::ZF64).unwrap().name(), "Z");
        assert_eq!(schema.record_size(), 24);

        // insertion order is preserved
        let names: Vec<&str> = schema.dimensions().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_added_flag_is_set() {
        let schema = Schema::from_ids(&[DimensionId::Intensity]).unwrap();
        let dim = schema.dimension(DimensionId::Intensity).unwrap();
        assert!(dim.flags().contains(DimensionFlags::ADDED));
        assert!(dim.is_valid());
    }

    #[test]
    fn test_missing_dimension_is_schema_error() {
        let schema = Schema::new();
        assert!(matches!(
            schema.dimension(DimensionId::XI32),
            Err(PipelineError::Schema(_))
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut schema = Schema::from_ids(&[DimensionId::XI32]).unwrap();
        let err = schema
            .add_dimension(Dimension::new(DimensionId::XI32).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("already"));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut schema = Schema::from_ids(&[
            DimensionId::XI32,
            DimensionId::YI32,
            DimensionId::ZI32,
            DimensionId::Intensity,
        ])
        .unwrap();
        let removed = schema.remove_dimension(DimensionId::YI32).unwrap();
        assert_eq!(removed.id(), DimensionId::YI32);
        let ids: Vec<DimensionId> = schema.dimensions().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![DimensionId::XI32, DimensionId::ZI32, DimensionId::Intensity]);
        assert_eq!(schema.dimension(DimensionId::Intensity).unwrap().name(), "Intensity");
        assert!(schema.remove_dimension(DimensionId::YI32).is_err());
    }

    #[test]
    fn test_replace_dimension() {
        let mut schema = Schema::from_ids(&[DimensionId::XF64, DimensionId::Time]).unwrap();
        schema
            .replace_dimension(DimensionId::XF64, Dimension::new(DimensionId::XI32).unwrap())
            .unwrap();
        assert!(schema.has_dimension(DimensionId::XI32));
        assert!(!schema.has_dimension(DimensionId::XF64));
        assert_eq!(schema.dimensions()[0].id(), DimensionId::XI32);
    }

    #[test]
    fn test_layout_compatibility() {
        let a = Schema::from_ids(&[DimensionId::XI32, DimensionId::YI32]).unwrap();
        let b = Schema::from_ids(&[DimensionId::XI32, DimensionId::YI32]).unwrap();
        let c = Schema::from_ids(&[DimensionId::YI32, DimensionId::XI32]).unwrap();
        assert!(a.is_layout_compatible(&b));
        assert!(!a.is_layout_compatible(&c));

        // an ignored trailing dimension does not count
        let mut d =
            Schema::from_ids(&[DimensionId::XI32, DimensionId::YI32, DimensionId::Time]).unwrap();
        assert!(!a.is_layout_compatible(&d));
        d.dimension_mut(DimensionId::Time)
            .unwrap()
            .set_flags(DimensionFlags::IGNORED);
        assert!(a.is_layout_compatible(&d));

        let mut e = Schema::new();
        e.add_dimension(Dimension::with_type(DimensionId::XI32, DataType::Uint32, "X", ""))
            .unwrap();
        e.add_dimension(Dimension::new(DimensionId::YI32).unwrap()).unwrap();
        assert!(!a.is_layout_compatible(&e));
    }
}
