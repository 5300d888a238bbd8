//! Primitive storage types for dimensions.
//!
//! Everything here is a pure function of the [`DataType`] enumeration;
//! the per-type facts live in a single table.

use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Storage type of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    /// Stored as 64 bits regardless of platform.
    Pointer,
    Float32,
    Float64,
    Undefined,
}

/// (type, name, size, numeric, signed, integer)
const DATA_TYPE_TABLE: &[(DataType, &str, usize, bool, bool, bool)] = &[
    (DataType::Int8, "Int8", 1, true, true, true),
    (DataType::Uint8, "Uint8", 1, true, false, true),
    (DataType::Int16, "Int16", 2, true, true, true),
    (DataType::Uint16, "Uint16", 2, true, false, true),
    (DataType::Int32, "Int32", 4, true, true, true),
    (DataType::Uint32, "Uint32", 4, true, false, true),
    (DataType::Int64, "Int64", 8, true, true, true),
    (DataType::Uint64, "Uint64", 8, true, false, true),
    (DataType::Pointer, "Pointer", 8, false, false, false),
    (DataType::Float32, "Float32", 4, true, true, false),
    (DataType::Float64, "Float64", 8, true, true, false),
    (DataType::Undefined, "Undefined", 0, false, false, false),
];

impl DataType {
    #[inline]
    fn entry(self) -> &'static (DataType, &'static str, usize, bool, bool, bool) {
        // The table is indexed by discriminant.
        &DATA_TYPE_TABLE[self as usize]
    }

    /// Symbolic name used in diagnostics.
    pub fn name(self) -> &'static str {
        self.entry().1
    }

    /// Number of bytes a value of this type occupies in a record.
    pub fn size(self) -> usize {
        self.entry().2
    }

    pub fn is_numeric(self) -> bool {
        self.entry().3
    }

    /// Only meaningful when [`is_numeric`](Self::is_numeric) is true.
    pub fn is_signed(self) -> bool {
        self.entry().4
    }

    /// Only meaningful when [`is_numeric`](Self::is_numeric) is true.
    pub fn is_integer(self) -> bool {
        self.entry().5
    }

    /// Look up a type by its symbolic name. `Float` and `Double` are
    /// accepted as aliases for the two floating types.
    pub fn from_name(name: &str) -> Option<DataType> {
        match name {
            "Float" => return Some(DataType::Float32),
            "Double" => return Some(DataType::Float64),
            _ => {}
        }
        DATA_TYPE_TABLE
            .iter()
            .find(|entry| entry.1 == name)
            .map(|entry| entry.0)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::from_name(s)
            .ok_or_else(|| PipelineError::SchemaParsing(format!("unknown datatype '{}'", s)))
    }
}

/// Byte order of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    pub fn name(self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endianness {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little" => Ok(Endianness::Little),
            "big" => Ok(Endianness::Big),
            other => Err(PipelineError::SchemaParsing(format!(
                "unknown endianness '{}'",
                other
            ))),
        }
    }
}

/// A Rust primitive that can be stored in a point record.
pub trait Field: Copy + PartialEq + fmt::Debug + 'static {
    /// Natural datatype for this primitive.
    const DATA_TYPE: DataType;
    /// Width in bytes.
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes.
    fn read_from(bytes: &[u8], endian: Endianness) -> Self;

    /// Encode into exactly `SIZE` bytes.
    fn write_to(self, bytes: &mut [u8], endian: Endianness);

    fn to_f64(self) -> f64;

    /// Convert an already-rounded real value, or `None` if it does not fit.
    fn from_f64_checked(value: f64) -> Option<Self>;
}

macro_rules! impl_integer_field {
    ($t:ty, $dt:expr, $n:expr) => {
        impl Field for $t {
            const DATA_TYPE: DataType = $dt;
            const SIZE: usize = $n;

            #[inline]
            fn read_from(bytes: &[u8], endian: Endianness) -> Self {
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&bytes[..$n]);
                match endian {
                    Endianness::Little => <$t>::from_le_bytes(raw),
                    Endianness::Big => <$t>::from_be_bytes(raw),
                }
            }

            #[inline]
            fn write_to(self, bytes: &mut [u8], endian: Endianness) {
                let raw = match endian {
                    Endianness::Little => self.to_le_bytes(),
                    Endianness::Big => self.to_be_bytes(),
                };
                bytes[..$n].copy_from_slice(&raw);
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64_checked(value: f64) -> Option<Self> {
                // MAX as f64 + 1.0 is exact for narrow types and rounds to
                // 2^63 / 2^64 for the 64-bit ones, so `<` is the right test.
                let lo = <$t>::MIN as f64;
                let hi = <$t>::MAX as f64 + 1.0;
                if value.is_finite() && value >= lo && value < hi {
                    Some(value as $t)
                } else {
                    None
                }
            }
        }
    };
}

macro_rules! impl_float_field {
    ($t:ty, $dt:expr, $n:expr) => {
        impl Field for $t {
            const DATA_TYPE: DataType = $dt;
            const SIZE: usize = $n;

            #[inline]
            fn read_from(bytes: &[u8], endian: Endianness) -> Self {
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&bytes[..$n]);
                match endian {
                    Endianness::Little => <$t>::from_le_bytes(raw),
                    Endianness::Big => <$t>::from_be_bytes(raw),
                }
            }

            #[inline]
            fn write_to(self, bytes: &mut [u8], endian: Endianness) {
                let raw = match endian {
                    Endianness::Little => self.to_le_bytes(),
                    Endianness::Big => self.to_be_bytes(),
                };
                bytes[..$n].copy_from_slice(&raw);
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64_checked(value: f64) -> Option<Self> {
                if value.is_finite() && value.abs() <= <$t>::MAX as f64 {
                    Some(value as $t)
                } else {
                    None
                }
            }
        }
    };
}

impl_integer_field!(i8, DataType::Int8, 1);
impl_integer_field!(u8, DataType::Uint8, 1);
impl_integer_field!(i16, DataType::Int16, 2);
impl_integer_field!(u16, DataType::Uint16, 2);
impl_integer_field!(i32, DataType::Int32, 4);
impl_integer_field!(u32, DataType::Uint32, 4);
impl_integer_field!(i64, DataType::Int64, 8);
impl_integer_field!(u64, DataType::Uint64, 8);
impl_float_field!(f32, DataType::Float32, 4);
impl_float_field!(f64, DataType::Float64, 8);

/// Decode the bytes of any numeric datatype as a real value.
///
/// Returns `None` for `Pointer` and `Undefined`.
pub fn read_as_f64(datatype: DataType, bytes: &[u8], endian: Endianness) -> Option<f64> {
    let value = match datatype {
        DataType::Int8 => i8::read_from(bytes, endian).to_f64(),
        DataType::Uint8 => u8::read_from(bytes, endian).to_f64(),
        DataType::Int16 => i16::read_from(bytes, endian).to_f64(),
        DataType::Uint16 => u16::read_from(bytes, endian).to_f64(),
        DataType::Int32 => i32::read_from(bytes, endian).to_f64(),
        DataType::Uint32 => u32::read_from(bytes, endian).to_f64(),
        DataType::Int64 => i64::read_from(bytes, endian).to_f64(),
        DataType::Uint64 => u64::read_from(bytes, endian).to_f64(),
        DataType::Float32 => f32::read_from(bytes, endian).to_f64(),
        DataType::Float64 => f64::read_from(bytes, endian),
        DataType::Pointer | DataType::Undefined => return None,
    };
    Some(value)
}

/// Encode a real value into the bytes of any numeric datatype.
///
/// Integer targets expect a value that is already rounded; `None` means the
/// value does not fit or the datatype is not numeric.
pub fn write_from_f64(
    datatype: DataType,
    value: f64,
    bytes: &mut [u8],
    endian: Endianness,
) -> Option<()> {
    match datatype {
        DataType::Int8 => i8::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Uint8 => u8::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Int16 => i16::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Uint16 => u16::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Int32 => i32::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Uint32 => u32::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Int64 => i64::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Uint64 => u64::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Float32 => f32::from_f64_checked(value)?.write_to(bytes, endian),
        DataType::Float64 => value.write_to(bytes, endian),
        DataType::Pointer | DataType::Undefined => return None,
    }
    Some(())
}
