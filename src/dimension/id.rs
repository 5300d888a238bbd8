//! Stable dimension identifiers and the master dimension table.

use std::fmt;

use super::datatype::DataType;

/// Identity of a dimension.
///
/// Well-known dimensions carry their storage type in the name (`XI32`
/// versus `XF64`), so a schema can hold both representations of a
/// coordinate at once. `Custom` identifies fields that are not in the
/// master table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimensionId {
    XI32,
    YI32,
    ZI32,
    XF64,
    YF64,
    ZF64,
    Intensity,
    ReturnNumber,
    NumberOfReturns,
    ScanDirectionFlag,
    EdgeOfFlightLine,
    Classification,
    ScanAngleRank,
    UserData,
    PointSourceId,
    Time,
    Red,
    Green,
    Blue,
    Custom(u32),
}

/// One row of the master table.
#[derive(Debug, Clone, Copy)]
pub struct DimensionInfo {
    pub id: DimensionId,
    pub name: &'static str,
    pub datatype: DataType,
    pub description: &'static str,
}

macro_rules! master_entry {
    ($id:ident, $name:expr, $dt:ident, $desc:expr) => {
        DimensionInfo {
            id: DimensionId::$id,
            name: $name,
            datatype: DataType::$dt,
            description: $desc,
        }
    };
}

static MASTER_TABLE: &[DimensionInfo] = &[
    master_entry!(
        XI32,
        "X",
        Int32,
        "x coordinate as a scaled integer; scale and offset give the real value"
    ),
    master_entry!(
        YI32,
        "Y",
        Int32,
        "y coordinate as a scaled integer; scale and offset give the real value"
    ),
    master_entry!(
        ZI32,
        "Z",
        Int32,
        "z coordinate as a scaled integer; scale and offset give the real value"
    ),
    master_entry!(XF64, "X", Float64, "x coordinate as a double"),
    master_entry!(YF64, "Y", Float64, "y coordinate as a double"),
    master_entry!(ZF64, "Z", Float64, "z coordinate as a double"),
    master_entry!(
        Intensity,
        "Intensity",
        Uint16,
        "integer representation of the pulse return magnitude"
    ),
    master_entry!(
        ReturnNumber,
        "ReturnNumber",
        Uint8,
        "pulse return number for a given output pulse"
    ),
    master_entry!(
        NumberOfReturns,
        "NumberOfReturns",
        Uint8,
        "total number of returns for a given pulse"
    ),
    master_entry!(
        ScanDirectionFlag,
        "ScanDirectionFlag",
        Uint8,
        "direction of the scanner mirror at the time of the output pulse"
    ),
    master_entry!(
        EdgeOfFlightLine,
        "EdgeOfFlightLine",
        Uint8,
        "set when the point is at the end of a scan"
    ),
    master_entry!(Classification, "Classification", Uint8, "ASPRS classification of the point"),
    master_entry!(
        ScanAngleRank,
        "ScanAngleRank",
        Int8,
        "angle, rounded to the nearest integer, of the output of the laser pulse"
    ),
    master_entry!(UserData, "UserData", Uint8, "free field for user-specific data"),
    master_entry!(
        PointSourceId,
        "PointSourceId",
        Uint16,
        "file source id from which this point originated"
    ),
    master_entry!(Time, "Time", Float64, "GPS time at which the point was acquired"),
    master_entry!(Red, "Red", Uint16, "red image channel value"),
    master_entry!(Green, "Green", Uint16, "green image channel value"),
    master_entry!(Blue, "Blue", Uint16, "blue image channel value"),
];

impl DimensionId {
    /// Master-table entry, or `None` for custom ids.
    pub fn info(self) -> Option<&'static DimensionInfo> {
        MASTER_TABLE.iter().find(|info| info.id == self)
    }

    /// All ids in the master table, in table order.
    pub fn well_known() -> impl Iterator<Item = DimensionId> {
        MASTER_TABLE.iter().map(|info| info.id)
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.info() {
            Some(info) => write!(f, "{} ({})", info.name, info.datatype),
            None => match self {
                DimensionId::Custom(n) => write!(f, "custom#{}", n),
                other => write!(f, "{:?}", other),
            },
        }
    }
}
