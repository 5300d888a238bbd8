// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]

//! pcpipe: a streaming point-cloud pipeline engine
//!
//! Points are packed records described by a [`Schema`] of typed
//! [`Dimension`]s. Stages pull fixed-capacity [`PointBuffer`]s from one
//! another, so a pipeline of any length runs in bounded memory.
//!
//! # Features
//!
//! - **Typed dimensions**: fixed-point scale/offset with checked descaling
//! - **Packed layouts**: byte offsets computed once per schema snapshot
//! - **Pull-based stages**: readers, filters and writers share one iterator
//!   protocol
//!
//! # Example
//!
//! ```rust,no_run
//! use pcpipe::prelude::*;
//!
//! let reader = FauxReader::new(
//!     Options::new()
//!         .with("bounds", "([0, 10], [0, 10], [0, 10])")
//!         .with("num_points", 1000),
//! );
//! let cube = Bounds::new_3d(0.0, 0.0, 0.0, 5.0, 5.0, 5.0);
//! let crop = CropFilter::with_bounds(Box::new(reader), cube);
//! let mut writer = Writer::new(Box::new(crop), MemoryWriter::new(), Options::none());
//! let stats = writer.write(None).unwrap();
//! println!("{}", stats);
//! ```

pub mod bounds;
pub mod buffer;
pub mod config;
pub mod dimension;
pub mod drivers;
pub mod error;
pub mod filters;
pub mod layout;
pub mod options;
pub mod schema;
pub mod stage;

// Re-export commonly used types
pub use bounds::Bounds;
pub use buffer::PointBuffer;
pub use dimension::{DataType, Dimension, DimensionId, Endianness};
pub use error::{PipelineError, Result};
pub use layout::SchemaLayout;
pub use options::Options;
pub use schema::Schema;
pub use stage::{PointSource, Stage, StageIterator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bounds::Bounds;
    pub use crate::buffer::PointBuffer;
    pub use crate::dimension::{DataType, Dimension, DimensionId, Endianness};
    pub use crate::drivers::{FauxReader, MemoryReader, MemoryWriter, TextReader, TextWriter};
    pub use crate::error::{PipelineError, Result};
    pub use crate::filters::{CropFilter, DecimationFilter, ScalingFilter};
    pub use crate::options::Options;
    pub use crate::schema::Schema;
    pub use crate::stage::{
        PointCount, PointSink, PointSource, RandomIterator, Stage, StageIterator, Writer,
    };
}
