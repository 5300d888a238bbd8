//! Readers and sinks at the two ends of a pipeline.

pub mod faux;
pub mod memory;
pub mod text;

pub use faux::{FauxMode, FauxReader};
pub use memory::{MemoryReader, MemoryWriter};
pub use text::{TextReader, TextWriter};
