//! Sizing defaults for streaming execution.
//!
//! These constants control memory usage vs throughput tradeoffs. A chunk is
//! the number of points a writer or filter pulls per `read` call.

/// Default chunk size (65536 points).
/// At 20-40 bytes per record this keeps a chunk in the low megabytes.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Low-memory chunk size (4096 points).
pub const LOW_MEMORY_CHUNK_SIZE: usize = 4 * 1024;

/// Files at least this large are memory-mapped instead of read into memory.
pub const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Output buffer for text sinks (2 MB).
pub const DEFAULT_OUTPUT_BUFFER: usize = 2 * 1024 * 1024;

/// Returns the appropriate chunk size based on the low_memory flag.
#[inline]
pub const fn chunk_size(low_memory: bool) -> usize {
    if low_memory {
        LOW_MEMORY_CHUNK_SIZE
    } else {
        DEFAULT_CHUNK_SIZE
    }
}
