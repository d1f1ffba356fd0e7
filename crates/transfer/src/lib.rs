//! Blob sources, windowed hashing, chunk planning and progress tracking.
//!
//! Nothing in this crate holds a whole blob in memory: sources hand out byte
//! ranges on demand, the hasher consumes fixed windows, and the planner only
//! produces offsets.

mod hash;
mod plan;
mod progress;
mod source;

pub use hash::{DEFAULT_HASH_WINDOW, HashEngine, checksum_bytes};
pub use plan::{ChunkIter, ChunkPlan, ChunkRange, plan};
pub use progress::{ProgressMeter, TransferProgress};
pub use source::{BlobSource, FileSource, MemorySource, range_stream};

/// Default chunk size: 8 MiB.
///
/// Servers may lower it through `Max-Chunk-Size` during negotiation.
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to read blob at offset {offset} while hashing: {source}")]
    HashRead {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk size must be positive")]
    InvalidChunkSize,
}
