//! Error types for the anti-caching manager.

use thiserror::Error;

use crate::common::SegmentId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the eviction machinery.
///
/// Expected absence (loading an unknown segment, removing a segment that was
/// never stored) is *not* an error. Those paths return `Option`/`bool`.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a file-backed memory resource or the CSV export.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A memory resource cannot satisfy an allocation.
    ///
    /// No online resize exists, so this is fatal for the segment being moved.
    #[error("{resource} out of space: requested {requested} bytes, {available} bytes available")]
    OutOfSpace {
        resource: String,
        requested: usize,
        available: usize,
    },

    /// The allocation request itself was malformed (bad alignment, overflow).
    #[error("invalid allocation: {0}")]
    Allocation(String),

    /// A persistent pool file failed header or checksum verification.
    #[error("corrupted pool: {0}")]
    CorruptedPool(String),

    /// A relocated copy is larger than the configured sanity ceiling.
    ///
    /// This indicates an accounting bug or a broken configuration.
    #[error("segment {segment} has a footprint of {footprint} bytes, exceeding the ceiling of {ceiling} bytes")]
    FootprintExceeded {
        segment: SegmentId,
        footprint: usize,
        ceiling: usize,
    },

    /// The selection engine returned a set that does not fit the budget.
    #[error("selected segments use {cost} bytes, exceeding the memory budget of {budget} bytes")]
    BudgetExceeded { cost: u64, budget: u64 },

    /// The storage directory has no table with this name.
    #[error("table {0} not found")]
    TableNotFound(String),

    /// The table has no chunk with this index.
    #[error("chunk {chunk} not found in table {table}")]
    ChunkNotFound { table: String, chunk: u32 },

    /// The chunk has no column with this index.
    #[error("column {column} not found in chunk {chunk} of table {table}")]
    ColumnNotFound {
        table: String,
        chunk: u32,
        column: u16,
    },

    /// A registry handle does not name a known memory resource.
    #[error("memory resource handle {0} not found")]
    UnknownResource(usize),
}

impl Error {
    /// Whether this error signals a broken invariant rather than a failure
    /// local to one segment.
    ///
    /// Fatal errors abort the running eviction cycle and stop the background
    /// loop. Everything else is logged and the affected segment is skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FootprintExceeded { .. } | Error::BudgetExceeded { .. } | Error::CorruptedPool(_)
        )
    }
}
