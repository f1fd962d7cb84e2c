//! Storage layer - the tables, chunks and segments that eviction works on.
//!
//! # Hierarchy
//! ```text
//! StorageDirectory
//!   └── Table ("orders")
//!         ├── Chunk 0 ──┬── Segment (column 0)
//!         │             └── Segment (column 1)
//!         └── Chunk 1 ──┬── Segment (column 0)
//!                       └── Segment (column 1)
//! ```
//!
//! Every segment carries a [`SegmentAccessCounter`] that query code bumps
//! through the recorded accessors on [`Segment`].

mod access_counter;
mod chunk;
mod directory;
pub mod segment;
mod table;

pub use access_counter::{AccessCategory, AccessCounts, SegmentAccessCounter};
pub use chunk::Chunk;
pub use directory::StorageDirectory;
pub use segment::{
    DictionarySegment, MemoryUsageMode, RunLengthSegment, Segment, SegmentKind, SegmentRef,
    ValueSegment,
};
pub use table::Table;
