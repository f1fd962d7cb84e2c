//! Common types and utilities shared across the crate.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and the configuration file
//! - Error types
//! - Identifiers (ChunkId, ColumnId, SegmentId)

pub mod config;
pub mod error;
mod ids;
mod segment_id;

pub use config::{AntiCachingConfig, MemoryResourceType};
pub use error::{Error, Result};
pub use ids::{ChunkId, ColumnId};
pub use segment_id::SegmentId;
