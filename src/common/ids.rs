//! Chunk and column identifier types.
//!
//! Both are plain index newtypes. A chunk is a horizontal partition of a
//! table; a column index picks one segment within a chunk:
//! ```text
//!              ColumnId(0)  ColumnId(1)
//! ChunkId(0) ┌───────────┬───────────┐
//!            │  segment  │  segment  │
//! ChunkId(1) ├───────────┼───────────┤
//!            │  segment  │  segment  │
//!            └───────────┴───────────┘
//! ```

use std::fmt;

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident($repr:ty), $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub $repr);

        impl $name {
            /// Sentinel for "no such index".
            pub const INVALID: $name = $name(<$repr>::MAX);

            #[inline]
            pub const fn new(id: $repr) -> Self {
                $name(id)
            }

            /// Convert a container position, failing on overflow.
            #[inline]
            pub fn from_index(index: usize) -> Option<Self> {
                <$repr>::try_from(index)
                    .ok()
                    .map($name)
                    .filter(Self::is_valid)
            }

            #[inline]
            pub fn is_valid(&self) -> bool {
                *self != Self::INVALID
            }

            /// Position in the owning container.
            #[inline]
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl From<$repr> for $name {
            fn from(id: $repr) -> Self {
                $name(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!($label, "({})"), self.0)
                } else {
                    f.write_str(concat!($label, "(INVALID)"))
                }
            }
        }
    };
}

index_id!(
    /// Index of a chunk within a table. Chunks are appended, never reordered,
    /// so the index is stable for the table's lifetime.
    ///
    /// # Example
    /// ```
    /// use anticache::ChunkId;
    ///
    /// let chunk_id = ChunkId::from_index(42).unwrap();
    /// assert_eq!(chunk_id, ChunkId::new(42));
    /// assert_eq!(chunk_id.to_string(), "Chunk(42)");
    /// ```
    ChunkId(u32),
    "Chunk"
);

index_id!(
    /// Index of a column within a table, and of its segment within a chunk.
    ColumnId(u16),
    "Column"
);
