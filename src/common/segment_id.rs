//! Segment identifier type.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::common::{ChunkId, ColumnId};

/// Identifies one segment: the data of one column within one chunk of a table.
///
/// `SegmentId` is the key of every map in the eviction machinery. Equality,
/// hashing and ordering only look at `(table_name, chunk_id, column_id)`.
/// `column_name` is carried along for log lines and the statistics export but
/// is not part of the identity.
///
/// # Example
/// ```
/// use anticache::{ChunkId, ColumnId, SegmentId};
///
/// let a = SegmentId::new("orders", ChunkId::new(3), ColumnId::new(1), "o_total");
/// let b = SegmentId::new("orders", ChunkId::new(3), ColumnId::new(1), "renamed");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct SegmentId {
    pub table_name: String,
    pub chunk_id: ChunkId,
    pub column_id: ColumnId,
    pub column_name: String,
}

impl SegmentId {
    /// Create a new SegmentId.
    pub fn new(
        table_name: impl Into<String>,
        chunk_id: ChunkId,
        column_id: ColumnId,
        column_name: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            chunk_id,
            column_id,
            column_name: column_name.into(),
        }
    }

    fn key(&self) -> (&str, ChunkId, ColumnId) {
        (&self.table_name, self.chunk_id, self.column_id)
    }
}

impl PartialEq for SegmentId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SegmentId {}

impl Hash for SegmentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for SegmentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} (chunk_id: {}, column_id: {})",
            self.table_name, self.column_name, self.chunk_id.0, self.column_id.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn id(table: &str, chunk: u32, column: u16, name: &str) -> SegmentId {
        SegmentId::new(table, ChunkId::new(chunk), ColumnId::new(column), name)
    }

    #[test]
    fn test_column_name_is_not_identity() {
        assert_eq!(id("t", 1, 2, "a"), id("t", 1, 2, "b"));
        assert_ne!(id("t", 1, 2, "a"), id("t", 1, 3, "a"));
        assert_ne!(id("t", 1, 2, "a"), id("t", 2, 2, "a"));
        assert_ne!(id("t", 1, 2, "a"), id("u", 1, 2, "a"));
    }

    #[test]
    fn test_hash_ignores_column_name() {
        let mut set = HashSet::new();
        set.insert(id("t", 0, 0, "first"));
        assert!(!set.insert(id("t", 0, 0, "second")));
        assert_eq!(set.len(), 1);

        let mut map = HashMap::new();
        map.insert(id("t", 0, 0, "x"), 1);
        assert_eq!(map.get(&id("t", 0, 0, "y")), Some(&1));
    }

    #[test]
    fn test_ordering() {
        let mut ids = vec![id("b", 0, 0, ""), id("a", 1, 0, ""), id("a", 0, 1, ""), id("a", 0, 0, "")];
        ids.sort();
        assert_eq!(
            ids,
            vec![id("a", 0, 0, ""), id("a", 0, 1, ""), id("a", 1, 0, ""), id("b", 0, 0, "")]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            format!("{}", id("orders", 3, 1, "o_total")),
            "orders.o_total (chunk_id: 3, column_id: 1)"
        );
    }
}
