use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{ChunkId, ColumnId};
use crate::storage::chunk::Chunk;
use crate::storage::segment::SegmentRef;

/// A table: named columns and an append-only list of chunks.
#[derive(Debug)]
pub struct Table {
    column_names: Vec<String>,
    chunks: RwLock<Vec<Arc<Chunk>>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<S: Into<String>>(column_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            column_names: column_names.into_iter().map(Into::into).collect(),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// Name of `column_id`.
    pub fn column_name(&self, column_id: ColumnId) -> Option<&str> {
        self.column_names.get(column_id.index()).map(String::as_str)
    }

    /// Number of chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// The chunk at `chunk_id`.
    pub fn get_chunk(&self, chunk_id: ChunkId) -> Option<Arc<Chunk>> {
        self.chunks.read().get(chunk_id.index()).cloned()
    }

    /// Snapshot of all chunks in id order.
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().clone()
    }

    /// Append an immutable chunk.
    ///
    /// # Panics
    /// Panics if the number of segments differs from the number of columns,
    /// or if the table has run out of chunk ids.
    pub fn append_chunk(&self, segments: Vec<SegmentRef>) -> ChunkId {
        self.push(Chunk::new(segments))
    }

    /// Append a chunk that still accepts appends.
    pub fn append_mutable_chunk(&self, segments: Vec<SegmentRef>) -> ChunkId {
        self.push(Chunk::new_mutable(segments))
    }

    fn push(&self, chunk: Chunk) -> ChunkId {
        assert_eq!(
            chunk.column_count(),
            self.column_count(),
            "chunk must hold one segment per column"
        );
        let mut chunks = self.chunks.write();
        let Some(chunk_id) = ChunkId::from_index(chunks.len()) else {
            panic!("table already holds the maximum number of chunks");
        };
        chunks.push(Arc::new(chunk));
        chunk_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::segment::ValueSegment;

    fn segment(values: &[i32]) -> SegmentRef {
        Arc::new(ValueSegment::new(values).unwrap())
    }

    #[test]
    fn test_append_and_get() {
        let table = Table::new(["a", "b"]);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.column_name(ColumnId(1)), Some("b"));
        assert_eq!(table.column_name(ColumnId(2)), None);

        let first = table.append_chunk(vec![segment(&[1]), segment(&[2])]);
        let second = table.append_mutable_chunk(vec![segment(&[3]), segment(&[4])]);
        assert_eq!(first, ChunkId(0));
        assert_eq!(second, ChunkId(1));
        assert_eq!(table.chunk_count(), 2);

        assert!(!table.get_chunk(first).unwrap().is_mutable());
        assert!(table.get_chunk(second).unwrap().is_mutable());
        assert!(table.get_chunk(ChunkId(2)).is_none());
    }

    #[test]
    #[should_panic(expected = "one segment per column")]
    fn test_append_wrong_width_panics() {
        let table = Table::new(["a", "b"]);
        table.append_chunk(vec![segment(&[1])]);
    }
}
