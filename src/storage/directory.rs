//! The storage directory - every table the engine knows about.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{ChunkId, ColumnId, Error, Result, SegmentId};
use crate::storage::chunk::Chunk;
use crate::storage::segment::{Segment, SegmentRef};
use crate::storage::table::Table;

/// Named tables, iterated in name order.
///
/// # Thread Safety
/// The table map sits behind a `RwLock`. Iteration works on a snapshot of
/// the map, so callbacks may take as long as they need without blocking
/// `add_table`.
#[derive(Debug, Default)]
pub struct StorageDirectory {
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
}

impl StorageDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the table `name`.
    pub fn add_table(&self, name: impl Into<String>, table: Table) -> Arc<Table> {
        let name = name.into();
        let table = Arc::new(table);
        debug!(table = %name, columns = table.column_count(), "added table");
        self.tables.write().insert(name, Arc::clone(&table));
        table
    }

    /// Remove the table `name`. Returns whether it existed.
    pub fn drop_table(&self, name: &str) -> bool {
        self.tables.write().remove(name).is_some()
    }

    /// The table `name`.
    pub fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.read().get(name).cloned()
    }

    /// Snapshot of all tables in name order.
    pub fn tables(&self) -> Vec<(String, Arc<Table>)> {
        self.tables
            .read()
            .iter()
            .map(|(name, table)| (name.clone(), Arc::clone(table)))
            .collect()
    }

    /// Number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// The chunk holding segment `id`.
    ///
    /// # Errors
    /// `Error::TableNotFound` or `Error::ChunkNotFound`.
    pub fn chunk_for(&self, id: &SegmentId) -> Result<Arc<Chunk>> {
        let table = self
            .get_table(&id.table_name)
            .ok_or_else(|| Error::TableNotFound(id.table_name.clone()))?;
        table
            .get_chunk(id.chunk_id)
            .ok_or_else(|| Error::ChunkNotFound {
                table: id.table_name.clone(),
                chunk: id.chunk_id.0,
            })
    }

    /// The current segment `id`.
    pub fn segment(&self, id: &SegmentId) -> Result<SegmentRef> {
        self.chunk_for(id)?
            .get_segment(id.column_id)
            .ok_or_else(|| Error::ColumnNotFound {
                table: id.table_name.clone(),
                chunk: id.chunk_id.0,
                column: id.column_id.0,
            })
    }

    /// Visit every segment in (table name, chunk, column) order.
    ///
    /// Chunks that still accept appends are skipped unless
    /// `include_mutable` is set. Stops at the first error.
    pub fn try_for_each_segment<E, F>(
        &self,
        include_mutable: bool,
        mut visit: F,
    ) -> std::result::Result<(), E>
    where
        F: FnMut(SegmentId, &Arc<Chunk>, SegmentRef) -> std::result::Result<(), E>,
    {
        for (table_name, table) in self.tables() {
            for (chunk_index, chunk) in table.chunks().iter().enumerate() {
                if chunk.is_mutable() && !include_mutable {
                    continue;
                }
                let Some(chunk_id) = ChunkId::from_index(chunk_index) else {
                    break;
                };
                for column_index in 0..chunk.column_count() {
                    let Some(column_id) = ColumnId::from_index(column_index) else {
                        break;
                    };
                    let Some(segment) = chunk.get_segment(column_id) else {
                        continue;
                    };
                    let id = SegmentId::new(
                        table_name.as_str(),
                        chunk_id,
                        column_id,
                        table.column_name(column_id).unwrap_or_default(),
                    );
                    visit(id, chunk, segment)?;
                }
            }
        }
        Ok(())
    }

    /// Visit every segment; see [`StorageDirectory::try_for_each_segment`].
    pub fn for_each_segment<F>(&self, include_mutable: bool, mut visit: F)
    where
        F: FnMut(SegmentId, &Arc<Chunk>, SegmentRef),
    {
        let _ = self.try_for_each_segment::<(), _>(include_mutable, |id, chunk, segment| {
            visit(id, chunk, segment);
            Ok(())
        });
    }

    /// Zero the access counters of every segment, mutable chunks included.
    pub fn reset_access_counters(&self) {
        self.for_each_segment(true, |_, _, segment| segment.access_counter().reset());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::segment::ValueSegment;
    use crate::storage::AccessCategory;

    fn segment(values: &[i32]) -> SegmentRef {
        Arc::new(ValueSegment::new(values).unwrap())
    }

    fn directory() -> StorageDirectory {
        let directory = StorageDirectory::new();
        let orders = directory.add_table("orders", Table::new(["id", "amount"]));
        orders.append_chunk(vec![segment(&[1, 2]), segment(&[10, 20])]);
        orders.append_mutable_chunk(vec![segment(&[3]), segment(&[30])]);

        let items = directory.add_table("items", Table::new(["sku"]));
        items.append_chunk(vec![segment(&[7, 8, 9])]);
        directory
    }

    #[test]
    fn test_iteration_order_and_mutable_filter() {
        let directory = directory();

        let mut ids = Vec::new();
        directory.for_each_segment(false, |id, _, _| ids.push(id.to_string()));
        assert_eq!(
            ids,
            vec![
                "items.sku (chunk_id: 0, column_id: 0)",
                "orders.id (chunk_id: 0, column_id: 0)",
                "orders.amount (chunk_id: 0, column_id: 1)",
            ]
        );

        let mut count = 0;
        directory.for_each_segment(true, |_, _, _| count += 1);
        assert_eq!(count, 5);
    }

    #[test]
    fn test_try_for_each_stops_at_error() {
        let directory = directory();
        let mut visited = 0;
        let result = directory.try_for_each_segment(false, |_, _, _| {
            visited += 1;
            if visited == 2 {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_lookup() {
        let directory = directory();
        let id = SegmentId::new("orders", ChunkId(0), ColumnId(1), "amount");
        assert_eq!(directory.segment(&id).unwrap().to_vec(), vec![10, 20]);

        let missing_table = SegmentId::new("nope", ChunkId(0), ColumnId(0), "x");
        assert!(matches!(
            directory.segment(&missing_table),
            Err(Error::TableNotFound(_))
        ));

        let missing_chunk = SegmentId::new("orders", ChunkId(9), ColumnId(0), "id");
        assert!(matches!(
            directory.chunk_for(&missing_chunk),
            Err(Error::ChunkNotFound { chunk: 9, .. })
        ));

        let missing_column = SegmentId::new("orders", ChunkId(0), ColumnId(5), "x");
        assert!(matches!(
            directory.segment(&missing_column),
            Err(Error::ColumnNotFound { column: 5, .. })
        ));
    }

    #[test]
    fn test_reset_access_counters() {
        let directory = directory();
        let id = SegmentId::new("items", ChunkId(0), ColumnId(0), "sku");
        let segment = directory.segment(&id).unwrap();
        segment.access_counter().record(AccessCategory::Point, 5);

        directory.reset_access_counters();
        assert_eq!(segment.access_counter().snapshot().total(), 0);
    }

    #[test]
    fn test_drop_table() {
        let directory = directory();
        assert!(directory.drop_table("items"));
        assert!(!directory.drop_table("items"));
        assert_eq!(directory.table_count(), 1);
    }
}
