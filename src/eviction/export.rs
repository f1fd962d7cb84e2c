//! CSV export of the statistics history.
//!
//! Two files are written. The meta file has one row per segment:
//! ```text
//! entry_id,table_name,column_name,chunk_id,row_count,memory_usage
//! 0,orders,o_price,0,65535,262144
//! ```
//! and the statistics file has one row per segment per snapshot, keyed by
//! the same entry id:
//! ```text
//! entry_id,elapsed_ms,resident,point,sequential,monotonic,random,dictionary
//! 0,10000,1,12,3,0,0,0
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::common::{Result, SegmentId};
use crate::eviction::TimestampedStatistics;
use crate::storage::AccessCounts;

pub const META_HEADERS: &str = "entry_id,table_name,column_name,chunk_id,row_count,memory_usage";

/// Header of the statistics file.
pub fn statistics_headers() -> String {
    format!("entry_id,elapsed_ms,resident,{}", AccessCounts::HEADERS)
}

/// Quote a field holding a separator, quote or line break.
fn escape_csv(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Write both CSV streams for `history`.
///
/// Entry ids are assigned in the order segments first appear. Elapsed time
/// is measured from `since`. Returns the number of distinct segments.
pub fn write_access_statistics<M: Write, S: Write>(
    history: &TimestampedStatistics,
    since: Instant,
    meta: &mut M,
    statistics: &mut S,
) -> Result<usize> {
    let mut entry_ids: HashMap<&SegmentId, usize> = HashMap::new();

    writeln!(meta, "{}", META_HEADERS)?;
    writeln!(statistics, "{}", statistics_headers())?;

    for (timestamp, infos) in history.iter() {
        let elapsed_ms = timestamp.saturating_duration_since(since).as_millis();
        for info in infos {
            let next_id = entry_ids.len();
            let entry_id = *entry_ids.entry(&info.segment_id).or_insert(next_id);
            if entry_id == next_id {
                let id = &info.segment_id;
                writeln!(
                    meta,
                    "{},{},{},{},{},{}",
                    entry_id,
                    escape_csv(&id.table_name),
                    escape_csv(&id.column_name),
                    id.chunk_id.0,
                    info.row_count,
                    info.memory_usage
                )?;
            }
            writeln!(
                statistics,
                "{},{},{},{}",
                entry_id,
                elapsed_ms,
                u8::from(info.resident),
                info.access_counts.to_csv()
            )?;
        }
    }

    meta.flush()?;
    statistics.flush()?;
    Ok(entry_ids.len())
}

/// Write the meta and statistics CSV files, replacing existing files.
pub fn export_access_statistics<P: AsRef<Path>, Q: AsRef<Path>>(
    history: &TimestampedStatistics,
    since: Instant,
    meta_path: P,
    statistics_path: Q,
) -> Result<usize> {
    let mut meta = BufWriter::new(File::create(meta_path.as_ref())?);
    let mut statistics = BufWriter::new(File::create(statistics_path.as_ref())?);

    let segments = write_access_statistics(history, since, &mut meta, &mut statistics)?;
    info!(
        segments,
        snapshots = history.len(),
        meta = %meta_path.as_ref().display(),
        statistics = %statistics_path.as_ref().display(),
        "exported access statistics"
    );
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChunkId, ColumnId};
    use crate::eviction::SegmentInfo;
    use crate::storage::SegmentKind;
    use std::time::Duration;

    fn info(chunk: u32, point: u64) -> SegmentInfo {
        SegmentInfo {
            segment_id: SegmentId::new("orders", ChunkId(chunk), ColumnId(1), "o_price"),
            memory_usage: 400,
            row_count: 100,
            access_counts: AccessCounts {
                point,
                ..Default::default()
            },
            kind: SegmentKind::Unencoded,
            resident: chunk == 0,
        }
    }

    #[test]
    fn test_writes_meta_once_per_segment() {
        let start = Instant::now();
        let mut history = TimestampedStatistics::new(4);
        history.push(start + Duration::from_millis(10), vec![info(0, 1), info(1, 2)]);
        history.push(start + Duration::from_millis(20), vec![info(0, 5), info(1, 2)]);

        let mut meta = Vec::new();
        let mut statistics = Vec::new();
        let segments =
            write_access_statistics(&history, start, &mut meta, &mut statistics).unwrap();
        assert_eq!(segments, 2);

        let meta = String::from_utf8(meta).unwrap();
        let lines: Vec<&str> = meta.lines().collect();
        assert_eq!(
            lines,
            vec![META_HEADERS, "0,orders,o_price,0,100,400", "1,orders,o_price,1,100,400"]
        );

        let statistics = String::from_utf8(statistics).unwrap();
        let lines: Vec<&str> = statistics.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], statistics_headers());
        assert_eq!(lines[1], "0,10,1,1,0,0,0,0");
        assert_eq!(lines[4], "1,20,0,2,0,0,0,0");
    }

    #[test]
    fn test_names_with_separators_are_quoted() {
        let mut odd = info(0, 1);
        odd.segment_id = SegmentId::new("sales, 2024", ChunkId(0), ColumnId(0), "price \"net\"");
        let mut history = TimestampedStatistics::new(1);
        history.push(Instant::now(), vec![odd]);

        let mut meta = Vec::new();
        let mut statistics = Vec::new();
        write_access_statistics(&history, Instant::now(), &mut meta, &mut statistics).unwrap();
        assert_eq!(String::from_utf8(statistics).unwrap().lines().count(), 2);
        let meta = String::from_utf8(meta).unwrap();
        assert_eq!(
            meta.lines().nth(1).unwrap(),
            r#"0,"sales, 2024","price ""net""",0,100,400"#
        );
        assert_eq!(escape_csv("o_price"), "o_price");
    }

    #[test]
    fn test_export_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let meta_path = dir.path().join("meta.csv");
        let statistics_path = dir.path().join("statistics.csv");

        let mut history = TimestampedStatistics::new(2);
        history.push(Instant::now(), vec![info(3, 7)]);
        export_access_statistics(&history, Instant::now(), &meta_path, &statistics_path).unwrap();

        let meta = std::fs::read_to_string(&meta_path).unwrap();
        assert!(meta.ends_with("0,orders,o_price,3,100,400\n"));
        let statistics = std::fs::read_to_string(&statistics_path).unwrap();
        // Timestamp predates `since`, elapsed saturates to zero
        assert!(statistics.ends_with("0,0,0,7,0,0,0,0\n"));
    }

    #[test]
    fn test_empty_history_writes_headers() {
        let history = TimestampedStatistics::new(1);
        let mut meta = Vec::new();
        let mut statistics = Vec::new();
        let segments =
            write_access_statistics(&history, Instant::now(), &mut meta, &mut statistics).unwrap();
        assert_eq!(segments, 0);
        assert_eq!(String::from_utf8(meta).unwrap().lines().count(), 1);
    }
}
