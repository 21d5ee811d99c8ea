//! Buffered, partitioned Parquet writer.
//!
//! Rows are buffered per `(dataset_id, domain_prefix)` partition. A
//! partition flushes when its estimated buffered bytes reach
//! `partition_buffer_size`; when the sum across partitions exceeds
//! `global_buffer_limit`, the largest buffer is force-flushed to bound
//! memory. `flush_all` drains everything (call it before dropping the
//! writer).
//!
//! Each flush finalizes one `part-NNNNN.parquet`: the batch is written to a
//! dot-prefixed temp file and renamed into place, so a crash can never leave
//! a partially written file under a final part name. Recovery after a crash
//! is simply re-running ingestion.
//!
//! Parquet settings: ZSTD payload compression at the configured level,
//! dictionary encoding for the string columns, row groups sized toward
//! ~128 MiB of uncompressed rows.

use arrow::array::{ArrayRef, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, UrlakeError};
use crate::storage::layout::StorageLayout;

/// Target uncompressed bytes per row group.
pub const ROW_GROUP_TARGET_BYTES: usize = 128 * 1024 * 1024;

const MIN_ROWS_PER_GROUP: usize = 1_000;
const MAX_ROWS_PER_GROUP: usize = 1_000_000;

/// One normalized URL row as stored in the lake.
///
/// `dataset_id` and `domain_prefix` are not part of the row body; they are
/// encoded in the file's directory path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRow {
    /// xxh3-64 of the registrable domain (ingest-time identity).
    pub domain_id: u64,
    /// xxh3-64 of the raw URL bytes.
    pub url_id: u64,
    pub scheme: String,
    pub host: String,
    pub path_query: String,
    pub domain: String,
}

impl UrlRow {
    /// Rough uncompressed size used for buffer accounting.
    fn estimated_bytes(&self) -> usize {
        16 + self.scheme.len() + self.host.len() + self.path_query.len() + self.domain.len()
    }
}

/// Statistics from one or more flushes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub files_written: usize,
    pub rows_written: usize,
}

impl FlushStats {
    fn absorb(&mut self, other: FlushStats) {
        self.files_written += other.files_written;
        self.rows_written += other.rows_written;
    }
}

#[derive(Debug, Default)]
struct PartitionBuffer {
    rows: Vec<UrlRow>,
    bytes: usize,
}

/// Buffered writer over all partitions of the lake.
pub struct PartitionedWriter {
    layout: StorageLayout,
    partition_buffer_size: usize,
    global_buffer_limit: usize,
    compression_level: i32,
    buffers: HashMap<(u32, String), PartitionBuffer>,
    total_buffered: usize,
}

impl PartitionedWriter {
    pub fn new(config: &Config) -> Self {
        PartitionedWriter {
            layout: StorageLayout::new(&config.base_path),
            partition_buffer_size: config.partition_buffer_size,
            global_buffer_limit: config.global_buffer_limit,
            compression_level: config.compression_level,
            buffers: HashMap::new(),
            total_buffered: 0,
        }
    }

    /// Buffer one row under its partition, flushing as thresholds demand.
    pub fn append(&mut self, dataset_id: u32, domain_prefix: &str, row: UrlRow) -> Result<FlushStats> {
        let bytes = row.estimated_bytes();
        let key = (dataset_id, domain_prefix.to_string());
        let buffer = self.buffers.entry(key.clone()).or_default();
        buffer.rows.push(row);
        buffer.bytes += bytes;
        self.total_buffered += bytes;

        let mut stats = FlushStats::default();
        let partition_full =
            self.partition_buffer_size == 0 || buffer.bytes >= self.partition_buffer_size;
        if partition_full {
            stats.absorb(self.flush_partition(&key)?);
        }

        // Global ceiling: evict the largest buffer until back under.
        while self.global_buffer_limit > 0 && self.total_buffered > self.global_buffer_limit {
            let Some(largest) = self
                .buffers
                .iter()
                .filter(|(_, b)| !b.rows.is_empty())
                .max_by_key(|(_, b)| b.bytes)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            log::info!(
                "global buffer limit exceeded ({} bytes), force-flushing partition dataset_id={} prefix={}",
                self.total_buffered,
                largest.0,
                largest.1
            );
            stats.absorb(self.flush_partition(&largest)?);
        }

        Ok(stats)
    }

    /// Flush every buffered partition.
    pub fn flush_all(&mut self) -> Result<FlushStats> {
        let keys: Vec<_> = self.buffers.keys().cloned().collect();
        let mut stats = FlushStats::default();
        for key in keys {
            stats.absorb(self.flush_partition(&key)?);
        }
        Ok(stats)
    }

    /// Bytes currently buffered across all partitions.
    pub fn buffered_bytes(&self) -> usize {
        self.total_buffered
    }

    fn flush_partition(&mut self, key: &(u32, String)) -> Result<FlushStats> {
        let Some(buffer) = self.buffers.remove(key) else {
            return Ok(FlushStats::default());
        };
        if buffer.rows.is_empty() {
            return Ok(FlushStats::default());
        }
        self.total_buffered -= buffer.bytes;

        let (dataset_id, domain_prefix) = (key.0, key.1.as_str());
        self.layout.ensure_partition(dataset_id, domain_prefix)?;
        let part_number = self.layout.next_part_number(dataset_id, domain_prefix)?;
        let final_path = self.layout.part_path(dataset_id, domain_prefix, part_number);
        let tmp_path = final_path.with_file_name(format!(".part-{:05}.parquet.tmp", part_number));

        let rows_written = buffer.rows.len();
        let rows_per_group = rows_per_group(&buffer.rows, buffer.bytes);
        write_parquet(&tmp_path, &buffer.rows, self.compression_level, rows_per_group)?;
        fs::rename(&tmp_path, &final_path)
            .map_err(|e| UrlakeError::io(&final_path, "finalize part file", e))?;

        log::info!(
            "wrote {} rows to {}",
            rows_written,
            final_path.display()
        );
        Ok(FlushStats {
            files_written: 1,
            rows_written,
        })
    }
}

impl Drop for PartitionedWriter {
    fn drop(&mut self) {
        if self.buffers.values().any(|b| !b.rows.is_empty()) {
            log::warn!(
                "PartitionedWriter dropped with {} buffered bytes; call flush_all() to persist them",
                self.total_buffered
            );
        }
    }
}

fn rows_per_group(rows: &[UrlRow], total_bytes: usize) -> usize {
    if rows.is_empty() {
        return MIN_ROWS_PER_GROUP;
    }
    let bytes_per_row = (total_bytes / rows.len()).max(1);
    (ROW_GROUP_TARGET_BYTES / bytes_per_row).clamp(MIN_ROWS_PER_GROUP, MAX_ROWS_PER_GROUP)
}

/// Arrow schema of the stored row body.
pub(crate) fn row_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("domain_id", DataType::UInt64, false),
        Field::new("url_id", DataType::UInt64, false),
        Field::new("scheme", DataType::Utf8, false),
        Field::new("host", DataType::Utf8, false),
        Field::new("path_query", DataType::Utf8, false),
        Field::new("domain", DataType::Utf8, false),
    ]))
}

fn write_parquet(
    path: &Path,
    rows: &[UrlRow],
    compression_level: i32,
    rows_per_group: usize,
) -> Result<()> {
    let schema = row_schema();

    let domain_ids: Vec<u64> = rows.iter().map(|r| r.domain_id).collect();
    let url_ids: Vec<u64> = rows.iter().map(|r| r.url_id).collect();
    let schemes: Vec<&str> = rows.iter().map(|r| r.scheme.as_str()).collect();
    let hosts: Vec<&str> = rows.iter().map(|r| r.host.as_str()).collect();
    let path_queries: Vec<&str> = rows.iter().map(|r| r.path_query.as_str()).collect();
    let domains: Vec<&str> = rows.iter().map(|r| r.domain.as_str()).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(domain_ids)),
        Arc::new(UInt64Array::from(url_ids)),
        Arc::new(StringArray::from(schemes)),
        Arc::new(StringArray::from(hosts)),
        Arc::new(StringArray::from(path_queries)),
        Arc::new(StringArray::from(domains)),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let zstd_level = ZstdLevel::try_new(compression_level)
        .map_err(|e| UrlakeError::validation(format!("bad zstd level: {}", e)))?;
    let props = WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_2_0)
        .set_compression(Compression::ZSTD(zstd_level))
        .set_dictionary_enabled(true)
        .set_max_row_group_size(rows_per_group)
        .build();

    let file = File::create(path).map_err(|e| UrlakeError::io(path, "create part file", e))?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::reader::read_row_group;
    use tempfile::tempdir;

    fn test_row(domain: &str, path: &str) -> UrlRow {
        UrlRow {
            domain_id: crate::ids::domain_hash(domain),
            url_id: crate::ids::url_id(&format!("https://{}{}", domain, path)),
            scheme: "https".to_string(),
            host: domain.to_string(),
            path_query: path.to_string(),
            domain: domain.to_string(),
        }
    }

    fn test_config(base: &Path) -> Config {
        Config {
            base_path: base.to_path_buf(),
            // Write-through so every append lands on disk immediately.
            partition_buffer_size: 0,
            ..Config::default()
        }
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut writer = PartitionedWriter::new(&test_config(dir.path()));

        let rows = vec![
            test_row("example.com", "/a"),
            test_row("example.com", "/b"),
        ];
        for row in &rows {
            writer.append(0, "ab", row.clone()).unwrap();
        }

        let layout = StorageLayout::new(dir.path());
        let files = layout.list_part_files(0, "ab").unwrap();
        assert_eq!(files.len(), 2);

        let read_back = read_row_group(&files[0], 0).unwrap();
        assert_eq!(read_back, vec![rows[0].clone()]);
    }

    #[test]
    fn test_buffering_until_flush_all() {
        let dir = tempdir().unwrap();
        let config = Config {
            base_path: dir.path().to_path_buf(),
            partition_buffer_size: usize::MAX,
            ..Config::default()
        };
        let mut writer = PartitionedWriter::new(&config);

        let stats = writer.append(0, "ab", test_row("example.com", "/a")).unwrap();
        assert_eq!(stats.files_written, 0);
        assert!(writer.buffered_bytes() > 0);

        let stats = writer.flush_all().unwrap();
        assert_eq!(stats.files_written, 1);
        assert_eq!(stats.rows_written, 1);
        assert_eq!(writer.buffered_bytes(), 0);

        let layout = StorageLayout::new(dir.path());
        assert_eq!(layout.list_part_files(0, "ab").unwrap().len(), 1);
    }

    #[test]
    fn test_global_ceiling_flushes_largest_buffer() {
        let dir = tempdir().unwrap();
        let config = Config {
            base_path: dir.path().to_path_buf(),
            partition_buffer_size: usize::MAX,
            global_buffer_limit: 200,
            ..Config::default()
        };
        let mut writer = PartitionedWriter::new(&config);

        writer.append(0, "ab", test_row("example.com", "/a")).unwrap();
        writer
            .append(0, "cd", test_row("other.org", "/with/a/much/longer/path"))
            .unwrap();
        let mut flushed = FlushStats::default();
        for i in 0..10 {
            let stats = writer
                .append(0, "cd", test_row("other.org", &format!("/p/{}", i)))
                .unwrap();
            flushed.absorb(stats);
        }

        assert!(flushed.files_written >= 1, "ceiling never triggered");
        assert!(writer.buffered_bytes() <= 200 + 100);
    }

    #[test]
    fn test_part_numbers_are_monotonic() {
        let dir = tempdir().unwrap();
        let mut writer = PartitionedWriter::new(&test_config(dir.path()));
        writer.append(3, "7f", test_row("example.com", "/1")).unwrap();
        writer.append(3, "7f", test_row("example.com", "/2")).unwrap();
        writer.append(3, "7f", test_row("example.com", "/3")).unwrap();

        let layout = StorageLayout::new(dir.path());
        let files = layout.list_part_files(3, "7f").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["part-00000.parquet", "part-00001.parquet", "part-00002.parquet"]
        );
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let mut writer = PartitionedWriter::new(&test_config(dir.path()));
        writer.append(0, "ab", test_row("example.com", "/a")).unwrap();

        let partition = StorageLayout::new(dir.path()).partition_path(0, "ab");
        for entry in std::fs::read_dir(partition).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(!name.to_string_lossy().ends_with(".tmp"));
        }
    }
}
