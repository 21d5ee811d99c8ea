//! Ingestion pipeline: raw URLs → normalized, partitioned rows.
//!
//! Each URL runs through normalization and identity assignment, then lands
//! in the partitioned writer under `(dataset_id, domain_prefix)`. A bad URL
//! never aborts a batch: rejects are counted and reported in aggregate.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, UrlakeError};
use crate::ids::{domain_hash, domain_prefix, url_id};
use crate::normalize::normalize;
use crate::registry::DatasetRegistry;
use crate::storage::{PartitionedWriter, UrlRow};

/// Aggregate outcome of one ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub dataset_id: u32,
    pub rows_accepted: usize,
    pub rows_rejected: usize,
    pub files_written: usize,
}

/// Single-writer ingestion front end over one lake.
pub struct Ingestor {
    registry: DatasetRegistry,
    writer: PartitionedWriter,
}

impl Ingestor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Ingestor {
            registry: DatasetRegistry::open(&config.base_path)?,
            writer: PartitionedWriter::new(config),
        })
    }

    /// Ingest an iterator of raw URL strings into `dataset_name`, flushing
    /// every partition at the end.
    pub fn ingest_urls<I>(&mut self, dataset_name: &str, urls: I) -> Result<IngestStats>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let dataset_id = self.registry.resolve(dataset_name)?;
        let mut stats = IngestStats {
            dataset_id,
            ..IngestStats::default()
        };

        for raw in urls {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let normalized = match normalize(raw) {
                Ok(n) => n,
                Err(err) => {
                    log::debug!("rejected URL '{}': {}", raw, err);
                    stats.rows_rejected += 1;
                    continue;
                }
            };

            let prefix = domain_prefix(&normalized.domain);
            let row = UrlRow {
                domain_id: domain_hash(&normalized.domain),
                url_id: url_id(raw),
                scheme: normalized.scheme.clone(),
                host: normalized.host.clone(),
                path_query: normalized.path_query(),
                domain: normalized.domain.clone(),
            };
            let flush = self.writer.append(dataset_id, &prefix, row)?;
            stats.files_written += flush.files_written;
            stats.rows_accepted += 1;
        }

        let flush = self.writer.flush_all()?;
        stats.files_written += flush.files_written;

        log::info!(
            "ingested dataset '{}' (id {}): {} rows accepted, {} rejected, {} files",
            dataset_name,
            dataset_id,
            stats.rows_accepted,
            stats.rows_rejected,
            stats.files_written
        );
        Ok(stats)
    }

    /// Ingest a line-delimited URL file.
    pub fn ingest_file(&mut self, dataset_name: &str, source: &Path) -> Result<IngestStats> {
        let file =
            File::open(source).map_err(|e| UrlakeError::io(source, "open source file", e))?;
        let reader = BufReader::new(file);
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(line.map_err(|e| UrlakeError::io(source, "read source file", e))?);
        }
        self.ingest_urls(dataset_name, lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageLayout;
    use tempfile::tempdir;

    fn test_config(base: &Path) -> Config {
        Config {
            base_path: base.to_path_buf(),
            partition_buffer_size: 0,
            ..Config::default()
        }
    }

    #[test]
    fn test_bad_urls_counted_not_fatal() {
        let dir = tempdir().unwrap();
        let mut ingestor = Ingestor::new(&test_config(dir.path())).unwrap();

        let stats = ingestor
            .ingest_urls(
                "alpha",
                ["https://example.com/a", "http://localhost/nope", "", "https://example.com/b"],
            )
            .unwrap();

        assert_eq!(stats.dataset_id, 0);
        assert_eq!(stats.rows_accepted, 2);
        assert_eq!(stats.rows_rejected, 1);
        assert!(stats.files_written >= 1);
    }

    #[test]
    fn test_rows_land_in_domain_partition() {
        let dir = tempdir().unwrap();
        let mut ingestor = Ingestor::new(&test_config(dir.path())).unwrap();
        ingestor
            .ingest_urls("alpha", ["https://example.com/a"])
            .unwrap();

        let layout = StorageLayout::new(dir.path());
        let prefix = domain_prefix("example.com");
        let files = layout.list_part_files(0, &prefix).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_dataset_ids_stable_across_runs() {
        let dir = tempdir().unwrap();
        {
            let mut ingestor = Ingestor::new(&test_config(dir.path())).unwrap();
            let stats = ingestor.ingest_urls("alpha", ["https://a.com/1"]).unwrap();
            assert_eq!(stats.dataset_id, 0);
        }
        let mut ingestor = Ingestor::new(&test_config(dir.path())).unwrap();
        let stats = ingestor.ingest_urls("beta", ["https://b.com/1"]).unwrap();
        assert_eq!(stats.dataset_id, 1);
        let stats = ingestor.ingest_urls("alpha", ["https://a.com/2"]).unwrap();
        assert_eq!(stats.dataset_id, 0);
    }
}
