//! Projected reads over committed part files.
//!
//! The index builder reads only the `domain` column of one row group at a
//! time; the query service reads full rows of exactly the row groups its
//! postings point at. Both paths go through the Arrow Parquet reader with a
//! column projection and an explicit row-group selection so a lookup never
//! scans more than it has to.

use arrow::array::{Array, StringArray, UInt64Array};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use crate::error::{Result, UrlakeError};
use crate::storage::writer::UrlRow;

/// Number of row groups in a part file (metadata only, no data read).
pub fn row_group_count(path: &Path) -> Result<usize> {
    let file = File::open(path).map_err(|e| UrlakeError::io(path, "open part file", e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.metadata().num_row_groups())
}

/// Distinct domains of one row group, in ascending order.
pub fn distinct_domains_in_row_group(path: &Path, row_group: usize) -> Result<Vec<String>> {
    domains_of_row_groups(path, Some(row_group))
}

/// Distinct domains across every row group of a part file, in ascending order.
pub fn distinct_domains_in_file(path: &Path) -> Result<Vec<String>> {
    domains_of_row_groups(path, None)
}

fn domains_of_row_groups(path: &Path, row_group: Option<usize>) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| UrlakeError::io(path, "open part file", e))?;
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let schema = builder.parquet_schema();
    let domain_idx = schema
        .columns()
        .iter()
        .position(|col| col.name() == "domain")
        .ok_or_else(|| UrlakeError::format(path, "missing 'domain' column".to_string()))?;
    let mask = ProjectionMask::roots(schema, [domain_idx]);
    builder = builder.with_projection(mask);
    if let Some(rg) = row_group {
        let available = builder.metadata().num_row_groups();
        if rg >= available {
            return Err(UrlakeError::format(
                path,
                format!("row group {} out of range (file has {})", rg, available),
            ));
        }
        builder = builder.with_row_groups(vec![rg]);
    }
    let reader = builder.build()?;

    let mut domains = BTreeSet::new();
    for batch in reader {
        let batch = batch?;
        let column = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| UrlakeError::format(path, "expected Utf8 'domain' column"))?;
        for i in 0..column.len() {
            domains.insert(column.value(i).to_string());
        }
    }
    Ok(domains.into_iter().collect())
}

/// Read every row of one row group, in stored order.
pub fn read_row_group(path: &Path, row_group: usize) -> Result<Vec<UrlRow>> {
    let file = File::open(path).map_err(|e| UrlakeError::io(path, "open part file", e))?;
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let available = builder.metadata().num_row_groups();
    if row_group >= available {
        return Err(UrlakeError::format(
            path,
            format!(
                "row group {} out of range (file has {})",
                row_group, available
            ),
        ));
    }
    builder = builder.with_row_groups(vec![row_group]);
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let domain_ids = downcast_u64(path, &batch, 0, "domain_id")?;
        let url_ids = downcast_u64(path, &batch, 1, "url_id")?;
        let schemes = downcast_utf8(path, &batch, 2, "scheme")?;
        let hosts = downcast_utf8(path, &batch, 3, "host")?;
        let path_queries = downcast_utf8(path, &batch, 4, "path_query")?;
        let domains = downcast_utf8(path, &batch, 5, "domain")?;

        for i in 0..batch.num_rows() {
            rows.push(UrlRow {
                domain_id: domain_ids.value(i),
                url_id: url_ids.value(i),
                scheme: schemes.value(i).to_string(),
                host: hosts.value(i).to_string(),
                path_query: path_queries.value(i).to_string(),
                domain: domains.value(i).to_string(),
            });
        }
    }
    Ok(rows)
}

fn downcast_u64<'a>(
    path: &Path,
    batch: &'a arrow::record_batch::RecordBatch,
    index: usize,
    name: &str,
) -> Result<&'a UInt64Array> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| UrlakeError::format(path, format!("expected UInt64 '{}' column", name)))
}

fn downcast_utf8<'a>(
    path: &Path,
    batch: &'a arrow::record_batch::RecordBatch,
    index: usize,
    name: &str,
) -> Result<&'a StringArray> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| UrlakeError::format(path, format!("expected Utf8 '{}' column", name)))
}
