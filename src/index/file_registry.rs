//! File registry: stable u32 ids for committed part files.
//!
//! Persisted as a zstd-compressed TSV with a header row:
//! `file_id\tdataset_id\tdomain_prefix\tparquet_rel_path`. Paths are
//! relative to the `urls/` root.
//!
//! A full build enumerates the lake in sorted path order and assigns
//! 0..N. An incremental build keeps every previous assignment and gives new
//! paths `max+1, max+2, …` in sorted order; ids are never reused, even for
//! files a later gc removes. Deletions are not handled here.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, UrlakeError};
use crate::storage::{partition_components, StorageLayout};

/// One registered part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file_id: u32,
    pub dataset_id: u32,
    pub domain_prefix: String,
    pub rel_path: String,
}

/// file_id ↔ path mapping for one index version.
#[derive(Debug, Default)]
pub struct FileRegistry {
    entries: Vec<FileEntry>,
    by_path: HashMap<String, u32>,
    by_id: HashMap<u32, usize>,
}

impl FileRegistry {
    fn push(&mut self, entry: FileEntry) {
        self.by_path.insert(entry.rel_path.clone(), entry.file_id);
        self.by_id.insert(entry.file_id, self.entries.len());
        self.entries.push(entry);
    }

    fn entry_for(rel_path: &str, file_id: u32) -> Result<FileEntry> {
        let (dataset_id, domain_prefix) = partition_components(rel_path).ok_or_else(|| {
            UrlakeError::validation(format!(
                "part file outside the partition scheme: '{}'",
                rel_path
            ))
        })?;
        Ok(FileEntry {
            file_id,
            dataset_id,
            domain_prefix,
            rel_path: rel_path.to_string(),
        })
    }

    /// Full build: enumerate the lake, assign ids in sorted path order.
    pub fn build_full(layout: &StorageLayout) -> Result<Self> {
        let mut registry = FileRegistry::default();
        for (i, rel_path) in layout.list_all_files()?.iter().enumerate() {
            registry.push(Self::entry_for(rel_path, i as u32)?);
        }
        log::info!("file registry: {} part files", registry.entries.len());
        Ok(registry)
    }

    /// Incremental build: previous ids kept, new paths appended after the
    /// previous maximum.
    pub fn build_incremental(previous: FileRegistry, layout: &StorageLayout) -> Result<Self> {
        let mut registry = previous;
        let mut next_id = registry
            .entries
            .iter()
            .map(|e| e.file_id)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);

        let mut added = 0usize;
        for rel_path in layout.list_all_files()? {
            if registry.by_path.contains_key(&rel_path) {
                continue;
            }
            registry.push(Self::entry_for(&rel_path, next_id)?);
            next_id = next_id.checked_add(1).ok_or_else(|| {
                UrlakeError::overflow("file ids", u32::MAX as u64, u32::MAX as u64)
            })?;
            added += 1;
        }
        log::info!(
            "file registry: {} part files ({} new)",
            registry.entries.len(),
            added
        );
        Ok(registry)
    }

    /// Lake-relative paths present on disk but absent from this registry.
    pub fn new_files_since(&self, layout: &StorageLayout) -> Result<Vec<String>> {
        Ok(layout
            .list_all_files()?
            .into_iter()
            .filter(|rel| !self.by_path.contains_key(rel))
            .collect())
    }

    pub fn get(&self, file_id: u32) -> Option<&FileEntry> {
        self.by_id.get(&file_id).map(|&i| &self.entries[i])
    }

    pub fn id_of(&self, rel_path: &str) -> Option<u32> {
        self.by_path.get(rel_path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the registry TSV, zstd-compressed.
    pub fn save(&self, path: &Path, compression_level: i32) -> Result<()> {
        let mut tsv = String::from("file_id\tdataset_id\tdomain_prefix\tparquet_rel_path\n");
        for entry in &self.entries {
            tsv.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                entry.file_id, entry.dataset_id, entry.domain_prefix, entry.rel_path
            ));
        }

        let file =
            File::create(path).map_err(|e| UrlakeError::io(path, "create file registry", e))?;
        let mut encoder = zstd::stream::write::Encoder::new(file, compression_level)
            .map_err(|e| UrlakeError::io(path, "init zstd encoder", e))?;
        encoder
            .write_all(tsv.as_bytes())
            .map_err(|e| UrlakeError::io(path, "write file registry", e))?;
        encoder
            .finish()
            .map_err(|e| UrlakeError::io(path, "finish file registry", e))?;
        Ok(())
    }

    /// Load a registry written by `save`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| UrlakeError::io(path, "open file registry", e))?;
        let mut decoder = zstd::stream::read::Decoder::new(file)
            .map_err(|e| UrlakeError::io(path, "init zstd decoder", e))?;
        let mut tsv = String::new();
        decoder
            .read_to_string(&mut tsv)
            .map_err(|e| UrlakeError::format(path, format!("bad registry payload: {}", e)))?;

        let mut registry = FileRegistry::default();
        for (line_no, line) in tsv.lines().enumerate() {
            if line_no == 0 {
                if line != "file_id\tdataset_id\tdomain_prefix\tparquet_rel_path" {
                    return Err(UrlakeError::format(
                        path,
                        format!("unexpected registry header: '{}'", line),
                    ));
                }
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 4 {
                return Err(UrlakeError::format(
                    path,
                    format!("registry line {} has {} fields", line_no + 1, fields.len()),
                ));
            }
            let file_id: u32 = fields[0].parse().map_err(|_| {
                UrlakeError::format(path, format!("bad file_id on line {}", line_no + 1))
            })?;
            let dataset_id: u32 = fields[1].parse().map_err(|_| {
                UrlakeError::format(path, format!("bad dataset_id on line {}", line_no + 1))
            })?;
            registry.push(FileEntry {
                file_id,
                dataset_id,
                domain_prefix: fields[2].to_string(),
                rel_path: fields[3].to_string(),
            });
        }
        Ok(registry)
    }
}
