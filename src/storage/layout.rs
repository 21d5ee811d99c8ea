//! Directory layout for the partitioned lake.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, UrlakeError};

/// Name of the columnar root under the lake base path.
pub const URLS_DIR: &str = "urls";

/// Parse `(dataset_id, domain_prefix)` out of a lake-relative file path of
/// the form `dataset_id={id}/domain_prefix={hh}/part-NNNNN.parquet`.
pub fn partition_components(rel_path: &str) -> Option<(u32, String)> {
    let mut dataset_id = None;
    let mut domain_prefix = None;
    for part in rel_path.split('/') {
        if let Some(value) = part.strip_prefix("dataset_id=") {
            dataset_id = value.parse::<u32>().ok();
        } else if let Some(value) = part.strip_prefix("domain_prefix=") {
            if !value.is_empty() {
                domain_prefix = Some(value.to_string());
            }
        }
    }
    Some((dataset_id?, domain_prefix?))
}

/// Path construction and discovery for the partitioned Parquet tree.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_path: PathBuf,
    urls_root: PathBuf,
}

impl StorageLayout {
    pub fn new(base_path: &Path) -> Self {
        StorageLayout {
            base_path: base_path.to_path_buf(),
            urls_root: base_path.join(URLS_DIR),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Root of the columnar tree (`{base}/urls`).
    pub fn urls_root(&self) -> &Path {
        &self.urls_root
    }

    /// Directory for one `(dataset_id, domain_prefix)` partition.
    pub fn partition_path(&self, dataset_id: u32, domain_prefix: &str) -> PathBuf {
        self.urls_root
            .join(format!("dataset_id={}", dataset_id))
            .join(format!("domain_prefix={}", domain_prefix))
    }

    /// Full path of a part file within a partition.
    pub fn part_path(&self, dataset_id: u32, domain_prefix: &str, part_number: u32) -> PathBuf {
        self.partition_path(dataset_id, domain_prefix)
            .join(format!("part-{:05}.parquet", part_number))
    }

    /// Create a partition directory if needed.
    pub fn ensure_partition(&self, dataset_id: u32, domain_prefix: &str) -> Result<PathBuf> {
        let path = self.partition_path(dataset_id, domain_prefix);
        fs::create_dir_all(&path)
            .map_err(|e| UrlakeError::io(&path, "create partition directory", e))?;
        Ok(path)
    }

    /// Part files of one partition, sorted by part number.
    pub fn list_part_files(&self, dataset_id: u32, domain_prefix: &str) -> Result<Vec<PathBuf>> {
        let dir = self.partition_path(dataset_id, domain_prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let entries =
            fs::read_dir(&dir).map_err(|e| UrlakeError::io(&dir, "list partition", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| UrlakeError::io(&dir, "list partition", e))?;
            let path = entry.path();
            if is_part_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Next available part number in a partition (0 when empty).
    pub fn next_part_number(&self, dataset_id: u32, domain_prefix: &str) -> Result<u32> {
        let files = self.list_part_files(dataset_id, domain_prefix)?;
        let max = files
            .iter()
            .filter_map(|path| part_number(path))
            .max();
        Ok(match max {
            Some(n) => n + 1,
            None => 0,
        })
    }

    /// Every committed part file under the lake, as paths relative to
    /// `urls/`, in sorted order. Sorted enumeration keeps full-build file_id
    /// assignment deterministic.
    pub fn list_all_files(&self) -> Result<Vec<String>> {
        let mut rel_paths = Vec::new();
        if !self.urls_root.exists() {
            return Ok(rel_paths);
        }
        self.walk(&self.urls_root, &mut rel_paths)?;
        rel_paths.sort();
        Ok(rel_paths)
    }

    fn walk(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| UrlakeError::io(dir, "walk lake", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| UrlakeError::io(dir, "walk lake", e))?;
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, out)?;
            } else if is_part_file(&path) {
                let rel = path
                    .strip_prefix(&self.urls_root)
                    .expect("walked path is under urls root");
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }

    /// Absolute path for a lake-relative part path.
    pub fn resolve(&self, rel_path: &str) -> PathBuf {
        self.urls_root.join(rel_path)
    }
}

fn is_part_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with("part-") && name.ends_with(".parquet")
}

fn part_number(path: &Path) -> Option<u32> {
    let name = path.file_stem()?.to_str()?;
    name.strip_prefix("part-")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partition_and_part_paths() {
        let layout = StorageLayout::new(Path::new("/data"));
        assert_eq!(
            layout.partition_path(17, "3a"),
            PathBuf::from("/data/urls/dataset_id=17/domain_prefix=3a")
        );
        assert_eq!(
            layout.part_path(17, "3a", 0),
            PathBuf::from("/data/urls/dataset_id=17/domain_prefix=3a/part-00000.parquet")
        );
    }

    #[test]
    fn test_next_part_number() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        assert_eq!(layout.next_part_number(0, "ab").unwrap(), 0);

        layout.ensure_partition(0, "ab").unwrap();
        std::fs::write(layout.part_path(0, "ab", 0), b"x").unwrap();
        std::fs::write(layout.part_path(0, "ab", 1), b"x").unwrap();
        assert_eq!(layout.next_part_number(0, "ab").unwrap(), 2);
    }

    #[test]
    fn test_list_all_files_sorted_and_relative() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.ensure_partition(1, "ff").unwrap();
        layout.ensure_partition(0, "0a").unwrap();
        std::fs::write(layout.part_path(1, "ff", 0), b"x").unwrap();
        std::fs::write(layout.part_path(0, "0a", 0), b"x").unwrap();
        // Stray files are ignored.
        std::fs::write(dir.path().join("urls/notes.txt"), b"x").unwrap();

        let files = layout.list_all_files().unwrap();
        assert_eq!(
            files,
            vec![
                "dataset_id=0/domain_prefix=0a/part-00000.parquet".to_string(),
                "dataset_id=1/domain_prefix=ff/part-00000.parquet".to_string(),
            ]
        );
    }

    #[test]
    fn test_partition_components() {
        let (dataset_id, prefix) =
            partition_components("dataset_id=17/domain_prefix=3a/part-00000.parquet").unwrap();
        assert_eq!(dataset_id, 17);
        assert_eq!(prefix, "3a");

        assert!(partition_components("garbage/part-00000.parquet").is_none());
        assert!(partition_components("dataset_id=x/domain_prefix=3a/p.parquet").is_none());
    }
}
