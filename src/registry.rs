//! Persistent dataset registry: name → u32 id.
//!
//! Dataset ids are assigned sequentially from 0 and are never reused or
//! reassigned. The mapping lives at `registry/dataset_registry.json` under
//! the lake root and is rewritten atomically (temp file + rename) after
//! every assignment, so a crash never loses an id that a Parquet path
//! already encodes.
//!
//! The ingester is the single writer; it wraps the registry in a mutex.
//! The query path only reads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, UrlakeError};

/// Relative location of the registry document under the lake root.
pub const REGISTRY_REL_PATH: &str = "registry/dataset_registry.json";

#[derive(Debug, Serialize, Deserialize)]
struct RegistryDocument {
    next_dataset_id: u32,
    datasets: BTreeMap<String, u32>,
}

/// Durable dataset name → id assignments.
#[derive(Debug)]
pub struct DatasetRegistry {
    path: PathBuf,
    datasets: BTreeMap<String, u32>,
    next_dataset_id: u32,
}

impl DatasetRegistry {
    /// Open (or initialize) the registry stored under `base_path`.
    pub fn open(base_path: &Path) -> Result<Self> {
        let path = base_path.join(REGISTRY_REL_PATH);
        let mut registry = DatasetRegistry {
            path,
            datasets: BTreeMap::new(),
            next_dataset_id: 0,
        };
        registry.load()?;
        Ok(registry)
    }

    fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| UrlakeError::io(&self.path, "read dataset registry", e))?;
        let doc: RegistryDocument = serde_json::from_str(&contents)
            .map_err(|e| UrlakeError::format(&self.path, format!("bad registry JSON: {}", e)))?;

        // next_dataset_id must never fall behind an id already handed out.
        let max_assigned = doc.datasets.values().copied().max().map(|m| m + 1).unwrap_or(0);
        self.next_dataset_id = doc.next_dataset_id.max(max_assigned);
        self.datasets = doc.datasets;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let doc = RegistryDocument {
            next_dataset_id: self.next_dataset_id,
            datasets: self.datasets.clone(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UrlakeError::io(parent, "create registry directory", e))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(&doc)?;
        fs::write(&tmp_path, payload)
            .map_err(|e| UrlakeError::io(&tmp_path, "write dataset registry", e))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| UrlakeError::io(&self.path, "publish dataset registry", e))?;
        Ok(())
    }

    /// Return the id for `name`, assigning and persisting a fresh one if the
    /// dataset has never been seen.
    pub fn resolve(&mut self, name: &str) -> Result<u32> {
        if name.is_empty() {
            return Err(UrlakeError::validation("dataset name must be non-empty"));
        }
        if let Some(&id) = self.datasets.get(name) {
            return Ok(id);
        }

        let id = self.next_dataset_id;
        self.next_dataset_id = self
            .next_dataset_id
            .checked_add(1)
            .ok_or_else(|| UrlakeError::overflow("dataset ids", u32::MAX as u64, u32::MAX as u64))?;
        self.datasets.insert(name.to_string(), id);
        self.save()?;
        log::debug!("registered dataset '{}' with id {}", name, id);
        Ok(id)
    }

    /// Look up an existing dataset id without assigning.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.datasets.get(name).copied()
    }

    /// All known (name, id) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.datasets.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// Number of registered datasets.
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// True when no dataset has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sequential_assignment_from_zero() {
        let dir = tempdir().unwrap();
        let mut registry = DatasetRegistry::open(dir.path()).unwrap();

        assert_eq!(registry.resolve("alpha").unwrap(), 0);
        assert_eq!(registry.resolve("beta").unwrap(), 1);
        assert_eq!(registry.resolve("gamma").unwrap(), 2);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut registry = DatasetRegistry::open(dir.path()).unwrap();

        let first = registry.resolve("alpha").unwrap();
        let second = registry.resolve("alpha").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ids_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut registry = DatasetRegistry::open(dir.path()).unwrap();
            registry.resolve("alpha").unwrap();
            registry.resolve("beta").unwrap();
        }

        let mut registry = DatasetRegistry::open(dir.path()).unwrap();
        assert_eq!(registry.get("alpha"), Some(0));
        assert_eq!(registry.get("beta"), Some(1));
        // New names continue after the persisted maximum.
        assert_eq!(registry.resolve("gamma").unwrap(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempdir().unwrap();
        let mut registry = DatasetRegistry::open(dir.path()).unwrap();
        assert!(registry.resolve("").is_err());
    }

    #[test]
    fn test_registry_file_location() {
        let dir = tempdir().unwrap();
        let mut registry = DatasetRegistry::open(dir.path()).unwrap();
        registry.resolve("alpha").unwrap();
        assert!(dir.path().join("registry/dataset_registry.json").exists());
    }
}
