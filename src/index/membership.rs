//! Membership index: domain_id → set of dataset ids.
//!
//! One Roaring bitmap per domain, concatenated, with a trailing offset/length
//! table indexed by domain_id. Every id in `0..n_domains` has a table entry;
//! domains with no observed datasets (possible only for a corrupt build)
//! carry a zero-length blob.
//!
//! File layout, little-endian:
//!
//! ```text
//! magic "DTDR" | version u32 | n_domains u64 | index_offset u64
//! blobs…  (serialized Roaring bitmaps, concatenated)
//! index:  n_domains × (blob_start u64, blob_len u32)
//! ```
//!
//! The builder works on an in-memory map; the query path reads the file
//! through a read-only memory map and deserializes exactly one bitmap per
//! lookup.

use memmap2::Mmap;
use roaring::RoaringBitmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{Result, UrlakeError};
use crate::storage::{distinct_domains_in_file, partition_components, StorageLayout};

const MAGIC: &[u8; 4] = b"DTDR";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;
const INDEX_ENTRY_LEN: usize = 8 + 4;

/// Mutable membership map used during builds.
#[derive(Debug, Default)]
pub struct MembershipIndex {
    bitmaps: BTreeMap<u64, RoaringBitmap>,
}

impl MembershipIndex {
    /// Union in the (domain, dataset) pairs observed in the given
    /// lake-relative part files.
    pub fn extend_from_files(
        &mut self,
        layout: &StorageLayout,
        rel_paths: &[String],
        id_map: &std::collections::HashMap<&str, u64>,
    ) -> Result<()> {
        for rel_path in rel_paths {
            let Some((dataset_id, _)) = partition_components(rel_path) else {
                log::warn!("skipping file outside partition scheme: {}", rel_path);
                continue;
            };
            for domain in distinct_domains_in_file(&layout.resolve(rel_path))? {
                let Some(&domain_id) = id_map.get(domain.as_str()) else {
                    log::warn!("domain '{}' missing from dictionary, skipping", domain);
                    continue;
                };
                self.bitmaps.entry(domain_id).or_default().insert(dataset_id);
            }
        }
        Ok(())
    }

    /// Dataset ids of one domain, ascending.
    pub fn datasets_of(&self, domain_id: u64) -> Vec<u32> {
        self.bitmaps
            .get(&domain_id)
            .map(|bm| bm.iter().collect())
            .unwrap_or_default()
    }

    /// Total number of (domain, dataset) memberships.
    pub fn membership_count(&self) -> u64 {
        self.bitmaps.values().map(RoaringBitmap::len).sum()
    }

    /// Number of domains with at least one dataset.
    pub fn domain_count(&self) -> usize {
        self.bitmaps.len()
    }

    /// Serialize for `n_domains` dictionary entries. Ids at or past
    /// `n_domains` would be unreadable, so they are rejected.
    pub fn save(&self, path: &Path, n_domains: u64) -> Result<()> {
        if let Some((&max_id, _)) = self.bitmaps.iter().next_back() {
            if max_id >= n_domains {
                return Err(UrlakeError::validation(format!(
                    "membership has domain_id {} but dictionary holds only {} domains",
                    max_id, n_domains
                )));
            }
        }

        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&VERSION.to_le_bytes());
        data.extend_from_slice(&n_domains.to_le_bytes());
        let index_offset_pos = data.len();
        data.extend_from_slice(&0u64.to_le_bytes());

        let empty = RoaringBitmap::new();
        let mut index_entries = Vec::with_capacity(n_domains as usize);
        for domain_id in 0..n_domains {
            let bitmap = self.bitmaps.get(&domain_id).unwrap_or(&empty);
            let start = data.len() as u64;
            if bitmap.is_empty() {
                index_entries.push((start, 0u32));
                continue;
            }
            bitmap
                .serialize_into(&mut data)
                .map_err(|e| UrlakeError::io(path, "serialize bitmap", e))?;
            let len = data.len() as u64 - start;
            index_entries.push((start, len as u32));
        }

        let index_offset = data.len() as u64;
        data[index_offset_pos..index_offset_pos + 8].copy_from_slice(&index_offset.to_le_bytes());
        for (start, len) in index_entries {
            data.extend_from_slice(&start.to_le_bytes());
            data.extend_from_slice(&len.to_le_bytes());
        }

        std::fs::write(path, &data)
            .map_err(|e| UrlakeError::io(path, "write membership index", e))?;
        log::info!(
            "wrote membership index: {} domains, {} memberships, {} bytes",
            n_domains,
            self.membership_count(),
            data.len()
        );
        Ok(())
    }

    /// Load a full membership map (builder's incremental path).
    pub fn load(path: &Path) -> Result<Self> {
        let reader = MembershipFile::open(path)?;
        let mut bitmaps = BTreeMap::new();
        for domain_id in 0..reader.n_domains() {
            let datasets = reader.datasets_of(domain_id)?;
            if !datasets.is_empty() {
                bitmaps.insert(domain_id, datasets.iter().copied().collect());
            }
        }
        Ok(MembershipIndex { bitmaps })
    }
}

/// Read-only, memory-mapped view of a membership artifact.
pub struct MembershipFile {
    path: PathBuf,
    map: Mmap,
    n_domains: u64,
    index_offset: u64,
}

impl MembershipFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| UrlakeError::io(path, "open membership", e))?;
        // Read-only map of an immutable published artifact.
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| UrlakeError::io(path, "mmap membership", e))?;

        if map.len() < HEADER_LEN {
            return Err(UrlakeError::format(path, "membership file too short"));
        }
        if &map[0..4] != MAGIC {
            return Err(UrlakeError::format(path, "bad magic (expected DTDR)"));
        }
        let version = u32::from_le_bytes(map[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(UrlakeError::format(
                path,
                format!("unsupported membership version {} (expected {})", version, VERSION),
            ));
        }
        let n_domains = u64::from_le_bytes(map[8..16].try_into().unwrap());
        let index_offset = u64::from_le_bytes(map[16..24].try_into().unwrap());

        let index_len = (n_domains as usize)
            .checked_mul(INDEX_ENTRY_LEN)
            .ok_or_else(|| UrlakeError::format(path, "index size overflow"))?;
        let expected_end = (index_offset as usize)
            .checked_add(index_len)
            .ok_or_else(|| UrlakeError::format(path, "index size overflow"))?;
        if expected_end != map.len() {
            return Err(UrlakeError::format(
                path,
                format!(
                    "index table size mismatch: file is {} bytes, expected {}",
                    map.len(),
                    expected_end
                ),
            ));
        }

        Ok(MembershipFile {
            path: path.to_path_buf(),
            map,
            n_domains,
            index_offset,
        })
    }

    pub fn n_domains(&self) -> u64 {
        self.n_domains
    }

    /// Dataset ids of one domain, ascending. Unknown ids yield an empty set.
    pub fn datasets_of(&self, domain_id: u64) -> Result<Vec<u32>> {
        let Some(slice) = self.blob(domain_id)? else {
            return Ok(Vec::new());
        };
        let bitmap = RoaringBitmap::deserialize_from(slice).map_err(|e| {
            UrlakeError::format(&self.path, format!("bad bitmap for domain {}: {}", domain_id, e))
        })?;
        Ok(bitmap.iter().collect())
    }

    /// Number of datasets holding one domain.
    pub fn dataset_count(&self, domain_id: u64) -> Result<u64> {
        let Some(slice) = self.blob(domain_id)? else {
            return Ok(0);
        };
        let bitmap = RoaringBitmap::deserialize_from(slice).map_err(|e| {
            UrlakeError::format(&self.path, format!("bad bitmap for domain {}: {}", domain_id, e))
        })?;
        Ok(bitmap.len())
    }

    fn blob(&self, domain_id: u64) -> Result<Option<&[u8]>> {
        if domain_id >= self.n_domains {
            return Ok(None);
        }
        let entry_at = self.index_offset as usize + domain_id as usize * INDEX_ENTRY_LEN;
        let start = u64::from_le_bytes(self.map[entry_at..entry_at + 8].try_into().unwrap());
        let len = u32::from_le_bytes(self.map[entry_at + 8..entry_at + 12].try_into().unwrap());
        if len == 0 {
            return Ok(None);
        }
        let end = start as usize + len as usize;
        if end > self.index_offset as usize {
            return Err(UrlakeError::format(
                &self.path,
                format!("bitmap for domain {} escapes the blob section", domain_id),
            ));
        }
        Ok(Some(&self.map[start as usize..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn index_with(pairs: &[(u64, u32)]) -> MembershipIndex {
        let mut index = MembershipIndex::default();
        for &(domain_id, dataset_id) in pairs {
            index.bitmaps.entry(domain_id).or_default().insert(dataset_id);
        }
        index
    }

    #[test]
    fn test_save_open_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("domain_to_datasets.roar");

        let index = index_with(&[(0, 0), (0, 1), (2, 5)]);
        index.save(&path, 3).unwrap();

        let reader = MembershipFile::open(&path).unwrap();
        assert_eq!(reader.n_domains(), 3);
        assert_eq!(reader.datasets_of(0).unwrap(), vec![0, 1]);
        // Dictionary id 1 has no memberships: empty blob, empty answer.
        assert_eq!(reader.datasets_of(1).unwrap(), Vec::<u32>::new());
        assert_eq!(reader.datasets_of(2).unwrap(), vec![5]);
        assert_eq!(reader.dataset_count(0).unwrap(), 2);
    }

    #[test]
    fn test_out_of_range_domain_is_empty() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("m.roar");
        index_with(&[(0, 0)]).save(&path, 1).unwrap();

        let reader = MembershipFile::open(&path).unwrap();
        assert_eq!(reader.datasets_of(99).unwrap(), Vec::<u32>::new());
        assert_eq!(reader.dataset_count(99).unwrap(), 0);
    }

    #[test]
    fn test_save_rejects_id_beyond_dictionary() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("m.roar");
        let index = index_with(&[(5, 0)]);
        assert!(index.save(&path, 3).is_err());
    }

    #[test]
    fn test_load_round_trips_builder_state() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("m.roar");
        let index = index_with(&[(0, 1), (3, 2), (3, 9)]);
        index.save(&path, 4).unwrap();

        let loaded = MembershipIndex::load(&path).unwrap();
        assert_eq!(loaded.datasets_of(0), vec![1]);
        assert_eq!(loaded.datasets_of(3), vec![2, 9]);
        assert_eq!(loaded.membership_count(), 3);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("m.roar");
        std::fs::write(&path, b"XXXX\x01\x00\x00\x00aaaaaaaaaaaaaaaa").unwrap();
        assert!(MembershipFile::open(&path).is_err());
    }

    #[test]
    fn test_truncated_file_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("m.roar");
        index_with(&[(0, 0)]).save(&path, 1).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(MembershipFile::open(&path).is_err());
    }
}
