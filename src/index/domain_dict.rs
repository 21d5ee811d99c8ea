//! Domain dictionary: the ordered list of distinct registrable domains.
//!
//! Position in the list *is* the `domain_id`. The persisted form is
//! newline-delimited UTF-8, zstd-compressed.
//!
//! Growth is strictly append-only across versions: a full build emits
//! domains in ascending byte order; an incremental build loads the previous
//! dictionary in its existing order, scans only the new part files, and
//! appends the novel domains (sorted among themselves) to the end. Nothing
//! is ever re-sorted, so a domain_id assigned in version V holds in every
//! later version.

use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, UrlakeError};
use crate::storage::{distinct_domains_in_file, StorageLayout};

/// Ordered dictionary of distinct domain strings.
#[derive(Debug, Clone, Default)]
pub struct DomainDictionary {
    domains: Vec<String>,
}

impl DomainDictionary {
    /// Scan the `domain` column of the given lake-relative part files and
    /// return every distinct domain. Files are scanned in parallel.
    pub fn scan_domains(layout: &StorageLayout, rel_paths: &[String]) -> Result<BTreeSet<String>> {
        let per_file: Vec<Vec<String>> = rel_paths
            .par_iter()
            .map(|rel| distinct_domains_in_file(&layout.resolve(rel)))
            .collect::<Result<_>>()?;

        let mut all = BTreeSet::new();
        for domains in per_file {
            all.extend(domains);
        }
        Ok(all)
    }

    /// Full build: distinct domains of every given file, ascending byte order.
    pub fn build_full(layout: &StorageLayout, rel_paths: &[String]) -> Result<Self> {
        let domains = Self::scan_domains(layout, rel_paths)?;
        log::info!("domain dictionary: {} distinct domains", domains.len());
        Ok(DomainDictionary {
            domains: domains.into_iter().collect(),
        })
    }

    /// Incremental build: previous order preserved, novel domains from
    /// `new_rel_paths` appended in sorted order. Never re-sorts.
    pub fn build_incremental(
        previous: DomainDictionary,
        layout: &StorageLayout,
        new_rel_paths: &[String],
    ) -> Result<Self> {
        let scanned = Self::scan_domains(layout, new_rel_paths)?;
        let existing: HashSet<&str> = previous.domains.iter().map(String::as_str).collect();

        let novel: Vec<String> = scanned
            .into_iter()
            .filter(|d| !existing.contains(d.as_str()))
            .collect();
        log::info!(
            "domain dictionary: {} existing, {} novel domains appended",
            previous.domains.len(),
            novel.len()
        );

        drop(existing);
        let mut domains = previous.domains;
        domains.extend(novel);
        Ok(DomainDictionary { domains })
    }

    pub fn from_domains(domains: Vec<String>) -> Self {
        DomainDictionary { domains }
    }

    /// Domain string at `domain_id`, if in range.
    pub fn get(&self, domain_id: u64) -> Option<&str> {
        self.domains.get(domain_id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Iterate (domain_id, domain) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.domains
            .iter()
            .enumerate()
            .map(|(i, d)| (i as u64, d.as_str()))
    }

    /// Borrowed domain → domain_id map for build passes.
    pub fn id_map(&self) -> HashMap<&str, u64> {
        self.domains
            .iter()
            .enumerate()
            .map(|(i, d)| (d.as_str(), i as u64))
            .collect()
    }

    /// xxh3-64 digest over the uncompressed newline-joined text. The
    /// resolver embeds this so loaders can detect a dictionary swap.
    pub fn checksum(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(self.to_text().as_bytes())
    }

    fn to_text(&self) -> String {
        let mut text = self.domains.join("\n");
        if !self.domains.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Write the dictionary as zstd-compressed newline-delimited text.
    pub fn save(&self, path: &Path, compression_level: i32) -> Result<()> {
        let file = File::create(path).map_err(|e| UrlakeError::io(path, "create dictionary", e))?;
        let mut encoder = zstd::stream::write::Encoder::new(file, compression_level)
            .map_err(|e| UrlakeError::io(path, "init zstd encoder", e))?;
        encoder
            .write_all(self.to_text().as_bytes())
            .map_err(|e| UrlakeError::io(path, "write dictionary", e))?;
        encoder
            .finish()
            .map_err(|e| UrlakeError::io(path, "finish dictionary", e))?;
        log::info!("wrote {} domains to {}", self.domains.len(), path.display());
        Ok(())
    }

    /// Load a dictionary written by `save`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| UrlakeError::io(path, "open dictionary", e))?;
        let mut decoder = zstd::stream::read::Decoder::new(file)
            .map_err(|e| UrlakeError::io(path, "init zstd decoder", e))?;
        let mut text = String::new();
        decoder
            .read_to_string(&mut text)
            .map_err(|e| UrlakeError::format(path, format!("bad dictionary payload: {}", e)))?;

        let domains: Vec<String> = text
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(DomainDictionary { domains })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dict(domains: &[&str]) -> DomainDictionary {
        DomainDictionary::from_domains(domains.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_position_is_domain_id() {
        let d = dict(&["a.com", "b.com", "c.com"]);
        assert_eq!(d.get(0), Some("a.com"));
        assert_eq!(d.get(2), Some("c.com"));
        assert_eq!(d.get(3), None);
        assert_eq!(d.id_map()["b.com"], 1);
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("domains.txt.zst");

        let original = dict(&["a.com", "b.org", "c.net"]);
        original.save(&path, 6).unwrap();
        let loaded = DomainDictionary::load(&path).unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(1), Some("b.org"));
        assert_eq!(loaded.checksum(), original.checksum());
    }

    #[test]
    fn test_empty_dictionary_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("domains.txt.zst");
        let empty = DomainDictionary::default();
        empty.save(&path, 6).unwrap();
        let loaded = DomainDictionary::load(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_checksum_changes_with_content() {
        assert_ne!(dict(&["a.com"]).checksum(), dict(&["b.com"]).checksum());
        // Order matters: the checksum pins id assignment, not just the set.
        assert_ne!(
            dict(&["a.com", "b.com"]).checksum(),
            dict(&["b.com", "a.com"]).checksum()
        );
    }
}
