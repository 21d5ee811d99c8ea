//! Postings index: (domain_id, dataset_id) → row-group locators.
//!
//! Sharded by `domain_id % num_shards`. Each shard is a pair of
//! zstd-compressed files:
//!
//! ```text
//! postings.idx.zst:  magic "PDX1" | version u32 | n_entries u64 | data_offset u64
//!                    n × (domain_id u64, dataset_id u32,
//!                         payload_offset u64, payload_len u32)   sorted by key
//! postings.dat.zst:  magic "PDD1" | version u32 | payloads…
//! ```
//!
//! A payload is a varint pair count followed by varint (file_id, row_group)
//! pairs. Payload offsets are absolute within the decompressed data file.
//!
//! Lookup decompresses one shard, binary-searches the fixed-width index
//! records, and decodes one payload. Incremental builds append locators from
//! new files to existing keys; `compact` dedups pairs without changing
//! lookup semantics.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::encoding::{decode_varint, push_varint};
use crate::error::{Result, UrlakeError};
use crate::index::files;
use crate::storage::{
    distinct_domains_in_row_group, partition_components, row_group_count, StorageLayout,
};

const MAGIC_IDX: &[u8; 4] = b"PDX1";
const MAGIC_DAT: &[u8; 4] = b"PDD1";
const VERSION: u32 = 1;
const DAT_HEADER_LEN: u64 = 8;
const IDX_RECORD_LEN: usize = 8 + 4 + 8 + 4;

/// Location of rows for one key: a part file and a row group within it.
pub type Locator = (u32, u32);

/// In-memory postings map used during builds.
#[derive(Debug)]
pub struct PostingsIndex {
    num_shards: u64,
    postings: BTreeMap<(u64, u32), Vec<Locator>>,
}

impl PostingsIndex {
    pub fn new(num_shards: u64) -> Self {
        PostingsIndex {
            num_shards,
            postings: BTreeMap::new(),
        }
    }

    pub fn shard_of(&self, domain_id: u64) -> u64 {
        domain_id % self.num_shards
    }

    pub fn entry_count(&self) -> usize {
        self.postings.len()
    }

    /// Record locators for every (domain, row group) of the given files.
    pub fn extend_from_files(
        &mut self,
        layout: &StorageLayout,
        rel_paths: &[String],
        id_map: &std::collections::HashMap<&str, u64>,
        file_id_of: impl Fn(&str) -> Option<u32>,
    ) -> Result<()> {
        for rel_path in rel_paths {
            let Some((dataset_id, _)) = partition_components(rel_path) else {
                log::warn!("skipping file outside partition scheme: {}", rel_path);
                continue;
            };
            let Some(file_id) = file_id_of(rel_path) else {
                log::warn!("file not in registry, skipping: {}", rel_path);
                continue;
            };

            let abs_path = layout.resolve(rel_path);
            for row_group in 0..row_group_count(&abs_path)? {
                for domain in distinct_domains_in_row_group(&abs_path, row_group)? {
                    let Some(&domain_id) = id_map.get(domain.as_str()) else {
                        log::warn!("domain '{}' missing from dictionary, skipping", domain);
                        continue;
                    };
                    self.postings
                        .entry((domain_id, dataset_id))
                        .or_default()
                        .push((file_id, row_group as u32));
                }
            }
        }
        Ok(())
    }

    /// Deduplicate locators per key, keeping first-occurrence order.
    pub fn compact(&mut self) {
        for locators in self.postings.values_mut() {
            let mut seen = std::collections::HashSet::with_capacity(locators.len());
            locators.retain(|loc| seen.insert(*loc));
        }
    }

    /// Write every non-empty shard under `{version_dir}/postings/`.
    pub fn save(&self, version_dir: &Path, compression_level: i32) -> Result<usize> {
        let postings_dir = version_dir.join(files::POSTINGS_DIR);

        let mut shards: BTreeMap<u64, Vec<(&(u64, u32), &Vec<Locator>)>> = BTreeMap::new();
        for (key, locators) in &self.postings {
            shards.entry(self.shard_of(key.0)).or_default().push((key, locators));
        }

        for (&shard, entries) in &shards {
            let shard_dir = postings_dir.join(files::postings_shard(shard));
            std::fs::create_dir_all(&shard_dir)
                .map_err(|e| UrlakeError::io(&shard_dir, "create shard directory", e))?;

            let mut dat = Vec::new();
            dat.extend_from_slice(MAGIC_DAT);
            dat.extend_from_slice(&VERSION.to_le_bytes());

            let mut idx = Vec::new();
            idx.extend_from_slice(MAGIC_IDX);
            idx.extend_from_slice(&VERSION.to_le_bytes());
            idx.extend_from_slice(&(entries.len() as u64).to_le_bytes());
            idx.extend_from_slice(&DAT_HEADER_LEN.to_le_bytes());

            // BTreeMap iteration keeps records sorted by (domain_id, dataset_id).
            for &(key, locators) in entries.iter() {
                let (domain_id, dataset_id) = *key;
                let mut payload = Vec::new();
                push_varint(locators.len() as u64, &mut payload);
                for &(file_id, row_group) in locators.iter() {
                    push_varint(file_id as u64, &mut payload);
                    push_varint(row_group as u64, &mut payload);
                }

                let payload_offset = dat.len() as u64;
                if payload.len() > u32::MAX as usize {
                    return Err(UrlakeError::overflow(
                        "postings payload",
                        u32::MAX as u64,
                        payload.len() as u64,
                    ));
                }
                dat.extend_from_slice(&payload);

                idx.extend_from_slice(&domain_id.to_le_bytes());
                idx.extend_from_slice(&dataset_id.to_le_bytes());
                idx.extend_from_slice(&payload_offset.to_le_bytes());
                idx.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            }

            write_zstd(&shard_dir.join(files::POSTINGS_IDX), &idx, compression_level)?;
            write_zstd(&shard_dir.join(files::POSTINGS_DAT), &dat, compression_level)?;
        }

        log::info!(
            "wrote postings: {} entries across {} shards",
            self.postings.len(),
            shards.len()
        );
        Ok(shards.len())
    }

    /// Load every shard of a previous version into a builder map.
    pub fn load_all(version_dir: &Path, num_shards: u64) -> Result<Self> {
        let mut index = PostingsIndex::new(num_shards);
        for shard in 0..num_shards {
            let Some(shard_data) = PostingsShard::load(version_dir, shard)? else {
                continue;
            };
            for record in &shard_data.records {
                let locators = shard_data.decode_at(record)?;
                index
                    .postings
                    .insert((record.domain_id, record.dataset_id), locators);
            }
        }
        Ok(index)
    }

    #[cfg(test)]
    fn insert(&mut self, domain_id: u64, dataset_id: u32, locators: Vec<Locator>) {
        self.postings.insert((domain_id, dataset_id), locators);
    }
}

fn write_zstd(path: &Path, data: &[u8], compression_level: i32) -> Result<()> {
    let file = File::create(path).map_err(|e| UrlakeError::io(path, "create postings file", e))?;
    let mut encoder = zstd::stream::write::Encoder::new(file, compression_level)
        .map_err(|e| UrlakeError::io(path, "init zstd encoder", e))?;
    encoder
        .write_all(data)
        .map_err(|e| UrlakeError::io(path, "write postings file", e))?;
    encoder
        .finish()
        .map_err(|e| UrlakeError::io(path, "finish postings file", e))?;
    Ok(())
}

fn read_zstd(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| UrlakeError::io(path, "open postings file", e))?;
    let mut decoder = zstd::stream::read::Decoder::new(file)
        .map_err(|e| UrlakeError::io(path, "init zstd decoder", e))?;
    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .map_err(|e| UrlakeError::format(path, format!("bad zstd payload: {}", e)))?;
    Ok(data)
}

/// One fixed-width index record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingRecord {
    pub domain_id: u64,
    pub dataset_id: u32,
    payload_offset: u64,
    payload_len: u32,
}

/// A decompressed shard: sorted records plus the raw payload blob.
pub struct PostingsShard {
    path: PathBuf,
    records: Vec<PostingRecord>,
    dat: Vec<u8>,
}

impl PostingsShard {
    /// Load one shard of a version, `None` when the shard is empty (its
    /// files were never written).
    pub fn load(version_dir: &Path, shard: u64) -> Result<Option<Self>> {
        let shard_dir = version_dir
            .join(files::POSTINGS_DIR)
            .join(files::postings_shard(shard));
        let idx_path = shard_dir.join(files::POSTINGS_IDX);
        let dat_path = shard_dir.join(files::POSTINGS_DAT);
        if !idx_path.exists() || !dat_path.exists() {
            return Ok(None);
        }

        let idx = read_zstd(&idx_path)?;
        let dat = read_zstd(&dat_path)?;

        if idx.len() < 24 {
            return Err(UrlakeError::format(&idx_path, "postings index too short"));
        }
        if &idx[0..4] != MAGIC_IDX {
            return Err(UrlakeError::format(&idx_path, "bad magic (expected PDX1)"));
        }
        let version = u32::from_le_bytes(idx[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(UrlakeError::format(
                &idx_path,
                format!("unsupported postings version {} (expected {})", version, VERSION),
            ));
        }
        if dat.len() < DAT_HEADER_LEN as usize || &dat[0..4] != MAGIC_DAT {
            return Err(UrlakeError::format(&dat_path, "bad magic (expected PDD1)"));
        }

        let n_entries = u64::from_le_bytes(idx[8..16].try_into().unwrap()) as usize;
        let records_bytes = &idx[24..];
        if records_bytes.len() != n_entries * IDX_RECORD_LEN {
            return Err(UrlakeError::format(
                &idx_path,
                format!(
                    "record section is {} bytes, expected {} for {} entries",
                    records_bytes.len(),
                    n_entries * IDX_RECORD_LEN,
                    n_entries
                ),
            ));
        }

        let mut records = Vec::with_capacity(n_entries);
        for chunk in records_bytes.chunks_exact(IDX_RECORD_LEN) {
            records.push(PostingRecord {
                domain_id: u64::from_le_bytes(chunk[0..8].try_into().unwrap()),
                dataset_id: u32::from_le_bytes(chunk[8..12].try_into().unwrap()),
                payload_offset: u64::from_le_bytes(chunk[12..20].try_into().unwrap()),
                payload_len: u32::from_le_bytes(chunk[20..24].try_into().unwrap()),
            });
        }

        Ok(Some(PostingsShard {
            path: dat_path,
            records,
            dat,
        }))
    }

    /// Locators for a key, in payload order. `None` when the key is absent.
    pub fn lookup(&self, domain_id: u64, dataset_id: u32) -> Result<Option<Vec<Locator>>> {
        let found = self
            .records
            .binary_search_by_key(&(domain_id, dataset_id), |r| (r.domain_id, r.dataset_id));
        match found {
            Ok(i) => Ok(Some(self.decode_at(&self.records[i])?)),
            Err(_) => Ok(None),
        }
    }

    fn decode_at(&self, record: &PostingRecord) -> Result<Vec<Locator>> {
        let start = record.payload_offset as usize;
        let end = start + record.payload_len as usize;
        if end > self.dat.len() {
            return Err(UrlakeError::format(
                &self.path,
                format!(
                    "payload for ({}, {}) escapes the data file",
                    record.domain_id, record.dataset_id
                ),
            ));
        }
        decode_payload(&self.dat[start..end])
    }
}

/// Decode one varint payload into (file_id, row_group) pairs.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<Locator>> {
    let (count, mut offset) = decode_varint(payload)?;
    let mut locators = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (file_id, used) = decode_varint(&payload[offset..])?;
        offset += used;
        let (row_group, used) = decode_varint(&payload[offset..])?;
        offset += used;
        locators.push((file_id as u32, row_group as u32));
    }
    Ok(locators)
}
