//! Domain string → domain_id resolver.
//!
//! A hash table over xxh3-64 of the domain string. Entries whose hash is
//! unique map hash → domain_id directly; the caller must verify a direct hit
//! by reading the dictionary at the returned position and comparing strings
//! (hash collisions against absent domains are possible). Hashes shared by
//! more than one dictionary domain go to a collision overflow section that
//! stores the full domain string, so lookups through it are already
//! verified. A 16-bit tag (high bits of the hash) rejects most non-matching
//! overflow probes before any string compare.
//!
//! The resolver is rebuilt from scratch each version; build cost is linear
//! in the number of domains. The dictionary's checksum is embedded so a
//! loader can detect a resolver paired with the wrong dictionary.
//!
//! Persisted form (zstd-compressed):
//!
//! ```text
//! magic "MPHF" | version u32 | dict_hash u64 | n_direct u64 | n_collisions u32
//! n_direct    × (hash u64, domain_id u64)            sorted by hash
//! n_collisions× (hash u64, n u16,
//!                n × (tag u16, len u16, domain bytes, domain_id u64))
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Result, UrlakeError};
use crate::index::domain_dict::DomainDictionary;

const MAGIC: &[u8; 4] = b"MPHF";
const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CollisionEntry {
    tag: u16,
    domain: String,
    domain_id: u64,
}

/// Constant-expected-time map from domain string to dictionary position.
#[derive(Debug, Default)]
pub struct DomainResolver {
    dict_hash: u64,
    direct: HashMap<u64, u64>,
    collisions: HashMap<u64, Vec<CollisionEntry>>,
}

#[inline]
fn tag_of(hash: u64) -> u16 {
    (hash >> 48) as u16
}

impl DomainResolver {
    /// Build a resolver for the given dictionary.
    pub fn build(dict: &DomainDictionary) -> Self {
        let mut resolver = DomainResolver {
            dict_hash: dict.checksum(),
            direct: HashMap::with_capacity(dict.len()),
            collisions: HashMap::new(),
        };

        let mut collision_count = 0usize;
        for (domain_id, domain) in dict.iter() {
            let hash = xxh3_64(domain.as_bytes());

            if let Some(entries) = resolver.collisions.get_mut(&hash) {
                collision_count += 1;
                entries.push(CollisionEntry {
                    tag: tag_of(hash),
                    domain: domain.to_string(),
                    domain_id,
                });
            } else if let Some(existing_id) = resolver.direct.remove(&hash) {
                // Second domain with this hash: move both to the overflow.
                collision_count += 1;
                let existing_domain = dict
                    .get(existing_id)
                    .expect("direct entry points into dictionary")
                    .to_string();
                resolver.collisions.insert(
                    hash,
                    vec![
                        CollisionEntry {
                            tag: tag_of(hash),
                            domain: existing_domain,
                            domain_id: existing_id,
                        },
                        CollisionEntry {
                            tag: tag_of(hash),
                            domain: domain.to_string(),
                            domain_id,
                        },
                    ],
                );
            } else {
                resolver.direct.insert(hash, domain_id);
            }
        }

        if collision_count > 0 {
            log::warn!(
                "domain resolver: {} hash collisions across {} domains",
                collision_count,
                dict.len()
            );
        }
        resolver
    }

    /// Candidate domain_id for a domain string.
    ///
    /// A hit through the collision overflow is already string-verified. A
    /// hit through the direct table is a candidate only: the caller must
    /// read the dictionary at the returned position and compare.
    pub fn lookup(&self, domain: &str) -> Option<u64> {
        let hash = xxh3_64(domain.as_bytes());

        if let Some(entries) = self.collisions.get(&hash) {
            let tag = tag_of(hash);
            return entries
                .iter()
                .find(|e| e.tag == tag && e.domain == domain)
                .map(|e| e.domain_id);
        }
        self.direct.get(&hash).copied()
    }

    /// Checksum of the dictionary this resolver was built from.
    pub fn dict_hash(&self) -> u64 {
        self.dict_hash
    }

    /// Fail unless the resolver matches the given dictionary.
    pub fn verify_dictionary(&self, dict: &DomainDictionary) -> Result<()> {
        let expected = dict.checksum();
        if self.dict_hash != expected {
            return Err(UrlakeError::validation(format!(
                "resolver is stale: dictionary hash {:#018x} != expected {:#018x}; rebuild the index",
                self.dict_hash, expected
            )));
        }
        Ok(())
    }

    /// Number of resolvable domains.
    pub fn len(&self) -> usize {
        self.direct.len() + self.collisions.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to `path`, zstd-compressed.
    pub fn save(&self, path: &Path, compression_level: i32) -> Result<()> {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&VERSION.to_le_bytes());
        data.extend_from_slice(&self.dict_hash.to_le_bytes());
        data.extend_from_slice(&(self.direct.len() as u64).to_le_bytes());
        data.extend_from_slice(&(self.collisions.len() as u32).to_le_bytes());

        let mut direct: Vec<(u64, u64)> = self.direct.iter().map(|(&h, &id)| (h, id)).collect();
        direct.sort_unstable();
        for (hash, domain_id) in direct {
            data.extend_from_slice(&hash.to_le_bytes());
            data.extend_from_slice(&domain_id.to_le_bytes());
        }

        let mut collision_hashes: Vec<&u64> = self.collisions.keys().collect();
        collision_hashes.sort_unstable();
        for &hash in collision_hashes {
            let entries = &self.collisions[&hash];
            if entries.len() > u16::MAX as usize {
                return Err(UrlakeError::overflow(
                    "collision entries per hash",
                    u16::MAX as u64,
                    entries.len() as u64,
                ));
            }
            data.extend_from_slice(&hash.to_le_bytes());
            data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for entry in entries {
                let bytes = entry.domain.as_bytes();
                if bytes.len() > u16::MAX as usize {
                    return Err(UrlakeError::overflow(
                        "domain length",
                        u16::MAX as u64,
                        bytes.len() as u64,
                    ));
                }
                data.extend_from_slice(&entry.tag.to_le_bytes());
                data.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
                data.extend_from_slice(bytes);
                data.extend_from_slice(&entry.domain_id.to_le_bytes());
            }
        }

        let file = File::create(path).map_err(|e| UrlakeError::io(path, "create resolver", e))?;
        let mut encoder = zstd::stream::write::Encoder::new(file, compression_level)
            .map_err(|e| UrlakeError::io(path, "init zstd encoder", e))?;
        encoder
            .write_all(&data)
            .map_err(|e| UrlakeError::io(path, "write resolver", e))?;
        encoder
            .finish()
            .map_err(|e| UrlakeError::io(path, "finish resolver", e))?;
        Ok(())
    }

    /// Load a resolver written by `save`, validating magic and version.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| UrlakeError::io(path, "open resolver", e))?;
        let mut decoder = zstd::stream::read::Decoder::new(file)
            .map_err(|e| UrlakeError::io(path, "init zstd decoder", e))?;
        let mut data = Vec::new();
        decoder
            .read_to_end(&mut data)
            .map_err(|e| UrlakeError::format(path, format!("bad resolver payload: {}", e)))?;

        let mut cursor = Cursor::new(path, &data);
        let magic = cursor.take(4)?;
        if magic != MAGIC {
            return Err(UrlakeError::format(path, "bad magic (expected MPHF)"));
        }
        let version = cursor.read_u32()?;
        if version != VERSION {
            return Err(UrlakeError::format(
                path,
                format!("unsupported resolver version {} (expected {})", version, VERSION),
            ));
        }
        let dict_hash = cursor.read_u64()?;
        let n_direct = cursor.read_u64()? as usize;
        let n_collisions = cursor.read_u32()? as usize;

        let mut direct = HashMap::with_capacity(n_direct);
        for _ in 0..n_direct {
            let hash = cursor.read_u64()?;
            let domain_id = cursor.read_u64()?;
            direct.insert(hash, domain_id);
        }

        let mut collisions = HashMap::with_capacity(n_collisions);
        for _ in 0..n_collisions {
            let hash = cursor.read_u64()?;
            let n = cursor.read_u16()? as usize;
            let mut entries = Vec::with_capacity(n);
            for _ in 0..n {
                let tag = cursor.read_u16()?;
                let len = cursor.read_u16()? as usize;
                let bytes = cursor.take(len)?;
                let domain = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    UrlakeError::format(path, format!("collision domain not UTF-8: {}", e))
                })?;
                let domain_id = cursor.read_u64()?;
                entries.push(CollisionEntry {
                    tag,
                    domain,
                    domain_id,
                });
            }
            collisions.insert(hash, entries);
        }

        Ok(DomainResolver {
            dict_hash,
            direct,
            collisions,
        })
    }
}

/// Bounds-checked little-endian reader over a decompressed artifact.
struct Cursor<'a> {
    path: &'a Path,
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(path: &'a Path, data: &'a [u8]) -> Self {
        Cursor {
            path,
            data,
            offset: 0,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|&e| e <= self.data.len());
        let Some(end) = end else {
            return Err(UrlakeError::format(
                self.path,
                format!("truncated artifact at offset {}", self.offset),
            ));
        };
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
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
    fn test_lookup_present_domains() {
        let d = dict(&["a.com", "b.com", "c.com"]);
        let resolver = DomainResolver::build(&d);

        for (id, domain) in d.iter() {
            assert_eq!(resolver.lookup(domain), Some(id));
        }
        assert_eq!(resolver.len(), 3);
    }

    #[test]
    fn test_lookup_absent_usually_none() {
        let d = dict(&["a.com", "b.com"]);
        let resolver = DomainResolver::build(&d);
        // Absent domains resolve to None barring a 64-bit hash collision;
        // the caller-side dictionary verify covers that remote case.
        assert_eq!(resolver.lookup("missing.example"), None);
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("domains.mphf");

        let d = dict(&["a.com", "b.com", "c.com"]);
        let resolver = DomainResolver::build(&d);
        resolver.save(&path, 6).unwrap();

        let loaded = DomainResolver::load(&path).unwrap();
        assert_eq!(loaded.dict_hash(), d.checksum());
        assert!(loaded.verify_dictionary(&d).is_ok());
        for (id, domain) in d.iter() {
            assert_eq!(loaded.lookup(domain), Some(id));
        }
    }

    #[test]
    fn test_collision_overflow_round_trip() {
        // Force a collision by constructing the overflow directly: two
        // domains sharing one hash, plus a direct entry.
        let d = dict(&["a.com", "x.com", "y.com"]);
        let shared_hash = xxh3_64(b"x.com");
        let mut resolver = DomainResolver {
            dict_hash: d.checksum(),
            direct: HashMap::from([(xxh3_64(b"a.com"), 0)]),
            collisions: HashMap::from([(
                shared_hash,
                vec![
                    CollisionEntry {
                        tag: tag_of(shared_hash),
                        domain: "x.com".to_string(),
                        domain_id: 1,
                    },
                    CollisionEntry {
                        tag: tag_of(xxh3_64(b"y.com")),
                        domain: "y.com".to_string(),
                        domain_id: 2,
                    },
                ],
            )]),
        };
        // Collision lookups are string-verified.
        assert_eq!(resolver.lookup("x.com"), Some(1));
        assert_eq!(resolver.len(), 3);

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("domains.mphf");
        resolver.save(&path, 6).unwrap();
        resolver = DomainResolver::load(&path).unwrap();
        assert_eq!(resolver.lookup("x.com"), Some(1));
        assert_eq!(resolver.lookup("a.com"), Some(0));
    }

    #[test]
    fn test_stale_dictionary_detected() {
        let d1 = dict(&["a.com"]);
        let d2 = dict(&["a.com", "b.com"]);
        let resolver = DomainResolver::build(&d1);
        assert!(resolver.verify_dictionary(&d1).is_ok());
        assert!(resolver.verify_dictionary(&d2).is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("domains.mphf");
        let file = File::create(&path).unwrap();
        let mut encoder = zstd::stream::write::Encoder::new(file, 3).unwrap();
        encoder.write_all(b"NOPE\x01\x00\x00\x00").unwrap();
        encoder.finish().unwrap();

        let err = DomainResolver::load(&path).unwrap_err();
        assert!(err.to_string().contains("MPHF"));
    }

    #[test]
    fn test_truncated_artifact_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("domains.mphf");
        let file = File::create(&path).unwrap();
        let mut encoder = zstd::stream::write::Encoder::new(file, 3).unwrap();
        // Claims one direct entry but provides no records.
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&VERSION.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        encoder.write_all(&data).unwrap();
        encoder.finish().unwrap();

        assert!(DomainResolver::load(&path).is_err());
    }
}
