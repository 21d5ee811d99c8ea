//! The compound, versioned domain index.
//!
//! A published version is a directory under `index/{version}/` holding one
//! complete, immutable set of artifacts:
//!
//! ```text
//! index/
//! ├── manifest.json              # current_version + per-version artifact paths
//! └── 20260802T120000Z/
//!     ├── domains.txt.zst        # sorted domain dictionary (position = domain_id)
//!     ├── domains.mphf           # domain string → domain_id resolver
//!     ├── domain_to_datasets.roar# domain_id → dataset bitmap (DTDR)
//!     ├── files.tsv.zst          # file_id registry
//!     └── postings/
//!         └── 0007/
//!             ├── postings.idx.zst   # PDX1 sorted key records
//!             └── postings.dat.zst   # PDD1 varint payloads
//! ```
//!
//! Every binary artifact starts with a 4-byte ASCII magic and a u32 format
//! version, little-endian throughout.

pub mod builder;
pub mod domain_dict;
pub mod file_registry;
pub mod manifest;
pub mod membership;
pub mod postings;
pub mod resolver;

use std::path::{Path, PathBuf};

/// Name of the index root under the lake base path.
pub const INDEX_DIR: &str = "index";

/// Standard artifact names within a version directory.
pub mod files {
    pub const DOMAINS: &str = "domains.txt.zst";
    pub const RESOLVER: &str = "domains.mphf";
    pub const MEMBERSHIP: &str = "domain_to_datasets.roar";
    pub const FILE_REGISTRY: &str = "files.tsv.zst";
    pub const POSTINGS_DIR: &str = "postings";
    pub const POSTINGS_IDX: &str = "postings.idx.zst";
    pub const POSTINGS_DAT: &str = "postings.dat.zst";

    /// Directory name of one postings shard.
    pub fn postings_shard(shard: u64) -> String {
        format!("{:04}", shard)
    }
}

/// Directory of one index version under the lake root.
pub fn version_dir(base_path: &Path, version: &str) -> PathBuf {
    base_path.join(INDEX_DIR).join(version)
}
