//! Per-version read state shared by all query handlers.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::{Result, UrlakeError};
use crate::index::domain_dict::DomainDictionary;
use crate::index::file_registry::FileRegistry;
use crate::index::manifest::{IndexVersion, Manifest};
use crate::index::membership::MembershipFile;
use crate::index::postings::{Locator, PostingsShard};
use crate::index::resolver::DomainResolver;
use crate::index::version_dir;
use crate::storage::{read_row_group, StorageLayout, UrlRow};

/// Decompressed postings shards kept hot.
const SHARD_CACHE_CAPACITY: usize = 64;
/// Row-group pages kept hot.
const PAGE_CACHE_CAPACITY: usize = 64;

/// Read-only index state for one published version.
pub struct IndexLoader {
    layout: StorageLayout,
    version: IndexVersion,
    dict: DomainDictionary,
    resolver: DomainResolver,
    membership: MembershipFile,
    registry: FileRegistry,
    num_shards: u64,
    shard_cache: Mutex<LruCache<u64, Option<Arc<PostingsShard>>>>,
    page_cache: Mutex<LruCache<(u32, u32), Arc<Vec<UrlRow>>>>,
}

impl IndexLoader {
    /// Load the current manifest version. Fails with `VersionMissing` when
    /// nothing has been published yet.
    pub fn open(config: &Config) -> Result<Self> {
        let layout = StorageLayout::new(&config.base_path);
        let manifest = Manifest::load(layout.base_path())?;
        let version = manifest
            .current_version()
            .cloned()
            .ok_or_else(|| UrlakeError::version_missing("manifest has no current version"))?;
        log::info!("loading index version {}", version.version);

        let base = layout.base_path();
        let dict = DomainDictionary::load(&base.join(&version.domains_txt))?;
        let resolver = DomainResolver::load(&base.join(&version.domains_mphf))?;
        resolver.verify_dictionary(&dict)?;
        let membership = MembershipFile::open(&base.join(&version.membership))?;
        let registry = FileRegistry::load(&base.join(&version.files_tsv))?;

        log::info!(
            "loaded {} domains, {} part files",
            dict.len(),
            registry.len()
        );

        Ok(IndexLoader {
            layout,
            version,
            dict,
            resolver,
            membership,
            registry,
            num_shards: config.postings_shards,
            shard_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(SHARD_CACHE_CAPACITY).unwrap(),
            )),
            page_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(PAGE_CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    /// Name of the pinned version.
    pub fn version(&self) -> &str {
        &self.version.version
    }

    pub fn domain_count(&self) -> usize {
        self.dict.len()
    }

    pub fn file_count(&self) -> usize {
        self.registry.len()
    }

    /// Verified domain_id lookup: the resolver's candidate is confirmed
    /// against the dictionary, so a hash collision with an absent domain
    /// resolves to `None`.
    pub fn lookup_domain_id(&self, domain: &str) -> Option<u64> {
        let candidate = self.resolver.lookup(domain)?;
        match self.dict.get(candidate) {
            Some(stored) if stored == domain => Some(candidate),
            _ => None,
        }
    }

    /// Dataset ids holding `domain_id`, ascending.
    pub fn datasets_of(&self, domain_id: u64) -> Result<Vec<u32>> {
        self.membership.datasets_of(domain_id)
    }

    /// Postings locators for a key, through the shard cache.
    pub fn postings_of(&self, domain_id: u64, dataset_id: u32) -> Result<Option<Vec<Locator>>> {
        let shard = domain_id % self.num_shards;
        let cached = {
            let mut cache = self.shard_cache.lock().expect("shard cache poisoned");
            cache.get(&shard).cloned()
        };

        let shard_data = match cached {
            Some(hit) => hit,
            None => {
                let loaded = PostingsShard::load(&self.index_version_dir(), shard)?.map(Arc::new);
                let mut cache = self.shard_cache.lock().expect("shard cache poisoned");
                cache.put(shard, loaded.clone());
                loaded
            }
        };

        match shard_data {
            Some(shard_data) => shard_data.lookup(domain_id, dataset_id),
            None => Ok(None),
        }
    }

    /// Rows of one row group, through the page cache.
    pub fn row_group(&self, file_id: u32, row_group: u32) -> Result<Arc<Vec<UrlRow>>> {
        let key = (file_id, row_group);
        {
            let mut cache = self.page_cache.lock().expect("page cache poisoned");
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let entry = self.registry.get(file_id).ok_or_else(|| {
            UrlakeError::validation(format!("file_id {} not in registry", file_id))
        })?;
        let path = self.layout.resolve(&entry.rel_path);
        let rows = Arc::new(read_row_group(&path, row_group as usize)?);

        let mut cache = self.page_cache.lock().expect("page cache poisoned");
        cache.put(key, rows.clone());
        Ok(rows)
    }

    fn index_version_dir(&self) -> std::path::PathBuf {
        version_dir(self.layout.base_path(), &self.version.version)
    }

    /// Lake-relative path of a registered file (inspect helper).
    pub fn file_path(&self, file_id: u32) -> Option<&Path> {
        self.registry.get(file_id).map(|e| Path::new(e.rel_path.as_str()))
    }
}
