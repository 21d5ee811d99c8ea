//! Index build orchestration.
//!
//! Builds run in a fixed order (dictionary, resolver, file registry,
//! membership, postings, manifest) so every artifact a later step needs is
//! already on disk. All artifacts land in a fresh timestamped version
//! directory; the manifest flip at the end is the only publication step, so
//! a failed build leaves readers on the previous version.

use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Result, UrlakeError};
use crate::index::domain_dict::DomainDictionary;
use crate::index::file_registry::FileRegistry;
use crate::index::manifest::{version_name, IndexVersion, Manifest};
use crate::index::membership::MembershipIndex;
use crate::index::postings::PostingsIndex;
use crate::index::resolver::DomainResolver;
use crate::index::{files, version_dir, INDEX_DIR};
use crate::storage::StorageLayout;

/// Summary of one published index version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStats {
    pub version: String,
    pub num_domains: usize,
    pub num_files: usize,
    pub num_postings: usize,
}

/// Orchestrates the full and incremental build pipelines.
pub struct IndexBuilder {
    config: Config,
    layout: StorageLayout,
}

impl IndexBuilder {
    pub fn new(config: &Config) -> Self {
        IndexBuilder {
            config: config.clone(),
            layout: StorageLayout::new(&config.base_path),
        }
    }

    /// Build every component from scratch, ignoring any previous version.
    pub fn build_full(&self) -> Result<BuildStats> {
        let version = self.fresh_version_name()?;
        log::info!("full build of version {}", version);

        let all_files = self.layout.list_all_files()?;

        log::info!("step 1/6: domain dictionary");
        let dict = DomainDictionary::build_full(&self.layout, &all_files)?;

        log::info!("step 2/6: file registry");
        let registry = FileRegistry::build_full(&self.layout)?;

        let mut membership = MembershipIndex::default();
        let mut postings = PostingsIndex::new(self.config.postings_shards);
        {
            let id_map = dict.id_map();

            log::info!("step 3/6: membership index");
            membership.extend_from_files(&self.layout, &all_files, &id_map)?;

            log::info!("step 4/6: postings index");
            postings.extend_from_files(&self.layout, &all_files, &id_map, |rel| {
                registry.id_of(rel)
            })?;
        }

        self.write_and_publish(&version, &dict, &registry, &membership, &postings)
    }

    /// Incremental build against the current version. Falls back to a full
    /// build when none exists; returns the previous version untouched when
    /// the lake has no new files.
    pub fn build_incremental(&self) -> Result<BuildStats> {
        let manifest = Manifest::load(self.layout.base_path())?;
        let Some(previous) = manifest.current_version().cloned() else {
            log::info!("no previous version, building from scratch");
            return self.build_full();
        };
        log::info!("incremental build on top of {}", previous.version);

        let base = self.layout.base_path();
        let prev_registry = FileRegistry::load(&base.join(&previous.files_tsv))?;
        let new_files = prev_registry.new_files_since(&self.layout)?;
        if new_files.is_empty() {
            log::info!("no new files, keeping version {}", previous.version);
            return self.stats_for(&previous);
        }
        log::info!("{} new files to index", new_files.len());

        let version = self.fresh_version_name()?;

        log::info!("step 1/6: domain dictionary (incremental)");
        let prev_dict = DomainDictionary::load(&base.join(&previous.domains_txt))?;
        let dict = DomainDictionary::build_incremental(prev_dict, &self.layout, &new_files)?;

        log::info!("step 2/6: file registry (incremental)");
        let registry = FileRegistry::build_incremental(prev_registry, &self.layout)?;

        let mut membership = MembershipIndex::load(&base.join(&previous.membership))?;
        let mut postings = PostingsIndex::load_all(
            &version_dir(base, &previous.version),
            self.config.postings_shards,
        )?;
        {
            let id_map = dict.id_map();

            log::info!("step 3/6: membership index (incremental)");
            membership.extend_from_files(&self.layout, &new_files, &id_map)?;

            log::info!("step 4/6: postings index (incremental)");
            postings.extend_from_files(&self.layout, &new_files, &id_map, |rel| {
                registry.id_of(rel)
            })?;
            postings.compact();
        }

        self.write_and_publish(&version, &dict, &registry, &membership, &postings)
    }

    fn write_and_publish(
        &self,
        version: &str,
        dict: &DomainDictionary,
        registry: &FileRegistry,
        membership: &MembershipIndex,
        postings: &PostingsIndex,
    ) -> Result<BuildStats> {
        let dir = version_dir(self.layout.base_path(), version);
        fs::create_dir_all(&dir)
            .map_err(|e| UrlakeError::io(&dir, "create version directory", e))?;
        let level = self.config.compression_level;

        dict.save(&dir.join(files::DOMAINS), level)?;

        log::info!("step 5/6: domain resolver");
        let resolver = DomainResolver::build(dict);
        resolver.save(&dir.join(files::RESOLVER), level)?;

        registry.save(&dir.join(files::FILE_REGISTRY), level)?;
        membership.save(&dir.join(files::MEMBERSHIP), dict.len() as u64)?;
        postings.save(&dir, level)?;

        log::info!("step 6/6: publishing to manifest");
        let mut manifest = Manifest::load(self.layout.base_path())?;
        manifest.publish(IndexVersion::for_build(version))?;

        Ok(BuildStats {
            version: version.to_string(),
            num_domains: dict.len(),
            num_files: registry.len(),
            num_postings: postings.entry_count(),
        })
    }

    fn stats_for(&self, published: &IndexVersion) -> Result<BuildStats> {
        let base = self.layout.base_path();
        let dict = DomainDictionary::load(&base.join(&published.domains_txt))?;
        let registry = FileRegistry::load(&base.join(&published.files_tsv))?;
        let postings = PostingsIndex::load_all(
            &version_dir(base, &published.version),
            self.config.postings_shards,
        )?;
        Ok(BuildStats {
            version: published.version.clone(),
            num_domains: dict.len(),
            num_files: registry.len(),
            num_postings: postings.entry_count(),
        })
    }

    /// Timestamped version name, suffixed when a same-second build already
    /// claimed the directory.
    fn fresh_version_name(&self) -> Result<String> {
        let base = version_name();
        let mut candidate = base.clone();
        let mut attempt = 1;
        while version_dir(self.layout.base_path(), &candidate).exists() {
            attempt += 1;
            candidate = format!("{}-{}", base, attempt);
        }
        Ok(candidate)
    }

    /// Remove version directories that are neither current nor among the
    /// newest `version_retention_count`. Returns the deleted version names.
    pub fn gc(&self) -> Result<Vec<String>> {
        let mut manifest = Manifest::load(self.layout.base_path())?;
        let removed = manifest.cleanup_old_versions(self.config.version_retention_count)?;

        let mut deleted = Vec::new();
        for version in removed {
            let dir = version_dir(self.layout.base_path(), &version);
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .map_err(|e| UrlakeError::io(&dir, "remove version directory", e))?;
            }
            deleted.push(version);
        }

        // Version directories never referenced by the manifest (aborted
        // builds) are also fair game once they are not the newest entry.
        let index_root = self.layout.base_path().join(INDEX_DIR);
        if index_root.exists() {
            for entry in fs::read_dir(&index_root)
                .map_err(|e| UrlakeError::io(&index_root, "list index root", e))?
            {
                let entry = entry.map_err(|e| UrlakeError::io(&index_root, "list index root", e))?;
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if manifest.get_version(&name).is_none() {
                    log::info!("removing unreferenced version directory {}", name);
                    fs::remove_dir_all(&path)
                        .map_err(|e| UrlakeError::io(&path, "remove version directory", e))?;
                    deleted.push(name);
                }
            }
        }

        Ok(deleted)
    }

    /// Paths helper for tests and the inspect command.
    pub fn version_dir(&self, version: &str) -> PathBuf {
        version_dir(self.layout.base_path(), version)
    }
}
