//! Manifest: the single small document naming index versions.
//!
//! Stored as JSON at `index/manifest.json` for easy inspection. A version
//! entry names every artifact of one published version; `current_version`
//! points at the version readers should use.
//!
//! Publishing is atomic: all artifacts are fully written under the version
//! directory first, then the manifest is serialized to a temp file and
//! renamed into place. A reader that opened the manifest before the rename
//! keeps the old version for the duration of its request; the pointer never
//! names a partially written version.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, UrlakeError};
use crate::index::{files, INDEX_DIR};

/// One published index version and its artifact paths (lake-relative).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexVersion {
    pub version: String,
    pub domains_txt: String,
    pub domains_mphf: String,
    pub membership: String,
    pub postings_base: String,
    pub files_tsv: String,
    pub parquet_root: String,
    pub created_at: String,
}

impl IndexVersion {
    /// Canonical artifact paths for a freshly built version.
    pub fn for_build(version: &str) -> Self {
        let dir = format!("{}/{}", INDEX_DIR, version);
        IndexVersion {
            version: version.to_string(),
            domains_txt: format!("{}/{}", dir, files::DOMAINS),
            domains_mphf: format!("{}/{}", dir, files::RESOLVER),
            membership: format!("{}/{}", dir, files::MEMBERSHIP),
            postings_base: format!("{}/{}/", dir, files::POSTINGS_DIR),
            files_tsv: format!("{}/{}", dir, files::FILE_REGISTRY),
            parquet_root: "urls/".to_string(),
            created_at: utc_timestamp(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestDocument {
    current_version: Option<String>,
    versions: Vec<IndexVersion>,
}

/// Manifest manager for one lake root.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    current_version: Option<String>,
    versions: Vec<IndexVersion>,
}

impl Manifest {
    pub fn manifest_path(base_path: &Path) -> PathBuf {
        base_path.join(INDEX_DIR).join("manifest.json")
    }

    /// Load the manifest, or start empty when none exists yet.
    pub fn load(base_path: &Path) -> Result<Self> {
        let path = Self::manifest_path(base_path);
        if !path.exists() {
            log::info!("no manifest at {}, starting fresh", path.display());
            return Ok(Manifest {
                path,
                current_version: None,
                versions: Vec::new(),
            });
        }

        let contents =
            fs::read_to_string(&path).map_err(|e| UrlakeError::io(&path, "read manifest", e))?;
        let doc: ManifestDocument = serde_json::from_str(&contents)
            .map_err(|e| UrlakeError::format(&path, format!("bad manifest JSON: {}", e)))?;

        if let Some(current) = &doc.current_version {
            if !doc.versions.iter().any(|v| &v.version == current) {
                return Err(UrlakeError::version_missing(format!(
                    "manifest current_version '{}' has no version entry",
                    current
                )));
            }
        }

        Ok(Manifest {
            path,
            current_version: doc.current_version,
            versions: doc.versions,
        })
    }

    /// Persist atomically (temp file + rename).
    pub fn save(&self) -> Result<()> {
        let doc = ManifestDocument {
            current_version: self.current_version.clone(),
            versions: self.versions.clone(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UrlakeError::io(parent, "create index directory", e))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(&doc)?;
        fs::write(&tmp_path, payload)
            .map_err(|e| UrlakeError::io(&tmp_path, "write manifest", e))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| UrlakeError::io(&self.path, "publish manifest", e))?;
        Ok(())
    }

    /// Add (or replace) a version entry, set it current, and save.
    pub fn publish(&mut self, version: IndexVersion) -> Result<()> {
        let name = version.version.clone();
        self.versions.retain(|v| v.version != name);
        self.versions.push(version);
        let old = self.current_version.replace(name.clone());
        self.save()?;
        log::info!(
            "published version {} (was {})",
            name,
            old.as_deref().unwrap_or("none")
        );
        Ok(())
    }

    pub fn current_version(&self) -> Option<&IndexVersion> {
        let current = self.current_version.as_deref()?;
        self.versions.iter().find(|v| v.version == current)
    }

    pub fn get_version(&self, version: &str) -> Option<&IndexVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Version names ordered by creation time.
    pub fn list_versions(&self) -> Vec<&str> {
        let mut versions: Vec<&IndexVersion> = self.versions.iter().collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        versions.iter().map(|v| v.version.as_str()).collect()
    }

    /// Drop the oldest entries beyond `keep`, never dropping the current
    /// version. Returns the removed version names; deleting their
    /// directories is gc's job.
    pub fn cleanup_old_versions(&mut self, keep: usize) -> Result<Vec<String>> {
        if self.versions.len() <= keep {
            return Ok(Vec::new());
        }

        let mut ordered: Vec<IndexVersion> = self.versions.clone();
        // Version name breaks created_at ties (same-second builds carry a
        // numeric suffix that sorts after the base name).
        ordered.sort_by(|a, b| {
            (b.created_at.as_str(), b.version.as_str()).cmp(&(a.created_at.as_str(), a.version.as_str()))
        });

        let mut kept: Vec<IndexVersion> = Vec::new();
        let mut removed: Vec<String> = Vec::new();
        for version in ordered {
            let is_current = Some(version.version.as_str()) == self.current_version.as_deref();
            if kept.len() < keep || is_current {
                kept.push(version);
            } else {
                removed.push(version.version);
            }
        }

        if !removed.is_empty() {
            self.versions = kept;
            self.save()?;
            log::info!("removed {} old versions from manifest: {:?}", removed.len(), removed);
        }
        Ok(removed)
    }
}

/// Seconds-precision UTC timestamp like `2026-08-02T12:00:00Z`.
pub fn utc_timestamp() -> String {
    format_utc(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_secs(),
    )
}

/// Filesystem-safe version name like `20260802T120000Z`.
pub fn version_name() -> String {
    let ts = utc_timestamp();
    ts.replace(['-', ':'], "")
}

fn format_utc(epoch_secs: u64) -> String {
    let days = epoch_secs / 86_400;
    let secs_of_day = epoch_secs % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_manifest() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::load(dir.path()).unwrap();
        assert!(manifest.current_version().is_none());
        assert!(manifest.list_versions().is_empty());
    }

    #[test]
    fn test_publish_and_reload() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::load(dir.path()).unwrap();
        manifest.publish(IndexVersion::for_build("v1")).unwrap();

        let reloaded = Manifest::load(dir.path()).unwrap();
        let current = reloaded.current_version().unwrap();
        assert_eq!(current.version, "v1");
        assert_eq!(current.domains_txt, "index/v1/domains.txt.zst");
        assert_eq!(current.files_tsv, "index/v1/files.tsv.zst");
        assert_eq!(current.parquet_root, "urls/");
    }

    #[test]
    fn test_publish_flips_current() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::load(dir.path()).unwrap();
        manifest.publish(IndexVersion::for_build("v1")).unwrap();
        manifest.publish(IndexVersion::for_build("v2")).unwrap();

        assert_eq!(manifest.current_version().unwrap().version, "v2");
        assert!(manifest.get_version("v1").is_some());
    }

    #[test]
    fn test_dangling_current_rejected() {
        let dir = tempdir().unwrap();
        let path = Manifest::manifest_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"current_version": "ghost", "versions": []}"#).unwrap();

        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, UrlakeError::VersionMissing(_)));
    }

    #[test]
    fn test_cleanup_keeps_current() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::load(dir.path()).unwrap();
        for name in ["v1", "v2", "v3", "v4"] {
            let mut version = IndexVersion::for_build(name);
            // Distinct creation times so ordering is deterministic.
            version.created_at = format!("2026-01-0{}T00:00:00Z", name.trim_start_matches('v'));
            manifest.publish(version).unwrap();
        }

        let removed = manifest.cleanup_old_versions(2).unwrap();
        assert_eq!(removed, vec!["v2".to_string(), "v1".to_string()]);
        assert_eq!(manifest.current_version().unwrap().version, "v4");
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_utc(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_utc(86_400 + 3661), "1970-01-02T01:01:01Z");
        // 2026-08-02T00:00:00Z
        assert_eq!(format_utc(1_785_628_800), "2026-08-02T00:00:00Z");
    }

    #[test]
    fn test_version_name_is_path_safe() {
        let name = version_name();
        assert!(!name.contains(':'));
        assert!(!name.contains('-'));
        assert!(name.ends_with('Z'));
    }
}
