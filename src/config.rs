//! Configuration for the lake, index builder, and query service.
//!
//! The recognized options are exactly:
//! `base_path`, `partition_buffer_size`, `global_buffer_limit`,
//! `compression_level`, `postings_shards`, `max_limit`,
//! `version_retention_count`.
//!
//! Values come from a TOML file (all fields optional, defaults below),
//! overridden by `URLAKE_*` environment variables, overridden by CLI flags.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, UrlakeError};

/// Default per-partition buffer: 128 MiB.
pub const DEFAULT_PARTITION_BUFFER_SIZE: usize = 128 * 1024 * 1024;
/// Default global in-memory ceiling across all partitions: 1 GiB.
pub const DEFAULT_GLOBAL_BUFFER_LIMIT: usize = 1024 * 1024 * 1024;
/// Default zstd compression level for Parquet payloads and index artifacts.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;
/// Default number of postings shards (must be a power of two).
pub const DEFAULT_POSTINGS_SHARDS: u64 = 1024;
/// Default page-size ceiling for URL queries.
pub const DEFAULT_MAX_LIMIT: u32 = 10_000;
/// Default number of index versions kept by gc.
pub const DEFAULT_VERSION_RETENTION_COUNT: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root directory of the lake (`urls/`, `index/`, `registry/` live here).
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Per-partition buffered bytes before a flush. 0 means write-through.
    #[serde(default = "default_partition_buffer_size")]
    pub partition_buffer_size: usize,

    /// Total buffered bytes across partitions before the largest buffer is
    /// force-flushed. 0 disables the ceiling.
    #[serde(default = "default_global_buffer_limit")]
    pub global_buffer_limit: usize,

    /// Zstd level for Parquet payloads and compressed index artifacts.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Number of postings shards. Must be a power of two.
    #[serde(default = "default_postings_shards")]
    pub postings_shards: u64,

    /// Hard ceiling on the `limit` query parameter; larger values are clamped.
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,

    /// Number of published index versions `gc` retains.
    #[serde(default = "default_version_retention_count")]
    pub version_retention_count: usize,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./data")
}
fn default_partition_buffer_size() -> usize {
    DEFAULT_PARTITION_BUFFER_SIZE
}
fn default_global_buffer_limit() -> usize {
    DEFAULT_GLOBAL_BUFFER_LIMIT
}
fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}
fn default_postings_shards() -> u64 {
    DEFAULT_POSTINGS_SHARDS
}
fn default_max_limit() -> u32 {
    DEFAULT_MAX_LIMIT
}
fn default_version_retention_count() -> usize {
    DEFAULT_VERSION_RETENTION_COUNT
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_path: default_base_path(),
            partition_buffer_size: default_partition_buffer_size(),
            global_buffer_limit: default_global_buffer_limit(),
            compression_level: default_compression_level(),
            postings_shards: default_postings_shards(),
            max_limit: default_max_limit(),
            version_retention_count: default_version_retention_count(),
        }
    }
}

impl Config {
    /// Parse a TOML config file and apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)
            .map_err(|e| UrlakeError::io(path, "read config file", e))?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| UrlakeError::validation(format!("failed to parse config TOML: {}", e)))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from defaults and environment overrides only.
    pub fn from_env() -> Result<Config> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("URLAKE_BASE_PATH") {
            self.base_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("URLAKE_PARTITION_BUFFER_SIZE") {
            self.partition_buffer_size = parse_env("URLAKE_PARTITION_BUFFER_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("URLAKE_GLOBAL_BUFFER_LIMIT") {
            self.global_buffer_limit = parse_env("URLAKE_GLOBAL_BUFFER_LIMIT", &v)?;
        }
        if let Ok(v) = std::env::var("URLAKE_COMPRESSION_LEVEL") {
            self.compression_level = parse_env("URLAKE_COMPRESSION_LEVEL", &v)?;
        }
        if let Ok(v) = std::env::var("URLAKE_POSTINGS_SHARDS") {
            self.postings_shards = parse_env("URLAKE_POSTINGS_SHARDS", &v)?;
        }
        if let Ok(v) = std::env::var("URLAKE_MAX_LIMIT") {
            self.max_limit = parse_env("URLAKE_MAX_LIMIT", &v)?;
        }
        if let Ok(v) = std::env::var("URLAKE_VERSION_RETENTION_COUNT") {
            self.version_retention_count = parse_env("URLAKE_VERSION_RETENTION_COUNT", &v)?;
        }
        Ok(())
    }

    /// Check cross-field and range constraints.
    pub fn validate(&self) -> Result<()> {
        if !self.postings_shards.is_power_of_two() {
            return Err(UrlakeError::validation(format!(
                "postings_shards must be a power of two (got {})",
                self.postings_shards
            )));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(UrlakeError::validation(format!(
                "compression_level must be in 1..=22 (got {})",
                self.compression_level
            )));
        }
        if self.max_limit == 0 {
            return Err(UrlakeError::validation("max_limit must be at least 1"));
        }
        if self.version_retention_count == 0 {
            return Err(UrlakeError::validation(
                "version_retention_count must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| UrlakeError::validation(format!("invalid {}='{}': {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.partition_buffer_size, 128 * 1024 * 1024);
        assert_eq!(config.global_buffer_limit, 1024 * 1024 * 1024);
        assert_eq!(config.compression_level, 6);
        assert_eq!(config.postings_shards, 1024);
        assert_eq!(config.max_limit, 10_000);
        assert_eq!(config.version_retention_count, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urlake.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "base_path = \"/srv/lake\"\npostings_shards = 256").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.base_path, PathBuf::from("/srv/lake"));
        assert_eq!(config.postings_shards, 256);
        // Untouched fields keep defaults.
        assert_eq!(config.max_limit, 10_000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urlake.toml");
        std::fs::write(&path, "row_group_bytes = 1024\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_non_power_of_two_shards_rejected() {
        let config = Config {
            postings_shards: 1000,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compression_level_range() {
        let config = Config {
            compression_level: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            compression_level: 23,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
