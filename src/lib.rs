//! urlake: a partitioned Parquet URL lake with a versioned domain index.
//!
//! The crate answers two queries at web-crawl scale: which datasets contain
//! a registrable domain, and which URLs a (domain, dataset) pair holds.
//! Normalized URL rows live in a Hive-partitioned Parquet tree; a compound
//! multi-file index (sorted domain dictionary, hash resolver, membership
//! bitmaps, sharded postings, file registry) is built full or incrementally
//! and published atomically through a manifest.

pub mod api;
pub mod config;
pub mod encoding;
pub mod error;
pub mod ids;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod normalize;
pub mod query;
pub mod registry;
pub mod storage;

pub use config::Config;
pub use error::{Result, UrlakeError};
pub use ingest::{IngestStats, Ingestor};
pub use normalize::{normalize, NormalizedUrl};
