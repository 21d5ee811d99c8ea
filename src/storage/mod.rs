//! Partitioned Parquet storage for normalized URL rows.
//!
//! Layout under the lake root:
//!
//! ```text
//! urls/
//! ├── dataset_id=0/
//! │   ├── domain_prefix=3a/
//! │   │   ├── part-00000.parquet
//! │   │   └── part-00001.parquet
//! │   └── domain_prefix=ff/
//! │       └── part-00000.parquet
//! └── dataset_id=1/
//!     └── ...
//! ```
//!
//! Parts within a partition are append-only and numbered monotonically.
//! A part file is immutable once it carries its final name.

mod layout;
mod reader;
mod writer;

pub use layout::{partition_components, StorageLayout, URLS_DIR};
pub use reader::{distinct_domains_in_file, distinct_domains_in_row_group, row_group_count, read_row_group};
pub use writer::{FlushStats, PartitionedWriter, UrlRow, ROW_GROUP_TARGET_BYTES};
