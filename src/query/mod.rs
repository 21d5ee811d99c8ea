//! Query execution against one pinned index version.
//!
//! `IndexLoader` holds the read-only state for a single published version:
//! the domain dictionary, the resolver, the memory-mapped membership index,
//! the file registry, and bounded LRU caches for decompressed postings
//! shards and row-group pages. It is loaded once at server startup and
//! shared by reference across request handlers; nothing in it mutates
//! during a request, so handlers run lock-free apart from cache interiors.
//!
//! `QueryService` chains resolver → membership → postings → row-group scan
//! to answer the two queries.

mod loader;
mod service;

pub use loader::IndexLoader;
pub use service::{DatasetMembership, DomainInfo, QueryService, UrlItem, UrlPage};
