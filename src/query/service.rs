//! The two query algorithms.
//!
//! Operation A (`datasets_of`): resolver → dictionary verify → membership.
//! Operation B (`urls_of`): resolver → postings → row-group scan with
//! offset/limit pagination.
//!
//! The row-group filter compares the stored `domain` string against the
//! query string, not the stored hash id. String equality stays correct even
//! across historical dictionary rebuilds, and it also rejects the rare
//! url_id/domain-hash collision row.
//!
//! Unknown domains, unknown datasets, and empty postings are all empty
//! results, never errors. Requests may carry a deadline; an expired
//! deadline stops further row-group reads and returns the page accumulated
//! so far, truncated at a row boundary, with `next_offset` set.

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::query::loader::IndexLoader;

/// One dataset holding a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMembership {
    pub dataset_id: u32,
    /// Populated only when an external pre-aggregate exists; never here.
    pub url_count_est: Option<u64>,
}

/// Answer to operation A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    pub domain: String,
    pub domain_id: Option<u64>,
    pub datasets: Vec<DatasetMembership>,
}

/// One URL of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlItem {
    pub url_id: u64,
    pub url: String,
}

/// Answer to operation B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPage {
    pub domain: String,
    pub dataset_id: u32,
    pub total_est: Option<u64>,
    pub items: Vec<UrlItem>,
    pub next_offset: Option<u64>,
}

/// Reconstruct a stored row into its URL string.
pub fn reconstruct_url(scheme: &str, host: &str, path_query: &str) -> String {
    format!("{}://{}{}", scheme, host, path_query)
}

/// Query executor over one loaded index version.
pub struct QueryService {
    loader: Arc<IndexLoader>,
    max_limit: u32,
}

impl QueryService {
    pub fn new(loader: Arc<IndexLoader>, max_limit: u32) -> Self {
        QueryService { loader, max_limit }
    }

    pub fn loader(&self) -> &IndexLoader {
        &self.loader
    }

    /// Ceiling applied to the `limit` parameter.
    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Operation A: which datasets contain `domain`.
    ///
    /// Absent domains yield an empty dataset list, not an error.
    pub fn datasets_of(&self, domain: &str) -> Result<DomainInfo> {
        let Some(domain_id) = self.loader.lookup_domain_id(domain) else {
            return Ok(DomainInfo {
                domain: domain.to_string(),
                domain_id: None,
                datasets: Vec::new(),
            });
        };

        let datasets = self
            .loader
            .datasets_of(domain_id)?
            .into_iter()
            .map(|dataset_id| DatasetMembership {
                dataset_id,
                url_count_est: None,
            })
            .collect();

        Ok(DomainInfo {
            domain: domain.to_string(),
            domain_id: Some(domain_id),
            datasets,
        })
    }

    /// Operation B: page through the URLs of `(domain, dataset_id)`.
    ///
    /// `limit` is clamped to `max_limit`. `limit = 0` returns an empty page
    /// with `next_offset = offset`. `deadline`, when given, bounds the scan:
    /// row groups are not fetched past it.
    pub fn urls_of(
        &self,
        domain: &str,
        dataset_id: u32,
        offset: u64,
        limit: u32,
        deadline: Option<Instant>,
    ) -> Result<UrlPage> {
        let limit = limit.min(self.max_limit) as usize;

        let empty = |next_offset| UrlPage {
            domain: domain.to_string(),
            dataset_id,
            total_est: None,
            items: Vec::new(),
            next_offset,
        };

        if limit == 0 {
            return Ok(empty(Some(offset)));
        }

        let Some(domain_id) = self.loader.lookup_domain_id(domain) else {
            return Ok(empty(None));
        };
        let Some(locators) = self.loader.postings_of(domain_id, dataset_id)? else {
            return Ok(empty(None));
        };

        let mut items = Vec::new();
        let mut skipped = 0u64;
        let mut truncated = false;
        let mut filled = false;

        'scan: for &(file_id, row_group) in &locators {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                truncated = !items.is_empty();
                if !truncated {
                    // Nothing gathered before the deadline: report an empty
                    // page the client can retry from the same offset.
                    return Ok(empty(Some(offset)));
                }
                break;
            }

            let rows = self.loader.row_group(file_id, row_group)?;
            for row in rows.iter() {
                if row.domain != domain {
                    continue;
                }
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                if items.len() >= limit {
                    filled = true;
                    break 'scan;
                }
                items.push(UrlItem {
                    url_id: row.url_id,
                    url: reconstruct_url(&row.scheme, &row.host, &row.path_query),
                });
            }
        }
        // A page cut exactly at the last row still reports a next offset;
        // the follow-up request comes back empty and terminates paging.
        let has_more = filled || items.len() == limit;

        let next_offset = if truncated || has_more {
            Some(offset + items.len() as u64)
        } else {
            None
        };

        Ok(UrlPage {
            domain: domain.to_string(),
            dataset_id,
            total_est: None,
            items,
            next_offset,
        })
    }
}
