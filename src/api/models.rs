//! Wire models for the query API.

use serde::Serialize;

use crate::query::{DomainInfo, UrlPage};

#[derive(Debug, Serialize)]
pub struct DatasetEntry {
    pub dataset_id: u32,
    pub url_count_est: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct DomainResponse {
    pub domain: String,
    pub domain_id: Option<u64>,
    pub datasets: Vec<DatasetEntry>,
}

impl From<DomainInfo> for DomainResponse {
    fn from(info: DomainInfo) -> Self {
        DomainResponse {
            domain: info.domain,
            domain_id: info.domain_id,
            datasets: info
                .datasets
                .into_iter()
                .map(|d| DatasetEntry {
                    dataset_id: d.dataset_id,
                    url_count_est: d.url_count_est,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UrlEntry {
    pub url_id: u64,
    pub url: String,
    pub ts: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UrlsResponse {
    pub domain: String,
    pub dataset_id: u32,
    pub total_est: Option<u64>,
    pub items: Vec<UrlEntry>,
    pub next_offset: Option<u64>,
}

impl From<UrlPage> for UrlsResponse {
    fn from(page: UrlPage) -> Self {
        UrlsResponse {
            domain: page.domain,
            dataset_id: page.dataset_id,
            total_est: page.total_est,
            items: page
                .items
                .into_iter()
                .map(|item| UrlEntry {
                    url_id: item.url_id,
                    url: item.url,
                    ts: None,
                })
                .collect(),
            next_offset: page.next_offset,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}
