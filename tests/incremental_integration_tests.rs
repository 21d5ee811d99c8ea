//! Incremental build behavior: id stability, full/incremental equivalence,
//! no-op rebuilds, and gc retention.

use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;
use urlake::config::Config;
use urlake::index::builder::IndexBuilder;
use urlake::index::manifest::Manifest;
use urlake::ingest::Ingestor;
use urlake::query::{IndexLoader, QueryService};

fn test_config(base: &Path) -> Config {
    Config {
        base_path: base.to_path_buf(),
        partition_buffer_size: 0,
        postings_shards: 16,
        version_retention_count: 2,
        ..Config::default()
    }
}

fn ingest(config: &Config, dataset: &str, urls: &[String]) {
    let mut ingestor = Ingestor::new(config).unwrap();
    ingestor.ingest_urls(dataset, urls).unwrap();
}

fn open_service(config: &Config) -> QueryService {
    let loader = Arc::new(IndexLoader::open(config).unwrap());
    QueryService::new(loader, config.max_limit)
}

fn urls_sorted(service: &QueryService, domain: &str, dataset_id: u32) -> Vec<String> {
    let mut urls: Vec<String> = service
        .urls_of(domain, dataset_id, 0, 10_000, None)
        .unwrap()
        .items
        .into_iter()
        .map(|i| i.url)
        .collect();
    urls.sort();
    urls
}

#[test]
fn test_domain_id_stable_across_incremental_builds() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());

    ingest(&config, "alpha", &["https://example.com/1".to_string()]);
    IndexBuilder::new(&config).build_full().unwrap();

    let loader = IndexLoader::open(&config).unwrap();
    let original_id = loader.lookup_domain_id("example.com").unwrap();
    drop(loader);

    // New domains that sort before example.com must not displace it.
    let more: Vec<String> = (0..50)
        .map(|i| format!("https://a{:03}.com/x", i))
        .collect();
    ingest(&config, "alpha", &more);
    IndexBuilder::new(&config).build_incremental().unwrap();

    let loader = IndexLoader::open(&config).unwrap();
    assert_eq!(loader.lookup_domain_id("example.com"), Some(original_id));
    // Appended domains take ids past the old dictionary length.
    assert!(loader.lookup_domain_id("a000.com").unwrap() >= 1);
}

#[test]
fn test_incremental_matches_full_build_answers() {
    let chunk_one = [
        "https://example.com/a",
        "https://shared.org/1",
        "https://only-in-one.net/x",
    ];
    let chunk_two = [
        "https://example.com/b",
        "https://shared.org/2",
        "https://fresh.io/y",
    ];

    // Lake A: one dataset per chunk, indexed incrementally.
    let dir_a = tempdir().unwrap();
    let config_a = test_config(dir_a.path());
    ingest(&config_a, "alpha", &chunk_one.map(String::from));
    IndexBuilder::new(&config_a).build_full().unwrap();
    ingest(&config_a, "beta", &chunk_two.map(String::from));
    IndexBuilder::new(&config_a).build_incremental().unwrap();

    // Lake B: identical data, indexed in one full build.
    let dir_b = tempdir().unwrap();
    let config_b = test_config(dir_b.path());
    ingest(&config_b, "alpha", &chunk_one.map(String::from));
    ingest(&config_b, "beta", &chunk_two.map(String::from));
    IndexBuilder::new(&config_b).build_full().unwrap();

    let service_a = open_service(&config_a);
    let service_b = open_service(&config_b);

    for domain in ["example.com", "shared.org", "only-in-one.net", "fresh.io"] {
        let info_a = service_a.datasets_of(domain).unwrap();
        let info_b = service_b.datasets_of(domain).unwrap();
        let mut sets_a: Vec<u32> = info_a.datasets.iter().map(|d| d.dataset_id).collect();
        let mut sets_b: Vec<u32> = info_b.datasets.iter().map(|d| d.dataset_id).collect();
        sets_a.sort();
        sets_b.sort();
        assert_eq!(sets_a, sets_b, "membership differs for {}", domain);

        for dataset_id in sets_a {
            assert_eq!(
                urls_sorted(&service_a, domain, dataset_id),
                urls_sorted(&service_b, domain, dataset_id),
                "urls differ for ({}, {})",
                domain,
                dataset_id
            );
        }
    }
}

#[test]
fn test_incremental_without_previous_delegates_to_full() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    ingest(&config, "alpha", &["https://example.com/a".to_string()]);

    let stats = IndexBuilder::new(&config).build_incremental().unwrap();
    assert_eq!(stats.num_domains, 1);

    let service = open_service(&config);
    assert_eq!(urls_sorted(&service, "example.com", 0).len(), 1);
}

#[test]
fn test_incremental_with_no_new_files_keeps_version() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    ingest(&config, "alpha", &["https://example.com/a".to_string()]);

    let builder = IndexBuilder::new(&config);
    let first = builder.build_full().unwrap();
    let second = builder.build_incremental().unwrap();

    assert_eq!(first.version, second.version);
    let manifest = Manifest::load(&config.base_path).unwrap();
    assert_eq!(manifest.list_versions().len(), 1);
}

#[test]
fn test_incremental_extends_membership_for_shared_domain() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());

    ingest(&config, "alpha", &["https://example.com/a".to_string()]);
    IndexBuilder::new(&config).build_full().unwrap();

    ingest(&config, "beta", &["https://example.com/b".to_string()]);
    IndexBuilder::new(&config).build_incremental().unwrap();

    let service = open_service(&config);
    let info = service.datasets_of("example.com").unwrap();
    let mut dataset_ids: Vec<u32> = info.datasets.iter().map(|d| d.dataset_id).collect();
    dataset_ids.sort();
    assert_eq!(dataset_ids, vec![0, 1]);

    // The pre-existing rows stay reachable through the new version.
    assert_eq!(
        urls_sorted(&service, "example.com", 0),
        vec!["https://example.com/a".to_string()]
    );
    assert_eq!(
        urls_sorted(&service, "example.com", 1),
        vec!["https://example.com/b".to_string()]
    );
}

#[test]
fn test_gc_respects_retention_and_current() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let builder = IndexBuilder::new(&config);

    // Four published versions; each build sees one more file.
    let mut versions = Vec::new();
    for i in 0..4 {
        ingest(&config, "alpha", &[format!("https://d{}.com/x", i)]);
        versions.push(builder.build_full().unwrap().version);
    }

    let removed = builder.gc().unwrap();
    assert_eq!(removed.len(), 2);
    for version in &versions[..2] {
        assert!(removed.contains(version));
        assert!(!builder.version_dir(version).exists());
    }
    for version in &versions[2..] {
        assert!(builder.version_dir(version).exists());
    }

    // The current version still answers queries after gc.
    let service = open_service(&config);
    assert!(service.datasets_of("d0.com").unwrap().domain_id.is_some());
}
