//! Hash-based identity assignment for URLs and domains.
//!
//! - `url_id`: xxh3-64 of the raw URL bytes. Used as a probe key only;
//!   collisions are tolerated because the query path re-checks the stored
//!   `domain` string before returning a row.
//! - `domain_hash`: xxh3-64 of the registrable domain, stored in the row
//!   body as its ingest-time identity.
//! - `domain_prefix`: first two hex characters of `domain_hash`, used purely
//!   as a partitioning key (256 buckets per dataset).
//!
//! Dataset ids come from the persistent registry (`crate::registry`), not
//! from hashing.

use xxhash_rust::xxh3::xxh3_64;

/// Number of hex characters in a domain prefix.
pub const DOMAIN_PREFIX_CHARS: usize = 2;

/// 64-bit identity of a raw URL string.
#[inline]
pub fn url_id(raw_url: &str) -> u64 {
    xxh3_64(raw_url.as_bytes())
}

/// 64-bit hash of a registrable domain.
#[inline]
pub fn domain_hash(domain: &str) -> u64 {
    xxh3_64(domain.as_bytes())
}

/// Partition prefix for a registrable domain: the first two hex characters
/// of its 64-bit hash, e.g. "a7" or "3f".
pub fn domain_prefix(domain: &str) -> String {
    let hex = format!("{:016x}", domain_hash(domain));
    hex[..DOMAIN_PREFIX_CHARS].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_id_stable() {
        let a = url_id("https://example.com/a");
        let b = url_id("https://example.com/a");
        assert_eq!(a, b);
        assert_ne!(a, url_id("https://example.com/b"));
    }

    #[test]
    fn test_domain_prefix_shape() {
        let prefix = domain_prefix("example.com");
        assert_eq!(prefix.len(), DOMAIN_PREFIX_CHARS);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        // Lowercase hex only, so directory names are stable across platforms.
        assert_eq!(prefix, prefix.to_lowercase());
    }

    #[test]
    fn test_domain_prefix_matches_hash() {
        let domain = "example.com";
        let expected = format!("{:016x}", domain_hash(domain));
        assert_eq!(domain_prefix(domain), expected[..2]);
    }
}
