//! URL canonicalization and registrable-domain extraction.
//!
//! `normalize` is a pure function from a raw URL string to its canonical
//! components:
//!
//! - scheme lowercased, defaulted to `http` when absent
//! - host lowercased, IDN hosts in punycode (ACE) form
//! - default port for the scheme removed, other ports retained
//! - path with collapsed slashes and `.`/`..` resolved (never above root),
//!   trailing slash preserved
//! - query pairs sorted by key, duplicate keys kept in their original
//!   relative order
//! - fragment dropped
//! - registrable domain (eTLD+1) resolved against the Public Suffix List
//!
//! URLs with no host or no registrable domain are rejected: they cannot be
//! partitioned or indexed, so they never enter the lake.

use url::Url;

use crate::error::{Result, UrlakeError};

/// Canonical components of a normalized URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Lowercase scheme, e.g. "https".
    pub scheme: String,
    /// Lowercase host in ASCII (punycode for IDN).
    pub host: String,
    /// Port, absent when it is the default for the scheme.
    pub port: Option<u16>,
    /// Normalized path, always starting with '/'.
    pub path: String,
    /// Normalized query string without the leading '?', empty when absent.
    pub query: String,
    /// Registrable domain (eTLD+1) of the host.
    pub domain: String,
}

impl NormalizedUrl {
    /// Combined path+query as stored in the lake, e.g. "/a?x=1&y=2".
    pub fn path_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// Reconstruct the normalized URL string (without fragment).
    pub fn to_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}{}", self.scheme, self.host, port, self.path_query()),
            None => format!("{}://{}{}", self.scheme, self.host, self.path_query()),
        }
    }
}

/// Default ports stripped during normalization.
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        "ftp" => Some(21),
        "ftps" => Some(990),
        _ => None,
    }
}

/// Normalize a raw URL string into canonical components.
///
/// Returns `Validation` errors for unusable input: empty strings,
/// unparseable structure, URLs without a host, and hosts without a
/// registrable domain (bare TLDs, single labels, IP addresses).
pub fn normalize(raw: &str) -> Result<NormalizedUrl> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlakeError::validation("empty URL"));
    }

    let parsed = parse_with_default_scheme(trimmed)?;

    let scheme = parsed.scheme().to_ascii_lowercase();

    // Only named hosts can carry a registrable domain; IP literals have no
    // place in a domain-partitioned lake.
    let host = match parsed.host() {
        Some(url::Host::Domain(h)) if !h.is_empty() => h.to_ascii_lowercase(),
        Some(_) => {
            return Err(UrlakeError::validation(format!(
                "URL host is an IP literal: '{}'",
                trimmed
            )))
        }
        None => {
            return Err(UrlakeError::validation(format!(
                "URL has no host: '{}'",
                trimmed
            )))
        }
    };

    // Url::parse already drops the default port for schemes it knows;
    // the explicit check covers the rest of the table.
    let port = parsed
        .port()
        .filter(|&p| default_port(&scheme) != Some(p));

    let path = normalize_path(parsed.path());
    let query = normalize_query(parsed.query().unwrap_or(""));

    let domain = psl::domain_str(&host)
        .map(str::to_string)
        .ok_or_else(|| {
            UrlakeError::validation(format!("host '{}' has no registrable domain", host))
        })?;

    Ok(NormalizedUrl {
        scheme,
        host,
        port,
        path,
        query,
        domain,
    })
}

/// Parse a URL, defaulting the scheme to `http` when it is missing.
fn parse_with_default_scheme(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{}", raw)).map_err(|e| {
                UrlakeError::validation(format!("failed to parse URL '{}': {}", raw, e))
            })
        }
        Err(e) => Err(UrlakeError::validation(format!(
            "failed to parse URL '{}': {}",
            raw, e
        ))),
    }
}

/// Collapse duplicate slashes and resolve `.`/`..` segments.
///
/// `..` never climbs above the root; a trailing slash survives when the
/// path still has segments.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {
                // Keep the leading slash marker only.
                if segments.is_empty() {
                    segments.push("");
                }
            }
            ".." => {
                if segments.len() > 1 {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }

    let mut result = segments.join("/");
    if !result.starts_with('/') {
        result.insert(0, '/');
    }
    if path.ends_with('/') && !result.ends_with('/') && segments.len() > 1 {
        result.push('/');
    }
    result
}

/// Sort query pairs by key, preserving the relative order of duplicates.
fn normalize_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // Stable sort keeps duplicate keys in their original relative order.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}
