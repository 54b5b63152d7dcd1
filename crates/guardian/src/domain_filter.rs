//! Cuckoo-backed domain blocklist.
//!
//! Whole domains are stored as filter fingerprints. A lookup extracts the
//! domain from a URL and tests every right-anchored label suffix, from the
//! TLD up to the full domain, so `example.com` in the list also matches
//! `ads.example.com` but never `otherexample.com`.
//!
//! Memory is fixed by the entry count rather than by label structure, at
//! the cost of occasional false positives.

use crate::cuckoo::{CuckooConfig, CuckooFilter};
use crate::error::Result;
use crate::matcher::LoadReport;
use tracing::{debug, warn};

/// URLs longer than this are never matched.
pub const MAX_URL_LENGTH: usize = 2048;

/// Domains longer than this are never matched.
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Number of times a saturated load is retried with doubled capacity.
const MAX_REBUILDS: usize = 3;

const DOMAIN_END: [char; 4] = [':', '?', '#', '/'];

/// Probabilistic domain blocklist.
#[derive(Debug, Clone)]
pub struct DomainFilter {
    filter: Option<CuckooFilter>,
}

impl DomainFilter {
    /// Create an unloaded filter. It matches nothing until [`load`](Self::load) is called.
    #[must_use]
    pub fn new() -> Self {
        Self { filter: None }
    }

    /// Replace the contents with `domains`.
    ///
    /// The filter is sized from the entry count. If any entry cannot be
    /// stored, the whole filter is rebuilt with twice the capacity, up to
    /// a fixed number of attempts; entries that still do not fit are
    /// reported as saturated. Repeated entries are stored once.
    pub fn load<S: AsRef<str>>(&mut self, domains: &[S]) -> Result<LoadReport> {
        let mut normalized: Vec<String> = domains
            .iter()
            .filter_map(|d| normalize_entry(d.as_ref()))
            .collect();
        let skipped = domains.len() - normalized.len();
        normalized.sort_unstable();
        normalized.dedup();

        let mut capacity = normalized.len().max(1);
        let mut attempt = 0;
        loop {
            let mut filter = CuckooFilter::new(CuckooConfig::with_capacity(capacity))?;
            let rejected: Vec<&String> = normalized
                .iter()
                .filter(|domain| !filter.add(domain.as_bytes()))
                .collect();

            if rejected.is_empty() || attempt == MAX_REBUILDS {
                for domain in &rejected {
                    warn!("Domain filter saturated, entry not stored: {}", domain);
                }
                let report = LoadReport {
                    loaded: normalized.len() - rejected.len(),
                    skipped,
                    saturated: rejected.len(),
                };
                debug!(
                    "Domain filter loaded {} entries into {} slots",
                    report.loaded,
                    filter.slot_count()
                );
                self.filter = Some(filter);
                return Ok(report);
            }

            debug!(
                "Domain filter rejected {} of {} entries at capacity {}, rebuilding",
                rejected.len(),
                normalized.len(),
                capacity
            );
            capacity = capacity.saturating_mul(2);
            attempt += 1;
        }
    }

    /// Empty the filter, keeping its dimensions.
    pub fn clear(&mut self) {
        if let Some(filter) = self.filter.as_mut() {
            filter.clear();
        }
    }

    /// An empty filter with the same dimensions as this one.
    pub fn cleared(&self) -> Result<Self> {
        let filter = match &self.filter {
            Some(filter) => Some(CuckooFilter::new(filter.config())?),
            None => None,
        };
        Ok(Self { filter })
    }

    /// Whether the domain of `url`, or any parent domain, is in the filter.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        let Some(filter) = &self.filter else {
            return false;
        };
        if url.len() > MAX_URL_LENGTH {
            return false;
        }

        let domain = parse_domain(url).to_ascii_lowercase();
        if domain.is_empty() || domain.len() > MAX_DOMAIN_LENGTH {
            return false;
        }

        let found = domain_suffixes(&domain).any(|suffix| filter.contains(suffix.as_bytes()));
        found
    }

    /// Number of stored fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filter.as_ref().map_or(0, CuckooFilter::len)
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DomainFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim, lowercase and strip an optional `*.` wildcard marker. Blank lines
/// yield `None`.
fn normalize_entry(entry: &str) -> Option<String> {
    let entry = entry.trim();
    let entry = entry.strip_prefix("*.").unwrap_or(entry);
    if entry.is_empty() {
        None
    } else {
        Some(entry.to_ascii_lowercase())
    }
}

/// Domain portion of a URL: an `http://`/`https://` scheme and a leading
/// `www.` are dropped, and the result ends before the first `:`, `?`, `#`
/// or `/`.
fn parse_domain(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    match rest.find(DOMAIN_END) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// Right-anchored suffixes of `domain`, shortest first:
/// `a.b.com` yields `com`, `b.com`, `a.b.com`.
fn domain_suffixes(domain: &str) -> impl Iterator<Item = &str> {
    domain
        .rmatch_indices('.')
        .map(move |(dot, _)| &domain[dot + 1..])
        .chain(std::iter::once(domain))
}
