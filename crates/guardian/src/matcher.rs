//! Common interface over the two domain matching strategies.
//!
//! [`SuffixTrie`] is exact and grows with the number of rules.
//! [`DomainFilter`] is probabilistic with memory fixed by the entry count.
//! A category picks one of them through [`MatchStrategy`]; their matching
//! semantics are intentionally left distinct.

use crate::domain_filter::DomainFilter;
use crate::error::Result;
use crate::trie::SuffixTrie;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of loading a list of entries into a matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries stored.
    pub loaded: usize,
    /// Entries ignored because they do not fit the matcher's rule format.
    pub skipped: usize,
    /// Entries that could not be stored because the structure was full.
    pub saturated: usize,
}

/// Which structure backs a category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Exact `*.domain` rules in a [`SuffixTrie`].
    Trie,
    /// Whole-domain fingerprints in a [`DomainFilter`].
    #[default]
    Cuckoo,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Trie => write!(f, "trie"),
            MatchStrategy::Cuckoo => write!(f, "cuckoo"),
        }
    }
}

impl MatchStrategy {
    /// A new, empty matcher of this kind.
    #[must_use]
    pub fn empty(self) -> Box<dyn DomainMatcher> {
        match self {
            MatchStrategy::Trie => Box::new(SuffixTrie::new()),
            MatchStrategy::Cuckoo => Box::new(DomainFilter::new()),
        }
    }

    /// A matcher of this kind holding `entries`.
    pub fn build<S: AsRef<str>>(self, entries: &[S]) -> Result<(Box<dyn DomainMatcher>, LoadReport)> {
        let entries: Vec<String> = entries.iter().map(|e| e.as_ref().to_string()).collect();
        let mut matcher = self.empty();
        let report = matcher.load(&entries)?;
        Ok((matcher, report))
    }
}

/// A set of blocklist rules that can be queried with a URL.
pub trait DomainMatcher: Send + Sync + fmt::Debug {
    /// Replace the matcher's contents with `entries`.
    fn load(&mut self, entries: &[String]) -> Result<LoadReport>;

    /// Whether `url` is matched by a stored rule.
    fn contains(&self, url: &str) -> bool;

    /// An empty matcher of the same kind and dimensions.
    fn cleared(&self) -> Result<Box<dyn DomainMatcher>>;

    /// Number of stored rules or fingerprints.
    fn len(&self) -> usize;

    /// Whether nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The strategy this matcher implements.
    fn strategy(&self) -> MatchStrategy;
}

impl DomainMatcher for SuffixTrie {
    fn load(&mut self, entries: &[String]) -> Result<LoadReport> {
        self.clear();
        let mut report = LoadReport::default();
        for entry in entries {
            if self.insert(entry.trim()) {
                report.loaded += 1;
            } else {
                report.skipped += 1;
            }
        }
        Ok(report)
    }

    fn contains(&self, url: &str) -> bool {
        SuffixTrie::contains(self, url)
    }

    fn cleared(&self) -> Result<Box<dyn DomainMatcher>> {
        Ok(Box::new(SuffixTrie::new()))
    }

    fn len(&self) -> usize {
        SuffixTrie::len(self)
    }

    fn strategy(&self) -> MatchStrategy {
        MatchStrategy::Trie
    }
}

impl DomainMatcher for DomainFilter {
    fn load(&mut self, entries: &[String]) -> Result<LoadReport> {
        DomainFilter::load(self, entries)
    }

    fn contains(&self, url: &str) -> bool {
        DomainFilter::contains(self, url)
    }

    fn cleared(&self) -> Result<Box<dyn DomainMatcher>> {
        Ok(Box::new(DomainFilter::cleared(self)?))
    }

    fn len(&self) -> usize {
        DomainFilter::len(self)
    }

    fn strategy(&self) -> MatchStrategy {
        MatchStrategy::Cuckoo
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strategies_share_interface() {
        for strategy in [MatchStrategy::Trie, MatchStrategy::Cuckoo] {
            let (matcher, report) = strategy.build(&["*.ads.example.com"]).unwrap();
            assert_eq!(matcher.strategy(), strategy);
            assert_eq!(report.loaded, 1);
            assert!(matcher.contains("https://ads.example.com/banner"));
            assert!(matcher.contains("sub.ads.example.com:443"));
            assert!(!matcher.contains("example.org"));
        }
    }

    #[test]
    fn test_trie_skips_plain_entries() {
        let (matcher, report) = MatchStrategy::Trie
            .build(&["example.com", "*.tracker.net", ""])
            .unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 2);
        assert!(!matcher.contains("example.com"));
        assert!(matcher.contains("tracker.net"));
    }

    #[test]
    fn test_cleared_is_empty() {
        for strategy in [MatchStrategy::Trie, MatchStrategy::Cuckoo] {
            let (matcher, _) = strategy.build(&["*.example.com"]).unwrap();
            let empty = matcher.cleared().unwrap();
            assert!(empty.is_empty());
            assert_eq!(empty.strategy(), strategy);
            assert!(!empty.contains("example.com"));
            assert!(matcher.contains("example.com"));
        }
    }

    #[test]
    fn test_load_replaces_contents() {
        for strategy in [MatchStrategy::Trie, MatchStrategy::Cuckoo] {
            let mut matcher = strategy.empty();
            matcher.load(&["*.old.example".to_string()]).unwrap();
            matcher.load(&["*.new.example".to_string()]).unwrap();
            assert!(matcher.contains("new.example"), "{strategy}");
            assert!(!matcher.contains("old.example"), "{strategy}");
        }
    }

    #[test]
    fn test_strategy_serde() {
        let json = serde_json::to_string(&MatchStrategy::Trie).unwrap();
        assert_eq!(json, "\"trie\"");
        let parsed: MatchStrategy = serde_json::from_str("\"cuckoo\"").unwrap();
        assert_eq!(parsed, MatchStrategy::Cuckoo);
    }
}
