//! Exact wildcard blocklist backed by a label trie.
//!
//! Entries of the form `*.ads.example.com` are stored as the reversed label
//! path `com -> example -> ads`, with the last node flagged as blocking.
//! A lookup walks the host's labels from the TLD inward and stops at the
//! first blocking node, so a rule blocks its domain and every subdomain
//! beneath it. Matching is case-insensitive.

use std::collections::HashMap;

/// Hosts deeper than this are neither stored nor matched.
pub const MAX_DOMAIN_DEPTH: usize = 127;

const WILDCARD_PREFIX: &str = "*.";

#[derive(Debug, Default, Clone)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    blocking: bool,
}

/// Suffix trie of blocked domains.
#[derive(Debug, Default, Clone)]
pub struct SuffixTrie {
    root: TrieNode,
    rules: usize,
}

impl SuffixTrie {
    /// Create an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single `*.<domain>` rule.
    ///
    /// Returns `false` for entries that are not wildcard rules, that have no
    /// labels, or that exceed [`MAX_DOMAIN_DEPTH`].
    pub fn insert(&mut self, entry: &str) -> bool {
        let Some(domain) = entry.strip_prefix(WILDCARD_PREFIX) else {
            return false;
        };

        let labels = split_labels(domain);
        if labels.is_empty() || labels.len() > MAX_DOMAIN_DEPTH {
            return false;
        }

        let mut node = &mut self.root;
        for label in labels.into_iter().rev() {
            node = node.children.entry(label).or_default();
        }
        if !node.blocking {
            node.blocking = true;
            self.rules += 1;
        }
        true
    }

    /// Whether the host of `url` is covered by a stored rule.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        let host = extract_host(url);
        if host.is_empty() {
            return false;
        }

        let labels = split_labels(host);
        if labels.is_empty() || labels.len() > MAX_DOMAIN_DEPTH {
            return false;
        }

        let mut node = &self.root;
        for label in labels.iter().rev() {
            match node.children.get(label) {
                Some(child) if child.blocking => return true,
                Some(child) => node = child,
                None => return false,
            }
        }
        false
    }

    /// Remove every rule.
    pub fn clear(&mut self) {
        self.root.children.clear();
        self.rules = 0;
    }

    /// Number of distinct blocking rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules
    }

    /// Whether the trie holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules == 0
    }
}

/// Host portion of a URL or authority: scheme, path/query/fragment and
/// port are stripped.
#[must_use]
pub fn extract_host(url: &str) -> &str {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    let rest = &url[authority_start..];

    let authority = match rest.find(['/', '?', '#']) {
        Some(end) => &rest[..end],
        None => rest,
    };

    match authority.find(':') {
        Some(port) if port > 0 => &authority[..port],
        _ => authority,
    }
}

/// Lowercase, non-empty labels in left-to-right order.
fn split_labels(domain: &str) -> Vec<String> {
    domain
        .split('.')
        .filter(|label| !label.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}
