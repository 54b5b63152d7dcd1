//! Domain classification engine for the guardian blocking proxy.
//!
//! Two interchangeable matching strategies sit behind [`DomainMatcher`]:
//!
//! 1. **Suffix trie** ([`SuffixTrie`]) - exact `*.domain` wildcard rules,
//!    memory proportional to the rule set.
//! 2. **Cuckoo filter** ([`DomainFilter`]) - whole-domain fingerprints in a
//!    fixed-size [`CuckooFilter`], with a small false-positive rate.
//!
//! [`Classifier`] combines one matcher per [`Category`] into a single
//! allow/deny decision: the whitelist wins, any blocklist match denies.

pub mod classifier;
pub mod cuckoo;
pub mod domain_filter;
pub mod error;
pub mod hash;
pub mod matcher;
pub mod trie;

pub use classifier::{Category, Classifier, FilterConfig};
pub use cuckoo::{CuckooConfig, CuckooFilter};
pub use domain_filter::DomainFilter;
pub use error::{GuardianError, Result};
pub use matcher::{DomainMatcher, LoadReport, MatchStrategy};
pub use trie::SuffixTrie;
