//! Category-based allow/deny policy.
//!
//! Each [`Category`] owns one [`DomainMatcher`]. The whitelist is checked
//! first and allows unconditionally; otherwise a match in any blocklist
//! category denies. No category identity is reported to the caller.
//!
//! Matchers are published through [`ArcSwap`]: a reload builds the new
//! structure off to the side and swaps it in whole, so concurrent lookups
//! see either the old or the new list, never a partially built one.

use crate::error::{GuardianError, Result};
use crate::matcher::{DomainMatcher, LoadReport, MatchStrategy};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A blocklist category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// User-maintained allow list. Takes precedence over every other category.
    Whitelist,
    /// User-maintained deny list.
    Blacklist,
    /// Bundled general-purpose blocklist.
    Default,
    /// Bundled gambling blocklist.
    Gambling,
    /// Bundled adult-content blocklist.
    Nsfw,
    /// Bundled tracker blocklist.
    Trackers,
}

impl Category {
    /// Every category, whitelist first.
    pub const ALL: [Category; 6] = [
        Category::Whitelist,
        Category::Blacklist,
        Category::Default,
        Category::Gambling,
        Category::Nsfw,
        Category::Trackers,
    ];

    /// Categories whose match denies a request.
    pub const BLOCKING: [Category; 5] = [
        Category::Blacklist,
        Category::Default,
        Category::Gambling,
        Category::Nsfw,
        Category::Trackers,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Category::Whitelist => "whitelist",
            Category::Blacklist => "blacklist",
            Category::Default => "default",
            Category::Gambling => "gambling",
            Category::Nsfw => "nsfw",
            Category::Trackers => "trackers",
        }
    }

    /// File name holding this category's entries.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.txt", self.name())
    }

    /// Whether the list is edited by the user rather than bundled.
    #[must_use]
    pub fn is_user_list(self) -> bool {
        matches!(self, Category::Whitelist | Category::Blacklist)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| GuardianError::Config(format!("unknown category: {}", s)))
    }
}

/// Matching strategy selection per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Strategy used by categories without an override.
    #[serde(default)]
    pub default_strategy: MatchStrategy,

    /// Per-category strategy overrides.
    #[serde(default)]
    pub overrides: BTreeMap<Category, MatchStrategy>,
}

impl FilterConfig {
    /// Every category uses `strategy`.
    #[must_use]
    pub fn uniform(strategy: MatchStrategy) -> Self {
        Self {
            default_strategy: strategy,
            overrides: BTreeMap::new(),
        }
    }

    /// The strategy `category` should use.
    #[must_use]
    pub fn strategy_for(&self, category: Category) -> MatchStrategy {
        self.overrides
            .get(&category)
            .copied()
            .unwrap_or(self.default_strategy)
    }
}

#[derive(Debug)]
struct CategorySlot {
    strategy: MatchStrategy,
    matcher: ArcSwap<Box<dyn DomainMatcher>>,
}

/// Allow/deny decision over all categories.
#[derive(Debug)]
pub struct Classifier {
    slots: Vec<CategorySlot>,
}

impl Classifier {
    /// Create a classifier with every category empty.
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        let slots = Category::ALL
            .iter()
            .map(|&category| {
                let strategy = config.strategy_for(category);
                CategorySlot {
                    strategy,
                    matcher: ArcSwap::from_pointee(strategy.empty()),
                }
            })
            .collect();
        Self { slots }
    }

    /// Replace `category`'s rules with `entries`.
    ///
    /// The new matcher is fully built before it becomes visible to lookups.
    pub fn load<S: AsRef<str>>(&self, category: Category, entries: &[S]) -> Result<LoadReport> {
        let slot = self.slot(category);
        let (matcher, report) = slot.strategy.build(entries)?;
        slot.matcher.store(Arc::new(matcher));

        if report.saturated > 0 {
            warn!(
                "Category {} could not store {} entries",
                category, report.saturated
            );
        }
        info!(
            "Loaded {} category ({}): {} rules, {} skipped",
            category, slot.strategy, report.loaded, report.skipped
        );
        Ok(report)
    }

    /// Empty `category`. The replacement keeps the old structure's dimensions.
    pub fn clear(&self, category: Category) -> Result<()> {
        let slot = self.slot(category);
        let empty = slot.matcher.load().cleared()?;
        slot.matcher.store(Arc::new(empty));
        debug!("Cleared {} category", category);
        Ok(())
    }

    /// Whether `url` matches a rule in `category`.
    #[must_use]
    pub fn matches(&self, category: Category, url: &str) -> bool {
        self.slot(category).matcher.load().contains(url)
    }

    /// Decide whether a request for `url` may proceed.
    #[must_use]
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.matches(Category::Whitelist, url) {
            return true;
        }
        !Category::BLOCKING
            .iter()
            .any(|&category| self.matches(category, url))
    }

    /// The strategy backing `category`.
    #[must_use]
    pub fn strategy(&self, category: Category) -> MatchStrategy {
        self.slot(category).strategy
    }

    /// Number of rules currently held by `category`.
    #[must_use]
    pub fn rule_count(&self, category: Category) -> usize {
        self.slot(category).matcher.load().len()
    }

    fn slot(&self, category: Category) -> &CategorySlot {
        &self.slots[category.index()]
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}
