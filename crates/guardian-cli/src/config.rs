//! Configuration file for the guardian CLI
//!
//! An optional JSON file provides proxy settings, matching strategies,
//! the list directory and the enabled categories. Command-line flags
//! override what the file says.

use crate::cli::{FilterArgs, LocationArgs, RunArgs};
use guardian::{Category, FilterConfig, GuardianError, MatchStrategy, Result};
use guardian_proxy::ProxyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the list directory when neither the file
/// nor `--lists` does.
pub const LISTS_DIR_ENV: &str = "GUARDIAN_LISTS";

const DEFAULT_LISTS_DIR: &str = "lists";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub lists_dir: Option<PathBuf>,

    /// Bundled categories to enforce. The user lists are always loaded.
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            filters: FilterConfig::default(),
            lists_dir: None,
            categories: default_categories(),
        }
    }
}

fn default_categories() -> Vec<Category> {
    vec![Category::Default]
}

impl GuardianConfig {
    /// Parse a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GuardianError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            GuardianError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        if config
            .categories
            .iter()
            .any(|category| category.is_user_list())
        {
            return Err(GuardianError::Config(format!(
                "{}: whitelist and blacklist are always loaded and cannot be listed as categories",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Read the file named by `--config`, if any, then apply `--lists`.
    pub fn from_location(args: &LocationArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(lists) = &args.lists {
            config.lists_dir = Some(lists.clone());
        }
        Ok(config)
    }

    /// Resolve configuration for commands that classify.
    pub fn from_filter_args(args: &FilterArgs) -> Result<Self> {
        let mut config = Self::from_location(&args.location)?;
        if !args.categories.is_empty() {
            config.categories = args
                .categories
                .iter()
                .copied()
                .filter(|category| !category.is_user_list())
                .collect();
        }
        if let Some(strategy) = args.strategy {
            config.filters = FilterConfig::uniform(MatchStrategy::from(strategy));
        }
        Ok(config)
    }

    /// Resolve configuration for `guardian run`.
    pub fn from_run_args(args: &RunArgs) -> Result<Self> {
        let mut config = Self::from_filter_args(&args.filter)?;
        if let Some(bind) = args.bind {
            config.proxy.bind_addr = bind;
        }
        if let Some(port) = args.port {
            config.proxy.bind_port = port;
        }
        if let Some(drain) = args.drain_ms {
            config.proxy.drain_timeout_ms = Some(drain);
        }
        Ok(config)
    }

    /// The list directory: config or flag, then `$GUARDIAN_LISTS`, then `./lists`.
    #[must_use]
    pub fn lists_dir(&self) -> PathBuf {
        self.lists_dir
            .clone()
            .or_else(|| std::env::var_os(LISTS_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LISTS_DIR))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::StrategyArg;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = GuardianConfig::default();
        assert_eq!(config.categories, vec![Category::Default]);
        assert_eq!(config.proxy.bind_port, 8888);
        assert_eq!(config.filters.default_strategy, MatchStrategy::Cuckoo);
    }

    #[test]
    fn test_load_file() {
        let file = config_file(
            r#"{
                "proxy": {"bind_port": 3128, "io_timeout_secs": 10},
                "filters": {"default_strategy": "trie"},
                "lists_dir": "/srv/guardian",
                "categories": ["trackers", "gambling"]
            }"#,
        );
        let config = GuardianConfig::load(file.path()).unwrap();
        assert_eq!(config.proxy.bind_port, 3128);
        assert_eq!(config.proxy.io_timeout_secs, 10);
        assert_eq!(config.proxy.read_buffer_size, 512);
        assert_eq!(config.filters.strategy_for(Category::Nsfw), MatchStrategy::Trie);
        assert_eq!(config.lists_dir(), PathBuf::from("/srv/guardian"));
        assert_eq!(config.categories, vec![Category::Trackers, Category::Gambling]);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let file = config_file("{ not json");
        let err = GuardianConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, GuardianError::Config(_)));
    }

    #[test]
    fn test_load_rejects_user_lists_as_categories() {
        let file = config_file(r#"{"categories": ["whitelist"]}"#);
        assert!(GuardianConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let file = config_file(r#"{"proxy": {"bind_port": 3128}, "lists_dir": "/srv/a"}"#);
        let args = RunArgs {
            filter: FilterArgs {
                location: LocationArgs {
                    config: Some(file.path().to_path_buf()),
                    lists: Some(PathBuf::from("/srv/b")),
                },
                categories: vec![Category::Nsfw, Category::Blacklist],
                strategy: Some(StrategyArg::Trie),
            },
            bind: None,
            port: Some(9000),
            drain_ms: Some(500),
        };
        let config = GuardianConfig::from_run_args(&args).unwrap();
        assert_eq!(config.proxy.bind_port, 9000);
        assert_eq!(config.proxy.drain_timeout_ms, Some(500));
        assert_eq!(config.lists_dir(), PathBuf::from("/srv/b"));
        assert_eq!(config.categories, vec![Category::Nsfw]);
        assert_eq!(config.filters, FilterConfig::uniform(MatchStrategy::Trie));
    }
}
