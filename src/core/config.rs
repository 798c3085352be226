//! User configuration, read from `config.yaml` in the data directory.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::harvest::{DEFAULT_BODY_CHARS, DEFAULT_SNIPPET_CHARS};
use crate::search::engine::TimeFilter;

/// Result limit used by quick searches (popup)
const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Result limit used by dashboard searches
const DEFAULT_DASHBOARD_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    #[serde(default = "default_dashboard_limit")]
    pub dashboard_limit: usize,

    #[serde(default)]
    pub default_time_filter: TimeFilter,

    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Body characters kept when composing semantic text
    #[serde(default = "default_body_chars")]
    pub body_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_limit: DEFAULT_SEARCH_LIMIT,
            dashboard_limit: DEFAULT_DASHBOARD_LIMIT,
            default_time_filter: TimeFilter::All,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
            body_chars: DEFAULT_BODY_CHARS,
        }
    }
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_dashboard_limit() -> usize {
    DEFAULT_DASHBOARD_LIMIT
}

fn default_snippet_chars() -> usize {
    DEFAULT_SNIPPET_CHARS
}

fn default_body_chars() -> usize {
    DEFAULT_BODY_CHARS
}

impl Config {
    /// Load the config file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.validate();
        Ok(config)
    }

    fn validate(&mut self) {
        self.search_limit = self.search_limit.clamp(1, MAX_LIMIT);
        self.dashboard_limit = self.dashboard_limit.clamp(1, MAX_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config.search_limit, 10);
        assert_eq!(config.dashboard_limit, 50);
        assert_eq!(config.default_time_filter, TimeFilter::All);
    }

    #[test]
    fn test_partial_file_and_clamping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "search_limit: 0\ndefault_time_filter: 7d\ndashboard_limit: 9000\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.search_limit, 1);
        assert_eq!(config.dashboard_limit, 500);
        assert_eq!(config.default_time_filter, TimeFilter::SevenDays);
        assert_eq!(config.snippet_chars, 200);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "default_time_filter: fortnight\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
