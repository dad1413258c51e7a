//! Replication configuration with builder pattern
//!
//! Settings come from a TOML file (`--config` or the user config directory)
//! and are then overridden by command-line flags through the builder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::availability::{ReportSettings, ScoringConfig};
use crate::error::ReplicationError;
use crate::replication::{DEFAULT_MAX_ERROR_COUNT, IteratorOptions, ReplicationStrategy};

/// Settings for one replication run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub strategy: ReplicationStrategy,
    /// `$top` for TopAndSkip; unset keeps the URI's `$top` or uses 100
    pub page_size: Option<u32>,
    /// `Prefer: odata.maxpagesize` for NextLink
    pub max_page_size: Option<u32>,
    /// Consecutive failures tolerated per resource
    pub max_error_count: usize,
    /// Client-side record cap per resource
    pub limit: Option<usize>,
    pub seconds_delay_between_requests: u64,
    /// Back-off after an HTTP 429
    pub rate_limited_wait_time_minutes: u64,
    pub request_timeout_secs: u64,
    pub output_dir: PathBuf,
    /// Write every page to disk in addition to scoring it
    pub persist_pages: bool,
    pub scoring: ScoringConfig,
    pub report: ReportSettings,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            strategy: ReplicationStrategy::TopAndSkip,
            page_size: None,
            max_page_size: None,
            max_error_count: DEFAULT_MAX_ERROR_COUNT,
            limit: None,
            seconds_delay_between_requests: 1,
            rate_limited_wait_time_minutes: 60,
            request_timeout_secs: 300,
            output_dir: PathBuf::from("reso-replication-output"),
            persist_pages: false,
            scoring: ScoringConfig::default(),
            report: ReportSettings::default(),
        }
    }
}

impl ReplicationConfig {
    /// Create a new builder for ReplicationConfig
    pub fn builder() -> ReplicationConfigBuilder {
        ReplicationConfigBuilder::new()
    }

    /// No delays or back-off (for tests and local servers)
    pub fn unthrottled() -> Self {
        Self {
            seconds_delay_between_requests: 0,
            rate_limited_wait_time_minutes: 0,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid replication config")
    }

    /// Default config file location: `<config dir>/reso-cli/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reso-cli").join("config.toml"))
    }

    /// Load from `path`, or from the default location when it exists, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn delay_between_requests(&self) -> Duration {
        Duration::from_secs(self.seconds_delay_between_requests)
    }

    pub fn rate_limited_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limited_wait_time_minutes * 60)
    }

    pub fn iterator_options(&self) -> IteratorOptions {
        IteratorOptions {
            strategy: self.strategy,
            page_size: self.page_size,
            max_page_size: self.max_page_size,
            max_error_count: self.max_error_count,
        }
    }

    /// HTTP client shared by the auth provider and the iterators
    pub fn build_http_client(&self) -> Result<reqwest::Client, ReplicationError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .user_agent(concat!("reso-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ReplicationError::HttpClient)
    }
}

/// Builder for ReplicationConfig
#[derive(Debug)]
pub struct ReplicationConfigBuilder {
    config: ReplicationConfig,
}

impl ReplicationConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReplicationConfig::default(),
        }
    }

    /// Start from an existing configuration (e.g. one loaded from file)
    pub fn from_config(config: ReplicationConfig) -> Self {
        Self { config }
    }

    pub fn strategy(mut self, strategy: ReplicationStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = Some(size);
        self
    }

    pub fn max_page_size(mut self, size: u32) -> Self {
        self.config.max_page_size = Some(size);
        self
    }

    pub fn max_error_count(mut self, count: usize) -> Self {
        self.config.max_error_count = count;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = Some(limit);
        self
    }

    pub fn seconds_delay_between_requests(mut self, seconds: u64) -> Self {
        self.config.seconds_delay_between_requests = seconds;
        self
    }

    pub fn rate_limited_wait_time_minutes(mut self, minutes: u64) -> Self {
        self.config.rate_limited_wait_time_minutes = minutes;
        self
    }

    pub fn request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.request_timeout_secs = seconds;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn persist_pages(mut self, enabled: bool) -> Self {
        self.config.persist_pages = enabled;
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.config.scoring = scoring;
        self
    }

    /// Add enumeration fields whose values should be counted
    pub fn lookup_fields(mut self, fields: &[String]) -> Self {
        self.config.scoring.lookup_fields.extend(fields.iter().cloned());
        self
    }

    pub fn expansion_target(
        mut self,
        field: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        self.config
            .scoring
            .expansion_targets
            .insert(field.into(), resource.into());
        self
    }

    pub fn build(self) -> ReplicationConfig {
        self.config
    }
}

impl Default for ReplicationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReplicationConfig::default();

        assert_eq!(config.strategy, ReplicationStrategy::TopAndSkip);
        assert_eq!(config.max_error_count, 3);
        assert_eq!(config.seconds_delay_between_requests, 1);
        assert_eq!(config.rate_limited_wait(), Duration::from_secs(3600));
        assert!(!config.persist_pages);
        assert_eq!(config.scoring.date_field, "ModificationTimestamp");
        assert_eq!(config.scoring.expansion_target("Media"), "Media");
    }

    #[test]
    fn test_unthrottled_config() {
        let config = ReplicationConfig::unthrottled();
        assert_eq!(config.delay_between_requests(), Duration::ZERO);
        assert_eq!(config.rate_limited_wait(), Duration::ZERO);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ReplicationConfig::builder()
            .strategy(ReplicationStrategy::NextLink)
            .max_page_size(500)
            .limit(1000)
            .max_error_count(5)
            .persist_pages(true)
            .lookup_fields(&["StandardStatus".to_string()])
            .expansion_target("ListAgent", "Member")
            .build();

        assert_eq!(config.strategy, ReplicationStrategy::NextLink);
        assert_eq!(config.limit, Some(1000));
        assert!(config.persist_pages);
        assert!(config.scoring.lookup_fields.contains("StandardStatus"));
        assert_eq!(config.scoring.expansion_target("ListAgent"), "Member");

        let options = config.iterator_options();
        assert_eq!(options.max_page_size, Some(500));
        assert_eq!(options.max_error_count, 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReplicationConfig::from_toml(
            r#"
            strategy = "NextLink"
            limit = 250
            seconds_delay_between_requests = 0

            [scoring]
            lookup_fields = ["StandardStatus", "PropertyType"]

            [scoring.expansion_targets]
            Media = "Media"
            ListAgent = "Member"
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, ReplicationStrategy::NextLink);
        assert_eq!(config.limit, Some(250));
        assert_eq!(config.max_error_count, 3);
        assert_eq!(config.scoring.date_field, "ModificationTimestamp");
        assert_eq!(config.scoring.lookup_fields.len(), 2);
        assert_eq!(config.scoring.expansion_target("ListAgent"), "Member");
        assert_eq!(config.report.version, "1.7");
    }

    #[test]
    fn test_unknown_strategy_in_toml_is_rejected() {
        assert!(ReplicationConfig::from_toml(r#"strategy = "Cursor""#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_error_count = 7\n").unwrap();

        let config = ReplicationConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_error_count, 7);

        assert!(ReplicationConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
