//! Configuration management for botmerge-tools.
//!
//! Handles loading and saving configuration from TOML files.
//! Config files are stored in platform-specific locations:
//!
//! - **macOS/Linux**: `~/.config/botmerge-tools/config.toml`
//! - **Windows**: `%APPDATA%\botmerge-tools\config.toml`
//!
//! The configuration owns the repository policies and tuning knobs the
//! engine consumes; the engine itself never reads files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ratelimit::RateLimiterConfig;
use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config directory name.
const CONFIG_DIR_NAME: &str = "botmerge-tools";

// =============================================================================
// Configuration structures
// =============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Repositories to watch, with their per-repository merge policies
    #[serde(default)]
    pub repositories: Vec<RepoPolicy>,

    /// PR authors eligible for automatic merging; empty disables the filter
    #[serde(default)]
    pub allowed_actors: Vec<String>,

    /// Labels that exclude a PR from merging, applied to every repository
    #[serde(default)]
    pub skip_labels: Vec<String>,

    /// Ignore PRs older than this many days; 0 disables the age filter
    #[serde(default)]
    pub max_age_days: u64,

    /// Concurrency, rate-limit, and retry tuning
    #[serde(default)]
    pub behavior: BehaviorConfig,

    /// GitHub connection settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubConfig>,

    /// GitLab connection settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab: Option<GitLabConfig>,

    /// Bitbucket connection settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitbucket: Option<BitbucketConfig>,
}

/// Per-repository merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoPolicy {
    /// `owner/name`
    pub full_name: String,

    /// Provider this repository lives on ("github", "gitlab", "bitbucket")
    pub provider: String,

    /// Merge method: "merge", "squash", or "rebase"; anything else falls back
    /// to squash at merge time
    #[serde(default)]
    pub merge_strategy: String,

    /// Repository-specific skip labels, merged with the global set
    #[serde(default)]
    pub skip_labels: Vec<String>,

    /// Require the aggregate status and every check to pass
    #[serde(default = "default_true")]
    pub require_checks: bool,

    /// Approvals required when merging with approval enforcement
    #[serde(default = "default_min_approvals")]
    pub min_approvals: u32,

    /// Include this repository in unattended merge runs
    #[serde(default)]
    pub auto_merge: bool,
}

/// Behavior tuning shared by both pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Concurrency ceiling for repository discovery and merge fan-out;
    /// 0 uses the host's logical core count
    #[serde(default)]
    pub concurrency: usize,

    /// Token-bucket parameters applied per provider
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Retry parameters applied to every provider call
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            rate_limit: RateLimitSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

/// Serialized form of the token-bucket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub requests_per_second: f64,
    pub burst: u32,
    pub timeout_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            burst: 10,
            timeout_secs: 30,
        }
    }
}

impl RateLimitSettings {
    /// Converts to the runtime limiter configuration.
    pub fn to_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_second: self.requests_per_second,
            burst: self.burst,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Serialized form of the retry parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            backoff_factor: 2.0,
            max_backoff_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetrySettings {
    /// Converts to the runtime retry configuration.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            backoff_factor: self.backoff_factor,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter: self.jitter,
        }
    }
}

/// GitHub connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (for GitHub Enterprise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// GitLab connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// GitLab instance URL
    #[serde(default = "default_gitlab_url")]
    pub url: String,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: default_gitlab_url(),
        }
    }
}

/// Bitbucket connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitbucketConfig {
    /// Bitbucket API base URL
    #[serde(default = "default_bitbucket_url")]
    pub base_url: String,

    /// Username paired with the app password credential
    pub username: String,
}

fn default_gitlab_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_bitbucket_url() -> String {
    "https://api.bitbucket.org".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_approvals() -> u32 {
    1
}

// =============================================================================
// Config implementation
// =============================================================================

impl Config {
    /// Get the configuration directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location.
    ///
    /// Returns a default (empty) config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns a default (empty) config if the file doesn't exist.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!(path = ?path, "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        debug!(path = ?path, "Loading config");

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        info!(path = ?path, repositories = config.repositories.len(), "Config loaded");
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        debug!(path = ?path, "Saving config");

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        info!(path = ?path, "Config saved");
        Ok(())
    }

    /// Look up the policy entry for a (provider, full name) pair.
    pub fn policy_for(&self, provider: &str, full_name: &str) -> Option<&RepoPolicy> {
        self.repositories
            .iter()
            .find(|r| r.provider == provider && r.full_name == full_name)
    }

    /// Provider names referenced by at least one repository policy.
    pub fn configured_providers(&self) -> Vec<&str> {
        let mut providers: Vec<&str> = self
            .repositories
            .iter()
            .map(|r| r.provider.as_str())
            .collect();
        providers.sort_unstable();
        providers.dedup();
        providers
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_policy() -> RepoPolicy {
        RepoPolicy {
            full_name: "octo/widgets".to_string(),
            provider: "github".to_string(),
            merge_strategy: "squash".to_string(),
            skip_labels: vec!["do-not-merge".to_string()],
            require_checks: true,
            min_approvals: 1,
            auto_merge: true,
        }
    }

    #[test]
    fn default_config_is_empty() {
        let config = Config::default();
        assert!(config.repositories.is_empty());
        assert!(config.allowed_actors.is_empty());
        assert!(config.configured_providers().is_empty());
        assert_eq!(config.behavior.rate_limit.burst, 10);
        assert_eq!(config.behavior.retry.max_attempts, 3);
    }

    #[test]
    fn policy_lookup_matches_provider_and_name() {
        let mut config = Config::default();
        config.repositories.push(sample_policy());

        assert!(config.policy_for("github", "octo/widgets").is_some());
        assert!(config.policy_for("gitlab", "octo/widgets").is_none());
        assert!(config.policy_for("github", "octo/other").is_none());
    }

    #[test]
    fn configured_providers_deduplicates() {
        let mut config = Config::default();
        config.repositories.push(sample_policy());
        config.repositories.push(RepoPolicy {
            full_name: "octo/gadgets".to_string(),
            ..sample_policy()
        });
        config.repositories.push(RepoPolicy {
            provider: "gitlab".to_string(),
            ..sample_policy()
        });

        assert_eq!(config.configured_providers(), vec!["github", "gitlab"]);
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut config = Config::default();
        config.repositories.push(sample_policy());
        config.allowed_actors.push("dependabot[bot]".to_string());
        config.behavior.concurrency = 4;

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();
        config.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("full_name = \"octo/widgets\""));
        assert!(contents.contains("dependabot[bot]"));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.repositories.len(), 1);
        assert_eq!(loaded.repositories[0].merge_strategy, "squash");
        assert_eq!(loaded.behavior.concurrency, 4);
    }

    #[test]
    fn load_nonexistent_returns_defaults() {
        let path = PathBuf::from("/nonexistent/path/config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn policy_defaults_apply_when_omitted() {
        let toml_str = r#"
            [[repositories]]
            full_name = "octo/widgets"
            provider = "github"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let policy = &config.repositories[0];
        assert!(policy.require_checks);
        assert_eq!(policy.min_approvals, 1);
        assert!(!policy.auto_merge);
        assert!(policy.merge_strategy.is_empty());
    }

    #[test]
    fn settings_convert_to_runtime_configs() {
        let settings = RetrySettings::default();
        let retry = settings.to_retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_backoff, Duration::from_millis(1_000));

        let limits = RateLimitSettings::default();
        let limiter = limits.to_limiter_config();
        assert_eq!(limiter.burst, 10);
        assert_eq!(limiter.timeout, Duration::from_secs(30));
    }
}
