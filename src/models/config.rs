//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pass scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Similar-item dedup window
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Channel dispatch behavior
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Snapshot shrink guard
    #[serde(default)]
    pub guard: GuardConfig,

    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Catalog provider
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Email relay
    #[serde(default)]
    pub email: EmailConfig,

    /// Push gateway
    #[serde(default)]
    pub push: PushConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            return Err(AppError::validation("scheduler.interval_secs must be > 0"));
        }
        if self.dedup.ttl_secs == 0 {
            return Err(AppError::validation("dedup.ttl_secs must be > 0"));
        }
        if self.dispatch.max_concurrent == 0 {
            return Err(AppError::validation("dispatch.max_concurrent must be > 0"));
        }
        if self.dispatch.channel_timeout_secs == 0 {
            return Err(AppError::validation(
                "dispatch.channel_timeout_secs must be > 0",
            ));
        }
        if self.guard.max_drop_percent > 100 {
            return Err(AppError::validation(
                "guard.max_drop_percent must be between 0 and 100",
            ));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(AppError::validation("catalog.timeout_secs must be > 0"));
        }
        for endpoint in [&self.catalog.url, &self.email.endpoint, &self.push.endpoint]
            .into_iter()
            .flatten()
        {
            Url::parse(endpoint)?;
        }
        Ok(())
    }
}

/// Pass scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduled passes
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Run a pass immediately when the scheduler starts
    #[serde(default = "defaults::enabled")]
    pub run_on_start: bool,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            run_on_start: true,
        }
    }
}

/// Dedup window for similar-item matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "defaults::dedup_ttl")]
    pub ttl_secs: u64,
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: defaults::dedup_ttl(),
        }
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Subscribers dispatched concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound for a single channel call
    #[serde(default = "defaults::channel_timeout")]
    pub channel_timeout_secs: u64,
}

impl DispatchConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            channel_timeout_secs: defaults::channel_timeout(),
        }
    }
}

/// Snapshot shrink guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Maximum allowed drop percentage (0-100)
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Below this previous size the check is skipped
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,

    /// Allow an empty snapshot when the previous one was also empty
    #[serde(default = "defaults::enabled")]
    pub allow_cold_start: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
            allow_cold_start: true,
        }
    }
}

/// File locations, relative paths resolve against the state directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::catalog_file")]
    pub catalog: PathBuf,

    #[serde(default = "defaults::subscriptions_file")]
    pub subscriptions: PathBuf,
}

impl PathsConfig {
    pub fn catalog_path(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(&self.catalog)
    }

    pub fn subscriptions_path(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(&self.subscriptions)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: defaults::catalog_file(),
            subscriptions: defaults::subscriptions_file(),
        }
    }
}

/// Catalog provider settings. Without a URL the catalog file is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: defaults::timeout(),
            user_agent: defaults::user_agent(),
        }
    }
}

/// Email relay settings. Without an endpoint emails are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the relay API key
    #[serde(default = "defaults::email_key_env")]
    pub api_key_env: String,

    #[serde(default = "defaults::email_from")]
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: defaults::email_key_env(),
            from: defaults::email_from(),
        }
    }
}

/// Push gateway settings. Without an endpoint pushes are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the gateway server key
    #[serde(default = "defaults::push_key_env")]
    pub server_key_env: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            server_key_env: defaults::push_key_env(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn enabled() -> bool {
        true
    }

    // Scheduler defaults
    pub fn interval() -> u64 {
        300
    }

    // Dedup defaults
    pub fn dedup_ttl() -> u64 {
        24 * 60 * 60
    }

    // Dispatch defaults
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn channel_timeout() -> u64 {
        10
    }

    // Guard defaults
    pub fn max_drop_percent() -> u8 {
        20
    }
    pub fn min_baseline() -> usize {
        10
    }

    // Path defaults
    pub fn catalog_file() -> PathBuf {
        PathBuf::from("catalog.json")
    }
    pub fn subscriptions_file() -> PathBuf {
        PathBuf::from("subscriptions.json")
    }

    // HTTP defaults
    pub fn timeout() -> u64 {
        30
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; notifier/0.1)".into()
    }

    // Channel defaults
    pub fn email_key_env() -> String {
        "NOTIFIER_EMAIL_API_KEY".into()
    }
    pub fn email_from() -> String {
        "notifier@localhost".into()
    }
    pub fn push_key_env() -> String {
        "NOTIFIER_PUSH_SERVER_KEY".into()
    }
}
