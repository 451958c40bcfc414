//! Configuration types for photo-dl
//!
//! Every setting has a working default. A TOML file can override any subset
//! of fields; the API credential is only ever read from the environment (or a
//! `.env` file) or a config file, never compiled in.

use crate::error::{Error, Result};
use crate::types::DispatchMode;
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Environment variable holding the media API credential
pub const API_KEY_ENV: &str = "PHOTO_DL_API_KEY";

/// Environment variable overriding the media API base URL
pub const BASE_URL_ENV: &str = "PHOTO_DL_BASE_URL";

/// Main configuration for a photo-dl run
///
/// Fields are organized into sub-configs, each its own TOML table:
/// - [`api`](ApiConfig) - endpoint, credential, image width, timeout
/// - [`paths`](PathsConfig) - dataset file and output directory
/// - [`batch`](BatchConfig) - concurrency, dispatch mode, retry
/// - [`report`](ReportConfig) - summary formatting
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Media API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Input and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Batch engine settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Load a TOML config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_file_over(path, Config::default())
    }

    /// Load a TOML config file on top of `base`
    ///
    /// Keys present in the file win; everything else keeps `base`'s value.
    pub fn from_file_over(path: &Path, base: Config) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let file: toml::Table = toml::from_str(&raw)?;

        let mut merged = match toml::Value::try_from(&base) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => toml::Table::new(),
            Err(e) => {
                return Err(Error::config(
                    format!("failed to layer config file over defaults: {e}"),
                    "config",
                ));
            }
        };
        merge_tables(&mut merged, file);
        // The credential is never serialized, so carry it over directly
        let mut config: Config = toml::Value::Table(merged).try_into()?;
        if config.api.api_key.is_none() {
            config.api.api_key = base.api.api_key;
        }
        Ok(config)
    }

    /// Defaults with the paced batch preset
    pub fn paced() -> Self {
        Self {
            batch: BatchConfig::paced(),
            ..Self::default()
        }
    }

    /// Apply overrides from the process environment
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// clobber a key from the config file.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            self.api.api_key = Some(ApiKey::new(key.trim()));
        }
        if let Ok(url) = std::env::var(BASE_URL_ENV)
            && !url.trim().is_empty()
        {
            self.api.base_url = url.trim().to_string();
        }
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.batch.concurrency_limit == 0 {
            return Err(Error::config(
                "concurrency limit must be at least 1",
                "batch.concurrency_limit",
            ));
        }
        if self.batch.progress_interval == 0 {
            return Err(Error::config(
                "progress interval must be at least 1",
                "batch.progress_interval",
            ));
        }
        if self.batch.retry.max_attempts == 0 {
            return Err(Error::config(
                "max attempts must be at least 1",
                "batch.retry.max_attempts",
            ));
        }
        if self.batch.retry.max_delay < self.batch.retry.backoff_base {
            return Err(Error::config(
                "max delay must not be shorter than the backoff base",
                "batch.retry.max_delay",
            ));
        }
        if self.paths.extension.trim().is_empty() || self.paths.extension.contains('.') {
            return Err(Error::config(
                "extension must be non-empty and without a leading dot",
                "paths.extension",
            ));
        }
        if self.api.max_width_px == 0 {
            return Err(Error::config(
                "max width must be at least 1 pixel",
                "api.max_width_px",
            ));
        }
        url::Url::parse(&self.api.base_url).map_err(|e| {
            Error::config(
                format!("invalid base URL '{}': {}", self.api.base_url, e),
                "api.base_url",
            )
        })?;
        Ok(())
    }

    /// The credential, or a config error naming where to set it
    pub fn require_api_key(&self) -> Result<&ApiKey> {
        match &self.api.api_key {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::config(
                format!("no API key configured; set {API_KEY_ENV} or api.api_key"),
                "api.api_key",
            )),
        }
    }
}

/// Media API credential
///
/// `Debug` never prints the value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a credential string
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw credential, for building requests only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the credential is blank
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Media API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base endpoint (default: "https://places.googleapis.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Credential sent as the `key` query parameter
    #[serde(default, skip_serializing)]
    pub api_key: Option<ApiKey>,

    /// Requested image width in pixels (default: 800)
    #[serde(default = "default_max_width_px")]
    pub max_width_px: u32,

    /// Timeout for one request/response cycle (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            max_width_px: default_max_width_px(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Dataset and output locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Dataset JSON file (default: "data/clinics.json")
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    /// Directory receiving one file per item (default: "public/images/clinics")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File extension for stored photos, without the dot (default: "jpg")
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            output_dir: default_output_dir(),
            extension: default_extension(),
        }
    }
}

/// Batch engine settings, read-only for the engine's lifetime
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum fetches in flight at once; chunk size in paced mode (default: 10)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Dispatch mode (default: unthrottled)
    #[serde(default)]
    pub mode: DispatchMode,

    /// Pause between chunks in paced mode (default: 2 seconds)
    #[serde(
        default = "default_inter_batch_delay",
        with = "optional_duration_serde"
    )]
    pub inter_batch_delay: Option<Duration>,

    /// Emit a progress signal every N completions in unthrottled mode (default: 50)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Retry behavior for individual items
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            mode: DispatchMode::Unthrottled,
            inter_batch_delay: default_inter_batch_delay(),
            progress_interval: default_progress_interval(),
            retry: RetryConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Rate-limit friendly preset: 3 at a time, 2 seconds between chunks
    pub fn paced() -> Self {
        Self {
            concurrency_limit: 3,
            mode: DispatchMode::Paced,
            inter_batch_delay: Some(Duration::from_secs(2)),
            ..Self::default()
        }
    }
}

/// Which errors the retry loop re-attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Only HTTP 429 is retried, with backoff
    RateLimitOnly,
    /// HTTP 429 with backoff, transient transport errors immediately
    #[default]
    RateLimitAndTransient,
}

/// Retry configuration for rate-limited and transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per item, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after the first rate-limited attempt; doubles per attempt (default: 2000 ms)
    #[serde(
        default = "default_backoff_base",
        rename = "backoff_base_ms",
        with = "duration_ms_serde"
    )]
    pub backoff_base: Duration,

    /// Cap on a single backoff wait (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Add random jitter to backoff waits (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// Which errors are retried (default: rate_limit_and_transient)
    #[serde(default)]
    pub policy: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            max_delay: default_max_delay(),
            jitter: false,
            policy: RetryPolicy::default(),
        }
    }
}

/// Summary formatting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Failures listed individually before collapsing to "... and N more" (default: 10)
    #[serde(default = "default_failure_display_limit")]
    pub failure_display_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            failure_display_limit: default_failure_display_limit(),
        }
    }
}

/// Recursively overlay `overrides` onto `base`, table by table
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://places.googleapis.com/v1".to_string()
}

fn default_max_width_px() -> u32 {
    800
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_dataset() -> PathBuf {
    PathBuf::from("data/clinics.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public/images/clinics")
}

fn default_extension() -> String {
    "jpg".to_string()
}

fn default_concurrency_limit() -> usize {
    10
}

fn default_inter_batch_delay() -> Option<Duration> {
    Some(Duration::from_secs(2))
}

fn default_progress_interval() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_failure_display_limit() -> usize {
    10
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
