//! Configuration types for build-relay
//!
//! The relay is configured once at startup, normally from the process
//! environment via [`Config::from_env`], and the resulting [`Config`] is shared
//! read-only (behind an `Arc`) by every component.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Inbound webhook settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Address to bind to (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Shared secret the provider sends in the `Authorization` header
    pub authorization_key: String,

    /// Only notifications for this project are accepted
    pub project_guid: String,
}

/// Build provider API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API root that build-detail links are relative to
    #[serde(default = "default_provider_api_base")]
    pub api_base: String,

    /// Pre-shared API key, sent as `Authorization: Basic <key>`
    pub api_key: String,
}

/// Distribution service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Scheme and host of the distribution service
    #[serde(default = "default_distribution_base")]
    pub base_url: String,

    /// Application the artifact is released under
    pub app_id: String,

    /// API token, sent in the `X-HockeyAppToken` header
    pub api_key: String,

    /// Release status form field (default: 2, available for download)
    #[serde(default = "default_release_status")]
    pub release_status: u8,

    /// Release notes attached to every upload
    #[serde(default = "default_release_notes")]
    pub release_notes: String,

    /// Release notes format (default: 0, plain text)
    #[serde(default)]
    pub notes_type: u8,

    /// Notify testers flag (default: 0, don't notify)
    #[serde(default)]
    pub notify: u8,

    /// Multipart field name carrying the binary (default: "ipa")
    #[serde(default = "default_file_field")]
    pub file_field: String,
}

impl DistributionConfig {
    /// Full upload endpoint for the configured application
    pub fn upload_url(&self) -> String {
        format!(
            "{}/api/2/apps/{}/app_versions",
            self.base_url.trim_end_matches('/'),
            self.app_id
        )
    }
}

/// Transfer pipeline settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Root directory for per-session artifact directories (default: "./artifacts")
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Overall deadline for download plus upload (default: 1 hour)
    #[serde(default = "default_session_timeout", with = "duration_serde")]
    pub session_timeout: Duration,

    /// How long shutdown waits for in-flight sessions (default: 30 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            session_timeout: default_session_timeout(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Retry configuration for outbound calls
///
/// The default performs no retries; the first failure is terminal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the relay
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Inbound webhook settings
    pub webhook: WebhookConfig,

    /// Build provider API
    pub provider: ProviderConfig,

    /// Distribution service
    pub distribution: DistributionConfig,

    /// Local storage and deadlines
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Retry policy for outbound calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Read configuration from the process environment
    ///
    /// | variable | meaning | default |
    /// |---|---|---|
    /// | `PORT` | listen port | 3000 |
    /// | `AUTH_KEY` | inbound shared secret | required |
    /// | `PROJECT_GUID` | accepted project | required |
    /// | `UNITYCLOUD_KEY` | provider API key | required |
    /// | `UNITYCLOUD_API_BASE` | provider API root | `https://build-api.cloud.unity3d.com` |
    /// | `HOCKEYAPPID` | distribution app id | required |
    /// | `HOCKEYAPP_KEY` | distribution API key | required |
    /// | `HOCKEYAPP_BASE` | distribution base URL | `https://rink.hockeyapp.net` |
    /// | `ARTIFACT_DIR` | artifact root | `./artifacts` |
    /// | `SESSION_TIMEOUT_SECS` | per-session deadline | 3600 |
    /// | `RETRY_MAX_ATTEMPTS` | retries per outbound call | 0 |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Used by [`Config::from_env`]; tests pass a map instead of touching the
    /// real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| Error::config(key, format!("{} must be set", key)))
        };

        let port = match get("PORT") {
            Some(raw) => parse_number::<u16>("PORT", &raw)?,
            None => default_bind_address().port(),
        };

        let mut transfer = TransferConfig::default();
        if let Some(dir) = get("ARTIFACT_DIR") {
            transfer.artifact_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("SESSION_TIMEOUT_SECS") {
            transfer.session_timeout =
                Duration::from_secs(parse_number("SESSION_TIMEOUT_SECS", &raw)?);
        }

        let mut retry = RetryConfig::default();
        if let Some(raw) = get("RETRY_MAX_ATTEMPTS") {
            retry.max_attempts = parse_number("RETRY_MAX_ATTEMPTS", &raw)?;
        }

        let config = Config {
            webhook: WebhookConfig {
                bind_address: SocketAddr::from(([0, 0, 0, 0], port)),
                authorization_key: require("AUTH_KEY")?,
                project_guid: require("PROJECT_GUID")?,
            },
            provider: ProviderConfig {
                api_base: get("UNITYCLOUD_API_BASE").unwrap_or_else(default_provider_api_base),
                api_key: require("UNITYCLOUD_KEY")?,
            },
            distribution: DistributionConfig {
                base_url: get("HOCKEYAPP_BASE").unwrap_or_else(default_distribution_base),
                app_id: require("HOCKEYAPPID")?,
                api_key: require("HOCKEYAPP_KEY")?,
                release_status: default_release_status(),
                release_notes: default_release_notes(),
                notes_type: 0,
                notify: 0,
                file_field: default_file_field(),
            },
            transfer,
            retry,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.provider.api_base).map_err(|e| {
            Error::config(
                "UNITYCLOUD_API_BASE",
                format!("invalid provider API base {:?}: {}", self.provider.api_base, e),
            )
        })?;

        url::Url::parse(&self.distribution.upload_url()).map_err(|e| {
            Error::config(
                "HOCKEYAPP_BASE",
                format!(
                    "invalid distribution base {:?}: {}",
                    self.distribution.base_url, e
                ),
            )
        })?;

        if self.transfer.session_timeout.is_zero() {
            return Err(Error::config(
                "SESSION_TIMEOUT_SECS",
                "session timeout must be greater than zero",
            ));
        }

        if self.distribution.file_field.is_empty() {
            return Err(Error::config(
                "file_field",
                "multipart file field name must not be empty",
            ));
        }

        Ok(())
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::config(key, format!("invalid value {:?} for {}: {}", raw, key, e)))
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_provider_api_base() -> String {
    "https://build-api.cloud.unity3d.com".to_string()
}

fn default_distribution_base() -> String {
    "https://rink.hockeyapp.net".to_string()
}

fn default_release_status() -> u8 {
    2
}

fn default_release_notes() -> String {
    "Automated release triggered from Unity Cloud Build.".to_string()
}

fn default_file_field() -> String {
    "ipa".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
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
