//! Configuration management for Reportgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ReportGateError, Result};

/// Prefix for environment variable overrides, e.g. `REPORTGATE__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "REPORTGATE";

/// Main configuration for the Reportgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportGateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Download target and record log
    #[serde(default)]
    pub download: DownloadConfig,

    /// Confirmation mail
    #[serde(default)]
    pub mail: MailConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Honor the first `X-Forwarded-For` entry as the client address.
    /// Only enable behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trust_forwarded_for: false,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// What the limiter does when its state cannot be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Treat the client as having no history and let the request through
    #[default]
    Open,
    /// Reject the request
    Closed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path of the persisted rate limit state
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Requests allowed per client per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Behavior on state load failures
    #[serde(default)]
    pub failure_mode: FailureMode,
}

impl RateLimitingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            failure_mode: FailureMode::default(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/rate_limits.json")
}

fn default_max_requests() -> u32 {
    3
}

fn default_window_secs() -> u64 {
    15 * 60
}

/// Download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// URL handed out on a successful request
    #[serde(default)]
    pub download_url: String,

    /// Append-only log of granted downloads
    #[serde(default = "default_record_path")]
    pub record_path: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_url: String::new(),
            record_path: default_record_path(),
        }
    }
}

fn default_record_path() -> PathBuf {
    PathBuf::from("data/downloads.jsonl")
}

/// SMTP configuration for the confirmation mail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Send mail at all; when false sends are only logged
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub from_email: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// Use STARTTLS
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,

    /// Upper bound on a single send, in seconds
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_email: String::new(),
            from_name: default_from_name(),
            subject: default_subject(),
            use_tls: default_use_tls(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Reportgate".to_string()
}

fn default_subject() -> String {
    "Your report download".to_string()
}

fn default_use_tls() -> bool {
    true
}

fn default_mail_timeout() -> u64 {
    10
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ReportGateConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ReportGateError::Config(e.to_string()))
    }

    /// Load configuration from an optional file, then apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ReportGateError::Config(e.to_string()))
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.download.download_url.trim().is_empty() {
            return Err(ReportGateError::Config(
                "download.download_url must be set".to_string(),
            ));
        }
        if self.rate_limiting.max_requests == 0 {
            return Err(ReportGateError::Config(
                "rate_limiting.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limiting.window_secs == 0 {
            return Err(ReportGateError::Config(
                "rate_limiting.window_secs must be at least 1".to_string(),
            ));
        }
        if self.mail.enabled && (self.mail.smtp_host.is_empty() || self.mail.from_email.is_empty()) {
            return Err(ReportGateError::Config(
                "mail.smtp_host and mail.from_email are required when mail is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
