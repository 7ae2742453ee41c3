use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub limiter: LimiterConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub feed: FeedConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/logsift/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("logsift/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the list store path
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.general.store_path)
    }

    /// Block TTL in milliseconds
    pub fn block_ttl_ms(&self) -> i64 {
        self.general.block_ttl_hours as i64 * 60 * 60 * 1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path to the SQLite-backed list store
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long a block event counts as "currently blocked" (hours)
    #[serde(default = "default_block_ttl_hours")]
    pub block_ttl_hours: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            log_level: default_log_level(),
            block_ttl_hours: default_block_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Requests allowed per IP inside the window before flagging
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Sliding window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleWeights {
    #[serde(default = "default_w_rate_limit")]
    pub rate_limit_exceeded: u32,

    #[serde(default = "default_w_country")]
    pub suspicious_country: u32,

    #[serde(default = "default_w_asn")]
    pub suspicious_asn: u32,

    #[serde(default = "default_w_device")]
    pub suspicious_device: u32,

    #[serde(default = "default_w_referer")]
    pub suspicious_referer: u32,

    #[serde(default = "default_w_uri")]
    pub suspicious_uri: u32,

    #[serde(default = "default_w_scheme")]
    pub insecure_scheme: u32,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            rate_limit_exceeded: default_w_rate_limit(),
            suspicious_country: default_w_country(),
            suspicious_asn: default_w_asn(),
            suspicious_device: default_w_device(),
            suspicious_referer: default_w_referer(),
            suspicious_uri: default_w_uri(),
            insecure_scheme: default_w_scheme(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub weights: RuleWeights,

    /// Country codes considered suspicious
    #[serde(default = "default_countries")]
    pub countries: Vec<String>,

    /// Device types considered suspicious (matched lowercased)
    #[serde(default = "default_devices")]
    pub devices: Vec<String>,

    /// Referer substrings that flag a request
    #[serde(default = "default_referers")]
    pub referers: Vec<String>,

    /// URI path segments that flag a request (matched lowercased, per segment)
    #[serde(default = "default_uri_keywords")]
    pub uri_keywords: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            weights: RuleWeights::default(),
            countries: default_countries(),
            devices: default_devices(),
            referers: default_referers(),
            uri_keywords: default_uri_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records buffered per tier before a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bytes read from the source per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Local path to the suspicious-ASN JSON array
    #[serde(default)]
    pub path: Option<String>,

    /// HTTP(S) URL for the suspicious-ASN JSON array
    #[serde(default)]
    pub url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            timeout_secs: default_feed_timeout(),
        }
    }
}

// Default value functions

fn default_store_path() -> String {
    "/var/lib/logsift/lists.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_block_ttl_hours() -> u32 {
    12
}

fn default_max_requests() -> usize {
    100
}

fn default_window_ms() -> i64 {
    60_000
}

fn default_w_rate_limit() -> u32 {
    15
}

fn default_w_country() -> u32 {
    10
}

fn default_w_asn() -> u32 {
    8
}

fn default_w_device() -> u32 {
    5
}

fn default_w_referer() -> u32 {
    6
}

fn default_w_uri() -> u32 {
    7
}

fn default_w_scheme() -> u32 {
    4
}

fn default_countries() -> Vec<String> {
    ["CN", "RU", "KR", "IR", "IN"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_devices() -> Vec<String> {
    ["mobile", "unknown"].iter().map(|s| s.to_string()).collect()
}

fn default_referers() -> Vec<String> {
    ["http://www.hernandez.com/", "http://untrustedsite.com/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_uri_keywords() -> Vec<String> {
    ["login", "admin", "wp-login", "exploit", "shell"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_batch_size() -> usize {
    100
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_feed_timeout() -> u64 {
    10
}
