//! Server configuration.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! minimal (or empty) file is valid.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration loaded from TOML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[derive(Default)]
pub struct Config {
    /// Listen socket
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Cache budget
    #[serde(default)]
    pub cache: CacheConfig,

    /// Connection admission and timeouts
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Worker thread pool
    #[serde(default)]
    pub pool: PoolConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Total byte budget for keys and values (e.g., "64MB")
    #[serde(default = "default_max_bytes", deserialize_with = "deserialize_size")]
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

/// Connection admission and timeout configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum concurrently served connections; extra sockets are
    /// closed on accept
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Idle read timeout in seconds before a connection is closed
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

/// Worker thread pool configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Minimum number of pooled threads kept alive when idle
    /// (default: number of CPUs)
    pub low_watermark: Option<usize>,

    /// Maximum number of pooled threads
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,

    /// Maximum queued tasks awaiting a thread
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    /// How long a surplus idle thread lingers before exiting
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            low_watermark: None,
            high_watermark: default_high_watermark(),
            max_queue: default_max_queue(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level filter (overridden by RUST_LOG when set)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "pretty", "json", or "compact"
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include the event's module target
    #[serde(default)]
    pub target: bool,

    /// Include thread names
    #[serde(default = "default_true")]
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
            target: false,
            thread_names: true,
        }
    }
}

// Default value functions

fn default_listen_address() -> SocketAddr {
    "127.0.0.1:11211".parse().unwrap()
}

fn default_max_bytes() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_max_connections() -> usize {
    1024
}

fn default_read_timeout_secs() -> u64 {
    5
}

fn default_high_watermark() -> usize {
    1024
}

fn default_max_queue() -> usize {
    128
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Deserialize a size string like "64MB" or "4GB" into bytes.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Number(usize),
        String(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(D::Error::custom),
    }
}

/// Parse a size string like "64MB", "4GB", "1TB" into bytes.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| c.is_alphabetic()) {
        Some(idx) => (&s[..idx], s[idx..].to_uppercase()),
        None => (s, String::new()),
    };

    let num: usize = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier: usize = match suffix.as_str() {
        "" => 1,
        "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(format!("unknown size suffix: {}", suffix)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size overflow".to_string())
}

/// Format a size in bytes as a human-readable string.
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    const GB: usize = 1024 * MB;

    if bytes >= GB && bytes % GB == 0 {
        format!("{} GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{} KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.cache.max_bytes < 1 {
            return Err("cache max_bytes must be at least 1".into());
        }

        if self.limits.max_connections < 1 {
            return Err("max_connections must be at least 1".into());
        }

        if self.pool.high_watermark < 1 {
            return Err("pool high_watermark must be at least 1".into());
        }

        if self.pool.high_watermark < self.low_watermark() {
            return Err(format!(
                "pool high_watermark ({}) must be at least low_watermark ({})",
                self.pool.high_watermark,
                self.low_watermark()
            )
            .into());
        }

        Ok(())
    }

    /// Minimum pooled thread count, defaulting to the CPU count.
    pub fn low_watermark(&self) -> usize {
        self.pool.low_watermark.unwrap_or_else(num_cpus::get)
    }

    /// Per-connection idle read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.read_timeout_secs)
    }

    /// Surplus pool thread idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.pool.idle_timeout_ms)
    }
}
