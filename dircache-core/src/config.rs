//! Configuration for the cache and the lookup boundary.
//!
//! Values come from the enclosing filter. [`CacheConfig::from_env`] reads the
//! same settings from `DIRCACHE_*` environment variables (a `.env` file is
//! honoured) for the CLI and for hosts without their own config layer.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_IDENTIFIER_KEY, DEFAULT_LDAP_PORT, DEFAULT_MAX_ENTRIES, DEFAULT_PERSIST_SCHEDULE,
    DEFAULT_TTL_SECONDS, MAX_PERSIST_INTERVAL_SECS,
};
use crate::error::{DirCacheError, Result};

/// Result cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether lookups go through the cache at all
    pub use_cache: bool,
    /// Maximum number of entries
    pub max_entries: usize,
    /// Entry time-to-live in seconds
    pub ttl_seconds: u64,
    /// Snapshot file; `None` disables persistence
    pub persist_path: Option<PathBuf>,
    /// How often to save, e.g. `"10m"`, `"30s"`, `"90"`
    pub persist_schedule: String,
    /// Whether to write one last snapshot when the scheduler stops
    pub save_on_shutdown: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            persist_path: None,
            persist_schedule: DEFAULT_PERSIST_SCHEDULE.into(),
            save_on_shutdown: true,
        }
    }
}

impl CacheConfig {
    /// Creates a config with the given limits and no persistence.
    pub fn new(max_entries: usize, ttl_seconds: u64) -> Self {
        Self {
            max_entries,
            ttl_seconds,
            ..Default::default()
        }
    }

    /// Enables persistence to `path` on the given schedule.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>, schedule: impl Into<String>) -> Self {
        self.persist_path = Some(path.into());
        self.persist_schedule = schedule.into();
        self
    }

    /// Disables caching.
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Entry time-to-live.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Parsed persistence interval.
    pub fn persist_interval(&self) -> Result<Duration> {
        parse_schedule(&self.persist_schedule)
    }

    /// Returns true when a snapshot file is configured and caching is on.
    pub fn persistence_enabled(&self) -> bool {
        self.use_cache && self.persist_path.is_some()
    }

    /// Checks limits once, at construction time.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(DirCacheError::ConfigError("max_entries must be positive".into()));
        }
        if self.ttl_seconds == 0 {
            return Err(DirCacheError::ConfigError("ttl_seconds must be positive".into()));
        }
        if let Some(path) = &self.persist_path {
            if path.as_os_str().is_empty() {
                return Err(DirCacheError::ConfigError("persist_path must not be empty".into()));
            }
            // Only meaningful when persistence is on
            self.persist_interval()?;
        }
        Ok(())
    }

    /// Loads configuration from `DIRCACHE_*` environment variables.
    ///
    /// Unset variables keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Ok(v) = std::env::var("DIRCACHE_USE_CACHE") {
            config.use_cache = parse_flag("DIRCACHE_USE_CACHE", &v)?;
        }
        if let Ok(v) = std::env::var("DIRCACHE_MAX_ENTRIES") {
            config.max_entries = v.trim().parse().map_err(|_| {
                DirCacheError::ConfigError(format!("DIRCACHE_MAX_ENTRIES is not a number: {}", v))
            })?;
        }
        if let Ok(v) = std::env::var("DIRCACHE_TTL_SECONDS") {
            config.ttl_seconds = v.trim().parse().map_err(|_| {
                DirCacheError::ConfigError(format!("DIRCACHE_TTL_SECONDS is not a number: {}", v))
            })?;
        }
        if let Ok(v) = std::env::var("DIRCACHE_PERSIST_PATH") {
            if !v.trim().is_empty() {
                config.persist_path = Some(PathBuf::from(v.trim()));
            }
        }
        if let Ok(v) = std::env::var("DIRCACHE_PERSIST_SCHEDULE") {
            config.persist_schedule = v;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parameters identifying the directory queries being cached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSettings {
    /// Directory server host
    pub host: String,
    /// Directory server port
    pub port: u16,
    /// Attribute the identifier value is matched against
    pub identifier_key: String,
    /// Put the error message into the record under `error`
    pub enable_error_capture: bool,
    /// Cache records produced by failed or empty lookups
    pub cache_failures: bool,
}

impl LookupSettings {
    /// Creates settings for `host` with default port and identifier key.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_LDAP_PORT,
            identifier_key: DEFAULT_IDENTIFIER_KEY.into(),
            enable_error_capture: false,
            cache_failures: true,
        }
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the identifier attribute.
    pub fn identifier_key(mut self, key: impl Into<String>) -> Self {
        self.identifier_key = key.into();
        self
    }

    /// Enables error capture in result records.
    pub fn capture_errors(mut self) -> Self {
        self.enable_error_capture = true;
        self
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DirCacheError::ConfigError("host is required".into()));
        }
        if self.identifier_key.trim().is_empty() {
            return Err(DirCacheError::ConfigError("identifier_key must not be empty".into()));
        }
        Ok(())
    }
}

/// Parses a boolean environment value, case-insensitively.
fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DirCacheError::ConfigError(format!(
            "{} must be true/false, yes/no, on/off or 1/0, got '{}'",
            name, value
        ))),
    }
}

/// Parses a schedule string into an interval.
///
/// Accepts a bare number of seconds (`"90"`) or one or more `<n><unit>`
/// groups with units `s`, `m`, `h`, `d`, `w` (`"10m"`, `"1h30m"`). The
/// interval must be positive and at most [`MAX_PERSIST_INTERVAL_SECS`].
pub fn parse_schedule(schedule: &str) -> Result<Duration> {
    let s = schedule.trim();
    if s.is_empty() {
        return Err(DirCacheError::ConfigError("empty schedule".into()));
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = s
            .parse()
            .map_err(|_| DirCacheError::ConfigError(format!("schedule out of range: {}", s)))?;
        return in_range(Duration::from_secs(secs), schedule);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => {
                return Err(DirCacheError::ConfigError(format!(
                    "invalid schedule '{}': unknown unit '{}'",
                    schedule, c
                )))
            }
        };
        if digits.is_empty() {
            return Err(DirCacheError::ConfigError(format!(
                "invalid schedule '{}': unit '{}' without a number",
                schedule, c
            )));
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| DirCacheError::ConfigError(format!("schedule out of range: {}", schedule)))?;
        total = n
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| DirCacheError::ConfigError(format!("schedule out of range: {}", schedule)))?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(DirCacheError::ConfigError(format!(
            "invalid schedule '{}': trailing number without a unit",
            schedule
        )));
    }

    in_range(Duration::from_secs(total), schedule)
}

fn in_range(interval: Duration, schedule: &str) -> Result<Duration> {
    if interval.is_zero() {
        return Err(DirCacheError::ConfigError(format!(
            "schedule '{}' must be longer than zero",
            schedule
        )));
    }
    if interval.as_secs() > MAX_PERSIST_INTERVAL_SECS {
        return Err(DirCacheError::ConfigError(format!(
            "schedule '{}' exceeds the maximum of {} seconds",
            schedule, MAX_PERSIST_INTERVAL_SECS
        )));
    }
    Ok(interval)
}
