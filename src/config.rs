//! diveops configuration.
//!
//! Loaded from `~/.diveops/config.toml`. A missing file means defaults; a
//! file that exists but does not parse is an error.

use std::{env, fs, path::PathBuf, time::Duration};

use jiff::tz::TimeZone;
use serde::Deserialize;

use crate::storage::Storage;

/// Overrides `database` from the config file.
pub const DATABASE_ENV: &str = "DIVEOPS_DB";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Database file. Defaults to `~/.diveops/diveops.sqlite`.
    pub database: Option<PathBuf>,

    /// IANA zone that dive dates and start times are written in.
    pub timezone: String,

    /// How long enabled rules are cached before being re-read.
    pub rule_cache_ttl_secs: u64,

    /// Pause between bottom-time sweeps in `monitor watch`.
    pub sweep_interval_secs: u64,

    /// Acting identity when neither `--as` nor `DIVEOPS_IDENTITY` is set.
    pub identity: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            timezone: "UTC".to_string(),
            rule_cache_ttl_secs: 30,
            sweep_interval_secs: 60,
            identity: None,
        }
    }
}

impl Config {
    /// Load config from `~/.diveops/config.toml`, or defaults if there is none.
    pub fn load() -> Result<Self, String> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };

        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        Self::parse(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;
        config.time_zone()?;
        if config.sweep_interval_secs == 0 {
            return Err("sweep-interval-secs must be at least 1".to_string());
        }
        Ok(config)
    }

    /// The config file path: `~/.diveops/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".diveops").join("config.toml"))
    }

    /// The database to open: `DIVEOPS_DB`, then `database`, then the default.
    pub fn database_path(&self) -> Result<PathBuf, String> {
        let from_env = env::var_os(DATABASE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        self.database_path_with(from_env)
    }

    fn database_path_with(&self, from_env: Option<PathBuf>) -> Result<PathBuf, String> {
        from_env
            .or_else(|| self.database.clone())
            .or_else(Storage::default_path)
            .ok_or_else(|| "could not determine home directory".to_string())
    }

    pub fn time_zone(&self) -> Result<TimeZone, String> {
        TimeZone::get(&self.timezone).map_err(|e| format!("unknown time zone '{}': {e}", self.timezone))
    }

    pub fn rule_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rule_cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
