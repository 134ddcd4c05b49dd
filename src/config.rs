//! Runtime configuration
//!
//! Loaded from `~/.roastrack/config.json` (or an explicit path); every field
//! has a default so a missing file is not an error. A few values can be
//! overridden from the environment so secrets stay out of the file.

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::mapping::{default_apps, AppEntry, PackageMapping};
use crate::types::{Result, RoastrackError};

/// AppLovin MAX report endpoint
pub const APPLOVIN_REPORT_URL: &str = "https://r.applovin.com/maxReport";

/// Default HTTP request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default raw response cache TTL in seconds (24 hours)
pub const CACHE_TTL_SECS: i64 = 24 * 60 * 60;

/// Default report window in days back from today
pub const WINDOW_DAYS: u32 = 7;

pub const ENV_API_KEY: &str = "ROASTRACK_APPLOVIN_API_KEY";
pub const ENV_REVENUE_URL: &str = "ROASTRACK_APPLOVIN_URL";
pub const ENV_SPEND_URL: &str = "ROASTRACK_SPEND_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub revenue_url: String,
    pub revenue_api_key: Option<String>,
    /// Mintegral spend endpoint; no default
    pub spend_url: Option<String>,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: i64,
    pub window_days: u32,
    /// Package mapping between revenue bundle ids and spend store ids
    pub apps: Vec<AppEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            revenue_url: APPLOVIN_REPORT_URL.to_string(),
            revenue_api_key: None,
            spend_url: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            cache_ttl_secs: CACHE_TTL_SECS,
            window_days: WINDOW_DAYS,
            apps: default_apps(),
        }
    }
}

impl Config {
    /// Load from `path`, or the default location when `None`, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = Self::load_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `~/.roastrack/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| RoastrackError::Config("Cannot determine home directory".into()))?;
        Ok(base_dirs.home_dir().join(".roastrack").join("config.json"))
    }

    /// Read a config file; a missing file yields defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            RoastrackError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.revenue_api_key = Some(key);
        }
        if let Some(url) = non_empty(ENV_REVENUE_URL) {
            self.revenue_url = url;
        }
        if let Some(url) = non_empty(ENV_SPEND_URL) {
            self.spend_url = Some(url);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(RoastrackError::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.cache_ttl_secs < 0 {
            return Err(RoastrackError::Config(
                "cache_ttl_secs must not be negative".into(),
            ));
        }
        if let Some(app) = self
            .apps
            .iter()
            .find(|a| a.bundle_id.trim().is_empty() || a.store_id.trim().is_empty())
        {
            return Err(RoastrackError::Config(format!(
                "app entry has an empty id: {:?}",
                app
            )));
        }
        Ok(())
    }

    pub fn mapping(&self) -> PackageMapping {
        PackageMapping::new(self.apps.clone())
    }

    /// Cache directory next to the default config file
    pub fn cache_dir() -> Result<PathBuf> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| RoastrackError::Cache("Cannot determine home directory".into()))?;
        Ok(base_dirs.home_dir().join(".roastrack").join("cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_file(&temp.path().join("config.json")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.revenue_url, APPLOVIN_REPORT_URL);
        assert_eq!(config.apps.len(), 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "spend_url": "https://example.test/api/mintegral/spend",
                "window_days": 14,
                "apps": [{"bundle_id": "com.a", "store_id": "idA", "name": "Game A"}]
            }"#,
        )
        .unwrap();

        let config = Config::load_file(&path).unwrap();

        assert_eq!(
            config.spend_url.as_deref(),
            Some("https://example.test/api/mintegral/spend")
        );
        assert_eq!(config.window_days, 14);
        assert_eq!(config.request_timeout_secs, REQUEST_TIMEOUT_SECS);
        let mapping = config.mapping();
        assert_eq!(mapping.bundle_for_store("idA"), Some("com.a"));
        assert_eq!(mapping.display_name("com.a"), "Game A");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, RoastrackError::Config(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"request_timeout_secs": 0}"#).unwrap();

        assert!(matches!(
            Config::load_file(&path),
            Err(RoastrackError::Config(_))
        ));
    }

    #[test]
    fn test_empty_store_id_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"apps": [{"bundle_id": "com.a", "store_id": " "}]}"#).unwrap();

        assert!(matches!(
            Config::load_file(&path),
            Err(RoastrackError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "secret"),
            (ENV_SPEND_URL, "https://example.test/spend"),
            (ENV_REVENUE_URL, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.revenue_api_key.as_deref(), Some("secret"));
        assert_eq!(config.spend_url.as_deref(), Some("https://example.test/spend"));
        // Blank values do not override
        assert_eq!(config.revenue_url, APPLOVIN_REPORT_URL);
    }
}
