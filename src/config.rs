//! Portal configuration.
//!
//! Provides two loading methods:
//! - `default_config()` - Settings embedded in the binary at compile time
//! - `load_config(path)` - Settings read from a TOML file
//!
//! `config_from_env()` picks between them using `ERP_PORTAL_CONFIG`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PortalError;

/// Default settings, loaded from `config/portal.toml`.
const DEFAULT_CONFIG: &str = include_str!("../config/portal.toml");

/// Environment variable naming an override config file.
pub const CONFIG_ENV_VAR: &str = "ERP_PORTAL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalConfig {
    /// Origin + directory of the portal pages. Must end with `/`.
    pub base_url: String,
    pub login_path: String,
    pub dashboard_path: String,
    pub captcha_path: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub login_timeout_secs: u64,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub key_prefix: String,
    /// SQLite file for the session cache. Defaults to the user cache dir.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl PortalConfig {
    fn base(&self) -> Result<Url, PortalError> {
        Url::parse(&self.base_url)
            .map_err(|e| PortalError::Config(format!("Invalid base_url '{}': {}", self.base_url, e)))
    }

    /// Resolve a portal-relative link (as found in page markup) to an absolute URL.
    pub fn resolve(&self, relative: &str) -> Result<Url, PortalError> {
        self.base()?.join(relative.trim()).map_err(|e| {
            PortalError::Config(format!("Cannot resolve '{}' against base: {}", relative, e))
        })
    }

    pub fn login_url(&self) -> Result<Url, PortalError> {
        self.resolve(&self.login_path)
    }

    pub fn dashboard_url(&self) -> Result<Url, PortalError> {
        self.resolve(&self.dashboard_path)
    }

    pub fn captcha_url(&self) -> Result<Url, PortalError> {
        self.resolve(&self.captcha_path)
    }

    /// Where the session cache database lives.
    pub fn cache_db_path(&self) -> PathBuf {
        if let Some(path) = &self.cache.path {
            return path.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("erp-dashboard")
            .join("sessions.db")
    }

    fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.base_url)?;
        if !base.path().ends_with('/') {
            bail!("base_url must end with '/': {}", self.base_url);
        }
        if self.request_timeout_secs == 0 || self.login_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        Ok(())
    }
}

/// Load and validate a config from a TOML file.
pub fn load_config(path: &Path) -> Result<PortalConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PortalConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// The config embedded in the binary.
///
/// # Panics
/// Panics if the embedded TOML is invalid (a compile-time bug).
pub fn default_config() -> PortalConfig {
    toml::from_str(DEFAULT_CONFIG).expect("embedded portal.toml must be valid TOML")
}

/// Load the file named by `ERP_PORTAL_CONFIG`, or the embedded defaults.
pub fn config_from_env() -> Result<PortalConfig> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) => load_config(Path::new(&path)),
        None => Ok(default_config()),
    }
}
