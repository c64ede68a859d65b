//! Activation configuration.

use crate::error::{ActivationError, ActivationResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding [`AuthorityConfig::base_url`].
pub const ENV_URL: &str = "KARAOKE_ACTIVATION_URL";
/// Environment variable overriding [`AuthorityConfig::api_key`].
pub const ENV_API_KEY: &str = "KARAOKE_ACTIVATION_API_KEY";
/// Environment variable overriding [`AuthorityConfig::timeout_secs`].
pub const ENV_TIMEOUT_SECS: &str = "KARAOKE_ACTIVATION_TIMEOUT_SECS";
/// Environment variable overriding [`ActivationConfig::offline_grace_hours`].
pub const ENV_GRACE_HOURS: &str = "KARAOKE_OFFLINE_GRACE_HOURS";
/// Environment variable overriding [`ActivationConfig::database_path`].
pub const ENV_DB: &str = "KARAOKE_ACTIVATION_DB";

/// Connection settings for the activation authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the activation API (e.g. `https://www.bluekaraokes.com.br`).
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Optional bearer token sent with every request.
    pub api_key: Option<String>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.bluekaraokes.com.br".to_string(),
            timeout_secs: 10,
            api_key: None,
        }
    }
}

/// Top-level configuration for the activation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Remote authority settings.
    #[serde(default)]
    pub authority: AuthorityConfig,
    /// Offline window after the last online check, for keys without a cached expiry.
    pub offline_grace_hours: u32,
    /// SQLite file holding the activation record.
    pub database_path: PathBuf,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityConfig::default(),
            offline_grace_hours: 72,
            database_path: default_database_path(),
        }
    }
}

impl ActivationConfig {
    /// Builds the default configuration with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Config`] if a numeric variable does not parse.
    pub fn from_env() -> ActivationResult<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Config`] if a numeric variable does not
    /// parse or the result fails [`validate`](Self::validate).
    pub fn with_overrides<F>(mut self, lookup: F) -> ActivationResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var(ENV_URL) {
            self.authority.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(key) = var(ENV_API_KEY) {
            self.authority.api_key = Some(key);
        }
        if let Some(secs) = var(ENV_TIMEOUT_SECS) {
            self.authority.timeout_secs = parse_number(ENV_TIMEOUT_SECS, &secs)?;
        }
        if let Some(hours) = var(ENV_GRACE_HOURS) {
            self.offline_grace_hours = parse_number(ENV_GRACE_HOURS, &hours)?;
        }
        if let Some(path) = var(ENV_DB) {
            self.database_path = PathBuf::from(path);
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks values that would make the engine misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Config`] for a zero timeout or an empty
    /// base URL.
    pub fn validate(&self) -> ActivationResult<()> {
        if self.authority.timeout_secs == 0 {
            return Err(ActivationError::Config(
                "authority timeout must be at least one second".to_string(),
            ));
        }
        if self.authority.base_url.is_empty() {
            return Err(ActivationError::Config("authority base URL is empty".to_string()));
        }
        Ok(())
    }

    /// Offline grace window as a `chrono` duration.
    #[must_use]
    pub fn offline_grace(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.offline_grace_hours))
    }

    /// Per-request timeout as a std duration.
    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.authority.timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> ActivationResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ActivationError::Config(format!("{name} is not a valid number: {value}")))
}

/// Default location of the activation database.
#[must_use]
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bluekaraoke")
        .join("activation.sqlite")
}
