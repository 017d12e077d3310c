use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::{model::Coordinates, provider::ProviderId};

/// Environment variable that overrides the configured API key.
pub const API_KEY_ENV: &str = "NIMBUS_API_KEY";

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Override for the provider's API root, mostly useful for testing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// How the "device" location is obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// `false` behaves like a user who denied the location prompt.
    #[serde(default = "default_allow_device")]
    pub allow_device: bool,

    /// Place looked up by name when device location fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_place: Option<String>,

    #[serde(default = "default_device_timeout")]
    pub device_timeout_secs: u64,

    /// IP geolocation endpoint used when no fixed coordinates are set.
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,

    /// Fixed device position. Both must be set to take effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

fn default_allow_device() -> bool {
    true
}

const fn default_device_timeout() -> u64 {
    10
}

fn default_lookup_url() -> String {
    "http://ip-api.com/json".to_string()
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            allow_device: default_allow_device(),
            fallback_place: None,
            device_timeout_secs: default_device_timeout(),
            lookup_url: default_lookup_url(),
            latitude: None,
            longitude: None,
        }
    }
}

impl LocationConfig {
    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }

    /// Configured fixed position, if both halves are present.
    pub fn fixed_coordinates(&self) -> Result<Option<Coordinates>> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Ok(Some(
                Coordinates::new(lat, lon).context("Invalid [location] coordinates in config")?,
            )),
            (None, None) => Ok(None),
            _ => Err(anyhow!(
                "Both [location] latitude and longitude must be set to use a fixed position."
            )),
        }
    }

    /// Fallback place with surrounding whitespace removed; blank counts as unset.
    pub fn fallback_place(&self) -> Option<&str> {
        self.fallback_place.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Upper bound for every provider request.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

const fn default_http_timeout() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: default_http_timeout() }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// How many forecast entries the front end shows.
    #[serde(default = "default_forecast_limit")]
    pub forecast_limit: usize,
}

const fn default_forecast_limit() -> usize {
    8
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { forecast_limit: default_forecast_limit() }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Optional default provider id, e.g. "openweather" or "weatherapi".
    pub default_provider: Option<String>,

    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    /// Where the snapshot and favorites are kept. Defaults to the platform cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "No default provider configured.\n\
                 Hint: run `nimbus configure <provider>` (e.g. `nimbus configure openweather`) first."
            )
        })?;

        ProviderId::try_from(s.as_str())
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration TOML")
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "nimbus", "nimbus")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory holding the cached snapshot and favorites.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().to_path_buf()),
        }
    }

    /// Convenience helper: set/replace a provider API key and optionally set default provider.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        let base_url = self
            .providers
            .get(provider_id.as_str())
            .and_then(|cfg| cfg.base_url.clone());
        self.providers
            .insert(provider_id.as_str().to_string(), ProviderConfig { api_key, base_url });

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns API key for a provider. `NIMBUS_API_KEY` wins over the file.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<String> {
        pick_api_key(std::env::var(API_KEY_ENV).ok(), self.file_api_key(provider_id))
    }

    fn file_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.file_api_key(provider_id).is_some()
    }
}

/// A non-blank environment key wins over the file key.
fn pick_api_key(env: Option<String>, file: Option<&str>) -> Option<String> {
    env.filter(|key| !key.trim().is_empty())
        .or_else(|| file.map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    #[test]
    fn default_provider_id_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.default_provider_id().unwrap_err();

        assert!(err.to_string().contains("No default provider configured"));
    }

    #[test]
    fn set_api_key_and_default_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());

        let default = cfg.default_provider_id().expect("default provider must exist");
        assert_eq!(default, ProviderId::OpenWeather);

        assert_eq!(cfg.file_api_key(ProviderId::OpenWeather), Some("OPEN_KEY"));
        assert!(cfg.is_provider_configured(ProviderId::OpenWeather));
    }

    #[test]
    fn upsert_does_not_override_existing_default() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "WEATHER_KEY".into());

        let default = cfg.default_provider_id().expect("default provider must exist");

        assert_eq!(default, ProviderId::OpenWeather);
        assert!(cfg.is_provider_configured(ProviderId::WeatherApi));

        cfg.set_default_provider(ProviderId::WeatherApi);
        assert_eq!(cfg.default_provider_id().unwrap(), ProviderId::WeatherApi);
    }

    #[test]
    fn upsert_keeps_base_url_override() {
        let mut cfg = Config::from_toml(
            r#"
            [providers.openweather]
            api_key = "OLD"
            base_url = "http://localhost:9999"
            "#,
        )
        .unwrap();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "NEW".into());

        let provider = cfg.provider_config(ProviderId::OpenWeather).unwrap();
        assert_eq!(provider.api_key, "NEW");
        assert_eq!(provider.base_url.as_deref(), Some("http://localhost:9999"));
    }

    #[test]
    fn empty_toml_gets_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert!(cfg.location.allow_device);
        assert_eq!(cfg.location.device_timeout_secs, 10);
        assert_eq!(cfg.http.timeout_secs, 10);
        assert_eq!(cfg.display.forecast_limit, 8);
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn location_section_parses() {
        let cfg = Config::from_toml(
            r#"
            [location]
            allow_device = false
            fallback_place = "  Springfield "
            latitude = 39.78
            longitude = -89.65
            "#,
        )
        .unwrap();

        assert!(!cfg.location.allow_device);
        assert_eq!(cfg.location.fallback_place(), Some("Springfield"));
        let fixed = cfg.location.fixed_coordinates().unwrap().unwrap();
        assert_eq!(fixed.latitude(), 39.78);
    }

    #[test]
    fn half_a_fixed_position_is_an_error() {
        let cfg = Config::from_toml("[location]\nlatitude = 10.0\n").unwrap();
        assert!(cfg.location.fixed_coordinates().is_err());
    }

    #[test]
    fn env_api_key_wins_over_file() {
        assert_eq!(
            pick_api_key(Some("ENV_KEY".into()), Some("FILE_KEY")).as_deref(),
            Some("ENV_KEY")
        );
        assert_eq!(pick_api_key(Some("ENV_KEY".into()), None).as_deref(), Some("ENV_KEY"));
    }

    #[test]
    fn blank_env_api_key_falls_through_to_file() {
        assert_eq!(pick_api_key(Some("  ".into()), Some("FILE_KEY")).as_deref(), Some("FILE_KEY"));
        assert_eq!(pick_api_key(None, Some("FILE_KEY")).as_deref(), Some("FILE_KEY"));
    }

    #[test]
    fn no_api_key_anywhere() {
        assert_eq!(pick_api_key(None, None), None);
        assert_eq!(pick_api_key(Some(String::new()), None), None);
    }

    #[test]
    fn blank_fallback_place_is_unset() {
        let cfg = Config::from_toml("[location]\nfallback_place = \"   \"\n").unwrap();
        assert_eq!(cfg.location.fallback_place(), None);
    }
}
