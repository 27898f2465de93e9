use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::geolocation::http::{DEFAULT_ENDPOINT, DEFAULT_PLACE_FIELD};
use crate::geolocation::GeoError;

/// Errors raised while loading configuration or building from it
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Geolocation setup failed: {0}")]
    Geo(#[from] GeoError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the login gate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing files
    pub storage: StorageConfig,
    /// Origin fence behaviour
    pub fence: FenceConfig,
    /// Geolocation lookups (city fence only)
    pub geolocation: GeolocationConfig,
    /// Texts shown to denied players
    pub messages: MessagesConfig,
    /// Decision audit output
    pub output: OutputConfig,
    /// Webhook notifications for denied logins
    pub alerting: AlertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding both files
    pub data_dir: PathBuf,
    pub whitelist_file: String,
    /// Named `.json` for compatibility, but the format is `username:origin` lines
    pub origins_file: String,
}

impl StorageConfig {
    pub fn whitelist_path(&self) -> PathBuf {
        self.data_dir.join(&self.whitelist_file)
    }

    pub fn origins_path(&self) -> PathBuf {
        self.data_dir.join(&self.origins_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("plugins/username-whitelist"),
            whitelist_file: "whitelist.txt".to_string(),
            origins_file: "ip.json".to_string(),
        }
    }
}

/// Which origin descriptor is tracked and how drift is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FenceMode {
    /// Whitelist only
    Disabled,
    /// Raw peer IP, same /24 required
    Subnet,
    /// Geolocated city name, exact match required
    City,
}

/// Outcome when the city lookup fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupFailurePolicy {
    Deny,
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FenceConfig {
    pub mode: FenceMode,
    pub on_lookup_failure: LookupFailurePolicy,
}

impl Default for FenceConfig {
    fn default() -> Self {
        FenceConfig {
            mode: FenceMode::City,
            on_lookup_failure: LookupFailurePolicy::Deny,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoProvider {
    Http,
    Maxmind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub provider: GeoProvider,
    /// Endpoint template, `{ip}` is replaced with the peer address
    pub endpoint: String,
    /// JSON field holding the place name
    pub place_field: String,
    pub timeout_seconds: u64,
    /// GeoLite2-City database (maxmind provider)
    pub database_path: Option<PathBuf>,
    /// Locale of city names (maxmind provider)
    pub language: String,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        GeolocationConfig {
            provider: GeoProvider::Http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            place_field: DEFAULT_PLACE_FIELD.to_string(),
            timeout_seconds: 3,
            database_path: None,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub not_whitelisted: String,
    pub origin_drift: String,
    pub lookup_failure: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        MessagesConfig {
            not_whitelisted: "You are not whitelisted on this server. Join discord.gg/PN8egFY3ap \
                              and let the owner know or ask your friends to /whitelist you"
                .to_string(),
            origin_drift: "Your location has changed significantly. You have been kicked."
                .to_string(),
            lookup_failure: "We could not verify your location. Try again later or ask on \
                             discord.gg/PN8egFY3ap."
                .to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: "jsonl".to_string(),
            file_path: Some(PathBuf::from("plugins/username-whitelist/decisions.jsonl")),
        }
    }
}

/// Alert dispatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Also alert on logins from non-whitelisted users
    pub notify_not_whitelisted: bool,
    pub discord: Option<DiscordConfig>,
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// "POST" (default) or "PUT"
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.whitelist_file == self.storage.origins_file {
            return Err(ConfigError::Invalid(
                "whitelist_file and origins_file must differ".to_string(),
            ));
        }
        if self.fence.mode == FenceMode::City {
            if self.geolocation.provider == GeoProvider::Http
                && !self.geolocation.endpoint.contains("{ip}")
            {
                return Err(ConfigError::Invalid(
                    "geolocation.endpoint must contain {ip}".to_string(),
                ));
            }
            if self.geolocation.provider == GeoProvider::Maxmind
                && self.geolocation.database_path.is_none()
            {
                return Err(ConfigError::Invalid(
                    "geolocation.database_path is required for the maxmind provider".to_string(),
                ));
            }
            if self.geolocation.timeout_seconds == 0 {
                return Err(ConfigError::Invalid(
                    "geolocation.timeout_seconds must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}
