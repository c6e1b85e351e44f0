use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const ENV_API_URL: &str = "TOOLSHARE_API_URL";
pub const ENV_IMGBB_API_KEY: &str = "TOOLSHARE_IMGBB_API_KEY";
pub const ENV_MAPS_API_KEY: &str = "TOOLSHARE_MAPS_API_KEY";
pub const ENV_SESSION_SECRET: &str = "TOOLSHARE_SESSION_SECRET";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub image_host: ImageHostConfig,
    #[serde(default)]
    pub maps: MapsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Backend base URL, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3333".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageHostConfig {
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// imgbb API key
    pub api_key: Option<String>,
}

impl Default for ImageHostConfig {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            api_key: None,
        }
    }
}

fn default_upload_url() -> String {
    "https://api.imgbb.com/1/upload".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapsConfig {
    /// Places autocomplete key. Carried for completeness; coordinates are typed in directly.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Secret used to sign the persisted session file. Without it nothing is persisted.
    pub secret: Option<String>,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Persisted sessions older than this are discarded (default: 30 days)
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    /// Sign out when the backend answers 401/403 (default: false)
    #[serde(default)]
    pub logout_on_unauthorized: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            store_path: default_store_path(),
            max_age_hours: default_max_age_hours(),
            logout_on_unauthorized: false,
        }
    }
}

/// Upper bound for `session.max_age_hours` (five years).
pub const MAX_SESSION_AGE_HOURS: u64 = 5 * 365 * 24;

impl SessionConfig {
    /// Values past what chrono can represent saturate.
    pub fn max_age(&self) -> chrono::TimeDelta {
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(chrono::TimeDelta::try_hours)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./.toolshare/session.json")
}

fn default_max_age_hours() -> u64 {
    720
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Apply every poll response in arrival order, even if an older request
    /// resolves after a newer one.
    #[default]
    LastWriteWins,
    /// Drop responses whose request id is older than the last applied one.
    DiscardStale,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Interval between polls in milliseconds (default: 1000)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub stale_policy: StalePolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            stale_policy: StalePolicy::default(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

fn default_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            image_host: ImageHostConfig::default(),
            maps: MapsConfig::default(),
            session: SessionConfig::default(),
            polling: PollingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Override file values with non-empty variables from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(key) = get(ENV_IMGBB_API_KEY) {
            self.image_host.api_key = Some(key);
        }
        if let Some(key) = get(ENV_MAPS_API_KEY) {
            self.maps.api_key = Some(key);
        }
        if let Some(secret) = get(ENV_SESSION_SECRET) {
            self.session.secret = Some(secret);
        }
    }

    /// Hard errors that make the configuration unusable.
    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("api.base_url must start with http:// or https://, got '{}'", url);
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than zero");
        }
        if self.session.max_age_hours > MAX_SESSION_AGE_HOURS {
            anyhow::bail!(
                "session.max_age_hours must be at most {}, got {}",
                MAX_SESSION_AGE_HOURS,
                self.session.max_age_hours
            );
        }
        if self.polling.interval_ms == 0 {
            anyhow::bail!("polling.interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Non-fatal problems worth telling the user about.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.image_host.api_key.is_none() {
            warnings.push(format!(
                "No image host API key configured ({}); image uploads will fail",
                ENV_IMGBB_API_KEY
            ));
        }
        if self.maps.api_key.is_none() {
            warnings.push(format!(
                "No maps API key configured ({}); coordinates must be entered manually",
                ENV_MAPS_API_KEY
            ));
        }
        match &self.session.secret {
            None => warnings.push(format!(
                "No session secret configured ({}); sign-ins will not be remembered",
                ENV_SESSION_SECRET
            )),
            Some(secret) if secret.len() < 16 => {
                warnings.push("Session secret is shorter than 16 characters".to_string())
            }
            Some(_) => {}
        }
        if self.api.base_url.starts_with("http://")
            && !self.api.base_url.contains("localhost")
            && !self.api.base_url.contains("127.0.0.1")
        {
            warnings.push("Backend URL is not using HTTPS; tokens are sent in clear text".to_string());
        }
        if self.session.logout_on_unauthorized {
            info!("Sessions will be cleared on 401/403 responses");
        }

        warnings
    }
}
