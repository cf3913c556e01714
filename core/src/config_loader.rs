//! Layered configuration for the console.
//!
//! Precedence, later layers winning:
//! 1. Built-in defaults
//! 2. `$SOC_HOME/config.toml` (default `~/.soc/config.toml`)
//! 3. Environment overrides (`SOC_*`)
//!
//! ```no_run
//! use soc_core::config_loader::ConfigLoader;
//!
//! let config = ConfigLoader::new().with_env_prefix("SOC").load()?;
//! # Ok::<(), soc_core::config_loader::ConfigLoadError>(())
//! ```

use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::alerts::AlertFeedConfig;
use crate::search_spec::MAX_RESULT_SIZE;
use crate::search_spec::MIN_RESULT_SIZE;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("I/O error loading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error("Invalid value for ${var}: '{value}' (expected: {expected})")]
    InvalidEnvValue {
        var: String,
        value: String,
        expected: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fully merged console configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleConfig {
    /// Backend API root, e.g. `http://127.0.0.1:8000/api`.
    pub api_base_url: String,
    pub default_index: String,
    pub allowed_indices: Vec<String>,
    pub max_results: u32,
    pub rows_per_page: u32,
    pub alerts: AlertFeedConfig,
    pub http: HttpConfig,
}

/// What `config.toml` may set. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    api_base_url: Option<String>,
    default_index: Option<String>,
    allowed_indices: Option<Vec<String>>,
    max_results: Option<u32>,
    rows_per_page: Option<u32>,
    alerts: Option<AlertFeedConfig>,
    http: Option<HttpConfig>,
}

pub struct ConfigLoader {
    soc_home: Option<PathBuf>,
    env_prefix: String,
    skip_file: bool,
    skip_env: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            soc_home: None,
            env_prefix: "SOC".to_string(),
            skip_file: false,
            skip_env: false,
        }
    }

    /// Set the console home directory explicitly instead of consulting
    /// `$SOC_HOME` or `~/.soc`.
    pub fn with_soc_home(mut self, path: PathBuf) -> Self {
        self.soc_home = Some(path);
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn skip_file_layer(mut self) -> Self {
        self.skip_file = true;
        self
    }

    pub fn skip_env_layer(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Load with every enabled layer and validate the result.
    pub fn load(self) -> Result<ConsoleConfig, ConfigLoadError> {
        let mut config = Self::default_config();

        if !self.skip_file {
            let home = self.soc_home()?;
            let file_config = Self::load_from_file(&home)?;
            Self::merge_file(&mut config, file_config);
        }

        if !self.skip_env {
            Self::apply_env_overrides(&mut config, &self.env_prefix)?;
        }

        Self::validate(&mut config)?;
        Ok(config)
    }

    /// Resolve the console home directory.
    ///
    /// Priority: explicit builder value, `$SOC_HOME`, then `~/.soc`.
    pub fn soc_home(&self) -> Result<PathBuf, ConfigLoadError> {
        if let Some(ref path) = self.soc_home {
            return Ok(path.clone());
        }

        if let Ok(path) = env::var("SOC_HOME")
            && !path.trim().is_empty()
        {
            return Ok(PathBuf::from(path));
        }

        dirs::home_dir()
            .map(|home| home.join(".soc"))
            .ok_or_else(|| ConfigLoadError::Validation("Cannot determine home directory".to_string()))
    }

    pub fn default_config() -> ConsoleConfig {
        ConsoleConfig {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            default_index: "wazuh-alerts-*".to_string(),
            allowed_indices: vec!["wazuh-alerts-*".to_string(), "wazuh-archives-*".to_string()],
            max_results: 100,
            rows_per_page: 10,
            alerts: AlertFeedConfig::default(),
            http: HttpConfig::default(),
        }
    }

    fn load_from_file(home: &Path) -> Result<FileConfig, ConfigLoadError> {
        let config_path = home.join(CONFIG_FILE);

        let contents = match std::fs::read_to_string(&config_path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("config.toml not found at {:?}, using defaults", config_path);
                return Ok(FileConfig::default());
            }
            Err(e) => return Err(ConfigLoadError::Io(e)),
        };

        Ok(toml::from_str(&contents)?)
    }

    fn merge_file(base: &mut ConsoleConfig, overlay: FileConfig) {
        if let Some(url) = overlay.api_base_url {
            base.api_base_url = url;
        }
        if let Some(index) = overlay.default_index {
            base.default_index = index;
        }
        if let Some(indices) = overlay.allowed_indices {
            base.allowed_indices = indices;
        }
        if let Some(max) = overlay.max_results {
            base.max_results = max;
        }
        if let Some(rows) = overlay.rows_per_page {
            base.rows_per_page = rows;
        }
        if let Some(alerts) = overlay.alerts {
            base.alerts = alerts;
        }
        if let Some(http) = overlay.http {
            base.http = http;
        }
    }

    /// Supported variables (with the default `SOC` prefix):
    /// `SOC_API_URL`, `SOC_INDEX`, `SOC_MIN_ALERT_LEVEL`, `SOC_MAX_RESULTS`.
    fn apply_env_overrides(config: &mut ConsoleConfig, prefix: &str) -> Result<(), ConfigLoadError> {
        let url_var = format!("{prefix}_API_URL");
        if let Ok(value) = env::var(&url_var)
            && !value.trim().is_empty()
        {
            tracing::debug!("Applying env override: {}={}", url_var, value);
            if Url::parse(value.trim()).is_err() {
                return Err(ConfigLoadError::InvalidEnvValue {
                    var: url_var,
                    value,
                    expected: "absolute http(s) URL".to_string(),
                });
            }
            config.api_base_url = value.trim().to_string();
        }

        let index_var = format!("{prefix}_INDEX");
        if let Ok(value) = env::var(&index_var)
            && !value.trim().is_empty()
        {
            tracing::debug!("Applying env override: {}={}", index_var, value);
            config.default_index = value.trim().to_string();
        }

        let level_var = format!("{prefix}_MIN_ALERT_LEVEL");
        if let Some(level) = parse_env::<i64>(&level_var, "integer rule level")? {
            config.alerts.min_level = level;
        }

        let max_var = format!("{prefix}_MAX_RESULTS");
        if let Some(max) = parse_env::<u32>(&max_var, "positive integer")? {
            config.max_results = max;
        }

        Ok(())
    }

    fn validate(config: &mut ConsoleConfig) -> Result<(), ConfigLoadError> {
        let url = Url::parse(config.api_base_url.trim()).map_err(|e| {
            ConfigLoadError::Validation(format!("api_base_url '{}': {e}", config.api_base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigLoadError::Validation(format!(
                "api_base_url must be http(s), got {url}"
            )));
        }
        if config.default_index.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "default_index must not be empty".to_string(),
            ));
        }
        if config.alerts.min_level < 0 || config.alerts.seed_min_level < 0 {
            return Err(ConfigLoadError::Validation(
                "alert levels must not be negative".to_string(),
            ));
        }

        let clamped = config.max_results.clamp(MIN_RESULT_SIZE, MAX_RESULT_SIZE);
        if clamped != config.max_results {
            tracing::warn!(
                "max_results {} out of range, using {}",
                config.max_results,
                clamped
            );
            config.max_results = clamped;
        }
        config.rows_per_page = config.rows_per_page.max(1);
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: std::str::FromStr>(
    var: &str,
    expected: &str,
) -> Result<Option<T>, ConfigLoadError> {
    let Ok(value) = env::var(var) else {
        return Ok(None);
    };
    if value.trim().is_empty() {
        return Ok(None);
    }
    tracing::debug!("Applying env override: {}={}", var, value);
    value
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigLoadError::InvalidEnvValue {
            var: var.to_string(),
            value,
            expected: expected.to_string(),
        })
}
