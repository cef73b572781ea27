use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File the configuration was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Backend base URL, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds. Unset leaves the HTTP client default in place.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: None,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_base_url() -> String {
    "http://103.171.85.186".to_string()
}

/// Fixed path segments the backend expects.
///
/// These act as shared access keys embedded in the URL. They are kept
/// configurable so deployments can rotate them without a rebuild.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_sos_reports_segment")]
    pub sos_reports_segment: String,
    #[serde(default = "default_sos_submit_segment")]
    pub sos_submit_segment: String,
    #[serde(default = "default_machine_readings_segment")]
    pub machine_readings_segment: String,
    #[serde(default = "default_machine_logs_segment")]
    pub machine_logs_segment: String,
    /// Server-side token invalidation path, called best-effort on logout.
    /// Set to an empty string to skip the call.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Number of entries kept from the latest machine readings
    #[serde(default = "default_machine_readings_limit")]
    pub machine_readings_limit: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            sos_reports_segment: default_sos_reports_segment(),
            sos_submit_segment: default_sos_submit_segment(),
            machine_readings_segment: default_machine_readings_segment(),
            machine_logs_segment: default_machine_logs_segment(),
            logout_path: default_logout_path(),
            machine_readings_limit: default_machine_readings_limit(),
        }
    }
}

fn default_sos_reports_segment() -> String {
    "UI8iqknk28HJsdplkmaj2xcIfsjasi".to_string()
}

fn default_sos_submit_segment() -> String {
    "Naksjcoiqwekllsdjpkjuepclaol".to_string()
}

fn default_machine_readings_segment() -> String {
    "Iaisjoiwoe8ojdkiaposudcjqwAIo0wj".to_string()
}

fn default_machine_logs_segment() -> String {
    "kaoicKJilKDiaqwoMCMwonxqKXoiqwqxigyrtBHG".to_string()
}

fn default_logout_path() -> String {
    "/api/logout".to_string()
}

fn default_machine_readings_limit() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// File holding the persisted session
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/credentials.json")
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Interval between session checks in milliseconds (default: 1000)
    #[serde(default = "default_gate_interval_ms")]
    pub interval_ms: u64,
    /// Re-check immediately on login/logout instead of waiting for the next tick
    #[serde(default = "default_true")]
    pub listen_events: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_gate_interval_ms(),
            listen_events: true,
        }
    }
}

impl GateConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

fn default_gate_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_weather_units")]
    pub units: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            api_key: None,
            units: default_weather_units(),
        }
    }
}

fn default_weather_url() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_weather_units() -> String {
    "metric".to_string()
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
    "info".to_string()
}

impl Config {
    /// Read `path`, or fall back to defaults when it does not exist.
    ///
    /// Nothing is logged here. Call [`Config::log_source`] once a subscriber
    /// is installed.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let mut config = Self::from_toml(&content)?;
            config.source = Some(path.to_path_buf());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn log_source(&self) {
        match &self.source {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => info!("No config file found, using defaults"),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.base_url, "http://103.171.85.186");
        assert_eq!(config.server.timeout(), None);
        assert_eq!(config.gate.interval(), Duration::from_secs(1));
        assert!(config.gate.listen_events);
        assert_eq!(config.endpoints.machine_readings_limit, 5);
        assert_eq!(config.endpoints.logout_path, "/api/logout");
        assert_eq!(config.weather.units, "metric");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
[server]
base_url = "http://localhost:8000"
timeout_secs = 10

[gate]
interval_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "http://localhost:8000");
        assert_eq!(config.server.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.gate.interval(), Duration::from_millis(250));
        assert!(config.gate.listen_events);
        assert_eq!(
            config.endpoints.sos_submit_segment,
            "Naksjcoiqwekllsdjpkjuepclaol"
        );
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config::from_toml("[gate]\ninterval_ms = 0\n").unwrap();
        assert_eq!(config.gate.interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.storage.path, PathBuf::from("./data/credentials.json"));
        assert_eq!(config.source, None);
    }

    #[test]
    fn test_load_records_source_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fishersafe.toml");
        std::fs::write(&path, "[gate]\ninterval_ms = 250\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(config.gate.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fishersafe.toml");
        std::fs::write(&path, "[server\nbase_url = ").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
