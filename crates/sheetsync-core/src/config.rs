//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/sheetsync/config.toml)
//! 3. Environment variables (SHEETSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sheets::google::DEFAULT_API_URL;

/// Environment variable prefix
const ENV_PREFIX: &str = "SHEETSYNC";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Tenant configuration file
    #[serde(default = "default_tenants_file")]
    pub tenants_file: PathBuf,

    /// Google Sheets API root
    #[serde(default = "default_api_url")]
    pub sheets_api_url: String,

    /// Name of the environment variable holding the OAuth bearer token
    #[serde(default = "default_token_env")]
    pub access_token_env: String,

    /// Read through the public CSV export when the API denies access
    #[serde(default = "default_true")]
    pub csv_fallback: bool,

    /// Timeout for every spreadsheet request
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Total attempts per spreadsheet call
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry, doubled each time
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Interval between automatic syncs in `watch` mode
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_secs: u64,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tenants_file: default_tenants_file(),
            sheets_api_url: default_api_url(),
            access_token_env: default_token_env(),
            csv_fallback: true,
            request_timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_base_ms: default_retry_base_ms(),
            auto_sync_interval_secs: default_auto_sync_interval(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SHEETSYNC_DATA_DIR, SHEETSYNC_TENANTS_FILE, ...)
    /// 2. Config file (~/.config/sheetsync/config.toml or SHEETSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok();

        if let Some(val) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = var("TENANTS_FILE") {
            self.tenants_file = PathBuf::from(val);
        }

        if let Some(val) = var("SHEETS_API_URL") {
            if !val.is_empty() {
                self.sheets_api_url = val;
            }
        }

        if let Some(val) = var("CSV_FALLBACK") {
            self.csv_fallback = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // Unparsable numbers keep the previous value
        if let Some(secs) = var("REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }

        if let Some(secs) = var("AUTO_SYNC_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.auto_sync_interval_secs = secs;
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SHEETSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        config_dir().join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("sheetsync.db")
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheetsync")
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheetsync")
}

fn default_tenants_file() -> PathBuf {
    config_dir().join("tenants.toml")
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_token_env() -> String {
    "GOOGLE_SHEETS_TOKEN".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_auto_sync_interval() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "SHEETSYNC_DATA_DIR",
        "SHEETSYNC_TENANTS_FILE",
        "SHEETSYNC_SHEETS_API_URL",
        "SHEETSYNC_CSV_FALLBACK",
        "SHEETSYNC_REQUEST_TIMEOUT_SECS",
        "SHEETSYNC_AUTO_SYNC_INTERVAL_SECS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.csv_fallback);
        assert_eq!(config.request_timeout_secs, 20);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.sheets_api_url, "https://sheets.googleapis.com/v4");
        assert!(config.data_dir.ends_with("sheetsync"));
        assert!(config.tenants_file.ends_with("tenants.toml"));
    }

    #[test]
    fn test_database_path() {
        let config = Config::default();
        assert!(config.database_path().ends_with("sheetsync.db"));
    }

    #[test]
    fn test_env_override_paths() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SHEETSYNC_DATA_DIR", "/tmp/sheetsync-test");
        env::set_var("SHEETSYNC_TENANTS_FILE", "/tmp/tenants.toml");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/sheetsync-test"));
        assert_eq!(config.tenants_file, PathBuf::from("/tmp/tenants.toml"));
    }

    #[test]
    fn test_env_override_csv_fallback() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SHEETSYNC_CSV_FALLBACK", "false");
        config.apply_env_overrides();
        assert!(!config.csv_fallback);

        env::set_var("SHEETSYNC_CSV_FALLBACK", "1");
        config.apply_env_overrides();
        assert!(config.csv_fallback);
    }

    #[test]
    fn test_env_override_numbers() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SHEETSYNC_REQUEST_TIMEOUT_SECS", "30");
        env::set_var("SHEETSYNC_AUTO_SYNC_INTERVAL_SECS", "soon");
        config.apply_env_overrides();

        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.auto_sync_interval_secs, 300);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            tenants_file = "/custom/tenants.toml"
            csv_fallback = false
            retry_attempts = 5
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.tenants_file, PathBuf::from("/custom/tenants.toml"));
        assert!(!config.csv_fallback);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.access_token_env, "GOOGLE_SHEETS_TOKEN");
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        env::set_var("SHEETSYNC_DATA_DIR", dir.path().join("data"));

        let config = Config::load_from_path(&dir.path().join("missing.toml")).unwrap();
        assert!(config.csv_fallback);
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = Config {
            log_file: Some(PathBuf::from("/var/log/sheetsync.log")),
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("tenants_file"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.log_file, config.log_file);
        assert_eq!(parsed.data_dir, config.data_dir);
    }
}
