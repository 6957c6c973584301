//! Configuration infrastructure
//!
//! Session and logging settings, with JSON persistence under the user's
//! config directory. Every field has a default, so partial files are fine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::domain::encoding::DEFAULT_ENCODING;

const APP_DIR: &str = "htmlx";
const CONFIG_FILE: &str = "config.json";

/// Complete configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlxConfig {
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// How sessions fetch pages and launch the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Send a browser-like `User-Agent` header.
    pub mock_browser: bool,

    /// Verify TLS certificates (also applies to the rendering browser).
    pub verify: bool,

    /// Extra command-line arguments for the browser.
    pub browser_args: Vec<String>,

    /// Proxy per scheme, e.g. `{"http": "http://127.0.0.1:8080"}`.
    /// Keys may also be `all` or `scheme://host`.
    pub proxies: HashMap<String, String>,

    /// Extra default headers.
    pub headers: HashMap<String, String>,

    pub timeout_seconds: Option<u64>,

    pub follow_redirects: bool,

    pub max_redirects: usize,

    /// Concurrent request limit for async sessions.
    /// Defaults to five per available CPU.
    pub workers: Option<usize>,

    /// Browser executable; otherwise `CHROME_PATH` or a PATH search.
    pub chrome_executable: Option<PathBuf>,

    pub launch_timeout_seconds: u64,

    /// Response encoding when the server does not name one.
    pub default_encoding: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mock_browser: true,
            verify: true,
            browser_args: vec!["--no-sandbox".to_string()],
            proxies: HashMap::new(),
            headers: HashMap::new(),
            timeout_seconds: None,
            follow_redirects: true,
            max_redirects: 10,
            workers: None,
            chrome_executable: None,
            launch_timeout_seconds: 30,
            default_encoding: DEFAULT_ENCODING.to_string(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get) * 5
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Emit JSON lines instead of plain text
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Log directory; defaults to the local data directory
    pub log_dir: Option<PathBuf>,

    /// Module-specific level overrides, e.g. `{"htmlx::infrastructure::cdp": "trace"}`
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            module_filters: HashMap::new(),
        }
    }
}

pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// `<config dir>/htmlx`
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR);
        Ok(config_dir)
    }

    /// `<local data dir>/htmlx`
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR);
        Ok(data_dir)
    }

    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: Self::get_config_dir()?.join(CONFIG_FILE),
        })
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the configuration; a missing file yields the defaults.
    pub async fn load_config(&self) -> Result<HtmlxConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            info!(
                "Configuration file not found, using defaults: {:?}",
                self.config_path
            );
            return Ok(HtmlxConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {:?}", self.config_path))?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    pub async fn save_config(&self, config: &HtmlxConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }
        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;
        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert!(config.mock_browser);
        assert!(config.verify);
        assert_eq!(config.browser_args, ["--no-sandbox"]);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.default_encoding, "utf-8");
        assert!(config.worker_count() >= 5);
        assert_eq!(SessionConfig { workers: Some(3), ..config }.worker_count(), 3);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: HtmlxConfig =
            serde_json::from_str(r#"{"session": {"verify": false}, "logging": {"level": "debug"}}"#)
                .unwrap();
        assert!(!config.session.verify);
        assert!(config.session.mock_browser);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.console_output);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join(CONFIG_FILE));

        let mut config = HtmlxConfig::default();
        config
            .session
            .proxies
            .insert("http".into(), "http://127.0.0.1:3128".into());
        manager.save_config(&config).await.unwrap();

        assert_eq!(manager.load_config().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join(CONFIG_FILE));
        assert_eq!(manager.load_config().await.unwrap(), HtmlxConfig::default());
    }
}
