//! Logging system configuration and initialization
//!
//! The library only emits `tracing` events; applications that want them
//! written somewhere call [`init_logging`] or [`init_logging_with_config`]
//! once at startup.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use once_cell::sync::Lazy;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::{self, time::FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

const LOG_FILE: &str = "htmlx.log";

/// Dependencies that are only interesting at trace level.
const NOISY_TARGETS: [(&str, &str); 6] = [
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("h2", "warn"),
    ("tokio_tungstenite", "warn"),
    ("html5ever", "warn"),
    ("selectors", "warn"),
];

// Keeps the non-blocking file writers alive for the life of the process.
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Configured directory, else `<local data dir>/htmlx/logs`.
pub fn get_log_directory(config: &LoggingConfig) -> Result<PathBuf> {
    match &config.log_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(ConfigManager::get_app_data_dir()?.join("logs")),
    }
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

/// Filter used when `RUST_LOG` is not set: the configured level, module
/// overrides, and noisy dependencies capped unless the level is `trace`.
fn default_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    if !config.level.eq_ignore_ascii_case("trace") {
        for (target, level) in NOISY_TARGETS {
            filter = filter.add_directive(format!("{target}={level}").parse()?);
        }
    }
    for (module, level) in &config.module_filters {
        let directive = format!("{module}={level}");
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("Invalid module filter '{directive}'"))?,
        );
    }
    Ok(filter)
}

/// Install a global subscriber for `config`.
///
/// `RUST_LOG` overrides the configured levels. Fails if a subscriber is
/// already installed.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(&config)?,
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    let mut log_file = None;
    if config.file_output {
        let log_dir = get_log_directory(&config)?;
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let (writer, guard) = non_blocking(rolling::never(&log_dir, LOG_FILE));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("log guard store poisoned"))?
            .push(guard);

        let file_layer = fmt::Layer::new()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            file_layer.with_target(true).boxed()
        });
        log_file = Some(log_dir.join(LOG_FILE));
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logging subscriber: {e}"))?;

    info!("Logging initialized (level: {})", config.level);
    if let Some(path) = log_file {
        info!("Writing logs to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_caps_dependencies() {
        let filter = default_filter(&LoggingConfig::default()).unwrap().to_string();
        assert!(filter.contains("reqwest=info"));
        assert!(filter.contains("tokio_tungstenite=warn"));
    }

    #[test]
    fn test_trace_level_keeps_dependencies() {
        let config = LoggingConfig {
            level: "trace".into(),
            ..LoggingConfig::default()
        };
        let filter = default_filter(&config).unwrap().to_string();
        assert!(!filter.contains("reqwest"));
    }

    #[test]
    fn test_module_filters_and_bad_levels() {
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("htmlx::infrastructure::cdp".into(), "trace".into());
        let filter = default_filter(&config).unwrap().to_string();
        assert!(filter.contains("htmlx::infrastructure::cdp=trace"));

        config.module_filters.insert("htmlx".into(), "loud".into());
        assert!(default_filter(&config).is_err());
    }

    #[test]
    fn test_log_directory_prefers_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            log_dir: Some(dir.path().to_path_buf()),
            ..LoggingConfig::default()
        };
        assert_eq!(get_log_directory(&config).unwrap(), dir.path());
    }
}
