//! Infrastructure layer: HTTP sessions, the headless browser and the
//! process-level concerns (configuration, logging).

pub mod browser;
pub mod cdp;
pub mod config;
pub mod cookies;
pub mod http_client;
pub mod logging;
pub mod session;
pub mod user_agent;

pub use browser::{Browser, BrowserLauncher, BrowserPage, RenderCookie, WaitUntil};
pub use config::{ConfigManager, HtmlxConfig, LoggingConfig, SessionConfig};
pub use http_client::HtmlResponse;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use session::{AsyncSession, HtmlSession, SessionBuilder, SessionHandle};
pub use user_agent::{DEFAULT_USER_AGENT, user_agent};
