//! Error types shared by every layer of the crate.
//!
//! Query, resolver and traversal operations report "nothing found" through
//! `Option` or empty collections; this enum is reserved for genuine failures.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid XPath expression '{expression}': {reason}")]
    InvalidXPath { expression: String, reason: String },

    #[error("Invalid search template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unable to render the page after {attempts} attempts. Try increasing timeout.")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error(
        "Cannot use HtmlSession within an existing async runtime. Use AsyncSession instead."
    )]
    RuntimeActive,

    #[error("{operation} is not available on this session: {reason}")]
    SchedulerMismatch {
        operation: &'static str,
        reason: &'static str,
    },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i64, message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session has been closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_xpath(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidXPath {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_template(template: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser(message.into())
    }

    /// True for failures that the render loop treats as a failed attempt
    /// rather than a fatal error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::NavigationTimeout(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_retries_message_suggests_timeout() {
        let error = Error::MaxRetriesExceeded { attempts: 8 };
        let message = error.to_string();
        assert!(message.contains("Unable to render the page"));
        assert!(message.contains("Try increasing timeout"));
        assert!(message.contains('8'));
    }

    #[test]
    fn test_only_navigation_timeouts_are_retryable() {
        assert!(Error::NavigationTimeout(Duration::from_secs(8)).is_timeout());
        assert!(!Error::browser("crashed").is_timeout());
        assert!(!Error::RuntimeActive.is_timeout());
    }
}
