//! Headless browser abstraction used by the render orchestrator.
//!
//! The orchestrator only depends on these traits; the Chrome DevTools
//! implementation lives in `infrastructure::cdp`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Navigation milestone to wait for before reading the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle0")]
    NetworkIdle0,
    #[serde(rename = "networkidle2")]
    NetworkIdle2,
}

impl WaitUntil {
    /// Name of the matching `Page.lifecycleEvent`.
    #[must_use]
    pub const fn lifecycle_name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle0 => "networkIdle",
            Self::NetworkIdle2 => "networkAlmostIdle",
        }
    }
}

impl FromStr for WaitUntil {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "load" => Ok(Self::Load),
            "domcontentloaded" => Ok(Self::DomContentLoaded),
            "networkidle0" => Ok(Self::NetworkIdle0),
            "networkidle2" => Ok(Self::NetworkIdle2),
            other => Err(Error::browser(format!("unknown wait_until value '{other}'"))),
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle0 => "networkidle0",
            Self::NetworkIdle2 => "networkidle2",
        };
        f.write_str(name)
    }
}

/// A cookie in the shape the browser expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

impl RenderCookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Cookies need a url or a domain to be accepted by the browser.
    #[must_use]
    pub const fn is_scoped(&self) -> bool {
        self.url.is_some() || self.domain.is_some()
    }
}

/// One browser tab.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    async fn set_cookies(&self, cookies: &[RenderCookie]) -> Result<()>;

    /// Navigate and wait for every milestone in `wait_until` (`load` when empty).
    async fn goto(&self, url: &str, wait_until: &[WaitUntil]) -> Result<()>;

    /// Evaluate a script and return its JSON value. Function expressions
    /// are invoked; promises are awaited.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn key_down(&self, key: &str) -> Result<()>;

    async fn key_up(&self, key: &str) -> Result<()>;

    /// Serialized DOM of the current document, doctype included.
    async fn content(&self) -> Result<String>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;

    async fn close(&self) -> Result<()>;
}

/// Creates the browser a session renders with; called at most once per session.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Browser>>;
}
