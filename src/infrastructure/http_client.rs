//! HTTP client shared by blocking and async sessions.
//!
//! Wraps a `reqwest::Client` with a cookie jar, per-scheme proxies and the
//! session's browser, which is launched lazily and at most once.

use std::cell::OnceCell;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Method, Proxy, RequestBuilder, StatusCode};
use tokio::sync::OnceCell as AsyncOnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::document::Html;
use crate::domain::encoding;
use crate::error::{Error, Result};
use crate::infrastructure::browser::{Browser, BrowserLauncher, RenderCookie};
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::cookies;
use crate::infrastructure::session::SessionHandle;
use crate::infrastructure::user_agent::DEFAULT_USER_AGENT;

pub struct HttpClient {
    client: Client,
    jar: Arc<Jar>,
    config: SessionConfig,
    user_agent: Option<String>,
    launcher: Arc<dyn BrowserLauncher>,
    browser: AsyncOnceCell<Arc<dyn Browser>>,
    closed: AtomicBool,
}

impl HttpClient {
    pub fn new(config: SessionConfig, launcher: Arc<dyn BrowserLauncher>) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let headers = default_headers(&config)?;
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let redirect = if config.follow_redirects {
            Policy::limited(config.max_redirects)
        } else {
            Policy::none()
        };

        let mut builder = ClientBuilder::new()
            .cookie_provider(Arc::clone(&jar))
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .redirect(redirect)
            .danger_accept_invalid_certs(!config.verify);

        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        for (key, target) in &config.proxies {
            builder = builder.proxy(build_proxy(key, target)?);
        }

        let client = builder.build()?;
        info!(
            "HTTP client ready (verify: {}, proxies: {}, redirects: {})",
            config.verify,
            config.proxies.len(),
            config.follow_redirects
        );

        Ok(Self {
            client,
            jar,
            config,
            user_agent,
            launcher,
            browser: AsyncOnceCell::new(),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// The `User-Agent` header sent with requests, if any.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        debug!("{} {}", response.status(), response.url());
        if !response.status().is_success() {
            warn!("Non-success status {} for {}", response.status(), response.url());
        }
        Ok(response)
    }

    /// Session cookies in browser form for `url`.
    #[must_use]
    pub fn render_cookies(&self, url: &str) -> Vec<RenderCookie> {
        cookies::session_cookies_for(&self.jar, url)
    }

    /// The session's browser, launched on first use. Concurrent first calls
    /// share a single launch.
    pub async fn browser(&self) -> Result<Arc<dyn Browser>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SessionClosed);
        }
        let browser = self
            .browser
            .get_or_try_init(|| async {
                info!("Launching headless browser");
                self.launcher.launch().await
            })
            .await?;
        Ok(Arc::clone(browser))
    }

    /// Shut down the browser if one was launched. HTTP requests keep working.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(browser) = self.browser.get() {
            info!("Closing headless browser");
            browser.close().await?;
        }
        Ok(())
    }
}

fn default_headers(config: &SessionConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if config.mock_browser {
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    }
    for (name, value) in &config.headers {
        let name = HeaderName::from_str(name)
            .map_err(|e| Error::browser(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::browser(format!("invalid header value for '{name}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Proxy keys without a `:` are scheme names and become `scheme://`.
#[must_use]
pub fn normalize_proxy_key(key: &str) -> String {
    if key.contains(':') {
        key.to_string()
    } else {
        format!("{key}://")
    }
}

fn build_proxy(key: &str, target: &str) -> Result<Proxy> {
    let normalized = normalize_proxy_key(key);
    let (scheme, host) = normalized
        .split_once("://")
        .ok_or_else(|| Error::invalid_url(key, "proxy key must be a scheme or scheme://host"))?;

    let proxy = match (scheme, host) {
        ("http", "") => Proxy::http(target)?,
        ("https", "") => Proxy::https(target)?,
        ("all", "") => Proxy::all(target)?,
        (scheme, host) => {
            let target = Url::parse(target).map_err(|e| Error::invalid_url(target, e.to_string()))?;
            let scheme = scheme.to_string();
            let host = host.trim_end_matches('/').to_string();
            Proxy::custom(move |url| {
                (url.scheme() == scheme && url.host_str() == Some(host.as_str()))
                    .then(|| target.clone())
            })
        }
    };
    debug!("Proxy configured for {}", normalized);
    Ok(proxy)
}

/// A fetched page. The [`Html`] view is built on first access.
pub struct HtmlResponse {
    status: StatusCode,
    url: String,
    headers: HeaderMap,
    content: Vec<u8>,
    encoding: String,
    session: SessionHandle,
    html: OnceCell<Html>,
}

impl HtmlResponse {
    pub(crate) async fn read(response: reqwest::Response, session: SessionHandle) -> Result<Self> {
        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let encoding = charset_from_headers(&headers)
            .unwrap_or_else(|| session.client().config().default_encoding.clone());
        let content = response.bytes().await?.to_vec();
        info!("Fetched {} ({} bytes, {})", url, content.len(), status);

        Ok(Self {
            status,
            url,
            headers,
            content,
            encoding,
            session,
            html: OnceCell::new(),
        })
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Final URL after redirects.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Charset from `Content-Type`, else the session default (`utf-8`).
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Override the encoding; a previously built [`Html`] view is discarded.
    pub fn set_encoding(&mut self, label: &str) -> Result<()> {
        if encoding::lookup(label).is_none() {
            return Err(Error::UnknownEncoding(label.to_string()));
        }
        self.encoding = label.to_string();
        self.html = OnceCell::new();
        Ok(())
    }

    /// Body decoded with [`HtmlResponse::encoding`].
    #[must_use]
    pub fn text(&self) -> String {
        let target = encoding::lookup(&self.encoding).unwrap_or(encoding_rs::UTF_8);
        encoding::decode(&self.content, target).into_owned()
    }

    /// Document view of the body, bound to the session. Use
    /// [`HtmlResponse::into_html`] for operations that need `&mut Html`.
    pub fn html(&self) -> &Html {
        self.html.get_or_init(|| self.build_html())
    }

    #[must_use]
    pub fn into_html(mut self) -> Html {
        self.html.take().unwrap_or_else(|| self.build_html())
    }

    fn build_html(&self) -> Html {
        Html::new(self.content.clone())
            .with_url(self.url.clone())
            .with_default_encoding(self.encoding.clone())
            .with_session(self.session.clone())
    }
}

impl std::fmt::Debug for HtmlResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Response [{}] url={:?}>", self.status.as_u16(), self.url)
    }
}

fn charset_from_headers(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    content_type
        .split(';')
        .skip(1)
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
        .filter(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http", "http://")]
    #[case("https", "https://")]
    #[case("http://internal.example.com", "http://internal.example.com")]
    fn test_normalize_proxy_key(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(normalize_proxy_key(key), expected);
    }

    #[test]
    fn test_build_proxy_accepts_scheme_and_host_keys() {
        assert!(build_proxy("http", "http://127.0.0.1:3128").is_ok());
        assert!(build_proxy("all", "http://127.0.0.1:1080").is_ok());
        assert!(build_proxy("https://api.example.com", "http://127.0.0.1:3128").is_ok());
        assert!(build_proxy("https://api.example.com", "not a url").is_err());
    }

    #[rstest]
    #[case("text/html; charset=ISO-8859-1", Some("iso-8859-1"))]
    #[case("text/html; charset=\"utf-8\"", Some("utf-8"))]
    #[case("text/html", None)]
    fn test_charset_from_headers(#[case] content_type: &str, #[case] expected: Option<&str>) {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        assert_eq!(charset_from_headers(&headers).as_deref(), expected);
    }

    #[test]
    fn test_mock_browser_sets_default_user_agent() {
        let headers = default_headers(&SessionConfig::default()).unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), DEFAULT_USER_AGENT);

        let plain = SessionConfig {
            mock_browser: false,
            ..SessionConfig::default()
        };
        assert!(default_headers(&plain).unwrap().get(USER_AGENT).is_none());
    }
}
