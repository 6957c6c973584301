//! Render orchestration: load a document in the headless browser, optionally
//! run a script and scroll, and replace the document with what the browser
//! ended up with.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::document::{DEFAULT_URL, Html};
use crate::domain::parser::Parser;
use crate::error::{Error, Result};
use crate::infrastructure::browser::{Browser, BrowserPage, RenderCookie, WaitUntil};
use crate::infrastructure::cookies;
use crate::infrastructure::session::SessionHandle;

const SCROLL_KEY: &str = "PageDown";

/// Render settings. Defaults: 8 attempts, 0.2s pre-navigation wait,
/// 8s navigation timeout, live reload.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub retries: u32,
    /// Script evaluated after load; its value is returned from the render.
    pub script: Option<String>,
    /// Pause after opening the page, before navigating.
    pub wait: Duration,
    /// Number of PageDown presses.
    pub scrolldown: u32,
    /// Pause after each scroll, or once when not scrolling.
    pub sleep: Duration,
    /// Load the URL live; otherwise load the current markup.
    pub reload: bool,
    /// Per-attempt navigation timeout.
    pub timeout: Duration,
    pub wait_until: Vec<WaitUntil>,
    pub keep_page: bool,
    pub cookies: Vec<RenderCookie>,
    /// Send the session's cookies for the document URL instead of `cookies`.
    pub send_cookies_session: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            retries: 8,
            script: None,
            wait: Duration::from_millis(200),
            scrolldown: 0,
            sleep: Duration::ZERO,
            reload: true,
            timeout: Duration::from_secs(8),
            wait_until: Vec::new(),
            keep_page: false,
            cookies: Vec::new(),
            send_cookies_session: false,
        }
    }
}

impl RenderOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    #[must_use]
    pub const fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    #[must_use]
    pub const fn scrolldown(mut self, presses: u32) -> Self {
        self.scrolldown = presses;
        self
    }

    #[must_use]
    pub const fn sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    #[must_use]
    pub const fn reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn wait_until(mut self, condition: WaitUntil) -> Self {
        self.wait_until.push(condition);
        self
    }

    #[must_use]
    pub const fn keep_page(mut self, keep: bool) -> Self {
        self.keep_page = keep;
        self
    }

    #[must_use]
    pub fn cookie(mut self, cookie: RenderCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    #[must_use]
    pub const fn send_cookies_session(mut self, send: bool) -> Self {
        self.send_cookies_session = send;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderState {
    NotStarted,
    Attempting(u32),
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

pub(crate) struct RenderOutput {
    pub content: String,
    pub result: Option<Value>,
    pub page: Option<Box<dyn BrowserPage>>,
}

/// Everything one render needs, detached from the document.
pub(crate) struct Renderer {
    options: RenderOptions,
    target: String,
    user_agent: Option<String>,
    cookies: Vec<RenderCookie>,
    state: RenderState,
}

impl Renderer {
    pub(crate) fn new(
        options: RenderOptions,
        target: String,
        user_agent: Option<String>,
        cookies: Vec<RenderCookie>,
    ) -> Self {
        Self {
            options,
            target,
            user_agent,
            cookies,
            state: RenderState::NotStarted,
        }
    }

    pub(crate) const fn state(&self) -> RenderState {
        self.state
    }

    /// Attempt until one attempt captures content or the budget is spent.
    /// Navigation timeouts fail the attempt; any other error ends the render.
    pub(crate) async fn run(&mut self, browser: &dyn Browser) -> Result<RenderOutput> {
        for attempt in 1..=self.options.retries {
            self.state = RenderState::Attempting(attempt);
            match self.attempt(browser).await {
                Ok(output) => {
                    self.state = RenderState::Succeeded { attempts: attempt };
                    info!("Rendered {} on attempt {}", short(&self.target), attempt);
                    return Ok(output);
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        "Render attempt {}/{} timed out: {}",
                        attempt, self.options.retries, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        self.state = RenderState::Exhausted {
            attempts: self.options.retries,
        };
        Err(Error::MaxRetriesExceeded {
            attempts: self.options.retries,
        })
    }

    async fn attempt(&self, browser: &dyn Browser) -> Result<RenderOutput> {
        let page = browser.new_page().await?;
        match self.drive(page.as_ref()).await {
            Ok((content, result)) => {
                let page = if self.options.keep_page {
                    Some(page)
                } else {
                    close_quietly(page).await;
                    None
                };
                Ok(RenderOutput {
                    content,
                    result,
                    page,
                })
            }
            Err(e) => {
                close_quietly(page).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, page: &dyn BrowserPage) -> Result<(String, Option<Value>)> {
        let options = &self.options;
        if !options.wait.is_zero() {
            tokio::time::sleep(options.wait).await;
        }
        if let Some(user_agent) = &self.user_agent {
            page.set_user_agent(user_agent).await?;
        }
        if !self.cookies.is_empty() {
            page.set_cookies(&self.cookies).await?;
        }

        tokio::time::timeout(options.timeout, page.goto(&self.target, &options.wait_until))
            .await
            .map_err(|_| Error::NavigationTimeout(options.timeout))??;

        let result = match &options.script {
            Some(script) => Some(page.evaluate(script).await?),
            None => None,
        };

        if options.scrolldown > 0 {
            for _ in 0..options.scrolldown {
                page.key_down(SCROLL_KEY).await?;
                tokio::time::sleep(options.sleep).await;
            }
            page.key_up(SCROLL_KEY).await?;
        } else if !options.sleep.is_zero() {
            tokio::time::sleep(options.sleep).await;
        }

        let content = page.content().await?;
        Ok((content, result))
    }
}

async fn close_quietly(page: Box<dyn BrowserPage>) {
    if let Err(e) = page.close().await {
        debug!("Failed to close browser page: {}", e);
    }
}

/// Markup as a `data:` URL. Only `%` and `#` need escaping for Chrome.
/// Browsers strip tab and newline characters from URLs, so they are
/// escaped along with `%` and `#`.
fn data_url(html: &str) -> String {
    let mut url = String::with_capacity(html.len() + 32);
    url.push_str("data:text/html;charset=utf-8,");
    for c in html.chars() {
        match c {
            '%' => url.push_str("%25"),
            '#' => url.push_str("%23"),
            '\t' => url.push_str("%09"),
            '\n' => url.push_str("%0A"),
            '\r' => url.push_str("%0D"),
            other => url.push(other),
        }
    }
    url
}

fn short(target: &str) -> &str {
    if target.starts_with("data:") { "inline document" } else { target }
}

impl Html {
    /// Render in the headless browser of a blocking session and replace
    /// this document with the result. Returns the script's value, if any.
    pub fn render(&mut self, options: RenderOptions) -> Result<Option<Value>> {
        let session = self.blocking_session()?;
        let mut renderer = self.renderer(&session, options);
        let outcome = session.block_on("render", async {
            let browser = session.browser().await?;
            renderer.run(browser.as_ref()).await
        });
        debug!("Render finished: {:?}", renderer.state());
        let output = outcome?;

        let (result, stale) = self.replace_with(output);
        if let Some(stale) = stale {
            session.block_on("render", async {
                close_quietly(stale).await;
                Ok(())
            })?;
        }
        Ok(result)
    }

    /// [`Html::render`] on the caller's runtime, for documents from an
    /// [`AsyncSession`](crate::AsyncSession).
    pub async fn arender(&mut self, options: RenderOptions) -> Result<Option<Value>> {
        let session = self.async_session()?;
        session.ensure_cooperative("arender")?;
        let mut renderer = self.renderer(&session, options);
        let browser = session.browser().await?;
        let outcome = renderer.run(browser.as_ref()).await;
        debug!("Render finished: {:?}", renderer.state());
        let output = outcome?;

        let (result, stale) = self.replace_with(output);
        if let Some(stale) = stale {
            close_quietly(stale).await;
        }
        Ok(result)
    }

    fn renderer(&self, session: &SessionHandle, mut options: RenderOptions) -> Renderer {
        let url = self.url().to_string();
        if url == DEFAULT_URL {
            options.reload = false;
        }
        let target = if options.reload {
            url.clone()
        } else {
            data_url(&self.html())
        };

        let client = session.client();
        let mut cookies = if options.send_cookies_session {
            client.render_cookies(&url)
        } else {
            options.cookies.clone()
        };
        cookies::scope_cookies(&mut cookies, &url);

        debug!(
            "Rendering {} (reload: {}, retries: {})",
            url, options.reload, options.retries
        );
        Renderer::new(
            options,
            target,
            client.user_agent().map(str::to_string),
            cookies,
        )
    }

    /// Swap in a document built from the rendered content. Returns the
    /// script result and the page the previous render kept, if any.
    fn replace_with(&mut self, output: RenderOutput) -> (Option<Value>, Option<Box<dyn BrowserPage>>) {
        let mut next = self.successor(output.content);
        next.page = output.page;
        let mut previous = std::mem::replace(self, next);
        (output.result, previous.page.take())
    }
}
