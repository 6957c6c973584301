//! Sessions: a blocking [`HtmlSession`] and a cooperative [`AsyncSession`].
//!
//! Both wrap the same [`HttpClient`] and differ only in how work is
//! scheduled. Documents keep a [`SessionHandle`] so that pagination and
//! rendering reuse the session (cookies, headers, browser) they came from.

use std::future::Future;
use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{Body, Method, RequestBuilder};
use tokio::runtime::{Builder as RuntimeBuilder, Handle, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::infrastructure::browser::{Browser, BrowserLauncher};
use crate::infrastructure::cdp::ChromeLauncher;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::http_client::{HtmlResponse, HttpClient};

#[derive(Clone)]
enum Scheduler {
    /// Drives futures to completion on a private single-threaded runtime.
    Blocking(Arc<Runtime>),
    /// Runs on the caller's runtime; the semaphore bounds concurrent requests.
    Cooperative(Arc<Semaphore>),
}

/// Cheap, cloneable reference to a session.
#[derive(Clone)]
pub struct SessionHandle {
    client: Arc<HttpClient>,
    scheduler: Scheduler,
}

impl SessionHandle {
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self.scheduler, Scheduler::Blocking(_))
    }

    pub(crate) fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Run `future` to completion on the blocking scheduler.
    pub(crate) fn block_on<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match &self.scheduler {
            Scheduler::Blocking(runtime) => {
                if Handle::try_current().is_ok() {
                    return Err(Error::RuntimeActive);
                }
                runtime.block_on(future)
            }
            Scheduler::Cooperative(_) => Err(Error::SchedulerMismatch {
                operation,
                reason: "the document belongs to an AsyncSession; use the async variant",
            }),
        }
    }

    /// Fail unless this handle can be awaited on the caller's runtime.
    pub(crate) fn ensure_cooperative(&self, operation: &'static str) -> Result<()> {
        match self.scheduler {
            Scheduler::Cooperative(_) => Ok(()),
            Scheduler::Blocking(_) => Err(Error::SchedulerMismatch {
                operation,
                reason: "the document belongs to an HtmlSession; use the blocking variant",
            }),
        }
    }

    pub async fn get(&self, url: &str) -> Result<HtmlResponse> {
        self.execute(self.client.request(Method::GET, url)).await
    }

    pub async fn execute(&self, request: RequestBuilder) -> Result<HtmlResponse> {
        let _permit = match &self.scheduler {
            Scheduler::Cooperative(workers) => Some(
                Arc::clone(workers)
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::SessionClosed)?,
            ),
            Scheduler::Blocking(_) => None,
        };
        let response = self.client.send(request).await?;
        HtmlResponse::read(response, self.clone()).await
    }

    pub(crate) async fn browser(&self) -> Result<Arc<dyn Browser>> {
        self.client.browser().await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_blocking() { "blocking" } else { "async" };
        write!(f, "SessionHandle({kind})")
    }
}

/// Builds either kind of session.
pub struct SessionBuilder {
    config: SessionConfig,
    launcher: Option<Arc<dyn BrowserLauncher>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            launcher: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom browser instead of a locally launched Chrome.
    #[must_use]
    pub fn browser_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    fn client(self) -> Result<HttpClient> {
        let launcher: Arc<dyn BrowserLauncher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ChromeLauncher::from_config(&self.config)),
        };
        HttpClient::new(self.config, launcher)
    }

    /// A blocking session. Fails with [`Error::RuntimeActive`] when called
    /// from inside an async runtime.
    pub fn build_blocking(self) -> Result<HtmlSession> {
        if Handle::try_current().is_ok() {
            return Err(Error::RuntimeActive);
        }
        let runtime = RuntimeBuilder::new_current_thread().enable_all().build()?;
        let client = {
            let _guard = runtime.enter();
            self.client()?
        };
        debug!("Blocking session created");
        Ok(HtmlSession {
            handle: SessionHandle {
                client: Arc::new(client),
                scheduler: Scheduler::Blocking(Arc::new(runtime)),
            },
        })
    }

    pub fn build_async(self) -> Result<AsyncSession> {
        let workers = self.config.worker_count().max(1);
        let client = self.client()?;
        debug!("Async session created with {} workers", workers);
        Ok(AsyncSession {
            handle: SessionHandle {
                client: Arc::new(client),
                scheduler: Scheduler::Cooperative(Arc::new(Semaphore::new(workers))),
            },
        })
    }
}

/// A session whose methods block the calling thread.
///
/// Owns a private runtime, so it must not be created, used or dropped inside
/// an async context.
#[derive(Debug, Clone)]
pub struct HtmlSession {
    handle: SessionHandle,
}

impl HtmlSession {
    pub fn new() -> Result<Self> {
        SessionBuilder::new().build_blocking()
    }

    pub fn with_config(config: SessionConfig) -> Result<Self> {
        SessionBuilder::new().config(config).build_blocking()
    }

    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn get(&self, url: &str) -> Result<HtmlResponse> {
        self.handle.block_on("get", self.handle.get(url))
    }

    pub fn post(&self, url: &str, body: impl Into<Body>) -> Result<HtmlResponse> {
        self.send(self.request(Method::POST, url).body(body))
    }

    /// Start a request with the session's client; finish it with [`HtmlSession::send`].
    #[must_use]
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.handle.client.request(method, url)
    }

    pub fn send(&self, request: RequestBuilder) -> Result<HtmlResponse> {
        self.handle.block_on("send", self.handle.execute(request))
    }

    #[must_use]
    pub fn cookies(&self) -> &Arc<Jar> {
        self.handle.client.cookie_jar()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        self.handle.client.config()
    }

    /// The session's browser, launched on first use.
    pub fn browser(&self) -> Result<Arc<dyn Browser>> {
        self.handle.block_on("browser", self.handle.browser())
    }

    /// Shut down the browser, if one was started.
    pub fn close(&self) -> Result<()> {
        info!("Closing blocking session");
        self.handle.block_on("close", self.handle.client.close())
    }
}

/// A session whose methods are awaited on the caller's runtime.
#[derive(Debug, Clone)]
pub struct AsyncSession {
    handle: SessionHandle,
}

impl AsyncSession {
    pub fn new() -> Result<Self> {
        SessionBuilder::new().build_async()
    }

    pub fn with_config(config: SessionConfig) -> Result<Self> {
        SessionBuilder::new().config(config).build_async()
    }

    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub async fn get(&self, url: &str) -> Result<HtmlResponse> {
        self.handle.get(url).await
    }

    pub async fn post(&self, url: &str, body: impl Into<Body>) -> Result<HtmlResponse> {
        self.send(self.request(Method::POST, url).body(body)).await
    }

    #[must_use]
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.handle.client.request(method, url)
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<HtmlResponse> {
        self.handle.execute(request).await
    }

    #[must_use]
    pub fn cookies(&self) -> &Arc<Jar> {
        self.handle.client.cookie_jar()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        self.handle.client.config()
    }

    pub async fn browser(&self) -> Result<Arc<dyn Browser>> {
        self.handle.browser().await
    }

    /// Run every task concurrently; results come back in input order.
    pub async fn run<I, F>(&self, tasks: I) -> Vec<F::Output>
    where
        I: IntoIterator<Item = F>,
        F: Future,
    {
        futures::future::join_all(tasks).await
    }

    pub async fn close(&self) -> Result<()> {
        info!("Closing async session");
        self.handle.client.close().await
    }
}
