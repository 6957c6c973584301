//! Launching a local headless Chrome.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::client::CDPClient;
use super::page::CdpPage;
use super::protocol::{AttachToTargetResult, CreateTargetResult};
use crate::error::{Error, Result};
use crate::infrastructure::browser::{Browser, BrowserLauncher, BrowserPage};
use crate::infrastructure::config::SessionConfig;

const CHROME_PATH_ENV: &str = "CHROME_PATH";
const CANDIDATES: [&str; 5] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];
const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    args: Vec<String>,
    ignore_https_errors: bool,
    launch_timeout: Duration,
}

impl ChromeLauncher {
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            executable: config.chrome_executable.clone(),
            args: config.browser_args.clone(),
            ignore_https_errors: !config.verify,
            launch_timeout: Duration::from_secs(config.launch_timeout_seconds),
        }
    }

    /// Configured path, then `CHROME_PATH`, then the first known name on `PATH`.
    fn locate(&self) -> Result<PathBuf> {
        if let Some(path) = &self.executable {
            return Ok(path.clone());
        }
        if let Some(path) = std::env::var_os(CHROME_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        let search_path = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&search_path)
            .flat_map(|dir| CANDIDATES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                Error::browser(format!(
                    "no Chrome executable found; set {CHROME_PATH_ENV} or chrome_executable"
                ))
            })
    }

    fn command(&self, executable: &Path, profile_dir: &Path) -> Command {
        let mut command = Command::new(executable);
        command
            .arg("--headless=new")
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .args(&self.args);
        if self.ignore_https_errors {
            command.arg("--ignore-certificate-errors");
        }
        command
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        let executable = self.locate()?;
        let profile_dir =
            std::env::temp_dir().join(format!("htmlx-chrome-{}", uuid::Uuid::new_v4()));
        info!("Starting {:?}", executable);

        let mut child = self.command(&executable, &profile_dir).spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::browser("browser stderr is not captured"))?;

        let ws_url = match tokio::time::timeout(self.launch_timeout, devtools_url(stderr)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::browser(format!(
                    "browser did not start within {:?}",
                    self.launch_timeout
                )));
            }
        };

        let client = CDPClient::connect(&ws_url).await?;
        info!("Browser ready at {}", ws_url);
        Ok(Arc::new(ChromeBrowser {
            client,
            child: Mutex::new(Some(child)),
            profile_dir,
        }))
    }
}

/// Read stderr until the DevTools endpoint is announced, then keep draining
/// it so the browser never blocks on a full pipe.
async fn devtools_url(stderr: ChildStderr) -> Result<String> {
    let mut lines = BufReader::new(stderr).lines();
    while let Some(line) = lines.next_line().await? {
        trace!("chrome: {}", line);
        if let Some(url) = line.strip_prefix(DEVTOOLS_PREFIX) {
            let url = url.trim().to_string();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!("chrome: {}", line);
                }
            });
            return Ok(url);
        }
    }
    Err(Error::browser("browser exited before announcing its DevTools endpoint"))
}

pub struct ChromeBrowser {
    client: Arc<CDPClient>,
    child: Mutex<Option<Child>>,
    profile_dir: PathBuf,
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let created = self
            .client
            .send_request("Target.createTarget", Some(json!({ "url": "about:blank" })), None)
            .await?;
        let CreateTargetResult { target_id } = serde_json::from_value(created)?;

        let attached = self
            .client
            .send_request(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                None,
            )
            .await?;
        let AttachToTargetResult { session_id } = serde_json::from_value(attached)?;

        for method in ["Page.enable", "Network.enable", "Runtime.enable"] {
            self.client
                .send_request(method, None, Some(&session_id))
                .await?;
        }
        self.client
            .send_request(
                "Page.setLifecycleEventsEnabled",
                Some(json!({ "enabled": true })),
                Some(&session_id),
            )
            .await?;

        debug!("Opened page {} (session {})", target_id, session_id);
        Ok(Box::new(CdpPage::new(
            Arc::clone(&self.client),
            target_id,
            session_id,
        )))
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.client.send_request("Browser.close", None, None).await {
            debug!("Browser.close failed, killing the process: {}", e);
        }
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!("Browser process already gone: {}", e);
            }
        }
        remove_profile(&self.profile_dir);
        Ok(())
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        remove_profile(&self.profile_dir);
    }
}

fn remove_profile(dir: &Path) {
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!("Failed to remove browser profile {:?}: {}", dir, e);
        }
    }
}
