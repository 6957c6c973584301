//! A browser tab driven over CDP.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::client::CDPClient;
use super::protocol::{CDPEvent, NavigateResult, SessionId, TargetId};
use crate::error::{Error, Result};
use crate::infrastructure::browser::{BrowserPage, RenderCookie, WaitUntil};

/// Doctype plus outer markup, as a plain expression.
const CONTENT_EXPRESSION: &str = "(document.doctype \
    ? new XMLSerializer().serializeToString(document.doctype) \
    : '') + document.documentElement.outerHTML";

pub struct CdpPage {
    client: Arc<CDPClient>,
    target_id: TargetId,
    session_id: SessionId,
}

impl CdpPage {
    pub(crate) const fn new(client: Arc<CDPClient>, target_id: TargetId, session_id: SessionId) -> Self {
        Self {
            client,
            target_id,
            session_id,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.client
            .send_request(method, Some(params), Some(&self.session_id))
            .await
    }

    fn is_own(&self, event: &CDPEvent) -> bool {
        event.session_id.as_deref() == Some(self.session_id.as_str())
    }

    /// `Runtime.evaluate` of `expression` exactly as given.
    async fn evaluate_expression(&self, expression: &str) -> Result<Value> {
        let result = self
            .call("Runtime.evaluate", evaluate_params(expression))
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script threw an exception");
            return Err(Error::browser(format!("script evaluation failed: {message}")));
        }

        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn dispatch_key(&self, kind: &str, key: &str) -> Result<()> {
        let code = key_code(key);
        self.call(
            "Input.dispatchKeyEvent",
            json!({
                "type": kind,
                "key": key,
                "code": key,
                "windowsVirtualKeyCode": code,
                "nativeVirtualKeyCode": code,
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.call(
            "Network.setUserAgentOverride",
            json!({ "userAgent": user_agent }),
        )
        .await?;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[RenderCookie]) -> Result<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        self.call("Network.setCookies", json!({ "cookies": cookies }))
            .await?;
        Ok(())
    }

    async fn goto(&self, url: &str, wait_until: &[WaitUntil]) -> Result<()> {
        let mut remaining = lifecycle_targets(wait_until);

        // Subscribe first so no lifecycle event is missed.
        let mut events = self.client.events();
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        let navigation: NavigateResult = serde_json::from_value(result)?;
        if let Some(error) = navigation.error_text.filter(|text| !text.is_empty()) {
            return Err(Error::browser(format!("navigation to {url} failed: {error}")));
        }
        debug!("Navigating frame {} to {}", navigation.frame_id, url);

        // Same-document navigations have no loader and fire no lifecycle events.
        let Some(loader_id) = navigation.loader_id else {
            return Ok(());
        };

        while !remaining.is_empty() {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} browser events while waiting for navigation", skipped);
                    continue;
                }
                Err(RecvError::Closed) => {
                    return Err(Error::browser("browser connection closed during navigation"));
                }
            };
            if event.method != "Page.lifecycleEvent" || !self.is_own(&event) {
                continue;
            }
            if event.param_str("loaderId") != Some(loader_id.as_str()) {
                continue;
            }
            if let Some(name) = event.param_str("name") {
                remaining.remove(name);
            }
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.evaluate_expression(&script_expression(script)).await
    }

    async fn key_down(&self, key: &str) -> Result<()> {
        self.dispatch_key("keyDown", key).await
    }

    async fn key_up(&self, key: &str) -> Result<()> {
        self.dispatch_key("keyUp", key).await
    }

    async fn content(&self) -> Result<String> {
        match self.evaluate_expression(CONTENT_EXPRESSION).await? {
            Value::String(content) => Ok(content),
            other => Err(Error::browser(format!("unexpected page content: {other}"))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.client
            .send_request(
                "Target.closeTarget",
                Some(json!({ "targetId": self.target_id })),
                None,
            )
            .await?;
        Ok(())
    }
}

/// Lifecycle event names `goto` waits for; `load` when none are given.
fn lifecycle_targets(wait_until: &[WaitUntil]) -> HashSet<&'static str> {
    if wait_until.is_empty() {
        HashSet::from([WaitUntil::Load.lifecycle_name()])
    } else {
        wait_until.iter().map(|w| w.lifecycle_name()).collect()
    }
}

fn evaluate_params(expression: &str) -> Value {
    json!({
        "expression": expression,
        "awaitPromise": true,
        "returnByValue": true,
    })
}

/// The expression sent for a user script: function expressions are called,
/// anything else is evaluated as written.
fn script_expression(script: &str) -> String {
    let script = script.trim();
    if looks_like_function(script) {
        format!("({script})()")
    } else {
        script.to_string()
    }
}

/// Byte index of the `)` closing the `(` that `text` starts with.
fn closing_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// True for an uncalled arrow function or `function` expression. A script
/// that already ends in a call, like `(() => 1)()`, is an expression.
fn looks_like_function(script: &str) -> bool {
    let script = script.trim();
    if script.starts_with('(') && closing_paren(script) == Some(script.len() - 1) {
        return looks_like_function(&script[1..script.len() - 1]);
    }

    let head = script.strip_prefix("async").map_or(script, str::trim_start);
    if head.starts_with("function") {
        return script.ends_with('}');
    }
    match head.split_once("=>") {
        Some((params, _)) => {
            let params = params.trim();
            (params.starts_with('(') && closing_paren(params) == Some(params.len() - 1))
                || (!params.is_empty()
                    && params.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$'))
        }
        None => false,
    }
}

fn key_code(key: &str) -> u32 {
    match key {
        "Backspace" => 8,
        "Tab" => 9,
        "Enter" => 13,
        "Escape" => 27,
        "Space" | " " => 32,
        "PageUp" => 33,
        "PageDown" => 34,
        "End" => 35,
        "Home" => 36,
        "ArrowLeft" => 37,
        "ArrowUp" => 38,
        "ArrowRight" => 39,
        "ArrowDown" => 40,
        "Delete" => 46,
        other => other
            .chars()
            .next()
            .filter(|_| other.chars().count() == 1)
            .map_or(0, |c| u32::from(c.to_ascii_uppercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("() => document.title", true)]
    #[case("async () => { return 1; }", true)]
    #[case("x => x", true)]
    #[case("function () { return 1; }", true)]
    #[case("document.title", false)]
    #[case("1 + 1", false)]
    #[case("[1, 2].map(x => x * 2)", false)]
    #[case("(() => document.title)()", false)]
    #[case("(async () => { await 1; })()", false)]
    #[case("(function () { return 1; })()", false)]
    #[case("function () { return 1; }()", false)]
    #[case("(() => 1)", true)]
    #[case("async function () { return 1; }", true)]
    #[case("(a, b) => a + b", true)]
    fn test_function_detection(#[case] script: &str, #[case] expected: bool) {
        assert_eq!(looks_like_function(script), expected);
    }

    #[rstest]
    #[case("() => document.title", "(() => document.title)()")]
    #[case(
        "  async () => { await 1; return 2; }  ",
        "(async () => { await 1; return 2; })()"
    )]
    #[case("function () { return 1; }", "(function () { return 1; })()")]
    #[case("(() => document.title)()", "(() => document.title)()")]
    #[case("document.title", "document.title")]
    #[case("window.scrollY + 1", "window.scrollY + 1")]
    fn test_script_expressions(#[case] script: &str, #[case] expected: &str) {
        assert_eq!(script_expression(script), expected);
        assert_eq!(
            evaluate_params(&script_expression(script)),
            json!({ "expression": expected, "awaitPromise": true, "returnByValue": true })
        );
    }

    #[test]
    fn test_content_expression_is_sent_as_written() {
        assert!(!looks_like_function(CONTENT_EXPRESSION));
        assert_eq!(script_expression(CONTENT_EXPRESSION), CONTENT_EXPRESSION);
        let params = evaluate_params(CONTENT_EXPRESSION);
        let expression = params["expression"].as_str().unwrap();
        assert!(expression.ends_with("document.documentElement.outerHTML"));
        assert!(!expression.ends_with(")()"));
    }

    #[test]
    fn test_lifecycle_targets() {
        assert_eq!(lifecycle_targets(&[]), HashSet::from(["load"]));
        assert_eq!(
            lifecycle_targets(&[WaitUntil::DomContentLoaded, WaitUntil::NetworkIdle2]),
            HashSet::from(["DOMContentLoaded", "networkAlmostIdle"])
        );
    }

    #[rstest]
    #[case("PageDown", 34)]
    #[case("Enter", 13)]
    #[case("a", 65)]
    #[case("F13", 0)]
    fn test_key_codes(#[case] key: &str, #[case] code: u32) {
        assert_eq!(key_code(key), code);
    }
}
