//! User-Agent strings for mocked browser requests.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::debug;

/// Sent by sessions with `mock_browser` enabled.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_6) \
    AppleWebKit/603.3.8 (KHTML, like Gecko) Version/10.1.2 Safari/603.3.8";

/// Process-wide table, built on first use and shared by every session.
static USER_AGENTS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        (
            "chrome",
            vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
            ],
        ),
        (
            "firefox",
            vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
                "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0",
            ],
        ),
        (
            "safari",
            vec![
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Mobile/15E148 Safari/604.1",
            ],
        ),
        (
            "edge",
            vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51",
            ],
        ),
        (
            "opera",
            vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 OPR/109.0.0.0",
            ],
        ),
    ])
});

/// A User-Agent string.
///
/// Without a style the default Safari agent is returned. `random` picks from
/// every known agent; any other style picks from that browser's agents.
/// Unknown styles fall back to the default.
#[must_use]
pub fn user_agent(style: Option<&str>) -> String {
    let Some(style) = style.map(str::to_ascii_lowercase) else {
        return DEFAULT_USER_AGENT.to_string();
    };

    let candidates: Vec<&'static str> = if style == "random" {
        let mut all: Vec<&'static str> = USER_AGENTS.values().flatten().copied().collect();
        all.sort_unstable();
        all
    } else {
        USER_AGENTS.get(style.as_str()).cloned().unwrap_or_default()
    };

    if candidates.is_empty() {
        debug!("Unknown user agent style '{}', using default", style);
        return DEFAULT_USER_AGENT.to_string();
    }
    candidates[fastrand::usize(..candidates.len())].to_string()
}
