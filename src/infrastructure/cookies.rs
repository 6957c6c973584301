//! Moving cookies from the HTTP session into the rendering browser.

use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use crate::infrastructure::browser::RenderCookie;

/// Cookies the session jar would send to `url`, in browser form.
///
/// The jar only exposes name/value pairs for a URL, so each cookie is scoped
/// to that URL rather than to its original domain and path.
#[must_use]
pub fn session_cookies_for(jar: &Jar, url: &str) -> Vec<RenderCookie> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let Some(header) = jar.cookies(&parsed) else {
        return Vec::new();
    };
    let Ok(header) = header.to_str() else {
        return Vec::new();
    };

    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| RenderCookie {
            name: name.to_string(),
            value: value.to_string(),
            url: Some(url.to_string()),
            secure: Some(parsed.scheme() == "https"),
            ..RenderCookie::default()
        })
        .collect()
}

/// Give unscoped cookies the document URL, when it is an http(s) URL.
pub fn scope_cookies(cookies: &mut [RenderCookie], url: &str) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return;
    }
    for cookie in cookies.iter_mut().filter(|cookie| !cookie.is_scoped()) {
        cookie.url = Some(url.to_string());
    }
}
