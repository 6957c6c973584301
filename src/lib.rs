//! htmlx - HTML parsing for humans
//!
//! Fetch pages with a blocking [`HtmlSession`] or an [`AsyncSession`], query
//! them with CSS selectors, XPath or search templates, resolve and follow
//! their links, and render JavaScript-driven pages in a headless browser.
//!
//! ```no_run
//! use htmlx::{HtmlSession, Parser};
//!
//! let session = HtmlSession::new()?;
//! let response = session.get("https://python.org/")?;
//! let html = response.html();
//! for link in html.absolute_links() {
//!     println!("{link}");
//! }
//! let _about = html.find_first("#about")?;
//! # Ok::<(), htmlx::Error>(())
//! ```

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::{Pages, RenderOptions};
pub use domain::{
    AttrValue, Attrs, DEFAULT_NEXT_SYMBOL, DEFAULT_URL, Element, FindOptions, Html, Parser,
    SearchAll, SearchMatch, XPathItem, XPathOptions,
};
pub use error::{Error, Result};
pub use infrastructure::{
    AsyncSession, Browser, BrowserLauncher, BrowserPage, HtmlResponse, HtmlSession, RenderCookie,
    SessionBuilder, SessionConfig, SessionHandle, WaitUntil, user_agent,
};
