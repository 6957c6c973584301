//! Document view: a whole HTML page plus the session it came from.
//!
//! Derived state (resolved encoding, decoded text, the CSS tree and the
//! XPath tree) is computed on first use and cached. Every mutation of the
//! content goes through [`Html::invalidate`], so a stale cache can never be
//! observed.

use std::borrow::Cow;
use std::cell::OnceCell;
use std::fmt;

use scraper::{ElementRef, Selector};

use crate::domain::element::Element;
use crate::domain::encoding::{self, DEFAULT_ENCODING, ResolvedEncoding};
use crate::domain::parser::Parser;
use crate::domain::text;
use crate::error::{Error, Result};
use crate::infrastructure::browser::BrowserPage;
use crate::infrastructure::session::{AsyncSession, HtmlSession, SessionHandle};

/// Placeholder URL for documents built from a string.
pub const DEFAULT_URL: &str = "https://example.org/";

/// Link texts that mark a "next page" link.
pub const DEFAULT_NEXT_SYMBOL: [&str; 3] = ["next", "more", "older"];

#[derive(Default)]
struct DocumentCache {
    encoding: OnceCell<ResolvedEncoding>,
    text: OnceCell<String>,
    tree: OnceCell<scraper::Html>,
    xpath: OnceCell<sxd_document::Package>,
}

/// A parsed HTML page.
///
/// `Html` is not `Send`: the parsed trees are single-threaded structures.
pub struct Html {
    url: String,
    raw: Vec<u8>,
    default_encoding: String,
    encoding_override: Option<String>,
    skip_anchors: bool,
    next_symbol: Vec<String>,
    pub(crate) session: Option<SessionHandle>,
    pub(crate) page: Option<Box<dyn BrowserPage>>,
    cache: DocumentCache,
}

impl Html {
    /// Wrap raw markup. Text passed as `&str`/`String` is UTF-8 bytes.
    pub fn new(html: impl Into<Vec<u8>>) -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            raw: html.into(),
            default_encoding: DEFAULT_ENCODING.to_string(),
            encoding_override: None,
            skip_anchors: true,
            next_symbol: DEFAULT_NEXT_SYMBOL.iter().map(ToString::to_string).collect(),
            session: None,
            page: None,
            cache: DocumentCache::default(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Encoding used when the markup does not declare one.
    #[must_use]
    pub fn with_default_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.default_encoding = encoding.into();
        self.invalidate();
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    #[must_use]
    pub fn default_encoding(&self) -> &str {
        &self.default_encoding
    }

    /// Replace the raw bytes.
    pub fn set_raw_html(&mut self, raw: impl Into<Vec<u8>>) {
        self.raw = raw.into();
        self.invalidate();
    }

    /// Replace the content with text, stored in the current encoding.
    pub fn set_html(&mut self, html: &str) {
        let target = self.resolved_encoding().encoding();
        self.raw = encoding::encode(html, target).into_owned();
        self.invalidate();
    }

    /// Force an encoding instead of the detected one.
    pub fn set_encoding(&mut self, label: &str) -> Result<()> {
        if encoding::lookup(label).is_none() {
            return Err(Error::UnknownEncoding(label.to_string()));
        }
        self.encoding_override = Some(label.to_string());
        self.invalidate();
        Ok(())
    }

    /// True when the declared encoding could not decode the content and
    /// the default encoding was used instead.
    pub fn encoding_fell_back(&self) -> bool {
        self.resolved_encoding().fell_back()
    }

    pub fn set_skip_anchors(&mut self, skip: bool) {
        self.skip_anchors = skip;
    }

    #[must_use]
    pub fn next_symbol(&self) -> &[String] {
        &self.next_symbol
    }

    pub fn add_next_symbol(&mut self, symbol: impl Into<String>) {
        self.next_symbol.push(symbol.into());
    }

    pub fn set_next_symbol<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_symbol = symbols.into_iter().map(Into::into).collect();
    }

    #[must_use]
    pub const fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Browser page kept alive by a `keep_page` render.
    #[must_use]
    pub fn page(&self) -> Option<&dyn BrowserPage> {
        self.page.as_deref()
    }

    pub fn take_page(&mut self) -> Option<Box<dyn BrowserPage>> {
        self.page.take()
    }

    /// Drop every cached derivation of the content.
    fn invalidate(&mut self) {
        self.cache = DocumentCache::default();
    }

    fn resolved_encoding(&self) -> &ResolvedEncoding {
        self.cache.encoding.get_or_init(|| {
            self.encoding_override
                .as_deref()
                .and_then(encoding::lookup)
                .map_or_else(
                    || encoding::resolve(&self.raw, &self.default_encoding),
                    ResolvedEncoding::fixed,
                )
        })
    }

    fn decoded(&self) -> &str {
        self.cache.text.get_or_init(|| {
            encoding::decode(&self.raw, self.resolved_encoding().encoding()).into_owned()
        })
    }

    pub(crate) fn tree(&self) -> &scraper::Html {
        self.cache
            .tree
            .get_or_init(|| scraper::Html::parse_document(self.decoded()))
    }

    pub(crate) fn xpath_package(&self) -> &sxd_document::Package {
        self.cache
            .xpath
            .get_or_init(|| sxd_html::parse_html(self.decoded()))
    }

    /// Session for blocking operations, creating a default [`HtmlSession`]
    /// on first use.
    pub(crate) fn blocking_session(&mut self) -> Result<SessionHandle> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }
        let session = HtmlSession::new()?.handle();
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Session for async operations, creating a default [`AsyncSession`]
    /// on first use.
    pub(crate) fn async_session(&mut self) -> Result<SessionHandle> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }
        let session = AsyncSession::new()?.handle();
        self.session = Some(session.clone());
        Ok(session)
    }

    /// A fresh document for rendered `content` that keeps this document's
    /// URL, session and settings. The content is UTF-8 text whatever charset
    /// its markup still declares, so the encoding is pinned rather than sniffed.
    pub(crate) fn successor(&self, content: String) -> Self {
        let mut next = Self::new(content)
            .with_url(self.url.clone())
            .with_default_encoding(DEFAULT_ENCODING);
        next.encoding_override = Some(DEFAULT_ENCODING.to_string());
        next.skip_anchors = self.skip_anchors;
        next.next_symbol.clone_from(&self.next_symbol);
        next.session.clone_from(&self.session);
        next
    }
}

impl Parser for Html {
    fn url(&self) -> &str {
        &self.url
    }

    fn html(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.decoded())
    }

    fn raw_html(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.raw)
    }

    fn encoding(&self) -> &str {
        self.resolved_encoding().name()
    }

    fn skip_anchors(&self) -> bool {
        self.skip_anchors
    }

    fn text(&self) -> String {
        text::visible_text(self.tree().root_element(), false)
    }

    fn full_text(&self) -> String {
        text::full_text(self.tree().root_element(), false)
    }

    fn document(&self) -> &Html {
        self
    }

    fn context_node(&self) -> Option<ElementRef<'_>> {
        None
    }

    fn select_elements(&self, selector: &Selector, encoding: &str) -> Vec<Element<'_>> {
        self.tree()
            .select(selector)
            .map(|found| Element::new(found, self, encoding))
            .collect()
    }
}

impl fmt::Debug for Html {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<HTML url={:?}>", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::FindOptions;
    use rstest::rstest;

    const PAGE: &str = r##"<!DOCTYPE html>
<html><head><title>Demo</title><script>var tracking = true;</script></head>
<body>
  <div class="item">Alpha widget</div>
  <div class="item">Beta WIDGET</div>
  <div class="item">Gamma</div>
  <a href="/docs">Docs</a>
  <a href="  guide.html ">Guide</a>
  <a href="#top">Top</a>
  <a href="javascript:void(0)">Noop</a>
  <a href="mailto:team@example.com">Mail</a>
  <a href="https://other.org/x">Other</a>
  <a href="//cdn.example.net/lib.js">CDN</a>
  <p>Python is a programming language that lets you work quickly</p>
</body></html>"##;

    fn page() -> Html {
        Html::new(PAGE).with_url("https://example.com/section/index.html")
    }

    #[test]
    fn test_find_returns_document_order() {
        let doc = page();
        let texts: Vec<String> = doc.find(".item").unwrap().iter().map(Parser::text).collect();
        assert_eq!(texts, ["Alpha widget", "Beta WIDGET", "Gamma"]);
    }

    #[test]
    fn test_containing_filters_case_insensitively_in_document_order() {
        let doc = page();
        let options = FindOptions::new().containing(["widget"]);
        let texts: Vec<String> = doc
            .find_with(".item", &options)
            .unwrap()
            .iter()
            .map(Parser::text)
            .collect();
        assert_eq!(texts, ["Alpha widget", "Beta WIDGET"]);
    }

    #[test]
    fn test_find_first_and_missing() {
        let doc = page();
        assert_eq!(doc.find_first("title").unwrap().unwrap().text(), "Demo");
        assert!(doc.find_first("table").unwrap().is_none());
        assert!(doc.find("div[").is_err());
    }

    #[test]
    fn test_links_filter_and_trim() {
        let doc = page();
        let links = doc.links();
        assert!(links.contains("/docs"));
        assert!(links.contains("guide.html"));
        assert!(!links.contains("#top"));
        assert!(!links.iter().any(|l| l.starts_with("javascript:") || l.starts_with("mailto:")));
        assert_eq!(links.len(), 4);
    }

    #[test]
    fn test_anchors_are_kept_when_not_skipped() {
        let mut doc = page();
        doc.set_skip_anchors(false);
        assert!(doc.links().contains("#top"));
    }

    #[test]
    fn test_absolute_links_have_scheme_and_host() {
        let doc = page();
        let absolute = doc.absolute_links();
        assert!(absolute.contains("https://example.com/docs"));
        assert!(absolute.contains("https://example.com/section/guide.html"));
        assert!(absolute.contains("https://other.org/x"));
        assert!(absolute.contains("https://cdn.example.net/lib.js"));
        for link in &absolute {
            let parsed = url::Url::parse(link).unwrap();
            assert!(parsed.has_host(), "{link} has no host");
        }
    }

    #[test]
    fn test_base_tag_overrides_url_directory() {
        let doc = Html::new(
            r#"<html><head><base href="https://static.example.com/assets/"></head>
               <body><a href="img/logo.png">logo</a></body></html>"#,
        )
        .with_url("https://example.com/page.html");
        assert_eq!(doc.base_url(), "https://static.example.com/assets/");
        assert!(doc
            .absolute_links()
            .contains("https://static.example.com/assets/img/logo.png"));
    }

    #[rstest]
    #[case("https://example.com/a/b.html", "https://example.com/a/")]
    #[case("https://example.com/a/b/?q=1", "https://example.com/a/b/?q=1")]
    fn test_base_url_without_base_tag(#[case] url: &str, #[case] expected: &str) {
        let doc = Html::new("<p>x</p>").with_url(url);
        assert_eq!(doc.base_url(), expected);
    }

    #[test]
    fn test_search_over_markup() {
        let doc = page();
        let found = doc.search("Python is a {} language").unwrap().unwrap();
        assert_eq!(&found[0], "programming");
        assert_eq!(doc.search_all("<div class=\"item\">{}</div>").unwrap().count(), 3);
    }

    #[test]
    fn test_text_excludes_scripts() {
        let doc = page();
        let text = doc.text();
        assert!(text.contains("Alpha widget"));
        assert!(!text.contains("tracking"));
        assert!(doc.full_text().contains("tracking"));
    }

    #[test]
    fn test_caches_are_invalidated_when_content_changes() {
        let mut doc = Html::new("<p class=\"a\">one</p>");
        assert_eq!(doc.find("p").unwrap().len(), 1);

        doc.set_html("<p>one</p><p>two</p>");
        assert_eq!(doc.find("p").unwrap().len(), 2);

        doc.set_raw_html(b"<span>bytes</span>".to_vec());
        assert!(doc.find("p").unwrap().is_empty());
        assert_eq!(doc.text(), "bytes");
    }

    #[test]
    fn test_encoding_detection_and_override() {
        let raw = b"<html><head><meta charset=\"windows-1252\"></head><body><p>caf\xe9</p></body></html>";
        let mut doc = Html::new(raw.to_vec());
        assert_eq!(doc.encoding(), "windows-1252");
        assert_eq!(doc.find_first("p").unwrap().unwrap().text(), "café");
        assert!(!doc.encoding_fell_back());

        doc.set_encoding("utf-8").unwrap();
        assert_eq!(doc.encoding(), "utf-8");
        assert_eq!(doc.find_first("p").unwrap().unwrap().text(), "caf\u{fffd}");
        assert!(doc.set_encoding("klingon").is_err());
    }

    #[test]
    fn test_encoding_fallback_is_observable() {
        let raw = b"<meta charset=\"utf-8\"><p>caf\xe9</p>";
        let doc = Html::new(raw.to_vec()).with_default_encoding("windows-1252");
        assert!(doc.encoding_fell_back());
        assert_eq!(doc.encoding(), "windows-1252");
    }

    #[test]
    fn test_clean_find_strips_scripts() {
        let doc = Html::new(
            "<div id=\"x\"><script>alert(1)</script><style>b{}</style><b>kept</b></div>",
        );
        let options = FindOptions::new().clean(true);
        let found = doc.find_with("#x", &options).unwrap();
        let cleaned = found[0].html();
        assert!(!cleaned.contains("script"));
        assert!(!cleaned.contains("style"));
        assert!(cleaned.contains("<b>kept</b>"));
    }

    #[test]
    fn test_element_reports_requested_encoding() {
        let doc = page();
        let options = FindOptions::new().encoding("windows-1252");
        let element = doc.find_with("title", &options).unwrap().remove(0);
        assert_eq!(element.encoding(), "windows-1252");
        assert_eq!(&*element.raw_html(), b"<title>Demo</title>");
    }

    #[test]
    fn test_successor_keeps_rendered_text_as_utf8() {
        let original = page();
        let rendered = "<html><head><meta charset=\"windows-1252\"></head><body><p>café</p></body></html>";
        let next = original.successor(rendered.to_string());
        assert_eq!(next.encoding(), "utf-8");
        assert!(!next.encoding_fell_back());
        assert_eq!(next.find_first("p").unwrap().unwrap().text(), "café");
        assert_eq!(next.url(), original.url());
    }

    #[test]
    fn test_relative_base_tag_is_returned_verbatim() {
        let doc = Html::new(
            r#"<html><head><base href=" /static/ "></head>
               <body><a href="css/site.css">css</a></body></html>"#,
        )
        .with_url("https://example.com/a/page.html");
        assert_eq!(doc.base_url(), "/static/");
        assert!(doc
            .absolute_links()
            .contains("https://example.com/static/css/site.css"));
    }

    #[test]
    fn test_find_first_with_options() {
        let doc = page();
        let options = FindOptions::new().containing(["widget"]).clean(true);
        let found = doc.find_first_with(".item", &options).unwrap().unwrap();
        assert_eq!(found.text(), "Alpha widget");
        let missing = FindOptions::new().containing(["absent"]);
        assert!(doc.find_first_with(".item", &missing).unwrap().is_none());
    }

    #[test]
    fn test_next_symbol_can_be_extended() {
        let mut doc = page();
        doc.add_next_symbol("weiter");
        assert_eq!(doc.next_symbol(), ["next", "more", "older", "weiter"]);
        assert_eq!(format!("{doc:?}"), "<HTML url=\"https://example.com/section/index.html\">");
    }
}
