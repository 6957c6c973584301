//! Following "next page" links.
//!
//! Candidates are the anchors whose text contains one of the document's
//! next markers. The first candidate with `rel="next"` wins, then the first
//! with a class containing `next`, then the first whose href contains
//! `page`; otherwise the last candidate is taken, since forward links are
//! usually rendered last among the pagination controls.

use std::collections::HashSet;

use futures::Stream;
use tracing::{debug, info};

use crate::domain::document::Html;
use crate::domain::element::Element;
use crate::domain::links;
use crate::domain::parser::Parser;
use crate::domain::query::FindOptions;
use crate::error::Result;
use crate::infrastructure::session::{AsyncSession, HtmlSession, SessionHandle};

/// Pick the next-page href among `candidates` (document order).
fn choose<'c>(candidates: &'c [(Element<'_>, &str)]) -> Option<&'c str> {
    let by_rel = || {
        candidates.iter().find(|(element, _)| {
            element
                .attrs()
                .get("rel")
                .is_some_and(|rel| rel.contains_token("next"))
        })
    };
    let by_class = || {
        candidates
            .iter()
            .find(|(element, _)| element.classes().any(|class| class.contains("next")))
    };
    let by_href = || candidates.iter().find(|(_, href)| href.contains("page"));

    let (_, href) = by_rel()
        .or_else(by_class)
        .or_else(by_href)
        .or_else(|| candidates.last())?;
    Some(*href)
}

impl Html {
    /// Absolute URL of the next page, using [`Html::next_symbol`] as markers.
    #[must_use]
    pub fn next_url(&self) -> Option<String> {
        self.next_url_with(self.next_symbol())
    }

    /// Absolute URL of the next page for the given markers. `None` when no
    /// anchor text contains any marker.
    #[must_use]
    pub fn next_url_with<S: AsRef<str>>(&self, markers: &[S]) -> Option<String> {
        let options =
            FindOptions::new().containing(markers.iter().map(|marker| marker.as_ref().to_string()));
        let anchors = self.find_with("a", &options).ok()?;
        let candidates: Vec<(Element<'_>, &str)> = anchors
            .into_iter()
            .filter_map(|anchor| {
                let href = anchor.attr("href")?.trim();
                (!href.is_empty()).then_some((anchor, href))
            })
            .collect();

        let href = choose(&candidates)?;
        debug!(
            "Next link '{}' chosen from {} candidates",
            href,
            candidates.len()
        );
        Some(links::make_absolute(href, &self.link_base()))
    }

    /// Fetch the next page with this document's blocking session.
    pub fn next_page(&mut self) -> Result<Option<Html>> {
        let Some(url) = self.next_url() else {
            return Ok(None);
        };
        let session = self.blocking_session()?;
        let response = session.block_on("next_page", session.get(&url))?;
        Ok(Some(self.adopt(response.into_html())))
    }

    /// Fetch the next page with this document's async session.
    pub async fn anext_page(&mut self) -> Result<Option<Html>> {
        let Some(url) = self.next_url() else {
            return Ok(None);
        };
        let session = self.async_session()?;
        session.ensure_cooperative("anext_page")?;
        let response = session.get(&url).await?;
        Ok(Some(self.adopt(response.into_html())))
    }

    /// This page followed by every next page, fetched one at a time with a
    /// blocking session. Stops when no next link is found, a fetch fails
    /// (the error is the last item) or a URL repeats.
    #[must_use]
    pub fn pages(self) -> Pages {
        Pages {
            cursor: PageCursor::new(self),
        }
    }

    /// [`Html::pages`] as a stream, fetched with an async session.
    pub fn pages_stream(self) -> impl Stream<Item = Result<Html>> {
        futures::stream::unfold(PageCursor::new(self), |mut cursor| async move {
            let item = cursor.next_async().await?;
            Some((item, cursor))
        })
    }

    /// Carry the traversal settings over to a fetched page.
    fn adopt(&self, mut page: Html) -> Html {
        page.set_next_symbol(self.next_symbol().to_vec());
        page.set_skip_anchors(self.skip_anchors());
        page
    }
}

enum CursorState {
    Start(Box<Html>),
    Next { url: String, from: Box<Html> },
    Done,
}

/// Forward-only traversal state shared by [`Pages`] and
/// [`Html::pages_stream`]. Each step keeps a settings-only copy of the
/// previous page to build the next one from.
struct PageCursor {
    state: CursorState,
    session: Option<SessionHandle>,
    visited: HashSet<String>,
}

impl PageCursor {
    fn new(start: Html) -> Self {
        let session = start.session().cloned();
        Self {
            state: CursorState::Start(Box::new(start)),
            session,
            visited: HashSet::new(),
        }
    }

    /// Queue the page after `page`, unless there is none or it was seen.
    fn advance(&mut self, page: &Html) {
        self.visited.insert(page.url().to_string());
        self.state = match page.next_url() {
            Some(url) if self.visited.contains(&url) => {
                info!("Stopping pagination: {} was already visited", url);
                CursorState::Done
            }
            Some(url) => CursorState::Next {
                url,
                from: Box::new(page.adopt(Html::new(Vec::new()))),
            },
            None => {
                debug!("Pagination finished after {} pages", self.visited.len());
                CursorState::Done
            }
        };
    }

    fn take(&mut self) -> CursorState {
        std::mem::replace(&mut self.state, CursorState::Done)
    }

    fn next_blocking(&mut self) -> Option<Result<Html>> {
        match self.take() {
            CursorState::Start(page) => {
                self.advance(&page);
                Some(Ok(*page))
            }
            CursorState::Next { url, from } => Some(self.fetch_blocking(&url, &from)),
            CursorState::Done => None,
        }
    }

    fn fetch_blocking(&mut self, url: &str, from: &Html) -> Result<Html> {
        let session = match &self.session {
            Some(session) => session.clone(),
            None => {
                let session = HtmlSession::new()?.handle();
                self.session = Some(session.clone());
                session
            }
        };
        let response = session.block_on("pages", session.get(url))?;
        let page = from.adopt(response.into_html());
        self.advance(&page);
        Ok(page)
    }

    async fn next_async(&mut self) -> Option<Result<Html>> {
        match self.take() {
            CursorState::Start(page) => {
                self.advance(&page);
                Some(Ok(*page))
            }
            CursorState::Next { url, from } => Some(self.fetch_async(&url, &from).await),
            CursorState::Done => None,
        }
    }

    async fn fetch_async(&mut self, url: &str, from: &Html) -> Result<Html> {
        let session = match &self.session {
            Some(session) => session.clone(),
            None => {
                let session = AsyncSession::new()?.handle();
                self.session = Some(session.clone());
                session
            }
        };
        session.ensure_cooperative("pages_stream")?;
        let response = session.get(url).await?;
        let page = from.adopt(response.into_html());
        self.advance(&page);
        Ok(page)
    }
}

/// Blocking page iterator returned by [`Html::pages`].
pub struct Pages {
    cursor: PageCursor,
}

impl Iterator for Pages {
    type Item = Result<Html>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_blocking()
    }
}

impl std::iter::FusedIterator for Pages {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn doc(body: &str) -> Html {
        Html::new(format!("<html><body>{body}</body></html>"))
            .with_url("https://example.com/list/index.html")
    }

    #[rstest]
    #[case::rel_next_wins(
        r#"<a href="/p/9" class="next">Next</a><a href="/p/2" rel="next">next</a>"#,
        "https://example.com/p/2"
    )]
    #[case::class_beats_href(
        r#"<a href="/page/5">Next</a><a href="/x" class="pager-next-link">more</a>"#,
        "https://example.com/x"
    )]
    #[case::href_with_page(
        r#"<a href="/a">Next</a><a href="?page=2">next »</a><a href="/b">More</a>"#,
        "https://example.com/list/?page=2"
    )]
    #[case::last_candidate(
        r#"<a href="/first">next</a><a href="/second">Next</a><a href="/third">older</a>"#,
        "https://example.com/third"
    )]
    fn test_tie_break(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(doc(body).next_url().as_deref(), Some(expected));
    }

    #[test]
    fn test_no_marker_means_no_next_page() {
        let page = doc(r#"<a href="/about">About</a><a href="/contact">Contact</a>"#);
        assert_eq!(page.next_url(), None);
    }

    #[test]
    fn test_custom_markers() {
        let mut page = doc(r#"<a href="/p/2">Weiter</a>"#);
        assert_eq!(page.next_url(), None);
        page.add_next_symbol("weiter");
        assert_eq!(page.next_url().as_deref(), Some("https://example.com/p/2"));
    }

    #[test]
    fn test_relative_base_tag_resolves_next_link() {
        let page = Html::new(
            r#"<html><head><base href="/archive/"></head><body><a href="2.html">next</a></body></html>"#,
        )
        .with_url("https://example.com/list/index.html");
        assert_eq!(
            page.next_url().as_deref(),
            Some("https://example.com/archive/2.html")
        );
    }

    #[test]
    fn test_candidates_without_href_are_ignored() {
        let page = doc(r#"<a href="/p/2">next</a><a name="bottom">next</a>"#);
        assert_eq!(page.next_url().as_deref(), Some("https://example.com/p/2"));
    }

    #[test]
    fn test_single_page_traversal_needs_no_session() {
        let pages: Vec<Html> = doc("<p>only page</p>")
            .pages()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].session().is_none());
    }
}
