//! Query operations shared by the document view and element views.

use std::borrow::Cow;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};

use crate::domain::document::Html;
use crate::domain::element::Element;
use crate::domain::{encoding, links};
use crate::domain::query::{FindOptions, XPathOptions};
use crate::domain::template::{SearchAll, SearchMatch, Template};
use crate::domain::xpath::{self, XPathItem};
use crate::error::{Error, Result};

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid selector"));
static BASE: Lazy<Selector> = Lazy::new(|| Selector::parse("base").expect("valid selector"));

pub(crate) fn compile_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::invalid_selector(selector, e.to_string()))
}

/// Everything that can be queried: a whole [`Html`] document or an
/// [`Element`] inside one.
pub trait Parser {
    /// URL the content came from; used to resolve relative links.
    fn url(&self) -> &str;

    /// Markup of this view as text.
    fn html(&self) -> Cow<'_, str>;

    /// Name of the encoding used for `raw_html`.
    fn encoding(&self) -> &str;

    fn skip_anchors(&self) -> bool;

    /// Visible text, whitespace-collapsed.
    fn text(&self) -> String;

    /// All text content, untouched.
    fn full_text(&self) -> String;

    /// The document this view belongs to.
    fn document(&self) -> &Html;

    /// Context node for relative queries; `None` means the document root.
    fn context_node(&self) -> Option<ElementRef<'_>>;

    /// Raw CSS matches below this view, before `containing`/`clean` filters.
    fn select_elements(&self, selector: &Selector, encoding: &str) -> Vec<Element<'_>>;

    /// Markup of this view encoded with [`Parser::encoding`].
    fn raw_html(&self) -> Cow<'_, [u8]> {
        let target = encoding::lookup(self.encoding()).unwrap_or(encoding_rs::UTF_8);
        Cow::Owned(encoding::encode(&self.html(), target).into_owned())
    }

    fn find(&self, selector: &str) -> Result<Vec<Element<'_>>> {
        self.find_with(selector, &FindOptions::default())
    }

    fn find_first(&self, selector: &str) -> Result<Option<Element<'_>>> {
        self.find_first_with(selector, &FindOptions::default())
    }

    /// First result of [`Parser::find_with`], so `containing` and `clean`
    /// apply before the first match is taken.
    fn find_first_with(
        &self,
        selector: &str,
        options: &FindOptions,
    ) -> Result<Option<Element<'_>>> {
        Ok(self.find_with(selector, options)?.into_iter().next())
    }

    /// CSS query. Results are in document order; `containing` keeps elements
    /// whose full text contains any of the needles (case-insensitive).
    fn find_with(&self, selector: &str, options: &FindOptions) -> Result<Vec<Element<'_>>> {
        let compiled = compile_selector(selector)?;
        let encoding = options
            .encoding
            .clone()
            .unwrap_or_else(|| self.encoding().to_string());
        let mut elements = self.select_elements(&compiled, &encoding);

        if !options.containing.is_empty() {
            let needles: Vec<String> = options
                .containing
                .iter()
                .map(|needle| needle.to_lowercase())
                .collect();
            elements.retain(|element| {
                let text = element.full_text().to_lowercase();
                needles.iter().any(|needle| text.contains(needle.as_str()))
            });
        }

        if options.clean {
            for element in &mut elements {
                element.clean();
            }
        }

        Ok(elements)
    }

    fn xpath(&self, expression: &str) -> Result<Vec<XPathItem<'_>>> {
        self.xpath_with(expression, &XPathOptions::default())
    }

    fn xpath_first(&self, expression: &str) -> Result<Option<XPathItem<'_>>> {
        Ok(self.xpath(expression)?.into_iter().next())
    }

    /// XPath query relative to this view. Node results are elements,
    /// string/number/boolean results are text.
    fn xpath_with(&self, expression: &str, options: &XPathOptions) -> Result<Vec<XPathItem<'_>>> {
        let encoding = options
            .encoding
            .clone()
            .unwrap_or_else(|| self.encoding().to_string());
        let mut items = xpath::evaluate(self.document(), self.context_node(), expression, &encoding)?;

        if options.clean {
            for item in &mut items {
                if let XPathItem::Node(element) = item {
                    element.clean();
                }
            }
        }
        Ok(items)
    }

    /// First match of a search template over [`Parser::html`].
    fn search(&self, template: &str) -> Result<Option<SearchMatch>> {
        Ok(Template::compile(template)?.search(&self.html()))
    }

    /// Lazy scan for every match of a search template.
    fn search_all(&self, template: &str) -> Result<SearchAll<'_>> {
        Ok(Template::compile(template)?.search_all(self.html()))
    }

    /// Every href in the view, de-duplicated. Anchors (when `skip_anchors`),
    /// `javascript:` and `mailto:` links are left out.
    fn links(&self) -> HashSet<String> {
        let skip_anchors = self.skip_anchors();
        self.select_elements(&ANCHOR, self.encoding())
            .iter()
            .filter_map(|anchor| anchor.attr("href"))
            .map(str::trim)
            .filter(|href| links::is_followable(href, skip_anchors))
            .map(str::to_string)
            .collect()
    }

    /// [`Parser::links`] resolved against [`Parser::base_url`].
    fn absolute_links(&self) -> HashSet<String> {
        let base = self.link_base();
        self.links()
            .iter()
            .map(|link| links::make_absolute(link, &base))
            .collect()
    }

    /// The `<base href>` as written if present, else the directory of
    /// [`Parser::url`].
    fn base_url(&self) -> String {
        let declared = self
            .document()
            .tree()
            .select(&BASE)
            .filter_map(|base| base.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())
            .map(str::to_string);

        declared.unwrap_or_else(|| links::directory_url(self.url()))
    }

    /// [`Parser::base_url`] made absolute against [`Parser::url`]; a relative
    /// `<base href>` is resolved here.
    fn link_base(&self) -> String {
        links::make_absolute(&self.base_url(), self.url())
    }
}
