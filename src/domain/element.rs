//! Element view: one element of a parsed document.
//!
//! An element borrows its node from the owning [`Html`] tree, so it can never
//! outlive the document it was found in.

use std::borrow::Cow;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;

use scraper::{ElementRef, Selector};

use crate::domain::document::Html;
use crate::domain::parser::Parser;
use crate::domain::{sanitize, text};

/// Attributes whose values are whitespace-separated token lists.
const TOKEN_ATTRIBUTES: &[&str] = &["class", "rel"];

/// An attribute value; `class` and `rel` are split into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Single(String),
    Tokens(Vec<String>),
}

impl AttrValue {
    #[must_use]
    pub fn contains_token(&self, token: &str) -> bool {
        match self {
            Self::Single(value) => value == token,
            Self::Tokens(tokens) => tokens.iter().any(|t| t == token),
        }
    }

    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Tokens(_) => None,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Tokens(tokens) => tokens.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => f.write_str(value),
            Self::Tokens(tokens) => f.write_str(&tokens.join(" ")),
        }
    }
}

pub type Attrs = BTreeMap<String, AttrValue>;

pub struct Element<'a> {
    node: ElementRef<'a>,
    doc: &'a Html,
    encoding: String,
    cleaned: Option<String>,
    attrs: OnceCell<Attrs>,
}

impl<'a> Element<'a> {
    pub(crate) fn new(node: ElementRef<'a>, doc: &'a Html, encoding: &str) -> Self {
        Self {
            node,
            doc,
            encoding: encoding.to_string(),
            cleaned: None,
            attrs: OnceCell::new(),
        }
    }

    /// Tag name, lower-case.
    #[must_use]
    pub fn tag(&self) -> &'a str {
        self.node.value().name()
    }

    /// Raw value of a single attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.node.value().attr(name)
    }

    /// All attributes, built on first access.
    pub fn attrs(&self) -> &Attrs {
        self.attrs.get_or_init(|| {
            self.node
                .value()
                .attrs()
                .map(|(name, value)| {
                    let value = if TOKEN_ATTRIBUTES.contains(&name) {
                        AttrValue::Tokens(value.split_whitespace().map(str::to_string).collect())
                    } else {
                        AttrValue::Single(value.to_string())
                    };
                    (name.to_string(), value)
                })
                .collect()
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = &'a str> {
        self.node.value().classes()
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    #[must_use]
    pub fn inner_html(&self) -> String {
        self.node.inner_html()
    }

    /// Underlying tree node, for direct use with `scraper`.
    #[must_use]
    pub const fn node(&self) -> ElementRef<'a> {
        self.node
    }

    /// Strip scripts, styles and event handlers from this view.
    pub fn clean(&mut self) {
        if self.cleaned.is_none() {
            self.cleaned = Some(sanitize::clean_html(self.node));
        }
    }

    #[must_use]
    pub const fn is_cleaned(&self) -> bool {
        self.cleaned.is_some()
    }
}

impl Parser for Element<'_> {
    fn url(&self) -> &str {
        self.doc.url()
    }

    fn html(&self) -> Cow<'_, str> {
        match &self.cleaned {
            Some(cleaned) => Cow::Borrowed(cleaned),
            None => Cow::Owned(self.node.html()),
        }
    }

    fn encoding(&self) -> &str {
        &self.encoding
    }

    fn skip_anchors(&self) -> bool {
        self.doc.skip_anchors()
    }

    fn text(&self) -> String {
        text::visible_text(self.node, self.is_cleaned())
    }

    fn full_text(&self) -> String {
        text::full_text(self.node, self.is_cleaned())
    }

    fn document(&self) -> &Html {
        self.doc
    }

    fn context_node(&self) -> Option<ElementRef<'_>> {
        Some(self.node)
    }

    fn select_elements(&self, selector: &Selector, encoding: &str) -> Vec<Element<'_>> {
        let cleaned = self.is_cleaned();
        self.node
            .select(selector)
            .filter(|found| !cleaned || !sanitize::is_hidden_within(*found, self.node))
            .map(|found| Element::new(found, self.doc, encoding))
            .collect()
    }
}

impl fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Element '{}'", self.tag())?;
        for (name, value) in self.attrs() {
            match value {
                AttrValue::Single(value) => write!(f, " {name}='{value}'")?,
                AttrValue::Tokens(tokens) => write!(f, " {name}={tokens:?}")?,
            }
        }
        f.write_str(">")
    }
}
