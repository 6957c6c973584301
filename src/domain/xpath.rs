//! XPath evaluation.
//!
//! XPath runs against a second tree built from the same decoded markup by
//! `sxd_html`. Element results are mapped back onto the CSS tree through
//! their path of element-child indices, so callers always get the same
//! [`Element`] type that `find` produces.

use scraper::ElementRef;
use sxd_xpath::nodeset::Node as XPathNode;
use sxd_xpath::{Context, Factory, Value};
use tracing::warn;

use crate::domain::document::Html;
use crate::domain::element::Element;
use crate::error::{Error, Result};

/// One XPath result.
pub enum XPathItem<'a> {
    Node(Element<'a>),
    Text(String),
}

impl<'a> XPathItem<'a> {
    #[must_use]
    pub const fn as_element(&self) -> Option<&Element<'a>> {
        match self {
            Self::Node(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn into_element(self) -> Option<Element<'a>> {
        match self {
            Self::Node(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Node(_) => None,
        }
    }
}

impl std::fmt::Debug for XPathItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(element) => element.fmt(f),
            Self::Text(text) => write!(f, "{text:?}"),
        }
    }
}

pub(crate) fn evaluate<'a>(
    doc: &'a Html,
    context: Option<ElementRef<'a>>,
    expression: &str,
    encoding: &str,
) -> Result<Vec<XPathItem<'a>>> {
    let compiled = Factory::new()
        .build(expression)
        .map_err(|e| Error::invalid_xpath(expression, format!("{e:?}")))?
        .ok_or_else(|| Error::invalid_xpath(expression, "expression is empty"))?;

    let package = doc.xpath_package();
    let document = package.as_document();
    let root = XPathNode::from(document.root());

    let start = match context {
        None => root,
        Some(element) => descend(root, &css_path(element)).ok_or_else(|| {
            Error::invalid_xpath(expression, "context element is missing from the XPath tree")
        })?,
    };

    let value = compiled
        .evaluate(&Context::new(), start)
        .map_err(|e| Error::invalid_xpath(expression, format!("{e:?}")))?;

    let items = match value {
        Value::Nodeset(nodes) => nodes
            .document_order()
            .into_iter()
            .map(|node| to_item(doc, node, encoding))
            .collect(),
        Value::String(text) => vec![XPathItem::Text(text)],
        Value::Number(number) => vec![XPathItem::Text(format_number(number))],
        Value::Boolean(flag) => vec![XPathItem::Text(flag.to_string())],
    };
    Ok(items)
}

fn to_item<'a>(doc: &'a Html, node: XPathNode<'_>, encoding: &str) -> XPathItem<'a> {
    if node.element().is_some() {
        let path = xpath_path(node);
        if let Some(found) = resolve_css_path(doc, &path) {
            return XPathItem::Node(Element::new(found, doc, encoding));
        }
        warn!("XPath element at {:?} has no counterpart in the CSS tree", path);
    }
    XPathItem::Text(node.string_value())
}

fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{number:.0}")
    } else {
        number.to_string()
    }
}

/// Element-child indices from the document root down to `element`.
fn css_path(element: ElementRef<'_>) -> Vec<usize> {
    let mut path = Vec::new();
    let mut node = *element;
    loop {
        path.push(node.prev_siblings().filter(|s| s.value().is_element()).count());
        match node.parent() {
            Some(parent) if parent.value().is_element() => node = parent,
            _ => break,
        }
    }
    path.reverse();
    path
}

fn resolve_css_path<'a>(doc: &'a Html, path: &[usize]) -> Option<ElementRef<'a>> {
    let mut node = doc.tree().tree.root();
    for &index in path {
        node = node
            .children()
            .filter(|child| child.value().is_element())
            .nth(index)?;
    }
    ElementRef::wrap(node)
}

fn xpath_path(node: XPathNode<'_>) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = node;
    while let Some(parent) = current.parent() {
        let index = parent
            .children()
            .into_iter()
            .take_while(|child| *child != current)
            .filter(|child| child.element().is_some())
            .count();
        path.push(index);
        current = parent;
    }
    path.reverse();
    path
}

fn descend<'d>(root: XPathNode<'d>, path: &[usize]) -> Option<XPathNode<'d>> {
    let mut node = root;
    for &index in path {
        node = node
            .children()
            .into_iter()
            .filter(|child| child.element().is_some())
            .nth(index)?;
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use crate::domain::document::Html;
    use crate::domain::parser::Parser;

    const PAGE: &str = r#"<html><head><title>T</title></head><body>
        <ul id="list"><li class="item">one</li><li class="item">two</li></ul>
        <a href="/about">About</a>
    </body></html>"#;

    #[test]
    fn test_node_results_are_elements() {
        let doc = Html::new(PAGE);
        let items = doc.xpath("//li").unwrap();
        let texts: Vec<String> = items
            .iter()
            .map(|item| item.as_element().unwrap().text())
            .collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[test]
    fn test_attribute_and_scalar_results_are_text() {
        let doc = Html::new(PAGE);
        let href = doc.xpath_first("//a/@href").unwrap().unwrap();
        assert_eq!(href.as_text(), Some("/about"));

        let count = doc.xpath("count(//li)").unwrap();
        assert_eq!(count[0].as_text(), Some("2"));
    }

    #[test]
    fn test_relative_to_element() {
        let doc = Html::new(PAGE);
        let list = doc.find_first("#list").unwrap().unwrap();
        let items = list.xpath("./li[2]").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_element().unwrap().text(), "two");
    }

    #[test]
    fn test_invalid_expression_is_an_error() {
        let doc = Html::new(PAGE);
        assert!(doc.xpath("//li[").is_err());
    }
}
