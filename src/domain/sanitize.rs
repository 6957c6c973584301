//! Markup cleaning used by `clean` find/xpath results.
//!
//! Removes `<script>`, `<style>`, stylesheet `<link>` elements and comments,
//! drops inline event handlers, `style` attributes and `javascript:` URLs,
//! and serializes what remains.

use ego_tree::NodeRef;
use scraper::node::Element as ElementData;
use scraper::{ElementRef, Node};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction"];

/// Elements that are removed entirely, together with their content.
#[must_use]
pub fn is_stripped(element: &ElementData) -> bool {
    match element.name() {
        "script" | "style" => true,
        "link" => element
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet"))),
        _ => false,
    }
}

/// True if `node` or one of its ancestors, up to and including `scope`,
/// is a stripped element.
#[must_use]
pub fn is_hidden_within(node: ElementRef<'_>, scope: ElementRef<'_>) -> bool {
    if is_stripped(node.value()) {
        return true;
    }
    for ancestor in node.ancestors() {
        if let Some(element) = ancestor.value().as_element() {
            if is_stripped(element) {
                return true;
            }
        }
        if ancestor.id() == scope.id() {
            break;
        }
    }
    false
}

fn keeps_attribute(name: &str, value: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    if lowered.starts_with("on") || lowered == "style" {
        return false;
    }
    if URL_ATTRIBUTES.contains(&lowered.as_str()) {
        let target: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        return !target.to_ascii_lowercase().starts_with("javascript:");
    }
    true
}

/// Serialize an element with scripts, styles, comments and event handlers removed.
#[must_use]
pub fn clean_html(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    if !is_stripped(element.value()) {
        write_node(&mut out, *element);
    }
    out
}

fn write_node(out: &mut String, node: NodeRef<'_, Node>) {
    match node.value() {
        Node::Element(element) => {
            if is_stripped(element) {
                return;
            }
            let name = element.name();
            out.push('<');
            out.push_str(name);
            for (attr, value) in element.attrs() {
                if keeps_attribute(attr, value) {
                    out.push(' ');
                    out.push_str(attr);
                    out.push_str("=\"");
                    push_escaped(out, value, true);
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            for child in node.children() {
                write_node(out, child);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Node::Text(text) => push_escaped(out, text, false),
        Node::Document | Node::Fragment => {
            for child in node.children() {
                write_node(out, child);
            }
        }
        Node::Comment(_) | Node::Doctype(_) | Node::ProcessingInstruction(_) => {}
    }
}

fn push_escaped(out: &mut String, text: &str, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(css).unwrap()).next().unwrap()
    }

    #[test]
    fn test_clean_strips_scripts_styles_and_comments() {
        let doc = Html::parse_document(
            r#"<div id="c"><style>p{}</style><p onclick="x()" style="color:red">Hi<!-- note --></p><script>alert(1)</script></div>"#,
        );
        let cleaned = clean_html(first(&doc, "#c"));
        assert_eq!(cleaned, r#"<div id="c"><p>Hi</p></div>"#);
    }

    #[test]
    fn test_clean_drops_javascript_urls_and_stylesheets() {
        let doc = Html::parse_document(
            r#"<div id="c"><link rel="stylesheet" href="a.css"><a href=" javascript:void(0)">x</a><a href="/ok">y</a><br></div>"#,
        );
        let cleaned = clean_html(first(&doc, "#c"));
        assert_eq!(cleaned, r#"<div id="c"><a>x</a><a href="/ok">y</a><br></div>"#);
    }

    #[test]
    fn test_hidden_within_scope() {
        let doc = Html::parse_document("<div id=\"c\"><script><b>x</b></script><i>y</i></div>");
        let scope = first(&doc, "#c");
        let italic = first(&doc, "i");
        assert!(!is_hidden_within(italic, scope));
        assert!(is_stripped(first(&doc, "script").value()));
    }
}
