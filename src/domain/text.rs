//! Text extraction.
//!
//! `visible_text` approximates what a reader sees: scripts, styles and
//! templates are skipped, runs of whitespace collapse to a single space and
//! block-level elements start new lines. `full_text` is the raw text content
//! of every descendant text node.

use ego_tree::NodeRef;
use scraper::{ElementRef, Node};

use crate::domain::sanitize;

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "dd", "details", "dialog",
    "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "head", "header", "hgroup", "hr", "html", "li", "main", "nav", "ol",
    "option", "p", "pre", "section", "summary", "table", "tbody", "td", "tfoot", "th", "thead",
    "title", "tr", "ul",
];

const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

/// Visible text of `root`. When `cleaned` is set, elements removed by
/// cleaning are skipped as well.
#[must_use]
pub fn visible_text(root: ElementRef<'_>, cleaned: bool) -> String {
    let mut lines = LineBuffer::default();
    collect_visible(*root, cleaned, &mut lines);
    lines.finish()
}

/// Concatenated text of all descendant text nodes, untouched.
#[must_use]
pub fn full_text(root: ElementRef<'_>, cleaned: bool) -> String {
    if !cleaned {
        return root.text().collect();
    }
    let mut out = String::new();
    collect_raw(*root, &mut out);
    out
}

fn collect_raw(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(text),
        Node::Element(element) if sanitize::is_stripped(element) => {}
        _ => {
            for child in node.children() {
                collect_raw(child, out);
            }
        }
    }
}

fn collect_visible(node: NodeRef<'_, Node>, cleaned: bool, lines: &mut LineBuffer) {
    match node.value() {
        Node::Text(text) => lines.push_text(text),
        Node::Element(element) => {
            let name = element.name();
            if INVISIBLE_ELEMENTS.contains(&name) || (cleaned && sanitize::is_stripped(element)) {
                return;
            }
            if name == "br" {
                lines.break_line();
                return;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                lines.break_line();
            }
            for child in node.children() {
                collect_visible(child, cleaned, lines);
            }
            if block {
                lines.break_line();
            }
        }
        Node::Document | Node::Fragment => {
            for child in node.children() {
                collect_visible(child, cleaned, lines);
            }
        }
        _ => {}
    }
}

#[derive(Default)]
struct LineBuffer {
    lines: Vec<String>,
    current: String,
    pending_space: bool,
}

impl LineBuffer {
    fn push_text(&mut self, text: &str) {
        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for word in text.split_whitespace() {
            if self.pending_space && !self.current.is_empty() {
                self.current.push(' ');
            }
            self.current.push_str(word);
            self.pending_space = true;
        }
        if !text.ends_with(char::is_whitespace) && !text.trim().is_empty() {
            self.pending_space = false;
        }
    }

    fn break_line(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(std::mem::take(&mut self.current));
        }
        self.pending_space = false;
    }

    fn finish(mut self) -> String {
        self.break_line();
        self.lines.join("\n")
    }
}
