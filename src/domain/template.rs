//! Search templates: literal text with `{}` placeholders.
//!
//! A template such as `"Python is a {} language"` or `"id={id:d}, name={name}"`
//! is compiled into a case-insensitive regular expression. Anonymous fields
//! become positional results, named fields become keyed results, `{{` and
//! `}}` stand for literal braces.
//!
//! Supported field types: none (shortest non-empty run), `d` (integer),
//! `f`/`g`/`e` (number), `w`/`W` (word / non-word), `s`/`S` (whitespace /
//! non-whitespace), `l` (letters).

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Index;
use std::str::FromStr;

use regex::{Captures, Regex};

use crate::error::{Error, Result};

const NUMBER_PATTERN: &str = r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?";

#[derive(Debug, Clone)]
enum Field {
    Fixed(String),
    Named { name: String, group: String },
}

/// A compiled search template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    regex: Regex,
    fields: Vec<Field>,
}

impl Template {
    pub fn compile(template: &str) -> Result<Self> {
        let mut pattern = String::from("(?is)");
        let mut fields = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut spec = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        spec.push(inner);
                    }
                    if !closed {
                        return Err(Error::invalid_template(template, "unclosed '{'"));
                    }

                    pattern.push_str(&regex::escape(&literal));
                    literal.clear();

                    let (name, kind) = spec.split_once(':').unwrap_or((spec.as_str(), ""));
                    let body = field_pattern(kind)
                        .ok_or_else(|| {
                            Error::invalid_template(template, format!("unknown field type '{kind}'"))
                        })?;
                    let name = name.trim();

                    if name.is_empty() {
                        let group = format!("f{}", fields.len());
                        pattern.push_str(&format!("(?P<{group}>{body})"));
                        fields.push(Field::Fixed(group));
                    } else {
                        if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
                            return Err(Error::invalid_template(
                                template,
                                format!("invalid field name '{name}'"),
                            ));
                        }
                        let group = format!("n{}", fields.len());
                        pattern.push_str(&format!("(?P<{group}>{body})"));
                        fields.push(Field::Named {
                            name: name.to_string(),
                            group,
                        });
                    }
                }
                '}' => return Err(Error::invalid_template(template, "single '}' encountered")),
                other => literal.push(other),
            }
        }
        pattern.push_str(&regex::escape(&literal));

        let regex = Regex::new(&pattern)
            .map_err(|e| Error::invalid_template(template, e.to_string()))?;

        Ok(Self {
            source: template.to_string(),
            regex,
            fields,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First match anywhere in `text`.
    #[must_use]
    pub fn search(&self, text: &str) -> Option<SearchMatch> {
        self.regex
            .captures(text)
            .map(|captures| self.to_match(&captures))
    }

    /// Lazy iterator over every non-overlapping match in `text`.
    #[must_use]
    pub fn search_all<'t>(&self, text: impl Into<Cow<'t, str>>) -> SearchAll<'t> {
        SearchAll {
            template: self.clone(),
            text: text.into(),
            position: 0,
        }
    }

    fn to_match(&self, captures: &Captures<'_>) -> SearchMatch {
        let mut fixed = Vec::new();
        let mut named = HashMap::new();
        for field in &self.fields {
            match field {
                Field::Fixed(group) => {
                    let value = captures.name(group).map_or("", |m| m.as_str());
                    fixed.push(value.to_string());
                }
                Field::Named { name, group } => {
                    let value = captures.name(group).map_or("", |m| m.as_str());
                    named
                        .entry(name.clone())
                        .or_insert_with(|| value.to_string());
                }
            }
        }
        let whole = captures.get(0).map_or(0..0, |m| m.range());

        SearchMatch {
            fixed,
            named,
            span: (whole.start, whole.end),
        }
    }
}

fn field_pattern(kind: &str) -> Option<&'static str> {
    match kind.trim() {
        "" => Some(".+?"),
        "d" => Some(r"[-+]?\d+"),
        "f" | "F" | "g" | "e" => Some(NUMBER_PATTERN),
        "w" => Some(r"\w+"),
        "W" => Some(r"\W+"),
        "s" => Some(r"\s+"),
        "S" => Some(r"\S+"),
        "l" => Some(r"[a-zA-Z]+"),
        _ => None,
    }
}

/// The captures of one template match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    fixed: Vec<String>,
    named: HashMap<String, String>,
    span: (usize, usize),
}

impl SearchMatch {
    /// Positional results in template order.
    #[must_use]
    pub fn fixed(&self) -> &[String] {
        &self.fixed
    }

    #[must_use]
    pub const fn named(&self) -> &HashMap<String, String> {
        &self.named
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fixed.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Byte range of the whole match within the searched text.
    #[must_use]
    pub const fn span(&self) -> (usize, usize) {
        self.span
    }

    /// Convert a named result, e.g. `m.parse::<u32>("id")`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.name(name).and_then(|value| value.trim().parse().ok())
    }
}

impl Index<usize> for SearchMatch {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.fixed[index]
    }
}

impl Index<&str> for SearchMatch {
    type Output = str;

    fn index(&self, name: &str) -> &str {
        &self.named[name]
    }
}

/// Iterator returned by [`Template::search_all`]. Each call to
/// `search_all` starts a fresh scan.
#[derive(Debug)]
pub struct SearchAll<'t> {
    template: Template,
    text: Cow<'t, str>,
    position: usize,
}

impl Iterator for SearchAll<'_> {
    type Item = SearchMatch;

    fn next(&mut self) -> Option<SearchMatch> {
        if self.position > self.text.len() {
            return None;
        }
        let captures = self.template.regex.captures_at(&self.text, self.position)?;
        let whole = captures.get(0)?;

        self.position = if whole.end() > whole.start() {
            whole.end()
        } else {
            // step past the character after an empty match
            whole.end()
                + self.text[whole.end()..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8)
        };

        Some(self.template.to_match(&captures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_field() {
        let template = Template::compile("Python is a {} language").unwrap();
        let found = template
            .search("<p>Python is a programming language that lets you work quickly</p>")
            .unwrap();
        assert_eq!(&found[0], "programming");
    }

    #[test]
    fn test_named_and_typed_fields() {
        let template = Template::compile("id={id:d}, name={name}!").unwrap();
        let found = template.search("record id=42, name=Ferris!").unwrap();
        assert_eq!(found.parse::<u32>("id"), Some(42));
        assert_eq!(&found["name"], "Ferris");
        assert!(found.fixed().is_empty());
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let template = Template::compile("hello {}!").unwrap();
        assert_eq!(template.search("HELLO World!").unwrap().get(0), Some("World"));
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let template = Template::compile("{{{}}}").unwrap();
        assert_eq!(template.search("x {abc} y").unwrap().get(0), Some("abc"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let template = Template::compile("missing {} text").unwrap();
        assert!(template.search("nothing relevant here").is_none());
    }

    #[test]
    fn test_search_all_is_restartable() {
        let template = Template::compile("<li>{}</li>").unwrap();
        let text = "<ul><li>a</li><li>b</li><li>c</li></ul>";

        let values: Vec<String> = template
            .search_all(text)
            .map(|m| m.fixed()[0].clone())
            .collect();
        assert_eq!(values, ["a", "b", "c"]);

        let mut again = template.search_all(text);
        assert_eq!(again.next().unwrap().get(0), Some("a"));
    }

    #[test]
    fn test_invalid_templates_are_rejected() {
        assert!(matches!(
            Template::compile("open {"),
            Err(Error::InvalidTemplate { .. })
        ));
        assert!(Template::compile("stray } brace").is_err());
        assert!(Template::compile("{x:q}").is_err());
    }
}
