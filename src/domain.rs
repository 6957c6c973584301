//! Domain module - documents and everything that can be asked of them
//!
//! Nothing here performs I/O; fetching and rendering live in the
//! application and infrastructure layers.

pub mod document;
pub mod element;
pub mod encoding;
pub mod links;
pub mod parser;
pub mod query;
pub mod sanitize;
pub mod template;
pub mod text;
pub mod xpath;

pub use document::{DEFAULT_NEXT_SYMBOL, DEFAULT_URL, Html};
pub use element::{AttrValue, Attrs, Element};
pub use parser::Parser;
pub use query::{FindOptions, XPathOptions};
pub use template::{SearchAll, SearchMatch, Template};
pub use xpath::XPathItem;
