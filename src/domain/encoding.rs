//! Encoding & source resolution for raw markup.
//!
//! Resolution order: byte-order mark, then an in-document declaration
//! (`<meta charset>`, `http-equiv` content type or an XML prolog), then the
//! caller-supplied default. A declared encoding that fails a strict decode
//! falls back to the default and the fallback is recorded.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use tracing::{debug, warn};

/// Encoding used when nothing better is known.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Declarations are only honoured near the top of the document.
const SNIFF_WINDOW: usize = 4096;

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
        .expect("meta charset pattern is valid")
});

static XML_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*<\?xml[^>]+encoding\s*=\s*["']([a-z0-9_:.\-]+)["']"#)
        .expect("xml declaration pattern is valid")
});

/// Outcome of resolving the encoding of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEncoding {
    encoding: &'static Encoding,
    name: String,
    fell_back: bool,
}

impl ResolvedEncoding {
    fn new(encoding: &'static Encoding, fell_back: bool) -> Self {
        Self {
            encoding,
            name: encoding.name().to_ascii_lowercase(),
            fell_back,
        }
    }

    /// An explicitly chosen encoding; never a fallback.
    #[must_use]
    pub fn fixed(encoding: &'static Encoding) -> Self {
        Self::new(encoding, false)
    }

    #[must_use]
    pub const fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Lower-case WHATWG name, e.g. `utf-8` or `windows-1252`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the detected encoding could not decode the bytes and the
    /// default was used instead.
    #[must_use]
    pub const fn fell_back(&self) -> bool {
        self.fell_back
    }
}

/// Look up an encoding by any WHATWG label (`utf8`, `latin1`, `Shift_JIS`...).
#[must_use]
pub fn lookup(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Detect an encoding from a BOM or an in-document declaration.
#[must_use]
pub fn sniff(raw: &[u8]) -> Option<&'static Encoding> {
    if let Some((encoding, _)) = Encoding::for_bom(raw) {
        return Some(encoding);
    }

    let window = &raw[..raw.len().min(SNIFF_WINDOW)];
    [&*XML_DECLARATION, &*META_CHARSET]
        .into_iter()
        .filter_map(|pattern| pattern.captures(window))
        .filter_map(|captures| captures.get(1))
        .find_map(|label| Encoding::for_label(label.as_bytes()))
}

/// Resolve which encoding should be used to decode `raw`.
#[must_use]
pub fn resolve(raw: &[u8], default_label: &str) -> ResolvedEncoding {
    let default = lookup(default_label).unwrap_or_else(|| {
        warn!("Unknown default encoding '{}', using utf-8", default_label);
        UTF_8
    });

    let Some(detected) = sniff(raw) else {
        return ResolvedEncoding::new(default, false);
    };

    if detected == default || decodes_cleanly(raw, detected) {
        debug!("Resolved document encoding: {}", detected.name());
        return ResolvedEncoding::new(detected, false);
    }

    warn!(
        "Document declares {} but is not valid in it; falling back to {}",
        detected.name(),
        default.name()
    );
    ResolvedEncoding::new(default, true)
}

fn decodes_cleanly(raw: &[u8], encoding: &'static Encoding) -> bool {
    let body = strip_bom(raw, encoding);
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .is_some()
}

fn strip_bom<'a>(raw: &'a [u8], encoding: &'static Encoding) -> &'a [u8] {
    match Encoding::for_bom(raw) {
        Some((bom_encoding, length)) if bom_encoding == encoding => &raw[length..],
        _ => raw,
    }
}

/// Decode with replacement characters for any malformed sequence.
#[must_use]
pub fn decode<'a>(raw: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    let (text, _had_errors) = encoding.decode_without_bom_handling(strip_bom(raw, encoding));
    text
}

/// Encode text back into bytes. Encodings that cannot be produced
/// (UTF-16 variants, `replacement`) encode as UTF-8.
#[must_use]
pub fn encode<'a>(text: &'a str, encoding: &'static Encoding) -> Cow<'a, [u8]> {
    let (bytes, _used, _had_unmappable) = encoding.encode(text);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, WINDOWS_1252};
    use rstest::rstest;

    #[test]
    fn test_defaults_to_utf8_without_declaration() {
        let resolved = resolve(b"<html><body>plain</body></html>", DEFAULT_ENCODING);
        assert_eq!(resolved.name(), "utf-8");
        assert!(!resolved.fell_back());
    }

    #[rstest]
    #[case(r#"<meta charset="iso-8859-1">"#, "windows-1252")]
    #[case(r#"<META CHARSET=shift_jis>"#, "shift_jis")]
    #[case(
        r#"<meta http-equiv="Content-Type" content="text/html; charset=windows-1252">"#,
        "windows-1252"
    )]
    #[case(r#"<?xml version="1.0" encoding="ISO-8859-1"?><html/>"#, "windows-1252")]
    fn test_sniffs_declared_encoding(#[case] markup: &str, #[case] expected: &str) {
        let resolved = resolve(markup.as_bytes(), DEFAULT_ENCODING);
        assert_eq!(resolved.name(), expected);
    }

    #[test]
    fn test_bom_wins_over_declaration() {
        let mut raw = vec![0xEF, 0xBB, 0xBF];
        raw.extend_from_slice(br#"<meta charset="shift_jis"><p>x</p>"#);
        assert_eq!(sniff(&raw), Some(UTF_8));
    }

    #[test]
    fn test_invalid_declared_encoding_falls_back_to_default() {
        // Declares UTF-8 while the bytes are latin-1; default is windows-1252.
        let raw = b"<meta charset=\"utf-8\"><p>caf\xe9</p>";
        let resolved = resolve(raw, "windows-1252");
        assert_eq!(resolved.encoding(), WINDOWS_1252);
        assert!(resolved.fell_back());
        assert_eq!(decode(raw, resolved.encoding()), "<meta charset=\"utf-8\"><p>café</p>");
    }

    #[test]
    fn test_unknown_default_label_uses_utf8() {
        let resolved = resolve(b"<p>x</p>", "no-such-charset");
        assert_eq!(resolved.encoding(), UTF_8);
    }

    #[test]
    fn test_encode_round_trips_legacy_text() {
        let bytes = encode("テスト", SHIFT_JIS);
        assert_eq!(decode(&bytes, SHIFT_JIS), "テスト");
    }
}
