//! Link Resolver: turns hrefs found in a document into absolute URLs.

use url::Url;

/// Resolve `link` against `base`.
///
/// - a link that already has a scheme and host is returned unchanged
/// - a scheme-relative link (`//host/path`) takes the base's scheme
/// - anything else is joined onto the base
///
/// If the base itself cannot be parsed the link is returned as-is.
#[must_use]
pub fn make_absolute(link: &str, base: &str) -> String {
    if let Ok(parsed) = Url::parse(link) {
        if parsed.has_host() {
            return link.to_string();
        }
    }

    let Ok(base) = Url::parse(base) else {
        return link.to_string();
    };

    if link.starts_with("//") {
        return format!("{}:{}", base.scheme(), link);
    }

    base.join(link)
        .map_or_else(|_| link.to_string(), |joined| joined.to_string())
}

/// The "directory" of a URL: everything after the last `/` of the path is
/// dropped while query and fragment are kept.
#[must_use]
pub fn directory_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.cannot_be_a_base() {
        return url.to_string();
    }

    let directory = match parsed.path().rfind('/') {
        Some(index) => parsed.path()[..=index].to_string(),
        None => "/".to_string(),
    };
    parsed.set_path(&directory);
    parsed.to_string()
}

/// Whether an href is worth reporting as a link.
#[must_use]
pub fn is_followable(href: &str, skip_anchors: bool) -> bool {
    if skip_anchors && href.starts_with('#') {
        return false;
    }
    let lowered = href.to_ascii_lowercase();
    !(lowered.starts_with("javascript:") || lowered.starts_with("mailto:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("/about", "https://example.com/a/b.html", "https://example.com/about")]
    #[case("c.html", "https://example.com/a/b.html", "https://example.com/a/c.html")]
    #[case("?page=2", "https://example.com/list?page=1", "https://example.com/list?page=2")]
    #[case("//cdn.example.com/x.js", "https://example.com/", "https://cdn.example.com/x.js")]
    #[case("//cdn.example.com/x.js", "http://example.com/", "http://cdn.example.com/x.js")]
    #[case("https://other.org/Path?q=1", "https://example.com/", "https://other.org/Path?q=1")]
    fn test_make_absolute(#[case] link: &str, #[case] base: &str, #[case] expected: &str) {
        assert_eq!(make_absolute(link, base), expected);
    }

    #[test]
    fn test_make_absolute_keeps_link_when_base_is_unusable() {
        assert_eq!(make_absolute("/x", "not a url"), "/x");
    }

    #[rstest]
    #[case("https://example.com/a/b/c.html", "https://example.com/a/b/")]
    #[case("https://example.com/a/b/", "https://example.com/a/b/")]
    #[case("https://example.com", "https://example.com/")]
    #[case("https://example.com/a/page?x=1#top", "https://example.com/a/?x=1#top")]
    fn test_directory_url(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(directory_url(url), expected);
    }

    #[rstest]
    #[case("#top", true, false)]
    #[case("#top", false, true)]
    #[case("javascript:void(0)", false, false)]
    #[case("JavaScript:alert(1)", false, false)]
    #[case("mailto:someone@example.com", false, false)]
    #[case("/docs", true, true)]
    fn test_is_followable(#[case] href: &str, #[case] skip: bool, #[case] expected: bool) {
        assert_eq!(is_followable(href, skip), expected);
    }

    proptest! {
        #[test]
        fn prop_resolution_is_idempotent(
            segments in proptest::collection::vec("[a-z0-9]{1,8}", 0..4),
            leading in prop_oneof![Just(""), Just("/"), Just("../"), Just("./")],
            query in proptest::option::of("[a-z]{1,5}=[0-9]{1,3}"),
        ) {
            let base = "https://example.com/dir/sub/index.html";
            let mut link = format!("{leading}{}", segments.join("/"));
            if let Some(query) = query {
                link.push('?');
                link.push_str(&query);
            }

            let once = make_absolute(&link, base);
            let twice = make_absolute(&once, base);
            prop_assert_eq!(&once, &twice);

            let resolved = Url::parse(&once).expect("resolved link parses");
            prop_assert_eq!(resolved.scheme(), "https");
            prop_assert_eq!(resolved.host_str(), Some("example.com"));
        }

        #[test]
        fn prop_absolute_links_are_preserved(
            host in "[a-z]{1,10}\\.(com|org|net)",
            path in "(/[a-zA-Z0-9_-]{1,6}){0,3}",
        ) {
            let link = format!("http://{host}{path}");
            prop_assert_eq!(make_absolute(&link, "https://example.com/a/"), link);
        }
    }
}
