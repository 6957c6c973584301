//! Document and element views over fixture markup.

use proptest::prelude::*;
use rstest::rstest;
use url::Url;

use htmlx::{FindOptions, Html, Parser, XPathItem, XPathOptions};

const STORE: &str = r##"<!DOCTYPE html>
<html>
<head>
  <title>Store</title>
  <style>.price { color: red }</style>
  <script>window.analytics = "<p>tracking</p>";</script>
</head>
<body>
  <ul id="products">
    <li class="product"><a href="/p/1">Apple pie</a> <span class="price">$3</span></li>
    <li class="product"><a href="/p/2">Banana bread</a> <span class="price">$4</span></li>
    <li class="product"><a href="p/3?ref=list">Apple crumble</a> <span class="price">$5</span></li>
  </ul>
  <div id="promo" onmouseover="track()">
    <style>#promo { display: none }</style>
    <script>document.write("promo")</script>
    <p>Weekly <b>deals</b></p>
  </div>
  <footer><a href="https://elsewhere.org/">Partner</a> <a href="#top">Top</a></footer>
</body>
</html>"##;

fn store() -> Html {
    Html::new(STORE).with_url("https://shop.example.com/catalog/list.html")
}

#[test]
fn containing_keeps_document_order() {
    let doc = store();
    let apples = doc
        .find_with("li", &FindOptions::new().containing(["apple"]))
        .unwrap();
    let names: Vec<String> = apples
        .iter()
        .map(|li| li.find_first("a").unwrap().unwrap().text())
        .collect();
    assert_eq!(names, ["Apple pie", "Apple crumble"]);
}

#[test]
fn clean_results_have_no_script_or_style() {
    let doc = store();
    let promo = doc
        .find_with("#promo", &FindOptions::new().clean(true))
        .unwrap()
        .remove(0);
    let markup = promo.html();
    assert!(!markup.contains("<script"));
    assert!(!markup.contains("<style"));
    assert!(!markup.contains("onmouseover"));
    assert!(markup.contains("<b>deals</b>"));

    let raw = String::from_utf8(promo.raw_html().into_owned()).unwrap();
    assert!(!raw.contains("document.write"));
}

#[test]
fn clean_xpath_results_are_cleaned_too() {
    let doc = store();
    let items = doc
        .xpath_with("//div[@id='promo']", &XPathOptions::new().clean(true))
        .unwrap();
    let promo = items[0].as_element().unwrap();
    assert!(!promo.html().contains("<script"));
}

#[test]
fn absolute_links_resolve_against_the_page_directory() {
    let doc = store();
    let mut links: Vec<String> = doc.absolute_links().into_iter().collect();
    links.sort();
    assert_eq!(
        links,
        [
            "https://elsewhere.org/",
            "https://shop.example.com/catalog/p/3?ref=list",
            "https://shop.example.com/p/1",
            "https://shop.example.com/p/2",
        ]
    );
}

#[rstest]
#[case("https://cdn.example.net/assets/")]
#[case("https://cdn.example.net/assets/index.html")]
fn base_tag_wins_over_page_url(#[case] base: &str) {
    let doc = Html::new(format!(
        r#"<html><head><base href="{base}"></head><body><a href="img/logo.png">logo</a></body></html>"#
    ))
    .with_url("https://shop.example.com/catalog/list.html");
    assert_eq!(doc.base_url(), base);
    let expected = Url::parse(base).unwrap().join("img/logo.png").unwrap();
    assert!(doc.absolute_links().contains(expected.as_str()));
}

#[test]
fn relative_base_tag_is_kept_as_written_and_resolved_for_links() {
    let doc = Html::new(
        r#"<html><head><base href="/static/"></head><body><a href="img/logo.png">logo</a></body></html>"#,
    )
    .with_url("https://example.com/a/page.html");
    assert_eq!(doc.base_url(), "/static/");
    assert!(doc
        .absolute_links()
        .contains("https://example.com/static/img/logo.png"));
}

#[test]
fn find_first_with_applies_containing_and_clean() {
    let doc = store();
    let options = FindOptions::new().containing(["crumble"]).clean(true);
    let item = doc.find_first_with("li", &options).unwrap().unwrap();
    assert!(item.text().contains("Apple crumble"));
}

#[test]
fn xpath_returns_nodes_and_text() {
    let doc = store();
    let prices = doc.xpath("//span[@class='price']/text()").unwrap();
    let prices: Vec<&str> = prices.iter().filter_map(XPathItem::as_text).collect();
    assert_eq!(prices, ["$3", "$4", "$5"]);

    let first = doc.xpath_first("//li[2]").unwrap().unwrap();
    assert!(first.as_element().unwrap().text().contains("Banana bread"));
}

#[test]
fn search_templates_over_markup() {
    let doc = store();
    let found = doc.search("<title>{}</title>").unwrap().unwrap();
    assert_eq!(&found[0], "Store");

    let prices: Vec<u32> = doc
        .search_all(r#"<span class="price">${price:d}</span>"#)
        .unwrap()
        .map(|m| m.parse::<u32>("price").unwrap())
        .collect();
    assert_eq!(prices, [3, 4, 5]);
}

#[test]
fn text_skips_scripts_and_styles() {
    let text = store().text();
    assert!(text.contains("Apple pie"));
    assert!(!text.contains("analytics"));
    assert!(!text.contains("color: red"));
}

fn path_segment() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn href() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::collection::vec(path_segment(), 1..4).prop_map(|parts| parts.join("/")),
        prop::collection::vec(path_segment(), 1..4).prop_map(|parts| format!("/{}", parts.join("/"))),
        (path_segment(), path_segment()).prop_map(|(a, b)| format!("../{a}?q={b}")),
        path_segment().prop_map(|host| format!("//{host}.example.net/x")),
        path_segment().prop_map(|host| format!("https://{host}.example.org/")),
    ]
}

proptest! {
    #[test]
    fn every_absolute_link_has_scheme_and_host(hrefs in prop::collection::vec(href(), 1..8)) {
        let anchors: String = hrefs
            .iter()
            .map(|href| format!(r#"<a href="{href}">x</a>"#))
            .collect();
        let doc = Html::new(format!("<html><body>{anchors}</body></html>"))
            .with_url("https://site.example.com/a/b/page.html");

        for link in doc.absolute_links() {
            let parsed = Url::parse(&link).unwrap();
            prop_assert!(!parsed.scheme().is_empty());
            prop_assert!(parsed.host_str().is_some());
        }
    }
}
