//! HTML parser for extracting article links
//!
//! Only intra-wiki article links count as graph edges.
//!
//! **Include:**
//! - `<a href="/wiki/...">` anchors
//!
//! **Exclude:**
//! - Namespaced pages (`File:`, `Category:`, `Special:`, ...), i.e. anything with a `:`
//! - `Main_Page`
//! - Links back to the article itself
//! - External, relative and fragment-only links
//! - `.` and `..`, which resolve to a directory rather than an article

use scraper::{Html, Selector};
use std::collections::HashSet;

const ARTICLE_PREFIX: &str = "/wiki/";
const MAIN_PAGE: &str = "Main_Page";

/// Extracts the deduplicated article identifiers linked from `html`
///
/// Identifiers keep their original (percent-encoded) form and are returned in
/// first-seen order. Fragments and query strings are dropped, so
/// `/wiki/Beat_Generation#History` yields `Beat_Generation`.
///
/// # Example
///
/// ```
/// use wiki_ripple::crawler::extract_article_links;
///
/// let html = r#"<a href="/wiki/Jack_Kerouac">Kerouac</a><a href="/wiki/File:Road.jpg">img</a>"#;
/// assert_eq!(extract_article_links(html, "Neal_Cassady"), vec!["Jack_Kerouac"]);
/// ```
pub fn extract_article_links(html: &str, identifier: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(target) = article_target(href, identifier) {
            if seen.insert(target.to_string()) {
                links.push(target.to_string());
            }
        }
    }

    links
}

/// True for `.` and `..`, including percent-encoded dots
///
/// URL resolution treats these as relative path steps, so they would point at
/// the wiki root or above it instead of at an article.
pub(crate) fn is_dot_segment(identifier: &str) -> bool {
    let decoded = identifier.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Maps an `href` to the article it points at, if it is a followable article link
fn article_target<'a>(href: &'a str, identifier: &str) -> Option<&'a str> {
    let rest = href.strip_prefix(ARTICLE_PREFIX)?;
    let end = rest.find(['#', '?']).unwrap_or(rest.len());
    let target = &rest[..end];

    if target.is_empty() || target.contains(':') || target.contains('/') {
        return None;
    }

    if is_dot_segment(target) {
        return None;
    }

    if target == MAIN_PAGE || target == identifier {
        return None;
    }

    Some(target)
}
