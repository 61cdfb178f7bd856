//! Document link extraction from mirror landing pages.
//!
//! Strategies run in a fixed priority order and the first hit wins. The
//! order is part of correctness: later entries exist for malformed or
//! non-standard pages and would pick the wrong link on ordinary ones.
//!
//! | # | Strategy | Looks at |
//! |---|----------|----------|
//! | 1 | `download_container` | anchors under `.download`, preferring `/download/` links |
//! | 2 | `pdf_object` | `<object type="application/pdf" data=..>` |
//! | 3 | `any_object` | any `<object data=..>` |
//! | 4 | `pdf_iframe` | `<iframe src=..>` pointing at a PDF or `/download/` |
//! | 5 | `raw_markup_scan` | regexes over the raw markup, bypassing the DOM |
//! | 6 | `any_pdf_anchor` | any anchor pointing at a PDF or `/download/` |

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, trace};
use url::Url;

use super::constants::{PAYLOAD_EXTENSION, PAYLOAD_MIME, TITLE_PREVIEW_CHARS};
use super::error::ExtractionFailure;

/// Everything a strategy may inspect.
#[derive(Clone, Copy)]
pub struct PageContext<'a> {
    /// Parsed landing page.
    pub document: &'a Html,
    /// Raw landing page markup.
    pub raw: &'a str,
    /// URL the page was fetched from, for resolving relative links.
    pub base: &'a Url,
}

/// A link discovery rule.
pub type Strategy = fn(&PageContext<'_>) -> Option<Url>;

/// All strategies, highest priority first.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("download_container", download_container),
    ("pdf_object", pdf_object),
    ("any_object", any_object),
    ("pdf_iframe", pdf_iframe),
    ("raw_markup_scan", raw_markup_scan),
    ("any_pdf_anchor", any_pdf_anchor),
];

const DOWNLOAD_SEGMENT: &str = "/download/";

#[allow(clippy::expect_used)]
static DOWNLOAD_ANCHORS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".download a[href]").expect("download anchor selector is valid")
});

#[allow(clippy::expect_used)]
static PDF_OBJECTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&format!(r#"object[type="{PAYLOAD_MIME}"][data]"#))
        .expect("pdf object selector is valid")
});

#[allow(clippy::expect_used)]
static DATA_OBJECTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("object[data]").expect("object selector is valid"));

#[allow(clippy::expect_used)]
static IFRAMES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src]").expect("iframe selector is valid"));

#[allow(clippy::expect_used)]
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

#[allow(clippy::expect_used)]
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector is valid"));

#[allow(clippy::expect_used)]
static RAW_DOWNLOAD_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*class\s*=\s*["']download["'][^>]*>.*?<a[^>]+href\s*=\s*["']([^"']+)["']"#)
        .expect("raw download anchor regex is valid")
});

#[allow(clippy::expect_used)]
static RAW_OBJECT_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<object[^>]+data\s*=\s*["']([^"']+)["']"#)
        .expect("raw object data regex is valid")
});

/// Parses `raw` and locates the document link, or explains why there is none.
///
/// # Errors
///
/// Returns the refined [`ExtractionFailure`] when no strategy matches.
pub fn extract_document_url(raw: &str, base: &Url) -> Result<Url, ExtractionFailure> {
    let document = Html::parse_document(raw);
    let ctx = PageContext {
        document: &document,
        raw,
        base,
    };
    find_document_url(&ctx).ok_or_else(|| classify_page(&document, raw))
}

/// Runs [`STRATEGIES`] in order and returns the first hit.
#[must_use]
pub fn find_document_url(ctx: &PageContext<'_>) -> Option<Url> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let found = strategy(ctx);
        match &found {
            Some(url) => debug!(strategy = name, url = %url, "document link found"),
            None => trace!(strategy = name, "strategy found nothing"),
        }
        found
    })
}

/// Works out why a page yielded no link.
#[must_use]
pub fn classify_page(document: &Html, raw: &str) -> ExtractionFailure {
    let title = page_title(document);
    let lower_title = title.to_lowercase();
    let lower_raw = raw.to_lowercase();

    if lower_title.contains("article is not available")
        || lower_raw.contains("article is not available")
        || lower_raw.contains("not available through")
    {
        ExtractionFailure::Unavailable
    } else if lower_raw.contains("captcha") {
        ExtractionFailure::BotChallenge
    } else if lower_raw.contains("not found") || lower_raw.contains("404") {
        ExtractionFailure::MissingPage
    } else {
        ExtractionFailure::Unrecognized {
            title: (!title.is_empty()).then(|| truncate_title(&title)),
        }
    }
}

fn page_title(document: &Html) -> String {
    document
        .select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() > TITLE_PREVIEW_CHARS {
        let head: String = title.chars().take(TITLE_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

/// Resolves `reference` against `base` (URL-join semantics), keeping only web URLs.
#[must_use]
pub fn resolve_link(base: &Url, reference: &str) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    base.join(reference)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

fn strip_fragment(reference: &str) -> &str {
    reference.split('#').next().unwrap_or(reference)
}

fn looks_like_document(url: &Url) -> bool {
    let lower = url.as_str().to_lowercase();
    lower.contains(&format!(".{PAYLOAD_EXTENSION}")) || lower.contains(DOWNLOAD_SEGMENT)
}

fn download_container(ctx: &PageContext<'_>) -> Option<Url> {
    let mut first = None;
    for anchor in ctx.document.select(&DOWNLOAD_ANCHORS) {
        let Some(url) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(ctx.base, href))
        else {
            continue;
        };
        if url.as_str().contains(DOWNLOAD_SEGMENT) {
            return Some(url);
        }
        first.get_or_insert(url);
    }
    first
}

fn object_data(ctx: &PageContext<'_>, selector: &Selector) -> Option<Url> {
    ctx.document.select(selector).find_map(|object| {
        object
            .value()
            .attr("data")
            .and_then(|data| resolve_link(ctx.base, strip_fragment(data)))
    })
}

fn pdf_object(ctx: &PageContext<'_>) -> Option<Url> {
    object_data(ctx, &PDF_OBJECTS)
}

fn any_object(ctx: &PageContext<'_>) -> Option<Url> {
    object_data(ctx, &DATA_OBJECTS)
}

fn pdf_iframe(ctx: &PageContext<'_>) -> Option<Url> {
    ctx.document.select(&IFRAMES).find_map(|iframe| {
        iframe
            .value()
            .attr("src")
            .and_then(|src| resolve_link(ctx.base, src))
            .filter(looks_like_document)
    })
}

fn raw_markup_scan(ctx: &PageContext<'_>) -> Option<Url> {
    if let Some(url) = RAW_DOWNLOAD_ANCHOR
        .captures(ctx.raw)
        .and_then(|cap| resolve_link(ctx.base, &cap[1]))
    {
        return Some(url);
    }
    RAW_OBJECT_DATA
        .captures(ctx.raw)
        .and_then(|cap| resolve_link(ctx.base, strip_fragment(&cap[1])))
}

fn any_pdf_anchor(ctx: &PageContext<'_>) -> Option<Url> {
    ctx.document.select(&ANCHORS).find_map(|anchor| {
        anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(ctx.base, href))
            .filter(looks_like_document)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::FailureKind;

    fn base() -> Url {
        Url::parse("https://mirror.test/10.1000/xyz123").unwrap()
    }

    fn extract(html: &str) -> Result<Url, ExtractionFailure> {
        extract_document_url(html, &base())
    }

    #[test]
    fn test_download_container_relative_link_resolves_against_host() {
        let html = r#"<html><body><div class="download"><a href="/downloads/xyz.pdf">Download</a></div></body></html>"#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/downloads/xyz.pdf"
        );
    }

    #[test]
    fn test_download_container_beats_generic_pdf_anchor() {
        let html = r#"<html><body>
            <a href="https://elsewhere.test/paper.pdf">mirror copy</a>
            <div class="download"><a href="/download/2024/xyz.pdf">Download</a></div>
        </body></html>"#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/download/2024/xyz.pdf"
        );
    }

    #[test]
    fn test_download_container_prefers_download_segment_over_first_anchor() {
        let html = r#"<div class="download">
            <a href="/mirror/xyz.pdf">alt</a>
            <a href="/download/xyz.pdf">main</a>
        </div>"#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/download/xyz.pdf"
        );
    }

    #[test]
    fn test_pdf_object_strips_fragment() {
        let html = r#"<object type="application/pdf" data="//cdn.mirror.test/tree/xyz.pdf#navpanes=0&view=FitH"></object>"#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://cdn.mirror.test/tree/xyz.pdf"
        );
    }

    #[test]
    fn test_typed_object_beats_untyped_object() {
        let html = r#"
            <object data="/viewer/frame"></object>
            <object type="application/pdf" data="/files/real.pdf"></object>
        "#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/files/real.pdf"
        );
    }

    #[test]
    fn test_untyped_object_is_used_as_fallback() {
        let html = r#"<object data="/embed/xyz#page=1"></object>"#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/embed/xyz"
        );
    }

    #[test]
    fn test_iframe_requires_document_like_source() {
        let html = r#"
            <iframe src="/ads/banner.html"></iframe>
            <iframe src="/storage/XYZ.PDF"></iframe>
        "#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/storage/XYZ.PDF"
        );
    }

    #[test]
    fn test_raw_scan_finds_markup_hidden_from_dom() {
        let html = r#"<html><head><script>
            document.write('<object data="/embed/paper.pdf#view=FitH"></object>');
        </script></head><body><a href="/other/thing.pdf">other</a></body></html>"#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/embed/paper.pdf"
        );
    }

    #[test]
    fn test_raw_scan_download_pattern_spans_lines() {
        let document = Html::parse_document("");
        let raw = "<DIV id=\"x\" CLASS='download'>\n  <span>\n  <A title=\"t\" HREF='/download/multi.pdf'>";
        let base = base();
        let ctx = PageContext {
            document: &document,
            raw,
            base: &base,
        };
        assert_eq!(
            raw_markup_scan(&ctx).unwrap().as_str(),
            "https://mirror.test/download/multi.pdf"
        );
    }

    #[test]
    fn test_any_anchor_fallback_matches_download_segment() {
        let html = r#"<p><a href="/about">about</a><a href="/download/abc">get</a></p>"#;
        assert_eq!(
            extract(html).unwrap().as_str(),
            "https://mirror.test/download/abc"
        );
    }

    #[test]
    fn test_absolute_links_pass_through() {
        let html = r#"<div class="download"><a href="https://files.test/a.pdf">x</a></div>"#;
        assert_eq!(extract(html).unwrap().as_str(), "https://files.test/a.pdf");
    }

    #[test]
    fn test_non_web_links_are_ignored() {
        assert!(resolve_link(&base(), "javascript:void(0)").is_none());
        assert!(resolve_link(&base(), "   ").is_none());
        assert_eq!(
            resolve_link(&base(), "paper.pdf").unwrap().as_str(),
            "https://mirror.test/10.1000/paper.pdf"
        );
    }

    #[test]
    fn test_unavailable_page_classified() {
        let html = "<html><head><title>Sci-Hub: article is not available</title></head><body></body></html>";
        assert_eq!(extract(html).unwrap_err(), ExtractionFailure::Unavailable);
    }

    #[test]
    fn test_captcha_page_classified() {
        let html = "<html><body><form id='captcha'>Are you a robot?</form></body></html>";
        assert_eq!(extract(html).unwrap_err(), ExtractionFailure::BotChallenge);
    }

    #[test]
    fn test_not_found_page_classified() {
        let html = "<html><body><h1>Not Found</h1></body></html>";
        assert_eq!(extract(html).unwrap_err(), ExtractionFailure::MissingPage);
    }

    #[test]
    fn test_not_found_page_reports_missing_page_kind() {
        let failure = extract("<html><body><h1>404 Not Found</h1></body></html>").unwrap_err();
        assert_eq!(failure.kind(), FailureKind::MissingPage);
        assert_eq!(failure.kind().label(), "page not found");
    }

    #[test]
    fn test_generic_failure_embeds_truncated_title() {
        let long_title = "A".repeat(80);
        let html = format!("<html><head><title>{long_title}</title></head><body>hi</body></html>");
        let failure = extract(&html).unwrap_err();
        let ExtractionFailure::Unrecognized { title: Some(title) } = failure else {
            panic!("expected unrecognized with title, got {failure:?}");
        };
        assert_eq!(title, format!("{}...", "A".repeat(50)));
    }

    #[test]
    fn test_strategy_table_order_is_fixed() {
        let names: Vec<&str> = STRATEGIES.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            [
                "download_container",
                "pdf_object",
                "any_object",
                "pdf_iframe",
                "raw_markup_scan",
                "any_pdf_anchor"
            ]
        );
    }
}
