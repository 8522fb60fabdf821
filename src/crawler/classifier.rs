//! Rendered page classification
//!
//! A renderer always returns a document, even for error pages, so failures are
//! inferred from the document itself: its size and the `<title>` in `<head>`.

use crate::state::FailureReason;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static HEAD_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("head > title").expect("title selector is valid"));

/// Title markers checked in order; the first match wins
const TITLE_MARKERS: &[(&[&str], FailureReason)] = &[
    (&["404", "not found"], FailureReason::NotFound),
    (&["403", "forbidden"], FailureReason::Forbidden),
    (&["429", "too many requests"], FailureReason::RateLimited),
    (&["500", "internal server error"], FailureReason::ServerError),
    (&["502", "bad gateway"], FailureReason::BadGateway),
    (&["503", "service unavailable"], FailureReason::Unavailable),
];

/// Outcome of classifying a rendered document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A real page: store it and follow its links
    Success,
    /// An error page or an empty document
    Failure(FailureReason),
}

/// Extracts the document title from `<head>` only
///
/// Titles in the body (SVG, embedded documents) are ignored.
pub fn head_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document
        .select(&HEAD_TITLE)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Classifies a rendered document
///
/// # Rules
///
/// 1. At most `min_content_bytes` bytes: `empty_response`
/// 2. Otherwise the lowercased head title is checked for, in order: 404/not
///    found, 403/forbidden, 429/too many requests, 500/internal server error,
///    502/bad gateway, 503/service unavailable
/// 3. Anything else is a success
///
/// # Example
///
/// ```
/// use study_crawl::crawler::{classify, Classification};
/// use study_crawl::FailureReason;
///
/// let page = format!("<html><head><title>Page Not Found</title></head><body>{}</body></html>", "x".repeat(600));
/// assert_eq!(classify(&page, 500), Classification::Failure(FailureReason::NotFound));
/// ```
pub fn classify(html: &str, min_content_bytes: usize) -> Classification {
    if html.len() <= min_content_bytes {
        return Classification::Failure(FailureReason::EmptyResponse);
    }

    let Some(title) = head_title(html) else {
        return Classification::Success;
    };
    let title = title.to_lowercase();

    for (markers, reason) in TITLE_MARKERS {
        if markers.iter().any(|m| title.contains(m)) {
            return Classification::Failure(reason.clone());
        }
    }

    Classification::Success
}
