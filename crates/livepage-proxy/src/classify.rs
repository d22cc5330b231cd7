//! Response classification: is this response an HTML page we may rewrite?

use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderMap;
use regex::Regex;

const HTML_MIME: &str = "text/html";

/// Outcome of classifying one live-origin response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// A full-page HTML navigation; buffer and rewrite it.
    Eligible,
    /// Anything else; forwarded byte-for-byte and never parsed.
    PassThrough,
}

/// A response is eligible only when all three hold:
///
/// - the response `content-type` is `text/html`,
/// - the request `accept` asks for `text/html` (navigations do, `fetch`/XHR
///   calls to HTML endpoints usually don't),
/// - the request path does not match `ignore_path`.
///
/// `path_and_query` is what the browser requested, query string included.
pub fn classify_response(
    response_headers: &HeaderMap,
    request_headers: &HeaderMap,
    path_and_query: &str,
    ignore_path: Option<&Regex>,
) -> ResponseClass {
    if !header_mentions_html(response_headers, CONTENT_TYPE.as_str()) {
        return ResponseClass::PassThrough;
    }
    if !header_mentions_html(request_headers, ACCEPT.as_str()) {
        return ResponseClass::PassThrough;
    }
    if ignore_path.is_some_and(|re| re.is_match(path_and_query)) {
        return ResponseClass::PassThrough;
    }
    ResponseClass::Eligible
}

fn header_mentions_html(headers: &HeaderMap, name: &str) -> bool {
    headers.get_all(name).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.to_ascii_lowercase().contains(HTML_MIME))
            .unwrap_or(false)
    })
}
