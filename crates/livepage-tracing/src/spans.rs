//! Span builder helpers for livepage-proxy instrumentation.

/// Create the top-level span for one proxied request.
///
/// Usage: `let span = proxy_request_span!(request_id, method, path);`
///
/// `route` is recorded once the path classifier has run, `intercepted` once
/// the response classifier has.
#[macro_export]
macro_rules! proxy_request_span {
    ($request_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "proxy_request",
            request_id = %$request_id,
            method = %$method,
            path = %$path,
            route = tracing::field::Empty,
            intercepted = tracing::field::Empty,
        )
    };
}

/// Create a span for the forward to an upstream (live origin or dev server).
#[macro_export]
macro_rules! upstream_forward_span {
    ($upstream:expr, $url:expr) => {
        tracing::info_span!(
            "upstream_forward",
            upstream = %$upstream,
            url = %$url,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Create a span around the HTML rewrite of one buffered document.
#[macro_export]
macro_rules! document_mutation_span {
    ($body_len:expr) => {
        tracing::info_span!(
            "document_mutation",
            body_len = $body_len,
            rewritten = tracing::field::Empty,
            warnings = tracing::field::Empty,
        )
    };
}
