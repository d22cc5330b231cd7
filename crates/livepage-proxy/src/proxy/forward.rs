//! Transport helpers shared by both upstreams: header filtering, request
//! body collection, response assembly and upstream error mapping.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailers",
];

/// Largest request body the proxy will collect before forwarding.
pub const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name)
}

/// Copy the browser's headers for the upstream request.
///
/// `host` is dropped so the upstream client derives it from the target URL,
/// and `content-length` because reqwest sets it from the collected body.
pub fn request_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming {
        if is_hop_by_hop(name.as_str()) || *name == axum::http::header::CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Copy the upstream's response headers for the browser.
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Collect the inbound request body, answering `400` if it can't be read.
pub async fn collect_request_body(body: Body) -> Result<Bytes, Response> {
    axum::body::to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read request body");
            (StatusCode::BAD_REQUEST, "failed to read request body").into_response()
        })
}

/// Record status and latency on the current upstream span.
pub fn record_upstream(status: StatusCode, start: Instant) {
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);
    tracing::Span::current().record("status", status.as_u16());

    tracing::debug!(
        status = status.as_u16(),
        latency_ms = latency,
        "Forward complete"
    );
}

/// Map a failed upstream call to `504` (timeout) or `502`.
pub fn upstream_error(e: reqwest::Error, start: Instant) -> Response {
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);

    if e.is_timeout() {
        tracing::Span::current().record("status", 504_u16);
        tracing::error!(error = %e, "Upstream timeout");
        return (StatusCode::GATEWAY_TIMEOUT, "upstream timeout").into_response();
    }
    tracing::Span::current().record("status", 502_u16);
    tracing::error!(error = %e, "Upstream connection error");
    (StatusCode::BAD_GATEWAY, "upstream connection error").into_response()
}

/// Response whose body streams straight from the upstream, unbuffered.
pub fn streaming_response(
    status: StatusCode,
    headers: HeaderMap,
    upstream: reqwest::Response,
) -> Response {
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Response with a fully buffered body. `content-length` is recomputed from
/// `body`, so callers must not carry a stale one in `headers`.
pub fn buffered_response(status: StatusCode, mut headers: HeaderMap, body: Bytes) -> Response {
    headers.remove(axum::http::header::CONTENT_LENGTH);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
