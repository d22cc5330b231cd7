//! Verbatim forwarding to the local dev server for excluded paths (tooling,
//! sources, static assets). No header or body rewriting happens here.

use std::time::Instant;

use axum::extract::Request;
use axum::response::Response;
use tracing::Instrument;

use super::forward;

/// Forward `request` to the dev server at `dev_base` and stream its answer.
pub async fn forward_to_dev_server(
    client: &reqwest::Client,
    dev_base: &str,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{dev_base}{path_and_query}");

    let span = livepage_tracing::upstream_forward_span!("dev-server", url);
    let start = Instant::now();

    async {
        let body = match forward::collect_request_body(body).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let upstream = match client
            .request(parts.method.clone(), &url)
            .headers(forward::request_headers(&parts.headers))
            .body(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return forward::upstream_error(e, start),
        };

        let status = upstream.status();
        forward::record_upstream(status, start);

        let headers = forward::response_headers(upstream.headers());
        forward::streaming_response(status, headers, upstream)
    }
    .instrument(span)
    .await
}
