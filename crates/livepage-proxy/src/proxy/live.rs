//! Forwarding to the live origin through the interception pipeline.
//!
//! Outgoing: referer rewrite, header overrides. Incoming: cookie domain
//! rewrite, response classification, and for eligible HTML a buffered
//! rewrite of the whole document.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use tracing::Instrument;

use super::forward;
use crate::classify::{classify_response, ResponseClass};
use crate::config::LiveConfig;
use crate::cookies;
use crate::mutate::{mutate_document, MutationOutcome, MutationWarning};
use crate::rewrite;

/// Marker header set on every response whose body was rewritten.
pub const INTERCEPTED_HEADER: &str = "x-pol-intercepted";

/// Forward `request` to the live origin and return the (possibly rewritten)
/// response.
///
/// Must run inside the `proxy_request` span: the interception decision is
/// recorded on it.
pub async fn forward_to_live(
    client: &reqwest::Client,
    config: &Arc<LiveConfig>,
    request: Request,
) -> Response {
    let request_span = tracing::Span::current();
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();
    let url = format!("{}{path_and_query}", config.live_base());

    let span = livepage_tracing::upstream_forward_span!("live", url);
    let start = Instant::now();

    async {
        let body = match forward::collect_request_body(body).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let mut headers = forward::request_headers(&parts.headers);
        rewrite::prepare_live_request(&mut headers, config);

        let upstream = match client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return forward::upstream_error(e, start),
        };

        let status = upstream.status();
        forward::record_upstream(status, start);

        let mut response_headers = forward::response_headers(upstream.headers());

        if config.rewrite_cookies {
            let rewritten = cookies::rewrite_set_cookies(&mut response_headers, &parts.headers);
            if rewritten > 0 {
                tracing::debug!(cookies = rewritten, "Rewrote Set-Cookie for dev host");
            }
        }

        let class = if has_no_body(&parts.method, status) {
            ResponseClass::PassThrough
        } else {
            classify_response(
                &response_headers,
                &parts.headers,
                &path_and_query,
                config.ignore_path.as_ref(),
            )
        };
        request_span.record("intercepted", class == ResponseClass::Eligible);
        tracing::debug!(class = ?class, path = %path_and_query, "Classified live response");

        if class == ResponseClass::PassThrough {
            return forward::streaming_response(status, response_headers, upstream);
        }

        let html = match upstream.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read live page body");
                return forward::upstream_error(e, start);
            }
        };

        let outcome = rewrite_off_thread(html, Arc::clone(config)).await;
        for warning in outcome.warnings() {
            tracing::warn!(path = %path_and_query, warning = %warning, "Live page rewrite warning");
        }
        if outcome.is_rewritten() {
            tracing::debug!(bytes = outcome.body().len(), "Serving rewritten live page");
            response_headers.insert(INTERCEPTED_HEADER, HeaderValue::from_static("true"));
        }

        forward::buffered_response(status, response_headers, outcome.into_body())
    }
    .instrument(span)
    .await
}

/// HEAD answers and bodiless statuses are never rewritten: parsing an empty
/// buffer would synthesize a whole document.
fn has_no_body(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Run the mutator on the blocking pool. A panicking rewrite degrades to the
/// original body.
async fn rewrite_off_thread(html: Bytes, config: Arc<LiveConfig>) -> MutationOutcome {
    let span = livepage_tracing::document_mutation_span!(html.len());
    let task_span = span.clone();
    let original = html.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let _entered = task_span.enter();
        mutate_document(html, &config)
    })
    .await
    .unwrap_or_else(|e| MutationOutcome::Unchanged {
        body: original,
        warnings: vec![MutationWarning::Document(format!("rewrite task failed: {e}"))],
    });

    span.record("rewritten", outcome.is_rewritten());
    span.record("warnings", outcome.warnings().len());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bodiless_responses_detected() {
        assert!(has_no_body(&Method::HEAD, StatusCode::OK));
        assert!(has_no_body(&Method::GET, StatusCode::NOT_MODIFIED));
        assert!(has_no_body(&Method::GET, StatusCode::NO_CONTENT));
        assert!(!has_no_body(&Method::GET, StatusCode::OK));
        assert!(!has_no_body(&Method::POST, StatusCode::NOT_FOUND));
    }
}
