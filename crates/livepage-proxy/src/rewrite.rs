//! Outgoing request header rewriting for the live origin.

use http::header::{ACCEPT_ENCODING, REFERER};
use http::{HeaderMap, HeaderValue};
use url::Url;

use crate::config::LiveConfig;

/// Run every outgoing-request hook, in order.
pub fn prepare_live_request(headers: &mut HeaderMap, config: &LiveConfig) {
    rewrite_referer(headers, &config.live_origin);
    apply_header_overrides(headers, &config.header_overrides);
    // The upstream client negotiates and decodes compression itself, so the
    // body the pipeline buffers is always plain text.
    headers.remove(ACCEPT_ENCODING);
}

/// Point the `referer` at the live origin, keeping path, query and fragment.
///
/// The browser names the dev host as referer; some origins reject or redirect
/// requests that don't appear to come from themselves.
pub fn rewrite_referer(headers: &mut HeaderMap, live_origin: &Url) {
    let Some(referer) = headers.get(REFERER).and_then(|v| v.to_str().ok()) else {
        return;
    };
    let Ok(referer) = Url::parse(referer) else {
        tracing::debug!(referer = %referer, "Leaving unparseable referer untouched");
        return;
    };

    let mut rewritten = live_origin.clone();
    rewritten.set_path(referer.path());
    rewritten.set_query(referer.query());
    rewritten.set_fragment(referer.fragment());

    if let Ok(value) = HeaderValue::from_str(rewritten.as_str()) {
        headers.insert(REFERER, value);
    }
}

/// Set every override, replacing whatever the browser sent.
pub fn apply_header_overrides(headers: &mut HeaderMap, overrides: &HeaderMap) {
    for (name, value) in overrides {
        headers.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live() -> Url {
        Url::parse("https://live.example.com").unwrap()
    }

    #[test]
    fn test_referer_rewritten_to_live_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, "http://localhost:5173/foo?q=1".parse().unwrap());

        rewrite_referer(&mut headers, &live());

        assert_eq!(headers[REFERER], "https://live.example.com/foo?q=1");
    }

    #[test]
    fn test_referer_keeps_fragment_and_drops_dev_port() {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, "https://127.0.0.1:3080/a/b#top".parse().unwrap());

        rewrite_referer(&mut headers, &Url::parse("http://live.example.com:8080/").unwrap());

        assert_eq!(headers[REFERER], "http://live.example.com:8080/a/b#top");
    }

    #[test]
    fn test_absent_referer_is_noop() {
        let mut headers = HeaderMap::new();
        rewrite_referer(&mut headers, &live());
        assert!(headers.get(REFERER).is_none());
    }

    #[test]
    fn test_unparseable_referer_left_alone() {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, "not a url".parse().unwrap());
        rewrite_referer(&mut headers, &live());
        assert_eq!(headers[REFERER], "not a url");
    }

    #[test]
    fn test_overrides_replace_existing_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-bypass", "old".parse().unwrap());
        headers.append("x-bypass", "older".parse().unwrap());
        headers.insert("accept", "text/html".parse().unwrap());

        let mut overrides = HeaderMap::new();
        overrides.insert("x-bypass", "token".parse().unwrap());
        overrides.insert("authorization", "Basic abc".parse().unwrap());

        apply_header_overrides(&mut headers, &overrides);

        let values: Vec<_> = headers.get_all("x-bypass").iter().collect();
        assert_eq!(values, vec!["token"]);
        assert_eq!(headers["authorization"], "Basic abc");
        assert_eq!(headers["accept"], "text/html");
    }
}
