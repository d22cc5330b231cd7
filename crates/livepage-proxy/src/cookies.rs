//! `Set-Cookie` rewriting so live-origin session cookies work on the dev host.
//!
//! This weakens cookie security: `Secure` and `SameSite=None` are dropped and
//! an explicit `Domain` is re-pointed at whatever host the browser used to
//! reach the proxy. A cookie minted by the live origin therefore becomes a
//! cookie of the dev host. Only run this for local development.

use cookie::Cookie;
use http::header::{ORIGIN, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use url::{Host, Url};

/// What to do with each cookie's `Domain` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DomainRewrite {
    /// Browser-facing host is an IP literal; browsers reject `Domain=<ip>`,
    /// and omitting the attribute scopes the cookie to the serving host.
    Strip,
    Set(String),
}

/// Rewrite every `Set-Cookie` in `response_headers` for the host named by the
/// request's `origin` header. Returns the number of cookies rewritten.
///
/// No-op when the request has no usable `origin` or the response sets no
/// cookies. Values that fail to parse as cookies are kept verbatim.
pub fn rewrite_set_cookies(response_headers: &mut HeaderMap, request_headers: &HeaderMap) -> usize {
    if !response_headers.contains_key(SET_COOKIE) {
        return 0;
    }
    let Some(rewrite) = domain_rewrite_for(request_headers) else {
        return 0;
    };

    let originals: Vec<HeaderValue> = response_headers.get_all(SET_COOKIE).iter().cloned().collect();
    response_headers.remove(SET_COOKIE);

    let mut rewritten = 0;
    for value in originals {
        match rewrite_cookie(&value, &rewrite) {
            Some(new_value) => {
                response_headers.append(SET_COOKIE, new_value);
                rewritten += 1;
            }
            None => {
                tracing::debug!(cookie = ?value, "Keeping unparseable Set-Cookie verbatim");
                response_headers.append(SET_COOKIE, value);
            }
        }
    }
    rewritten
}

fn domain_rewrite_for(request_headers: &HeaderMap) -> Option<DomainRewrite> {
    let origin = request_headers.get(ORIGIN)?.to_str().ok()?;
    let origin = Url::parse(origin).ok()?;
    match origin.host()? {
        Host::Domain(domain) => Some(DomainRewrite::Set(domain.to_string())),
        Host::Ipv4(_) | Host::Ipv6(_) => Some(DomainRewrite::Strip),
    }
}

/// Rewrite one `Set-Cookie` value attribute by attribute. The name/value
/// pair and every attribute not listed below are kept as sent:
///
/// - an existing `Domain` is re-pointed at the dev host, or dropped for an IP
///   host; host-only cookies stay host-only,
/// - `Secure` is dropped, and `Partitioned` with it since browsers reject a
///   partitioned cookie that is not secure,
/// - `SameSite=None` is dropped; `Lax` and `Strict` stay.
fn rewrite_cookie(value: &HeaderValue, rewrite: &DomainRewrite) -> Option<HeaderValue> {
    let raw = value.to_str().ok()?;
    let parsed = Cookie::parse(raw).ok()?;
    let same_site_none = parsed.same_site().is_some_and(|s| s.is_none());

    let mut segments = raw.split(';');
    let mut out = segments.next()?.trim().to_string();

    for attribute in segments.map(str::trim).filter(|a| !a.is_empty()) {
        let name = attribute
            .split_once('=')
            .map_or(attribute, |(name, _)| name.trim());

        let replacement = if name.eq_ignore_ascii_case("domain") {
            match rewrite {
                DomainRewrite::Strip => None,
                DomainRewrite::Set(host) => Some(format!("Domain={host}")),
            }
        } else if name.eq_ignore_ascii_case("secure") || name.eq_ignore_ascii_case("partitioned") {
            None
        } else if name.eq_ignore_ascii_case("samesite") && same_site_none {
            None
        } else {
            Some(attribute.to_string())
        };

        if let Some(attribute) = replacement {
            out.push_str("; ");
            out.push_str(&attribute);
        }
    }

    HeaderValue::from_str(&out).ok()
}

#[cfg(test)]
mod tests {
    use cookie::SameSite;

    use super::*;

    fn response_with(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(SET_COOKIE, cookie.parse().unwrap());
        }
        headers
    }

    fn request_from(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, origin.parse().unwrap());
        headers
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_domain_replaced_and_security_attributes_stripped() {
        let mut resp =
            response_with(&["session=abc; Domain=live.example.com; Secure; SameSite=None"]);

        let n = rewrite_set_cookies(&mut resp, &request_from("http://localhost:5173"));

        assert_eq!(n, 1);
        assert_eq!(set_cookies(&resp), vec!["session=abc; Domain=localhost"]);
    }

    #[test]
    fn test_ip_origin_removes_domain() {
        let mut resp =
            response_with(&["session=abc; Domain=live.example.com; Secure; SameSite=None"]);

        rewrite_set_cookies(&mut resp, &request_from("http://127.0.0.1:5173"));

        assert_eq!(set_cookies(&resp), vec!["session=abc"]);
    }

    #[test]
    fn test_ipv6_origin_removes_domain() {
        let mut resp = response_with(&["a=1; Domain=.live.example.com"]);
        rewrite_set_cookies(&mut resp, &request_from("http://[::1]:3080"));
        assert_eq!(set_cookies(&resp), vec!["a=1"]);
    }

    #[test]
    fn test_strict_same_site_and_other_attributes_kept() {
        let mut resp = response_with(&[
            "a=1; Path=/; HttpOnly; SameSite=Lax; Domain=live.example.com",
            "b=2; Max-Age=60; Secure",
        ]);

        let n = rewrite_set_cookies(&mut resp, &request_from("https://dev.local:3080"));
        assert_eq!(n, 2);

        let cookies = set_cookies(&resp);
        let first = Cookie::parse(cookies[0].as_str()).unwrap();
        assert_eq!(first.path(), Some("/"));
        assert_eq!(first.http_only(), Some(true));
        assert_eq!(first.same_site(), Some(SameSite::Lax));
        assert_eq!(first.domain(), Some("dev.local"));

        let second = Cookie::parse(cookies[1].as_str()).unwrap();
        assert_eq!(second.secure(), None);
        assert_eq!(second.domain(), None);
        assert_eq!(second.max_age(), Some(cookie::time::Duration::seconds(60)));
    }

    #[test]
    fn test_host_only_cookie_stays_host_only() {
        let mut resp = response_with(&["sid=1; Path=/; HttpOnly"]);

        rewrite_set_cookies(&mut resp, &request_from("http://localhost:5173"));

        assert_eq!(set_cookies(&resp), vec!["sid=1; Path=/; HttpOnly"]);
    }

    #[test]
    fn test_unknown_attributes_kept_and_partitioned_dropped_with_secure() {
        let mut resp = response_with(&[
            "a=1; Path=/; Priority=High; Domain=live.example.com; \
             Expires=Wed, 21 Oct 2037 07:28:00 GMT; Partitioned; Secure; SameSite=None",
        ]);

        let n = rewrite_set_cookies(&mut resp, &request_from("http://localhost:5173"));

        assert_eq!(n, 1);
        assert_eq!(
            set_cookies(&resp),
            vec!["a=1; Path=/; Priority=High; Domain=localhost; Expires=Wed, 21 Oct 2037 07:28:00 GMT"]
        );
    }

    #[test]
    fn test_attribute_names_matched_case_insensitively() {
        let mut resp = response_with(&["a=1; domain=live.example.com; SECURE; samesite=none"]);

        rewrite_set_cookies(&mut resp, &request_from("http://localhost:5173"));

        assert_eq!(set_cookies(&resp), vec!["a=1; Domain=localhost"]);
    }

    #[test]
    fn test_no_origin_is_noop() {
        let original = "session=abc; Domain=live.example.com; Secure; SameSite=None";
        let mut resp = response_with(&[original]);

        assert_eq!(rewrite_set_cookies(&mut resp, &HeaderMap::new()), 0);
        assert_eq!(set_cookies(&resp), vec![original]);

        assert_eq!(rewrite_set_cookies(&mut resp, &request_from("null")), 0);
        assert_eq!(set_cookies(&resp), vec![original]);
    }

    #[test]
    fn test_no_cookies_is_noop() {
        let mut resp = HeaderMap::new();
        assert_eq!(
            rewrite_set_cookies(&mut resp, &request_from("http://localhost:5173")),
            0
        );
        assert!(resp.is_empty());
    }

    #[test]
    fn test_unparseable_cookie_kept_verbatim() {
        let mut resp = response_with(&["garbage-without-equals", "ok=1; Secure"]);

        let n = rewrite_set_cookies(&mut resp, &request_from("http://localhost:5173"));

        assert_eq!(n, 1);
        assert_eq!(
            set_cookies(&resp),
            vec!["garbage-without-equals", "ok=1"]
        );
    }
}
