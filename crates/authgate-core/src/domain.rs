//! Cookie-domain resolution.

use http::header::HOST;
use http::request::Parts;

use crate::scope::RequestScope;

const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Pick the first configured domain that covers `host`.
///
/// A domain matches on exact equality, or when it starts with `.` and `host`
/// ends with it. Returns the matching entry verbatim, or `""` if none match.
#[must_use]
pub fn cookie_domain<'a>(host: &str, domains: &'a [String]) -> &'a str {
    domains
        .iter()
        .find(|d| host == d.as_str() || (d.starts_with('.') && host.ends_with(d.as_str())))
        .map_or("", String::as_str)
}

/// Host the client addressed.
///
/// `X-Forwarded-Host` is only trusted when the request scope marks the request
/// as reverse-proxied. Otherwise the `Host` header, then the URI authority.
#[must_use]
pub fn effective_host(parts: &Parts) -> &str {
    let reverse_proxy = RequestScope::get(&parts.extensions).is_some_and(|s| s.reverse_proxy);
    if reverse_proxy {
        if let Some(forwarded) = header_str(parts, X_FORWARDED_HOST) {
            return forwarded;
        }
    }
    header_str(parts, HOST.as_str())
        .or_else(|| parts.uri.authority().map(http::uri::Authority::as_str))
        .unwrap_or("")
}

/// Resolve the cookie domain for a request.
#[must_use]
pub fn resolve_cookie_domain<'a>(parts: &Parts, domains: &'a [String]) -> &'a str {
    cookie_domain(effective_host(parts), domains)
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(host: &str, forwarded: Option<&str>) -> Parts {
        let mut builder = http::Request::builder()
            .uri(format!("https://{host}/cookie-path"))
            .header(HOST, host);
        if let Some(f) = forwarded {
            builder = builder.header(X_FORWARDED_HOST, f);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        if forwarded.is_some() {
            RequestScope::new(true).attach(&mut parts.extensions);
        }
        parts
    }

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_cookie_domain_table() {
        let cases: &[(&str, Option<&str>, &[&str], &str)] = &[
            ("www.cookies.test", None, &["www.cookies.test"], "www.cookies.test"),
            (
                "backend.cookies.internal",
                Some("www.cookies.test"),
                &["www.cookies.test"],
                "www.cookies.test",
            ),
            ("www.cookies.test", None, &[".cookies.test"], ".cookies.test"),
            (
                "backend.cookies.internal",
                Some("www.cookies.test"),
                &[".cookies.test"],
                ".cookies.test",
            ),
            (
                "www.cookies.test",
                None,
                &["www.cookies.test", ".cookies.test"],
                "www.cookies.test",
            ),
            (
                "www.cookies.test",
                None,
                &[".cookies.wrong", ".cookies.test"],
                ".cookies.test",
            ),
            (
                "www.cookies.test",
                None,
                &[".cookies.wrong", ".cookies.false"],
                "",
            ),
        ];

        for (host, forwarded, configured, expected) in cases {
            let configured = domains(configured);
            let parts = parts(host, *forwarded);
            assert_eq!(
                resolve_cookie_domain(&parts, &configured),
                *expected,
                "host={host} forwarded={forwarded:?}"
            );
        }
    }

    #[test]
    fn test_forwarded_host_ignored_without_reverse_proxy() {
        let mut parts = parts("backend.cookies.internal", Some("www.cookies.test"));
        parts.extensions.clear();
        assert_eq!(effective_host(&parts), "backend.cookies.internal");
        assert_eq!(
            resolve_cookie_domain(&parts, &domains(&[".cookies.test"])),
            ""
        );
    }

    #[test]
    fn test_suffix_requires_leading_dot() {
        assert_eq!(cookie_domain("evilcookies.test", &domains(&["cookies.test"])), "");
        assert_eq!(cookie_domain("cookies.test", &domains(&["cookies.test"])), "cookies.test");
    }

    #[test]
    fn test_host_from_uri_authority() {
        let (parts, ()) = http::Request::builder()
            .uri("https://www.cookies.test/x")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(effective_host(&parts), "www.cookies.test");
    }
}
