//! Content negotiation, locale resolution and CORS.

use crate::interaction::InboundCall;

/// The only accepted media type.
pub const MEDIA_TYPE: &str = "application/json";
/// The only accepted charset.
pub const CHARSET: &str = "utf-8";
/// Content type of every reply.
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Methods a preflight may ask for.
pub const ALLOWED_METHODS: [&str; 4] = ["GET", "POST", "PATCH", "DELETE"];

/// Headers a preflight may ask for.
pub const ALLOWED_HEADERS: [&str; 5] = [
    "content-type",
    "content-language",
    "accept-language",
    "x-session-id",
    "x-interaction-id",
];

/// True for `application/json; charset=utf-8` in any letter case and
/// parameter spacing.
pub fn acceptable_content_type(value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    let mut parts = value.split(';');
    let media_type = parts.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(MEDIA_TYPE) {
        return false;
    }
    parts.any(|param| {
        param
            .split_once('=')
            .map(|(name, value)| {
                name.trim().eq_ignore_ascii_case("charset")
                    && value.trim().trim_matches('"').eq_ignore_ascii_case(CHARSET)
            })
            .unwrap_or(false)
    })
}

/// Locale from `Content-Language`, else `Accept-Language`, else `default`.
///
/// Only the first comma-separated preference counts; quality values are
/// dropped and the result is lower-case.
pub fn resolve_locale(call: &InboundCall, default: &str) -> String {
    call.header("content-language")
        .or_else(|| call.header("accept-language"))
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.split(';').next())
        .map(|locale| locale.trim().to_ascii_lowercase())
        .filter(|locale| !locale.is_empty())
        .unwrap_or_else(|| default.to_ascii_lowercase())
}

/// Outcome of CORS handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cors {
    /// Same-origin call.
    NotRequested,
    /// Answer immediately with these headers and an empty body.
    Preflight(Vec<(String, String)>),
    /// A preflight asking for a method or header we do not allow.
    PreflightRejected,
    /// Cross-origin call; add these headers and carry on.
    Simple(Vec<(String, String)>),
}

/// Classifies a call for CORS.
pub fn cors(call: &InboundCall) -> Cors {
    let Some(origin) = call.header("origin") else {
        return Cors::NotRequested;
    };
    let allow_origin = ("Access-Control-Allow-Origin".to_string(), origin.to_string());

    if call.method != "OPTIONS" {
        return Cors::Simple(vec![allow_origin]);
    }

    let method_ok = call
        .header("access-control-request-method")
        .is_some_and(|m| ALLOWED_METHODS.iter().any(|a| a.eq_ignore_ascii_case(m)));

    let requested_headers = call
        .header("access-control-request-headers")
        .unwrap_or_default();
    let headers_ok = requested_headers
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .all(|h| ALLOWED_HEADERS.iter().any(|a| a.eq_ignore_ascii_case(h)));

    if !method_ok || !headers_ok {
        return Cors::PreflightRejected;
    }

    let mut headers = vec![
        allow_origin,
        (
            "Access-Control-Allow-Methods".to_string(),
            ALLOWED_METHODS.join(", "),
        ),
    ];
    if !requested_headers.is_empty() {
        headers.push((
            "Access-Control-Allow-Headers".to_string(),
            requested_headers.to_string(),
        ));
    }
    Cors::Preflight(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_acceptance() {
        assert!(acceptable_content_type(Some("application/json; charset=utf-8")));
        assert!(acceptable_content_type(Some("Application/JSON;charset=UTF-8")));
        assert!(acceptable_content_type(Some("application/json; charset=\"utf-8\"")));

        assert!(!acceptable_content_type(None));
        assert!(!acceptable_content_type(Some("application/json")));
        assert!(!acceptable_content_type(Some("text/html; charset=utf-8")));
        assert!(!acceptable_content_type(Some("application/json; charset=latin1")));
    }

    #[test]
    fn test_locale_resolution_order() {
        let call = InboundCall::new("GET", "/")
            .with_header("Content-Language", "FR-fr")
            .with_header("Accept-Language", "de-de");
        assert_eq!(resolve_locale(&call, "en-nz"), "fr-fr");

        let call = InboundCall::new("GET", "/")
            .with_header("Accept-Language", "de-DE;q=0.9, en;q=0.8");
        assert_eq!(resolve_locale(&call, "en-nz"), "de-de");

        let call = InboundCall::new("GET", "/");
        assert_eq!(resolve_locale(&call, "en-NZ"), "en-nz");
    }

    #[test]
    fn test_cors_not_requested_without_origin() {
        let call = InboundCall::new("OPTIONS", "/v1/widgets");
        assert_eq!(cors(&call), Cors::NotRequested);
    }

    #[test]
    fn test_cors_simple_adds_origin() {
        let call = InboundCall::new("GET", "/v1/widgets").with_header("Origin", "https://a.test");
        let Cors::Simple(headers) = cors(&call) else {
            panic!("expected simple CORS");
        };
        assert_eq!(
            headers,
            vec![(
                "Access-Control-Allow-Origin".to_string(),
                "https://a.test".to_string()
            )]
        );
    }

    #[test]
    fn test_cors_preflight() {
        let call = InboundCall::new("OPTIONS", "/v1/widgets")
            .with_header("Origin", "https://a.test")
            .with_header("Access-Control-Request-Method", "POST")
            .with_header("Access-Control-Request-Headers", "Content-Type, X-Session-ID");

        let Cors::Preflight(headers) = cors(&call) else {
            panic!("expected preflight");
        };
        assert!(headers
            .iter()
            .any(|(n, v)| n == "Access-Control-Allow-Methods" && v.contains("PATCH")));
        assert!(headers
            .iter()
            .any(|(n, v)| n == "Access-Control-Allow-Headers" && v.contains("X-Session-ID")));
    }

    #[test]
    fn test_cors_preflight_rejected() {
        let bad_method = InboundCall::new("OPTIONS", "/v1/widgets")
            .with_header("Origin", "https://a.test")
            .with_header("Access-Control-Request-Method", "PUT");
        assert_eq!(cors(&bad_method), Cors::PreflightRejected);

        let bad_header = InboundCall::new("OPTIONS", "/v1/widgets")
            .with_header("Origin", "https://a.test")
            .with_header("Access-Control-Request-Method", "GET")
            .with_header("Access-Control-Request-Headers", "X-Evil");
        assert_eq!(cors(&bad_header), Cors::PreflightRejected);
    }
}
