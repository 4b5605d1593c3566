//! Response emission.
//!
//! Builds the concrete HTTP responses the protocol prescribes: parameter
//! redirects (query and fragment), the auto-submitting `form_post` document,
//! JSON payloads with the mandated no-cache headers, and the native
//! plain-text error page used when no redirect target can be trusted.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LOCATION, PRAGMA};
use axum::http::{Response as HttpResponse, StatusCode};
use axum::response::Response;
use serde::Serialize;

use crate::error::ErrorResponse;

/// How authorization responses travel back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Parameters appended to the redirect query string.
    Query,
    /// Parameters carried in the redirect fragment.
    Fragment,
    /// Parameters posted by an auto-submitting HTML form.
    FormPost,
}

/// Builds the response for an authorization-endpoint result.
///
/// `redirect_uri` itself is never included among the parameters.
pub(crate) fn authorization_response(
    redirect_uri: &str,
    params: &[(String, String)],
    mode: ResponseMode,
) -> Response {
    match mode {
        ResponseMode::Query => {
            let separator = if redirect_uri.contains('?') { '&' } else { '?' };
            redirect(&format!("{redirect_uri}{separator}{}", encode_params(params)))
        }
        ResponseMode::Fragment => redirect(&format!("{redirect_uri}#{}", encode_params(params))),
        ResponseMode::FormPost => form_post(redirect_uri, params),
    }
}

/// 302 redirect.
pub(crate) fn redirect(location: &str) -> Response {
    HttpResponse::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location)
        .body(Body::empty())
        .unwrap_or_default()
}

/// Auto-submitting HTML form carrying the response parameters.
///
/// The form body is a security surface: the action and every hidden field
/// go through HTML entity encoding, never raw concatenation.
fn form_post(redirect_uri: &str, params: &[(String, String)]) -> Response {
    let fields: String = params
        .iter()
        .map(|(name, value)| {
            format!(
                r#"<input type="hidden" name="{}" value="{}" />"#,
                html_escape(name),
                html_escape(value)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Working...</title></head>
<body onload="document.forms[0].submit()">
<form method="post" action="{}">
{}
<noscript><button type="submit">Continue</button></noscript>
</form>
</body>
</html>"#,
        html_escape(redirect_uri),
        fields
    );

    let builder = HttpResponse::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html;charset=UTF-8");
    with_no_cache(builder)
        .body(Body::from(html))
        .unwrap_or_default()
}

/// JSON success payload with the mandated no-cache headers.
pub(crate) fn json_ok<T: Serialize>(payload: &T) -> Response {
    json_response(StatusCode::OK, payload)
}

/// JSON error payload: HTTP 400 plus the no-cache headers.
pub(crate) fn json_error(error: &ErrorResponse) -> Response {
    json_response(StatusCode::BAD_REQUEST, error)
}

fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response {
    let body = serde_json::to_string(payload).unwrap_or_default();
    let builder = HttpResponse::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json;charset=UTF-8");
    with_no_cache(builder)
        .body(Body::from(body))
        .unwrap_or_default()
}

/// Native plain-text error page, used when no redirect target is trusted.
pub(crate) fn native_error_page(error: &ErrorResponse) -> Response {
    let mut body = format!("error: {}", error.error);
    if let Some(description) = &error.error_description {
        body.push_str(&format!("\nerror_description: {description}"));
    }
    if let Some(uri) = &error.error_uri {
        body.push_str(&format!("\nerror_uri: {uri}"));
    }

    HttpResponse::builder()
        .status(StatusCode::BAD_REQUEST)
        .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
        .body(Body::from(body))
        .unwrap_or_default()
}

/// 200 with an empty body, for logout without a redirect target.
pub(crate) fn empty_ok() -> Response {
    HttpResponse::builder()
        .status(StatusCode::OK)
        .body(Body::empty())
        .unwrap_or_default()
}

fn with_no_cache(builder: axum::http::response::Builder) -> axum::http::response::Builder {
    builder
        .header(CACHE_CONTROL, "no-cache")
        .header(PRAGMA, "no-cache")
        .header(EXPIRES, "-1")
}

fn encode_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(name, value)| {
            format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// HTML entity encoding for attribute values and text content.
pub(crate) fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(response: &Response) -> String {
        response
            .headers()
            .get(LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[test]
    fn query_mode_appends_to_existing_query() {
        let params = vec![("code".to_owned(), "abc".to_owned())];
        let response =
            authorization_response("https://c/cb?keep=1", &params, ResponseMode::Query);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "https://c/cb?keep=1&code=abc");

        let response = authorization_response("https://c/cb", &params, ResponseMode::Query);
        assert_eq!(location(&response), "https://c/cb?code=abc");
    }

    #[test]
    fn fragment_mode_joins_with_ampersand() {
        let params = vec![
            ("error".to_owned(), "invalid_request".to_owned()),
            ("state".to_owned(), "s".to_owned()),
        ];
        let response = authorization_response("https://c/cb", &params, ResponseMode::Fragment);
        assert_eq!(location(&response), "https://c/cb#error=invalid_request&state=s");
    }

    #[test]
    fn parameters_are_url_encoded() {
        let params = vec![("error_description".to_owned(), "nonce parameter missing".to_owned())];
        let response = authorization_response("https://c/cb", &params, ResponseMode::Fragment);
        assert_eq!(
            location(&response),
            "https://c/cb#error_description=nonce%20parameter%20missing"
        );
    }

    #[test]
    fn html_escape_covers_every_special() {
        assert_eq!(
            html_escape(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;"
        );
    }

    #[test]
    fn json_error_carries_no_cache_headers() {
        let response = json_error(&ErrorResponse::new("invalid_request", "bad"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(response.headers().get(PRAGMA).unwrap(), "no-cache");
        assert_eq!(response.headers().get(EXPIRES).unwrap(), "-1");
    }

    #[test]
    fn native_error_page_is_plain_text() {
        let response = native_error_page(&ErrorResponse::new("server_error", "boom"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }
}
