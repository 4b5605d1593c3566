//! Request handling entry points.
//!
//! The core is host-framework-agnostic: the host adapts its inbound request
//! into a [`ServerRequest`], calls [`OidcServerHandler::handle`], and writes
//! whatever response comes back. Authorization and logout are two-phase —
//! validation first, then a completion call once the host has signed the
//! user in (or out) — mirroring the fact that user authentication itself is
//! not the core's business.

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use palisade_model::{AuthenticationTicket, ProtocolMessage};

use crate::endpoints::{authorization, discovery, dispatcher, introspection, logout, token};
use crate::error::ErrorResponse;
use crate::options::ServerOptions;
use crate::provider::{Endpoint, EndpointOutcome, MatchEndpointContext};
use crate::response;

/// An inbound HTTP request, reduced to what the protocol needs.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    /// Request method.
    pub method: Method,
    /// Request URI (path and query).
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body bytes.
    pub body: Vec<u8>,
    /// Whether the request arrived over TLS.
    pub secure: bool,
}

impl ServerRequest {
    /// Creates a GET request from a URI string.
    ///
    /// # Panics
    ///
    /// Panics if the URI does not parse; intended for host adapters and
    /// tests working with known-good URIs.
    #[must_use]
    pub fn get(uri: &str) -> Self {
        let uri: Uri = uri.parse().expect("valid uri");
        let secure = uri.scheme_str() == Some("https");
        Self {
            method: Method::GET,
            uri,
            headers: HeaderMap::new(),
            body: Vec::new(),
            secure,
        }
    }

    /// Creates a POST request carrying a form-encoded body.
    ///
    /// # Panics
    ///
    /// Panics if the URI does not parse.
    #[must_use]
    pub fn post_form(uri: &str, pairs: &[(&str, &str)]) -> Self {
        let mut request = Self::get(uri);
        request.method = Method::POST;
        request.headers.insert(
            CONTENT_TYPE,
            "application/x-www-form-urlencoded"
                .parse()
                .expect("static header value"),
        );
        request.body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
            .into_bytes();
        request
    }

    /// Marks the request as having arrived over TLS (or not).
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Ordered query parameters.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ordered form-body parameters.
    #[must_use]
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }

    /// The Content-Type header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Checks for `application/x-www-form-urlencoded`, accepting charset
    /// suffixes via prefix matching.
    #[must_use]
    pub fn has_form_content_type(&self) -> bool {
        self.content_type()
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
    }

    /// Parses Basic credentials from the Authorization header:
    /// UTF-8 of the base64-decoded value, split at the first colon.
    #[must_use]
    pub fn basic_credentials(&self) -> Option<(String, String)> {
        let header = self.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let credentials = String::from_utf8(decoded).ok()?;
        let (client_id, client_secret) = credentials.split_once(':')?;
        Some((client_id.to_owned(), client_secret.to_owned()))
    }
}

/// What the core decided about a request.
pub enum HandleOutcome {
    /// The core produced a response; write it.
    Response(Response),
    /// The request is not for this server; continue down the host pipeline.
    PassThrough(ServerRequest),
    /// A validated authorization request awaits user sign-in. Authenticate
    /// the user, then call
    /// [`OidcServerHandler::complete_authorization`] with the message and
    /// the resulting ticket.
    AwaitSignIn(ProtocolMessage),
    /// A validated logout request awaits sign-out. Sign the user out, then
    /// call [`OidcServerHandler::complete_logout`].
    AwaitSignOut(ProtocolMessage),
    /// An error the host application chose to render itself
    /// (`application_can_display_errors`).
    ApplicationError(ErrorResponse),
}

/// The authorization server core.
pub struct OidcServerHandler {
    options: Arc<ServerOptions>,
}

impl OidcServerHandler {
    /// Creates a handler over the given options.
    #[must_use]
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Returns the server options.
    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Classifies and processes one request.
    ///
    /// Dropping the returned future cancels the request: in-flight cache
    /// and provider operations are abandoned and no response is produced.
    pub async fn handle(&self, request: ServerRequest) -> HandleOutcome {
        let matched = dispatcher::match_path(&self.options, request.path());
        let mut ctx = MatchEndpointContext::new(request.path().to_owned(), matched);
        self.options.provider.match_endpoint(&mut ctx).await;

        match std::mem::take(&mut ctx.outcome) {
            EndpointOutcome::Handled(response) => return HandleOutcome::Response(response),
            EndpointOutcome::Skipped => return HandleOutcome::PassThrough(request),
            EndpointOutcome::Continue => {}
        }

        let Some(endpoint) = ctx.endpoint() else {
            return HandleOutcome::PassThrough(request);
        };

        if !request.secure && !self.options.allow_insecure_http {
            tracing::debug!(path = request.path(), "rejecting non-TLS protocol request");
            return HandleOutcome::Response(response::native_error_page(&ErrorResponse::new(
                "invalid_request",
                "this server requires TLS",
            )));
        }

        match endpoint {
            Endpoint::Authorization => authorization::handle(&self.options, &request).await,
            Endpoint::Token => token::handle(&self.options, &request).await,
            Endpoint::Introspection => introspection::handle(&self.options, &request).await,
            Endpoint::Logout => logout::handle(&self.options, &request).await,
            Endpoint::Configuration => discovery::handle_configuration(&self.options, &request).await,
            Endpoint::Cryptography => discovery::handle_jwks(&self.options, &request).await,
        }
    }

    /// Completes a pending authorization once the host has signed the user
    /// in: mints the requested tokens and materializes the redirect or
    /// form-post response.
    pub async fn complete_authorization(
        &self,
        message: &ProtocolMessage,
        ticket: AuthenticationTicket,
    ) -> HandleOutcome {
        authorization::complete(&self.options, message, ticket).await
    }

    /// Completes a pending logout once the host has signed the user out:
    /// redirects to the validated post-logout URI, or returns an empty 200.
    pub async fn complete_logout(&self, message: &ProtocolMessage) -> Response {
        logout::complete(&self.options, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_preserve_order() {
        let request = ServerRequest::get("https://id.example.com/connect/authorize?b=2&a=1");
        assert_eq!(
            request.query_pairs(),
            vec![("b".to_owned(), "2".to_owned()), ("a".to_owned(), "1".to_owned())]
        );
    }

    #[test]
    fn form_content_type_accepts_charset_suffix() {
        let mut request = ServerRequest::post_form("https://id.example.com/connect/token", &[]);
        assert!(request.has_form_content_type());

        request.headers.insert(
            CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=utf-8".parse().unwrap(),
        );
        assert!(request.has_form_content_type());

        request.headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(!request.has_form_content_type());
    }

    #[test]
    fn basic_credentials_split_at_first_colon() {
        let mut request = ServerRequest::post_form("https://id.example.com/connect/token", &[]);
        // "app1:se:cret"
        request
            .headers
            .insert(AUTHORIZATION, "Basic YXBwMTpzZTpjcmV0".parse().unwrap());
        assert_eq!(
            request.basic_credentials(),
            Some(("app1".to_owned(), "se:cret".to_owned()))
        );
    }

    #[test]
    fn malformed_basic_header_reads_as_absent() {
        let mut request = ServerRequest::post_form("https://id.example.com/connect/token", &[]);
        request
            .headers
            .insert(AUTHORIZATION, "Basic !!!notbase64!!!".parse().unwrap());
        assert_eq!(request.basic_credentials(), None);

        // No colon separator.
        request
            .headers
            .insert(AUTHORIZATION, "Basic bm9jb2xvbg==".parse().unwrap());
        assert_eq!(request.basic_credentials(), None);
    }

    #[test]
    fn secure_flag_follows_scheme() {
        assert!(ServerRequest::get("https://id.example.com/x").secure);
        assert!(!ServerRequest::get("http://id.example.com/x").secure);
    }
}
