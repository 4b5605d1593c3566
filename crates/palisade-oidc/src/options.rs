//! Server options.
//!
//! One options value configures the whole protocol surface: endpoint paths,
//! token lifetimes, signing material, token formats, the request cache, and
//! the provider hooks. Everything is plain data or a trait object so a host
//! can assemble the server without touching core code.

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use url::Url;

use palisade_cache::{MemoryRequestCache, RequestCache};
use palisade_crypto::{AeadDataProtector, SigningCredential};

use crate::provider::{DefaultServerProvider, OidcServerProvider};
use crate::serializer::{JwtTokenHandler, ProtectedTicketFormat, SecurityTokenHandler, TicketFormat};

/// Default endpoint paths.
pub mod paths {
    /// Authorization endpoint.
    pub const AUTHORIZATION: &str = "/connect/authorize";
    /// Token endpoint.
    pub const TOKEN: &str = "/connect/token";
    /// Token validation (introspection) endpoint.
    pub const INTROSPECTION: &str = "/connect/token_validation";
    /// Logout endpoint.
    pub const LOGOUT: &str = "/connect/logout";
    /// Discovery document.
    pub const CONFIGURATION: &str = "/.well-known/openid-configuration";
    /// JSON Web Key Set.
    pub const JWKS: &str = "/.well-known/jwks";
}

/// Errors raised while validating options.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The issuer carries a query or fragment component.
    #[error("issuer must not carry a query or fragment: {0}")]
    InvalidIssuer(String),
}

/// Configuration for the authorization server core.
pub struct ServerOptions {
    /// Absolute URI used as the `iss` claim and the metadata issuer.
    pub issuer: Url,

    /// Authorization endpoint path; empty disables the endpoint.
    pub authorization_endpoint_path: String,
    /// Token endpoint path; empty disables the endpoint.
    pub token_endpoint_path: String,
    /// Introspection endpoint path; empty disables the endpoint.
    pub introspection_endpoint_path: String,
    /// Logout endpoint path; empty disables the endpoint.
    pub logout_endpoint_path: String,
    /// Discovery document path; empty disables the endpoint.
    pub configuration_endpoint_path: String,
    /// JWKS path; empty disables the endpoint.
    pub jwks_endpoint_path: String,

    /// Lifetime of authorization codes.
    pub authorization_code_lifetime: Duration,
    /// Lifetime of access tokens.
    pub access_token_lifetime: Duration,
    /// Lifetime of identity tokens.
    pub identity_token_lifetime: Duration,
    /// Lifetime of refresh tokens.
    pub refresh_token_lifetime: Duration,

    /// When false, tokens minted on the refresh grant cannot outlive the
    /// incoming refresh token.
    pub use_sliding_expiration: bool,

    /// Permits plaintext HTTP requests and non-TLS `redirect_uri` values.
    pub allow_insecure_http: bool,

    /// When true, errors without a usable `redirect_uri` are handed to the
    /// host application instead of rendered as a native plain-text page.
    pub application_can_display_errors: bool,

    /// Ordered signing credentials; the first RS256-capable one signs, all
    /// are advertised on JWKS.
    pub signing_credentials: Vec<SigningCredential>,

    /// Access token serialization; `None` selects the opaque format.
    pub access_token_handler: Option<Arc<dyn SecurityTokenHandler>>,
    /// Identity token serialization; `None` selects the opaque format.
    pub identity_token_handler: Option<Arc<dyn SecurityTokenHandler>>,

    /// Data-protection format for opaque access tokens.
    pub access_token_format: Arc<dyn TicketFormat>,
    /// Data-protection format for authorization codes.
    pub authorization_code_format: Arc<dyn TicketFormat>,
    /// Data-protection format for refresh tokens.
    pub refresh_token_format: Arc<dyn TicketFormat>,

    /// Short-lived store for in-flight requests and authorization codes.
    pub cache: Arc<dyn RequestCache>,

    /// Extension hooks.
    pub provider: Arc<dyn OidcServerProvider>,
}

impl ServerOptions {
    /// Creates options with the default endpoint paths, lifetimes, JWT
    /// handlers, per-format data protection, in-memory cache, and no-op
    /// provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer carries a query or fragment.
    pub fn new(issuer: Url) -> Result<Self, OptionsError> {
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(OptionsError::InvalidIssuer(issuer.to_string()));
        }

        Ok(Self {
            issuer,
            authorization_endpoint_path: paths::AUTHORIZATION.to_owned(),
            token_endpoint_path: paths::TOKEN.to_owned(),
            introspection_endpoint_path: paths::INTROSPECTION.to_owned(),
            logout_endpoint_path: paths::LOGOUT.to_owned(),
            configuration_endpoint_path: paths::CONFIGURATION.to_owned(),
            jwks_endpoint_path: paths::JWKS.to_owned(),
            authorization_code_lifetime: Duration::minutes(5),
            access_token_lifetime: Duration::hours(1),
            identity_token_lifetime: Duration::minutes(20),
            refresh_token_lifetime: Duration::hours(6),
            use_sliding_expiration: true,
            allow_insecure_http: false,
            application_can_display_errors: false,
            signing_credentials: Vec::new(),
            access_token_handler: Some(Arc::new(JwtTokenHandler)),
            identity_token_handler: Some(Arc::new(JwtTokenHandler)),
            access_token_format: Arc::new(ProtectedTicketFormat::new(Arc::new(
                AeadDataProtector::random(),
            ))),
            authorization_code_format: Arc::new(ProtectedTicketFormat::new(Arc::new(
                AeadDataProtector::random(),
            ))),
            refresh_token_format: Arc::new(ProtectedTicketFormat::new(Arc::new(
                AeadDataProtector::random(),
            ))),
            cache: Arc::new(MemoryRequestCache::new()),
            provider: Arc::new(DefaultServerProvider),
        })
    }

    /// Returns the first credential able to sign RS256, if any.
    #[must_use]
    pub fn signing_credential(&self) -> Option<&SigningCredential> {
        self.signing_credentials
            .iter()
            .find(|credential| credential.supports_rs256())
    }

    /// Checks whether the token endpoint is enabled.
    #[must_use]
    pub fn token_endpoint_enabled(&self) -> bool {
        !self.token_endpoint_path.is_empty()
    }

    /// Builds the absolute URI of an endpoint from its configured path.
    #[must_use]
    pub fn absolute_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.issuer.as_str().trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_lifetimes() {
        let options = ServerOptions::new(Url::parse("https://server.example.com").unwrap()).unwrap();
        assert_eq!(options.authorization_code_lifetime, Duration::minutes(5));
        assert_eq!(options.access_token_lifetime, Duration::hours(1));
        assert_eq!(options.identity_token_lifetime, Duration::minutes(20));
        assert_eq!(options.refresh_token_lifetime, Duration::hours(6));
        assert!(options.use_sliding_expiration);
        assert!(!options.allow_insecure_http);
        assert_eq!(options.authorization_endpoint_path, "/connect/authorize");
        assert_eq!(options.jwks_endpoint_path, "/.well-known/jwks");
    }

    #[test]
    fn issuer_with_query_or_fragment_is_rejected() {
        assert!(ServerOptions::new(Url::parse("https://id.example.com/?x=1").unwrap()).is_err());
        assert!(ServerOptions::new(Url::parse("https://id.example.com/#frag").unwrap()).is_err());
    }

    #[test]
    fn absolute_endpoint_joins_without_double_slash() {
        let options = ServerOptions::new(Url::parse("https://id.example.com/").unwrap()).unwrap();
        assert_eq!(
            options.absolute_endpoint("/connect/token"),
            "https://id.example.com/connect/token"
        );
    }
}
