//! Extension hooks.
//!
//! The hosting application plugs into the protocol flow through a single
//! trait with default method bodies. Every hook receives a mutable context
//! carrying the data relevant at that point plus a tagged decision, so
//! contradictory states (validated and rejected at once) cannot be
//! expressed.

use async_trait::async_trait;
use axum::response::Response;

use palisade_model::{AuthenticationTicket, ProtocolMessage};

/// The endpoints a request can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The authorization endpoint.
    Authorization,
    /// The token endpoint.
    Token,
    /// The token validation (introspection) endpoint.
    Introspection,
    /// The logout endpoint.
    Logout,
    /// The discovery document endpoint.
    Configuration,
    /// The JWKS endpoint.
    Cryptography,
}

/// Outcome of a validating hook.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Decision {
    /// The hook expressed no opinion; default behavior applies.
    #[default]
    Skipped,
    /// The hook accepted the request.
    Validated,
    /// The hook rejected the request.
    Rejected {
        /// Error code; the hook's default applies when absent.
        error: Option<String>,
        /// Human-readable description.
        error_description: Option<String>,
        /// URI with more information.
        error_uri: Option<String>,
    },
}

impl Decision {
    /// Checks whether the decision is `Validated`.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated)
    }

    /// Checks whether the decision is `Rejected`.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Converts the decision into a wire error, substituting the invoking
    /// hook's default code when the rejection named none.
    pub(crate) fn rejection_error(&self, default_error: &str) -> crate::error::ErrorResponse {
        if let Self::Rejected {
            error,
            error_description,
            error_uri,
        } = self
        {
            crate::error::ErrorResponse {
                error: error.clone().unwrap_or_else(|| default_error.to_owned()),
                error_description: error_description.clone(),
                error_uri: error_uri.clone(),
            }
        } else {
            crate::error::ErrorResponse {
                error: default_error.to_owned(),
                error_description: None,
                error_uri: None,
            }
        }
    }
}

/// Outcome of an endpoint-level hook.
#[derive(Default)]
pub enum EndpointOutcome {
    /// Default processing continues.
    #[default]
    Continue,
    /// The provider wrote the response; the core must not.
    Handled(Response),
    /// The request is handed back to the host middleware untouched.
    Skipped,
}

macro_rules! decision_methods {
    () => {
        /// Accepts the request.
        pub fn validate(&mut self) {
            self.decision = Decision::Validated;
        }

        /// Rejects the request with the hook's default error code.
        pub fn reject(&mut self) {
            self.decision = Decision::Rejected {
                error: None,
                error_description: None,
                error_uri: None,
            };
        }

        /// Rejects the request with an explicit error triple.
        pub fn reject_with(
            &mut self,
            error: impl Into<String>,
            description: Option<String>,
            uri: Option<String>,
        ) {
            self.decision = Decision::Rejected {
                error: Some(error.into()),
                error_description: description,
                error_uri: uri,
            };
        }

        /// Returns the current decision.
        #[must_use]
        pub fn decision(&self) -> &Decision {
            &self.decision
        }
    };
}

/// Context of the `match_endpoint` hook.
pub struct MatchEndpointContext {
    path: String,
    endpoint: Option<Endpoint>,
    pub(crate) outcome: EndpointOutcome,
}

impl MatchEndpointContext {
    pub(crate) fn new(path: String, endpoint: Option<Endpoint>) -> Self {
        Self {
            path,
            endpoint,
            outcome: EndpointOutcome::Continue,
        }
    }

    /// The request path being classified.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The endpoint matched by path comparison, if any.
    #[must_use]
    pub const fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint
    }

    /// Reclassifies the request.
    ///
    /// A provider can flag an arbitrary sub-path (e.g. an accept/deny form
    /// handler) as the authorization endpoint.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = Some(endpoint);
    }

    /// Clears the classification so the request passes through.
    pub fn clear_endpoint(&mut self) {
        self.endpoint = None;
    }

    /// Marks the request as fully handled with the given response.
    pub fn handle(&mut self, response: Response) {
        self.outcome = EndpointOutcome::Handled(response);
    }

    /// Yields the request back to the host middleware.
    pub fn skip(&mut self) {
        self.outcome = EndpointOutcome::Skipped;
    }
}

/// Context of the `validate_client_redirect_uri` hook.
///
/// The hook must call [`validate`](Self::validate) for the authorization
/// request to proceed; anything else rejects the client.
pub struct ValidateClientRedirectUriContext {
    message: ProtocolMessage,
    client_id: String,
    redirect_uri: Option<String>,
    decision: Decision,
}

impl ValidateClientRedirectUriContext {
    pub(crate) fn new(message: ProtocolMessage, client_id: String, redirect_uri: Option<String>) -> Self {
        Self {
            message,
            client_id,
            redirect_uri,
            decision: Decision::Skipped,
        }
    }

    /// The authorization request under validation.
    #[must_use]
    pub fn message(&self) -> &ProtocolMessage {
        &self.message
    }

    /// The requesting client.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The redirect URI flowed on the request, if any.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    /// Supplies the registered redirect URI when the request omitted it.
    pub fn set_redirect_uri(&mut self, redirect_uri: String) {
        self.redirect_uri = Some(redirect_uri);
    }

    pub(crate) fn into_redirect_uri(self) -> Option<String> {
        self.redirect_uri
    }

    decision_methods!();
}

/// Context of the `validate_client_authentication` hook.
pub struct ValidateClientAuthenticationContext {
    message: ProtocolMessage,
    client_id: Option<String>,
    client_secret: Option<String>,
    decision: Decision,
}

impl ValidateClientAuthenticationContext {
    pub(crate) fn new(
        message: ProtocolMessage,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            message,
            client_id,
            client_secret,
            decision: Decision::Skipped,
        }
    }

    /// The token request under validation.
    #[must_use]
    pub fn message(&self) -> &ProtocolMessage {
        &self.message
    }

    /// The client identifier, from the form body or the Basic header.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// The client secret, from the form body or the Basic header.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    decision_methods!();
}

/// Context of a request-validation hook
/// (`validate_authorization_request`, `validate_token_request`).
pub struct ValidateRequestContext {
    message: ProtocolMessage,
    ticket: Option<AuthenticationTicket>,
    decision: Decision,
}

impl ValidateRequestContext {
    pub(crate) fn new(message: ProtocolMessage, ticket: Option<AuthenticationTicket>) -> Self {
        Self {
            message,
            ticket,
            decision: Decision::Skipped,
        }
    }

    /// The request under validation.
    #[must_use]
    pub fn message(&self) -> &ProtocolMessage {
        &self.message
    }

    /// The ticket materialized from the incoming grant, when there is one.
    #[must_use]
    pub fn ticket(&self) -> Option<&AuthenticationTicket> {
        self.ticket.as_ref()
    }

    decision_methods!();
}

/// Context of the `validate_client_logout_redirect_uri` hook.
pub struct ValidateLogoutRedirectUriContext {
    message: ProtocolMessage,
    post_logout_redirect_uri: String,
    decision: Decision,
}

impl ValidateLogoutRedirectUriContext {
    pub(crate) fn new(message: ProtocolMessage, post_logout_redirect_uri: String) -> Self {
        Self {
            message,
            post_logout_redirect_uri,
            decision: Decision::Skipped,
        }
    }

    /// The logout request under validation.
    #[must_use]
    pub fn message(&self) -> &ProtocolMessage {
        &self.message
    }

    /// The post-logout redirect URI flowed on the request.
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> &str {
        &self.post_logout_redirect_uri
    }

    decision_methods!();
}

/// Context of a grant hook.
///
/// Grant hooks may replace the ticket; the replacement is what the token
/// endpoint serializes.
pub struct GrantContext {
    message: ProtocolMessage,
    ticket: Option<AuthenticationTicket>,
    decision: Decision,
}

impl GrantContext {
    pub(crate) fn new(message: ProtocolMessage, ticket: Option<AuthenticationTicket>) -> Self {
        Self {
            message,
            ticket,
            decision: Decision::Skipped,
        }
    }

    /// The token request.
    #[must_use]
    pub fn message(&self) -> &ProtocolMessage {
        &self.message
    }

    /// The ticket the grant would issue tokens from.
    #[must_use]
    pub fn ticket(&self) -> Option<&AuthenticationTicket> {
        self.ticket.as_ref()
    }

    /// Accepts the grant with a replacement ticket.
    pub fn validate_with(&mut self, ticket: AuthenticationTicket) {
        self.ticket = Some(ticket);
        self.decision = Decision::Validated;
    }

    pub(crate) fn into_ticket(self) -> Option<AuthenticationTicket> {
        self.ticket
    }

    decision_methods!();
}

/// Context of an endpoint-level observation hook.
pub struct EndpointContext {
    message: Option<ProtocolMessage>,
    pub(crate) outcome: EndpointOutcome,
}

impl EndpointContext {
    pub(crate) fn new(message: Option<ProtocolMessage>) -> Self {
        Self {
            message,
            outcome: EndpointOutcome::Continue,
        }
    }

    /// The request message, for endpoints that parse one.
    #[must_use]
    pub fn message(&self) -> Option<&ProtocolMessage> {
        self.message.as_ref()
    }

    /// Marks the request as fully handled with the given response.
    pub fn handle(&mut self, response: Response) {
        self.outcome = EndpointOutcome::Handled(response);
    }
}

/// The token kinds flowing through creation and receive hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Authorization code.
    AuthorizationCode,
    /// Access token.
    AccessToken,
    /// Identity token.
    IdentityToken,
    /// Refresh token.
    RefreshToken,
}

/// Context of a token-creation hook.
///
/// The provider may serialize the token itself; otherwise the default
/// serializer applies.
pub struct TokenCreationContext {
    kind: TokenKind,
    ticket: AuthenticationTicket,
    token: Option<String>,
}

impl TokenCreationContext {
    pub(crate) fn new(kind: TokenKind, ticket: AuthenticationTicket) -> Self {
        Self {
            kind,
            ticket,
            token: None,
        }
    }

    /// The token kind being minted.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The prepared ticket the token will carry.
    #[must_use]
    pub fn ticket(&self) -> &AuthenticationTicket {
        &self.ticket
    }

    /// Emits the serialized token, overriding the default serializer.
    pub fn issue(&mut self, token: String) {
        self.token = Some(token);
    }

    pub(crate) fn into_parts(self) -> (AuthenticationTicket, Option<String>) {
        (self.ticket, self.token)
    }
}

/// Context of a token-receive hook.
///
/// The provider may materialize the ticket itself; otherwise the default
/// deserializer applies.
pub struct TokenReceiveContext {
    kind: TokenKind,
    token: String,
    ticket: Option<AuthenticationTicket>,
}

impl TokenReceiveContext {
    pub(crate) fn new(kind: TokenKind, token: String) -> Self {
        Self {
            kind,
            token,
            ticket: None,
        }
    }

    /// The token kind being read.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The serialized token as received from the client.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Supplies the materialized ticket, overriding the default
    /// deserializer.
    pub fn materialize(&mut self, ticket: AuthenticationTicket) {
        self.ticket = Some(ticket);
    }

    pub(crate) fn into_ticket(self) -> Option<AuthenticationTicket> {
        self.ticket
    }
}

/// Extension points invoked by the core at fixed places in each flow.
///
/// Implementations must be safe for concurrent invocation; the core never
/// serializes hook calls across requests. Default bodies express the
/// documented defaults: validation hooks skip, the code and refresh grants
/// accept the materialized ticket, and the remaining grants reject.
#[async_trait]
pub trait OidcServerProvider: Send + Sync {
    /// Classifies the request; may reclassify, handle, or skip.
    async fn match_endpoint(&self, _ctx: &mut MatchEndpointContext) {}

    /// Validates the client and its redirect URI.
    ///
    /// Must call `validate()` or the authorization request is rejected with
    /// `invalid_client`.
    async fn validate_client_redirect_uri(&self, _ctx: &mut ValidateClientRedirectUriContext) {}

    /// Authenticates the client at the token endpoint.
    async fn validate_client_authentication(&self, _ctx: &mut ValidateClientAuthenticationContext) {}

    /// Validates the fully-parsed authorization request.
    async fn validate_authorization_request(&self, _ctx: &mut ValidateRequestContext) {}

    /// Validates the token request, with the materialized ticket attached
    /// on the code and refresh grants.
    async fn validate_token_request(&self, _ctx: &mut ValidateRequestContext) {}

    /// Validates the post-logout redirect URI.
    ///
    /// Must call `validate()` for the URI to be honored.
    async fn validate_client_logout_redirect_uri(&self, _ctx: &mut ValidateLogoutRedirectUriContext) {}

    /// Accepts or rejects the authorization-code grant.
    async fn grant_authorization_code(&self, ctx: &mut GrantContext) {
        if ctx.ticket().is_some() {
            ctx.validate();
        }
    }

    /// Accepts or rejects the refresh-token grant.
    async fn grant_refresh_token(&self, ctx: &mut GrantContext) {
        if ctx.ticket().is_some() {
            ctx.validate();
        }
    }

    /// Handles the resource-owner password grant. Rejects by default.
    async fn grant_resource_owner_credentials(&self, _ctx: &mut GrantContext) {}

    /// Handles the client-credentials grant. Rejects by default.
    async fn grant_client_credentials(&self, _ctx: &mut GrantContext) {}

    /// Handles unrecognized grant types. Rejects by default.
    async fn grant_custom_extension(&self, _ctx: &mut GrantContext) {}

    /// Observes the authorization endpoint after validation.
    async fn authorization_endpoint(&self, _ctx: &mut EndpointContext) {}

    /// Observes the token endpoint before grant processing.
    async fn token_endpoint(&self, _ctx: &mut EndpointContext) {}

    /// Observes the introspection endpoint.
    async fn introspection_endpoint(&self, _ctx: &mut EndpointContext) {}

    /// Observes the logout endpoint.
    async fn logout_endpoint(&self, _ctx: &mut EndpointContext) {}

    /// Observes the discovery endpoint.
    async fn configuration_endpoint(&self, _ctx: &mut EndpointContext) {}

    /// Observes the JWKS endpoint.
    async fn cryptography_endpoint(&self, _ctx: &mut EndpointContext) {}

    /// Overrides authorization-code serialization.
    async fn create_authorization_code(&self, _ctx: &mut TokenCreationContext) {}

    /// Overrides access-token serialization.
    async fn create_access_token(&self, _ctx: &mut TokenCreationContext) {}

    /// Overrides identity-token serialization.
    async fn create_identity_token(&self, _ctx: &mut TokenCreationContext) {}

    /// Overrides refresh-token serialization.
    async fn create_refresh_token(&self, _ctx: &mut TokenCreationContext) {}

    /// Overrides authorization-code deserialization.
    async fn receive_authorization_code(&self, _ctx: &mut TokenReceiveContext) {}

    /// Overrides access-token deserialization.
    async fn receive_access_token(&self, _ctx: &mut TokenReceiveContext) {}

    /// Overrides identity-token deserialization.
    async fn receive_identity_token(&self, _ctx: &mut TokenReceiveContext) {}

    /// Overrides refresh-token deserialization.
    async fn receive_refresh_token(&self, _ctx: &mut TokenReceiveContext) {}
}

/// Provider with every default behavior.
///
/// With it, authorization requests are rejected at the redirect-uri check:
/// a real host must at minimum validate its clients.
pub struct DefaultServerProvider;

#[async_trait]
impl OidcServerProvider for DefaultServerProvider {}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_model::MessageKind;

    fn message() -> ProtocolMessage {
        ProtocolMessage::new(MessageKind::TokenRequest)
    }

    #[tokio::test]
    async fn validation_hooks_default_to_skipped() {
        let provider = DefaultServerProvider;

        let mut ctx = ValidateClientRedirectUriContext::new(message(), "app1".to_owned(), None);
        provider.validate_client_redirect_uri(&mut ctx).await;
        assert!(!ctx.decision().is_validated());
        assert!(!ctx.decision().is_rejected());
    }

    #[tokio::test]
    async fn code_grant_defaults_to_accepting_the_ticket() {
        let provider = DefaultServerProvider;

        let mut ctx = GrantContext::new(message(), Some(AuthenticationTicket::default()));
        provider.grant_authorization_code(&mut ctx).await;
        assert!(ctx.decision().is_validated());

        let mut ctx = GrantContext::new(message(), None);
        provider.grant_authorization_code(&mut ctx).await;
        assert!(!ctx.decision().is_validated());
    }

    #[tokio::test]
    async fn password_grant_defaults_to_reject() {
        let provider = DefaultServerProvider;
        let mut ctx = GrantContext::new(message(), None);
        provider.grant_resource_owner_credentials(&mut ctx).await;
        assert!(!ctx.decision().is_validated());
    }

    #[test]
    fn rejection_carries_the_error_triple() {
        let mut ctx = GrantContext::new(message(), None);
        ctx.reject_with("invalid_grant", Some("expired".to_owned()), None);
        match ctx.decision() {
            Decision::Rejected {
                error,
                error_description,
                ..
            } => {
                assert_eq!(error.as_deref(), Some("invalid_grant"));
                assert_eq!(error_description.as_deref(), Some("expired"));
            }
            _ => panic!("expected rejection"),
        }
    }
}
