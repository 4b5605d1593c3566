//! # palisade-oidc
//!
//! `OpenID` Connect 1.0 / OAuth 2.0 authorization server core.
//!
//! Implements the wire-level protocol surface of an identity provider:
//! - Authorization endpoint (code, implicit, and hybrid flows)
//! - Token endpoint (`authorization_code`, `refresh_token`, `password`,
//!   `client_credentials`, and custom grants)
//! - Token validation (introspection) endpoint
//! - Logout endpoint
//! - Discovery document and JWKS endpoints
//!
//! The core is deliberately incomplete on its own: client registration,
//! user authentication, and persistence belong to the hosting application,
//! which plugs in through [`OidcServerProvider`] and the trait objects on
//! [`ServerOptions`]. See the crate's integration tests for a minimal host.
//!
//! Specifications: RFC 6749, RFC 7515, RFC 7519, `OpenID` Connect Core 1.0,
//! Discovery 1.0, and the logout subset of Session Management 1.0.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod endpoints;
pub mod error;
pub mod handler;
pub mod options;
pub mod provider;
pub mod response;
pub mod serializer;

pub use endpoints::discovery::{ConfigurationMetadata, JsonWebKey, JsonWebKeySet};
pub use endpoints::introspection::{IntrospectedClaim, IntrospectionResponse};
pub use endpoints::token::TokenResponse;
pub use error::{ErrorResponse, ProtocolError};
pub use handler::{HandleOutcome, OidcServerHandler, ServerRequest};
pub use options::{OptionsError, ServerOptions};
pub use provider::{
    Decision, DefaultServerProvider, Endpoint, OidcServerProvider, TokenKind,
};
pub use response::ResponseMode;
pub use serializer::{
    JwtTokenHandler, ProtectedTicketFormat, SecurityTokenHandler, TicketFormat, TokenDescriptor,
    TokenValidationParameters,
};
