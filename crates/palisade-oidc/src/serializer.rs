//! Token serialization.
//!
//! Two strategies, independently selectable per token kind:
//!
//! - **JWT** (RS256), the default for access and identity tokens. The
//!   payload carries the registered claims plus every ticket claim whose
//!   destination set includes the token kind.
//! - **Opaque**, the default for authorization codes and refresh tokens:
//!   the ticket snapshot is sealed by the configured data-protection format.
//!   Authorization codes add one indirection — the ciphertext is parked in
//!   the request cache under a random 256-bit key and the key is what the
//!   client sees.
//!
//! Serialization failures never escape: they are logged as warnings and
//! surface as `None`, which the endpoints translate into `server_error`.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header, encode};
use serde_json::{Map, Value};
use tracing::warn;

use palisade_cache::ExpirationPolicy;
use palisade_crypto::hash::token_hash;
use palisade_crypto::random::request_key;
use palisade_crypto::{DataProtector, SigningCredential};
use palisade_model::ticket::claims;
use palisade_model::{AuthenticationTicket, Claim, Destination, SubjectIdentity, TicketProperties};

use crate::error::ProtocolError;
use crate::options::ServerOptions;
use crate::provider::{TokenCreationContext, TokenKind, TokenReceiveContext};

/// Everything a token handler needs to serialize a prepared ticket.
pub struct TokenDescriptor<'a> {
    /// Issuer identifier (`iss`).
    pub issuer: &'a str,
    /// Token audiences (`aud`); string when single, array when multiple.
    pub audiences: &'a [String],
    /// The token kind the claims were filtered for.
    pub destination: Destination,
    /// The prepared ticket copy: claims filtered, lifetime stamped.
    pub ticket: &'a AuthenticationTicket,
    /// The credential to sign with.
    pub signing: &'a SigningCredential,
}

/// Everything a token handler needs to read a token back.
///
/// Audience and lifetime checks are deliberately absent: the endpoints apply
/// them against the reconstructed ticket.
pub struct TokenValidationParameters<'a> {
    /// Expected issuer.
    pub issuer: &'a str,
    /// Credentials whose keys may have signed the token.
    pub credentials: &'a [SigningCredential],
    /// Destination to tag reconstructed claims with.
    pub destination: Destination,
}

/// Serializes and deserializes signed security tokens.
///
/// Swap the implementation on [`ServerOptions`] to emit a different token
/// format; set the handler to `None` to fall back to the opaque format.
pub trait SecurityTokenHandler: Send + Sync {
    /// Serializes a prepared ticket into a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticket cannot be expressed in the token
    /// format or signing fails.
    fn write_token(&self, descriptor: &TokenDescriptor<'_>) -> Result<String, ProtocolError>;

    /// Verifies a token and reconstructs its ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature or issuer does not verify.
    fn read_token(
        &self,
        token: &str,
        parameters: &TokenValidationParameters<'_>,
    ) -> Result<AuthenticationTicket, ProtocolError>;
}

/// Data-protection serialization of a complete ticket.
pub trait TicketFormat: Send + Sync {
    /// Seals a ticket into an opaque string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or sealing fails.
    fn protect(&self, ticket: &AuthenticationTicket) -> Result<String, ProtocolError>;

    /// Opens an opaque string back into a ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or fails authentication.
    fn unprotect(&self, protected: &str) -> Result<AuthenticationTicket, ProtocolError>;
}

/// [`TicketFormat`] over a [`DataProtector`]: JSON snapshot, sealed,
/// base64url-encoded.
pub struct ProtectedTicketFormat {
    protector: Arc<dyn DataProtector>,
}

impl ProtectedTicketFormat {
    /// Creates a format over the given protector.
    #[must_use]
    pub fn new(protector: Arc<dyn DataProtector>) -> Self {
        Self { protector }
    }
}

impl TicketFormat for ProtectedTicketFormat {
    fn protect(&self, ticket: &AuthenticationTicket) -> Result<String, ProtocolError> {
        let snapshot = serde_json::to_vec(ticket)
            .map_err(|e| ProtocolError::ServerError(format!("ticket serialization failed: {e}")))?;
        let sealed = self
            .protector
            .protect(&snapshot)
            .map_err(|e| ProtocolError::ServerError(format!("ticket protection failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn unprotect(&self, protected: &str) -> Result<AuthenticationTicket, ProtocolError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(protected)
            .map_err(|e| ProtocolError::InvalidGrant(format!("malformed token: {e}")))?;
        let snapshot = self
            .protector
            .unprotect(&sealed)
            .map_err(|e| ProtocolError::InvalidGrant(format!("token rejected: {e}")))?;
        serde_json::from_slice(&snapshot)
            .map_err(|e| ProtocolError::InvalidGrant(format!("malformed ticket: {e}")))
    }
}

/// The default JWT (RS256) handler.
pub struct JwtTokenHandler;

impl SecurityTokenHandler for JwtTokenHandler {
    fn write_token(&self, descriptor: &TokenDescriptor<'_>) -> Result<String, ProtocolError> {
        let ticket = descriptor.ticket;
        let mut payload = Map::new();

        payload.insert("iss".to_owned(), Value::String(descriptor.issuer.to_owned()));
        match descriptor.audiences {
            [] => {}
            [single] => {
                payload.insert("aud".to_owned(), Value::String(single.clone()));
            }
            many => {
                payload.insert(
                    "aud".to_owned(),
                    Value::Array(many.iter().map(|a| Value::String(a.clone())).collect()),
                );
            }
        }
        if let Some(issued_at) = ticket.properties.issued_at {
            payload.insert("nbf".to_owned(), Value::from(issued_at.timestamp()));
            payload.insert("iat".to_owned(), Value::from(issued_at.timestamp()));
        }
        if let Some(expires_at) = ticket.properties.expires_at {
            payload.insert("exp".to_owned(), Value::from(expires_at.timestamp()));
        }

        // sub is mandatory; fall back to the name-identifier claim, and drop
        // the duplicates that synthesis would otherwise re-emit.
        let mut synthesized = false;
        let subject = match &ticket.identity.subject {
            Some(subject) => subject.clone(),
            None => {
                synthesized = true;
                ticket
                    .identity
                    .find_claim(claims::NAME_IDENTIFIER)
                    .map(|claim| claim.value.clone())
                    .ok_or_else(|| {
                        ProtocolError::ServerError(
                            "no subject claim could be established".to_owned(),
                        )
                    })?
            }
        };
        payload.insert("sub".to_owned(), Value::String(subject));

        for claim in &ticket.identity.claims {
            if !claim.flows_into(descriptor.destination) {
                continue;
            }
            if synthesized && claim.kind == claims::NAME_IDENTIFIER {
                continue;
            }
            if matches!(claim.kind.as_str(), "iss" | "sub" | "aud" | "exp" | "nbf" | "iat") {
                continue;
            }
            insert_claim(&mut payload, &claim.kind, &claim.value);
        }

        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_owned());
        header.kid = Some(descriptor.signing.key_id().to_owned());
        header.x5t = descriptor.signing.x5t();

        encode(&header, &payload, descriptor.signing.encoding_key())
            .map_err(|e| ProtocolError::ServerError(format!("token signing failed: {e}")))
    }

    fn read_token(
        &self,
        token: &str,
        parameters: &TokenValidationParameters<'_>,
    ) -> Result<AuthenticationTicket, ProtocolError> {
        let header = decode_header(token)
            .map_err(|e| ProtocolError::InvalidGrant(format!("malformed token: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["iss"]);
        validation.set_issuer(&[parameters.issuer]);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        // Prefer the credential named by the kid header, then try the rest.
        let mut candidates: Vec<&SigningCredential> = parameters
            .credentials
            .iter()
            .filter(|credential| credential.supports_rs256())
            .collect();
        candidates.sort_by_key(|credential| header.kid.as_deref() != Some(credential.key_id()));

        let mut last_error = ProtocolError::InvalidGrant("no verification key available".to_owned());
        for credential in candidates {
            match decode::<Map<String, Value>>(token, credential.decoding_key(), &validation) {
                Ok(data) => return Ok(rebuild_ticket(data.claims, parameters.destination)),
                Err(e) => {
                    last_error = ProtocolError::InvalidGrant(format!("token rejected: {e}"));
                }
            }
        }
        Err(last_error)
    }
}

/// Reconstructs a ticket from a verified JWT payload: issued-at from `nbf`,
/// expiry from `exp`, audiences from `aud`, everything else as claims.
fn rebuild_ticket(payload: Map<String, Value>, destination: Destination) -> AuthenticationTicket {
    let mut identity = SubjectIdentity::default();
    let mut properties = TicketProperties::new();

    for (kind, value) in payload {
        match kind.as_str() {
            "iss" | "iat" => {}
            "sub" => {
                if let Value::String(subject) = value {
                    identity.subject = Some(subject);
                }
            }
            "nbf" => {
                properties.issued_at = value.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0));
            }
            "exp" => {
                properties.expires_at = value.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0));
            }
            "aud" => {
                let audiences = match value {
                    Value::String(audience) => audience,
                    Value::Array(entries) => entries
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" "),
                    _ => continue,
                };
                properties.set(palisade_model::ticket::properties::AUDIENCES, audiences);
            }
            _ => {
                for text in claim_values(&value) {
                    identity
                        .claims
                        .push(Claim::new(kind.as_str(), text).with_destination(destination));
                }
            }
        }
    }

    AuthenticationTicket {
        identity,
        properties,
    }
}

/// Flattens a JSON claim value into one string per claim entry.
fn claim_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => vec![text.clone()],
        Value::Array(entries) => entries.iter().flat_map(claim_values).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

/// Inserts a claim into the payload, folding repeats into an array.
fn insert_claim(payload: &mut Map<String, Value>, kind: &str, value: &str) {
    match payload.get_mut(kind) {
        None => {
            payload.insert(kind.to_owned(), Value::String(value.to_owned()));
        }
        Some(Value::Array(entries)) => entries.push(Value::String(value.to_owned())),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, Value::String(value.to_owned())]);
        }
    }
}

/// A minted token together with the expiry stamped on its ticket copy.
pub(crate) struct IssuedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Cache key for a parked in-flight authorization request.
pub(crate) fn request_cache_key(unique_id: &str) -> String {
    format!("palisade:request:{unique_id}")
}

/// Cache key for an opaque authorization code.
fn code_cache_key(code: &str) -> String {
    format!("palisade:code:{code}")
}

/// Retains only the claims allowed to flow into the given token kind.
///
/// The subject and name-identifier claims are always kept; the serializer
/// needs them to establish `sub`.
fn filter_for_destination(
    ticket: &AuthenticationTicket,
    destination: Destination,
) -> AuthenticationTicket {
    let mut copy = ticket.clone();
    copy.identity.claims.retain(|claim| {
        claim.flows_into(destination)
            || claim.kind == claims::SUBJECT
            || claim.kind == claims::NAME_IDENTIFIER
    });
    copy
}

fn clamp_expiry(proposed: DateTime<Utc>, limit: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match limit {
        Some(limit) if limit < proposed => limit,
        _ => proposed,
    }
}

/// Audiences of an access token: the ticket's audiences followed by any
/// granted resources not already present.
fn combined_audiences(properties: &TicketProperties) -> Vec<String> {
    let mut audiences: Vec<String> = properties
        .audiences()
        .map(|value| value.split(' ').filter(|t| !t.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default();
    if let Some(resource) = properties.resource() {
        for token in resource.split(' ').filter(|t| !t.is_empty()) {
            if !audiences.iter().any(|existing| existing == token) {
                audiences.push(token.to_owned());
            }
        }
    }
    audiences
}

/// Seconds until expiry with half-up rounding.
pub(crate) fn expires_in_seconds(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    let millis = (expires_at - now).num_milliseconds();
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let seconds = (millis as f64 / 1000.0 + 0.5).floor() as i64;
    seconds
}

/// Mints an authorization code: a fresh ticket copy with its own (shorter)
/// lifetime, sealed and parked in the cache under a random key.
pub(crate) async fn create_authorization_code(
    options: &ServerOptions,
    ticket: &AuthenticationTicket,
) -> Option<String> {
    let now = Utc::now();
    let mut copy = ticket.clone();
    // Code lifetime is independent of the lifetimes stamped for tokens.
    copy.properties.issued_at = Some(now);
    copy.properties.expires_at = Some(now + options.authorization_code_lifetime);

    let mut ctx = TokenCreationContext::new(TokenKind::AuthorizationCode, copy);
    options.provider.create_authorization_code(&mut ctx).await;
    let (copy, issued) = ctx.into_parts();
    if let Some(token) = issued {
        return Some(token);
    }

    let protected = match options.authorization_code_format.protect(&copy) {
        Ok(protected) => protected,
        Err(e) => {
            warn!(error = %e, "authorization code serialization failed");
            return None;
        }
    };

    let expires_at = copy.properties.expires_at.unwrap_or(now);
    let key = request_key();
    if let Err(e) = options
        .cache
        .put(
            &code_cache_key(&key),
            protected.into_bytes(),
            ExpirationPolicy::Absolute(expires_at),
        )
        .await
    {
        warn!(error = %e, "authorization code could not be cached");
        return None;
    }

    Some(key)
}

/// Mints an access token from a destination-filtered ticket copy.
pub(crate) async fn create_access_token(
    options: &ServerOptions,
    ticket: &AuthenticationTicket,
    max_expiry: Option<DateTime<Utc>>,
) -> Option<IssuedToken> {
    let now = Utc::now();
    let mut copy = filter_for_destination(ticket, Destination::AccessToken);
    copy.properties.issued_at = Some(now);
    copy.properties.expires_at = Some(clamp_expiry(now + options.access_token_lifetime, max_expiry));

    let mut ctx = TokenCreationContext::new(TokenKind::AccessToken, copy);
    options.provider.create_access_token(&mut ctx).await;
    let (copy, issued) = ctx.into_parts();
    let expires_at = copy.properties.expires_at.unwrap_or(now);
    if let Some(token) = issued {
        return Some(IssuedToken {
            value: token,
            expires_at,
        });
    }

    let result = match &options.access_token_handler {
        Some(handler) => {
            let Some(signing) = options.signing_credential() else {
                warn!("no RS256 signing credential configured; cannot mint access token");
                return None;
            };
            let audiences = combined_audiences(&copy.properties);
            handler.write_token(&TokenDescriptor {
                issuer: options.issuer.as_str(),
                audiences: &audiences,
                destination: Destination::AccessToken,
                ticket: &copy,
                signing,
            })
        }
        None => options.access_token_format.protect(&copy),
    };

    match result {
        Ok(value) => Some(IssuedToken { value, expires_at }),
        Err(e) => {
            warn!(error = %e, "access token serialization failed");
            None
        }
    }
}

/// Mints an identity token, binding it to the code and access token issued
/// in the same response via `c_hash` and `at_hash`.
pub(crate) async fn create_identity_token(
    options: &ServerOptions,
    ticket: &AuthenticationTicket,
    nonce: Option<&str>,
    code: Option<&str>,
    access_token: Option<&str>,
    max_expiry: Option<DateTime<Utc>>,
) -> Option<String> {
    let now = Utc::now();
    let mut copy = filter_for_destination(ticket, Destination::IdToken);
    copy.properties.issued_at = Some(now);
    copy.properties.expires_at =
        Some(clamp_expiry(now + options.identity_token_lifetime, max_expiry));

    if let Some(nonce) = nonce {
        copy.identity
            .claims
            .push(Claim::new(claims::NONCE, nonce).with_destination(Destination::IdToken));
    }
    if let Some(code) = code {
        copy.identity
            .claims
            .push(Claim::new(claims::C_HASH, token_hash(code)).with_destination(Destination::IdToken));
    }
    if let Some(access_token) = access_token {
        copy.identity.claims.push(
            Claim::new(claims::AT_HASH, token_hash(access_token))
                .with_destination(Destination::IdToken),
        );
    }

    let mut ctx = TokenCreationContext::new(TokenKind::IdentityToken, copy);
    options.provider.create_identity_token(&mut ctx).await;
    let (copy, issued) = ctx.into_parts();
    if let Some(token) = issued {
        return Some(token);
    }

    let Some(handler) = &options.identity_token_handler else {
        warn!("identity token handler is disabled; cannot mint identity token");
        return None;
    };
    let Some(signing) = options.signing_credential() else {
        warn!("no RS256 signing credential configured; cannot mint identity token");
        return None;
    };

    let audiences: Vec<String> = copy
        .properties
        .client_id()
        .map(|client_id| vec![client_id.to_owned()])
        .unwrap_or_default();

    match handler.write_token(&TokenDescriptor {
        issuer: options.issuer.as_str(),
        audiences: &audiences,
        destination: Destination::IdToken,
        ticket: &copy,
        signing,
    }) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "identity token serialization failed");
            None
        }
    }
}

/// Mints a refresh token: the complete ticket, sealed.
pub(crate) async fn create_refresh_token(
    options: &ServerOptions,
    ticket: &AuthenticationTicket,
    max_expiry: Option<DateTime<Utc>>,
) -> Option<String> {
    let now = Utc::now();
    let mut copy = ticket.clone();
    copy.properties.issued_at = Some(now);
    copy.properties.expires_at =
        Some(clamp_expiry(now + options.refresh_token_lifetime, max_expiry));

    let mut ctx = TokenCreationContext::new(TokenKind::RefreshToken, copy);
    options.provider.create_refresh_token(&mut ctx).await;
    let (copy, issued) = ctx.into_parts();
    if let Some(token) = issued {
        return Some(token);
    }

    match options.refresh_token_format.protect(&copy) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "refresh token serialization failed");
            None
        }
    }
}

/// Materializes the ticket behind an authorization code.
///
/// Consumption is single-use: the cache entry is removed atomically before
/// the ticket is accepted.
pub(crate) async fn receive_authorization_code(
    options: &ServerOptions,
    code: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = TokenReceiveContext::new(TokenKind::AuthorizationCode, code.to_owned());
    options.provider.receive_authorization_code(&mut ctx).await;
    if let Some(ticket) = ctx.into_ticket() {
        return Some(ticket);
    }

    let entry = match options.cache.take(&code_cache_key(code)).await {
        Ok(entry) => entry?,
        Err(e) => {
            warn!(error = %e, "authorization code lookup failed");
            return None;
        }
    };
    let protected = String::from_utf8(entry).ok()?;
    match options.authorization_code_format.unprotect(&protected) {
        Ok(ticket) => Some(ticket),
        Err(e) => {
            warn!(error = %e, "authorization code rejected");
            None
        }
    }
}

/// Materializes the ticket behind an access token.
pub(crate) async fn receive_access_token(
    options: &ServerOptions,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = TokenReceiveContext::new(TokenKind::AccessToken, token.to_owned());
    options.provider.receive_access_token(&mut ctx).await;
    if let Some(ticket) = ctx.into_ticket() {
        return Some(ticket);
    }

    read_with_handler(
        options,
        options.access_token_handler.as_deref(),
        Some(options.access_token_format.as_ref()),
        Destination::AccessToken,
        token,
    )
}

/// Materializes the ticket behind an identity token.
pub(crate) async fn receive_identity_token(
    options: &ServerOptions,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = TokenReceiveContext::new(TokenKind::IdentityToken, token.to_owned());
    options.provider.receive_identity_token(&mut ctx).await;
    if let Some(ticket) = ctx.into_ticket() {
        return Some(ticket);
    }

    read_with_handler(
        options,
        options.identity_token_handler.as_deref(),
        None,
        Destination::IdToken,
        token,
    )
}

/// Materializes the ticket behind a refresh token.
pub(crate) async fn receive_refresh_token(
    options: &ServerOptions,
    token: &str,
) -> Option<AuthenticationTicket> {
    let mut ctx = TokenReceiveContext::new(TokenKind::RefreshToken, token.to_owned());
    options.provider.receive_refresh_token(&mut ctx).await;
    if let Some(ticket) = ctx.into_ticket() {
        return Some(ticket);
    }

    match options.refresh_token_format.unprotect(token) {
        Ok(ticket) => Some(ticket),
        Err(e) => {
            warn!(error = %e, "refresh token rejected");
            None
        }
    }
}

fn read_with_handler(
    options: &ServerOptions,
    handler: Option<&dyn SecurityTokenHandler>,
    fallback_format: Option<&dyn TicketFormat>,
    destination: Destination,
    token: &str,
) -> Option<AuthenticationTicket> {
    let result = match (handler, fallback_format) {
        (Some(handler), _) => handler.read_token(
            token,
            &TokenValidationParameters {
                issuer: options.issuer.as_str(),
                credentials: &options.signing_credentials,
                destination,
            },
        ),
        (None, Some(format)) => format.unprotect(token),
        (None, None) => return None,
    };
    match result {
        Ok(ticket) => Some(ticket),
        Err(e) => {
            warn!(error = %e, "token rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_crypto::AeadDataProtector;
    use palisade_model::ticket::properties;

    const TEST_RSA_PEM: &str = include_str!("../tests/keys/test_rsa.pem");

    fn credential() -> SigningCredential {
        SigningCredential::from_rsa_pem(TEST_RSA_PEM).unwrap()
    }

    fn ticket() -> AuthenticationTicket {
        let identity = SubjectIdentity::with_subject("alice")
            .add_claim(Claim::new("email", "alice@example.com").with_destination(Destination::IdToken))
            .add_claim(Claim::new("role", "admin").with_destination(Destination::AccessToken))
            .add_claim(Claim::new("internal", "hidden"));
        let mut ticket = AuthenticationTicket::new(identity);
        ticket.properties.issued_at = Some(Utc::now());
        ticket.properties.expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        ticket.properties.set_client_id("app1".to_owned());
        ticket
    }

    fn decode_payload(token: &str) -> Map<String, Value> {
        let part = token.split('.').nth(1).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(part).unwrap()).unwrap()
    }

    #[test]
    fn jwt_payload_carries_registered_claims() {
        let signing = credential();
        let ticket = ticket();
        let audiences = vec!["app1".to_owned()];
        let token = JwtTokenHandler
            .write_token(&TokenDescriptor {
                issuer: "https://id.example.com/",
                audiences: &audiences,
                destination: Destination::AccessToken,
                ticket: &ticket,
                signing: &signing,
            })
            .unwrap();

        let payload = decode_payload(&token);
        assert_eq!(payload["iss"], "https://id.example.com/");
        assert_eq!(payload["aud"], "app1");
        assert_eq!(payload["sub"], "alice");
        assert_eq!(payload["nbf"], payload["iat"]);
        // Destination filtering happens in write_token too.
        assert_eq!(payload["role"], "admin");
        assert!(!payload.contains_key("email"));
        assert!(!payload.contains_key("internal"));
    }

    #[test]
    fn multiple_audiences_serialize_as_array() {
        let signing = credential();
        let ticket = ticket();
        let audiences = vec!["app1".to_owned(), "api".to_owned()];
        let token = JwtTokenHandler
            .write_token(&TokenDescriptor {
                issuer: "https://id.example.com/",
                audiences: &audiences,
                destination: Destination::AccessToken,
                ticket: &ticket,
                signing: &signing,
            })
            .unwrap();
        let payload = decode_payload(&token);
        assert_eq!(payload["aud"], serde_json::json!(["app1", "api"]));
    }

    #[test]
    fn subject_is_synthesized_from_name_identifier() {
        let signing = credential();
        let identity = SubjectIdentity::default().add_claim(
            Claim::new(claims::NAME_IDENTIFIER, "alice")
                .with_destination(Destination::AccessToken),
        );
        let mut ticket = AuthenticationTicket::new(identity);
        ticket.properties.issued_at = Some(Utc::now());
        ticket.properties.expires_at = Some(Utc::now() + chrono::Duration::hours(1));

        let token = JwtTokenHandler
            .write_token(&TokenDescriptor {
                issuer: "https://id.example.com/",
                audiences: &[],
                destination: Destination::AccessToken,
                ticket: &ticket,
                signing: &signing,
            })
            .unwrap();
        let payload = decode_payload(&token);
        assert_eq!(payload["sub"], "alice");
        // The synthesized source is removed to avoid duplication.
        assert!(!payload.contains_key(claims::NAME_IDENTIFIER));
    }

    #[test]
    fn missing_subject_is_an_error() {
        let signing = credential();
        let ticket = AuthenticationTicket::default();
        let result = JwtTokenHandler.write_token(&TokenDescriptor {
            issuer: "https://id.example.com/",
            audiences: &[],
            destination: Destination::AccessToken,
            ticket: &ticket,
            signing: &signing,
        });
        assert!(result.is_err());
    }

    #[test]
    fn read_token_verifies_issuer_but_not_lifetime() {
        let signing = credential();
        let mut expired = ticket();
        expired.properties.expires_at = Some(Utc::now() - chrono::Duration::hours(1));

        let audiences = vec!["app1".to_owned()];
        let token = JwtTokenHandler
            .write_token(&TokenDescriptor {
                issuer: "https://id.example.com/",
                audiences: &audiences,
                destination: Destination::AccessToken,
                ticket: &expired,
                signing: &signing,
            })
            .unwrap();

        let credentials = vec![credential()];
        // Expired token still reads; the endpoint applies the lifetime check.
        let restored = JwtTokenHandler
            .read_token(
                token.as_str(),
                &TokenValidationParameters {
                    issuer: "https://id.example.com/",
                    credentials: &credentials,
                    destination: Destination::AccessToken,
                },
            )
            .unwrap();
        assert_eq!(restored.identity.subject.as_deref(), Some("alice"));
        assert!(restored.properties.expires_at.unwrap() < Utc::now());
        assert_eq!(restored.properties.audiences(), Some("app1"));

        // Wrong issuer is rejected.
        assert!(
            JwtTokenHandler
                .read_token(
                    token.as_str(),
                    &TokenValidationParameters {
                        issuer: "https://other.example.com/",
                        credentials: &credentials,
                        destination: Destination::AccessToken,
                    },
                )
                .is_err()
        );
    }

    #[test]
    fn protected_format_round_trips_reserved_properties() {
        let format = ProtectedTicketFormat::new(Arc::new(AeadDataProtector::random()));
        let mut original = ticket();
        original.properties.set(properties::SCOPE, "openid".to_owned());
        original.properties.set(properties::NONCE, "n1".to_owned());
        original.properties.set(properties::RESOURCE, "api".to_owned());

        let protected = format.protect(&original).unwrap();
        let restored = format.unprotect(&protected).unwrap();

        assert_eq!(restored.identity.subject, original.identity.subject);
        assert_eq!(restored.properties.client_id(), Some("app1"));
        assert_eq!(restored.properties.scope(), Some("openid"));
        assert_eq!(restored.properties.nonce(), Some("n1"));
        assert_eq!(restored.properties.resource(), Some("api"));
    }

    #[test]
    fn repeated_claims_fold_into_an_array() {
        let mut payload = Map::new();
        insert_claim(&mut payload, "amr", "pwd");
        insert_claim(&mut payload, "amr", "otp");
        assert_eq!(payload["amr"], serde_json::json!(["pwd", "otp"]));
    }

    #[test]
    fn expires_in_rounds_half_up() {
        let now = Utc::now();
        assert_eq!(
            expires_in_seconds(now, now + chrono::Duration::milliseconds(3_600_499)),
            3600
        );
        assert_eq!(
            expires_in_seconds(now, now + chrono::Duration::milliseconds(3_600_500)),
            3601
        );
    }

    #[test]
    fn combined_audiences_union_resources() {
        let mut props = TicketProperties::new();
        props.set(properties::AUDIENCES, "app1 api".to_owned());
        props.set(properties::RESOURCE, "api billing".to_owned());
        assert_eq!(combined_audiences(&props), vec!["app1", "api", "billing"]);
    }
}
