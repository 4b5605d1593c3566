//! Token validation (introspection) endpoint.
//!
//! Resource servers present exactly one token and get back its audiences,
//! expiry, and claims. Audience binding is enforced here: a caller naming
//! an audience the ticket does not carry learns nothing.

use axum::http::Method;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use palisade_model::message::set_is_subset;
use palisade_model::{AuthenticationTicket, MessageKind, ProtocolMessage};

use crate::error::ErrorResponse;
use crate::handler::{HandleOutcome, ServerRequest};
use crate::options::ServerOptions;
use crate::provider::{EndpointContext, EndpointOutcome};
use crate::response::{json_error, json_ok};
use crate::serializer;

/// Introspection response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Audiences the ticket is bound to.
    pub audiences: Vec<String>,

    /// Expiry as a UTC timestamp (seconds since the epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// The ticket's claims.
    pub claims: Vec<IntrospectedClaim>,
}

/// One claim in an introspection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectedClaim {
    /// Claim type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Claim value.
    pub value: String,
}

pub(crate) async fn handle(options: &ServerOptions, request: &ServerRequest) -> HandleOutcome {
    HandleOutcome::Response(process(options, request).await)
}

async fn process(options: &ServerOptions, request: &ServerRequest) -> Response {
    let pairs = match request.method {
        Method::GET => request.query_pairs(),
        Method::POST => {
            if !request.has_form_content_type() {
                return json_error(&ErrorResponse::new(
                    "invalid_request",
                    "the request must carry an application/x-www-form-urlencoded body",
                ));
            }
            request.form_pairs()
        }
        _ => {
            return json_error(&ErrorResponse::new("invalid_request", "method not supported"));
        }
    };
    let message = ProtocolMessage::from_pairs(MessageKind::TokenRequest, pairs);

    let mut endpoint_ctx = EndpointContext::new(Some(message.clone()));
    options.provider.introspection_endpoint(&mut endpoint_ctx).await;
    if let EndpointOutcome::Handled(handled) = std::mem::take(&mut endpoint_ctx.outcome) {
        return handled;
    }

    // Exactly one token kind per request.
    let supplied = [
        message.access_token(),
        message.identity_token(),
        message.refresh_token(),
    ];
    if supplied.iter().filter(|token| token.is_some()).count() != 1 {
        return json_error(&ErrorResponse::new(
            "invalid_request",
            "exactly one of access_token, id_token, refresh_token must be provided",
        ));
    }

    let ticket = if let Some(token) = message.access_token() {
        serializer::receive_access_token(options, token).await
    } else if let Some(token) = message.identity_token() {
        serializer::receive_identity_token(options, token).await
    } else if let Some(token) = message.refresh_token() {
        serializer::receive_refresh_token(options, token).await
    } else {
        None
    };
    let Some(ticket) = ticket else {
        return json_error(&ErrorResponse::new("invalid_grant", "invalid token"));
    };

    if ticket
        .properties
        .expires_at
        .is_some_and(|expires_at| expires_at <= Utc::now())
    {
        return json_error(&ErrorResponse::new("invalid_grant", "the token has expired"));
    }

    let audiences = ticket_audiences(&ticket);
    if !audiences.is_empty()
        && let Some(requested) = message.audience()
        && !set_is_subset(requested, &audiences.join(" "))
    {
        return json_error(&ErrorResponse::new(
            "invalid_grant",
            "the requested audience exceeds the token audiences",
        ));
    }

    let mut claims = Vec::new();
    if let Some(subject) = &ticket.identity.subject {
        claims.push(IntrospectedClaim {
            kind: "sub".to_owned(),
            value: subject.clone(),
        });
    }
    for claim in &ticket.identity.claims {
        claims.push(IntrospectedClaim {
            kind: claim.kind.clone(),
            value: claim.value.clone(),
        });
    }

    json_ok(&IntrospectionResponse {
        audiences,
        // A UTC timestamp rather than a remaining duration; kept for wire
        // compatibility even though RFC 7662 calls this shape `exp`.
        expires_in: ticket.properties.expires_at.map(|at| at.timestamp()),
        claims,
    })
}

fn ticket_audiences(ticket: &AuthenticationTicket) -> Vec<String> {
    ticket
        .properties
        .audiences()
        .map(|value| {
            value
                .split(' ')
                .filter(|token| !token.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
