//! Token endpoint.
//!
//! POST-only, form-only. Authenticates the client, dispatches on the grant
//! type, enforces the bindings recorded at authorization time, and mints
//! the requested tokens.

use axum::http::Method;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use palisade_model::message::{grant_types, params, response_types, scopes, set_contains, set_is_subset};
use palisade_model::ticket::properties;
use palisade_model::{AuthenticationTicket, MessageKind, ProtocolMessage};

use crate::error::ErrorResponse;
use crate::handler::{HandleOutcome, ServerRequest};
use crate::options::ServerOptions;
use crate::provider::{EndpointContext, EndpointOutcome, GrantContext, ValidateClientAuthenticationContext, ValidateRequestContext};
use crate::response::{json_error, json_ok};
use crate::serializer;

/// Token endpoint response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Token type (`Bearer`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// The identity token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// The refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

struct GrantOutput {
    ticket: AuthenticationTicket,
    /// Whether the identity-token gate sees `openid` granted. The code and
    /// refresh grants capture this from the ticket as it was materialized,
    /// before the grant hook had a chance to replace it; the other grants
    /// read the ticket the hook produced.
    openid_granted: bool,
    /// Expiry ceiling for minted tokens when sliding expiration is off.
    max_expiry: Option<DateTime<Utc>>,
}

pub(crate) async fn handle(options: &ServerOptions, request: &ServerRequest) -> HandleOutcome {
    HandleOutcome::Response(process(options, request).await)
}

async fn process(options: &ServerOptions, request: &ServerRequest) -> Response {
    if request.method != Method::POST {
        return json_error(&ErrorResponse::new("invalid_request", "method not supported"));
    }
    if !request.has_form_content_type() {
        return json_error(&ErrorResponse::new(
            "invalid_request",
            "the request must carry an application/x-www-form-urlencoded body",
        ));
    }

    let mut message = ProtocolMessage::from_pairs(MessageKind::TokenRequest, request.form_pairs());

    let Some(grant_type) = message.grant_type().map(str::to_owned) else {
        return json_error(&ErrorResponse::new("invalid_request", "grant_type parameter missing"));
    };

    // Header credentials are only consulted when the form carries none.
    if message.client_id().is_none()
        && message.client_secret().is_none()
        && let Some((client_id, client_secret)) = request.basic_credentials()
    {
        message.set(params::CLIENT_ID, client_id);
        message.set(params::CLIENT_SECRET, client_secret);
    }

    let mut auth_ctx = ValidateClientAuthenticationContext::new(
        message.clone(),
        message.client_id().map(str::to_owned),
        message.client_secret().map(str::to_owned),
    );
    options
        .provider
        .validate_client_authentication(&mut auth_ctx)
        .await;
    if auth_ctx.decision().is_rejected() {
        return json_error(&auth_ctx.decision().rejection_error("invalid_client"));
    }
    let client_authenticated = auth_ctx.decision().is_validated();

    let mut endpoint_ctx = EndpointContext::new(Some(message.clone()));
    options.provider.token_endpoint(&mut endpoint_ctx).await;
    if let EndpointOutcome::Handled(handled) = std::mem::take(&mut endpoint_ctx.outcome) {
        return handled;
    }

    let granted = match grant_type.as_str() {
        grant_types::AUTHORIZATION_CODE => {
            process_code_or_refresh(options, &message, client_authenticated, false).await
        }
        grant_types::REFRESH_TOKEN => {
            process_code_or_refresh(options, &message, client_authenticated, true).await
        }
        grant_types::PASSWORD => process_password(options, &message).await,
        grant_types::CLIENT_CREDENTIALS => {
            process_client_credentials(options, &message, client_authenticated).await
        }
        _ => process_custom(options, &message).await,
    };

    let GrantOutput {
        mut ticket,
        openid_granted,
        max_expiry,
    } = match granted {
        Ok(output) => output,
        Err(error) => return json_error(&error),
    };

    // Stamp the binding state the minted tokens will carry.
    if let Some(client_id) = message.client_id() {
        ticket.properties.set_client_id(client_id.to_owned());
    }
    if client_authenticated {
        ticket.properties.set_client_authenticated(true);
    }

    // An explicit response_type on the token request filters which tokens
    // come back; absence means all of them.
    let response_type = message.response_type().map(str::to_owned);
    let wants = |token: &str| {
        response_type
            .as_deref()
            .is_none_or(|value| set_contains(value, token))
    };

    let now = Utc::now();
    let mut payload = TokenResponse::default();

    if wants(response_types::TOKEN) {
        let Some(issued) = serializer::create_access_token(options, &ticket, max_expiry).await
        else {
            return json_error(&ErrorResponse::new(
                "server_error",
                "an error occurred while issuing the access token",
            ));
        };
        payload.token_type = Some("Bearer".to_owned());
        payload.expires_in = Some(serializer::expires_in_seconds(now, issued.expires_at));
        payload.access_token = Some(issued.value);
    }

    if wants(response_types::ID_TOKEN) && openid_granted {
        // The nonce travelled inside the ticket from the authorization
        // request.
        let nonce = ticket.properties.nonce().map(str::to_owned);
        let Some(id_token) = serializer::create_identity_token(
            options,
            &ticket,
            nonce.as_deref(),
            None,
            payload.access_token.as_deref(),
            max_expiry,
        )
        .await
        else {
            return json_error(&ErrorResponse::new(
                "server_error",
                "an error occurred while issuing the identity token",
            ));
        };
        payload.id_token = Some(id_token);
    }

    if wants(response_types::REFRESH_TOKEN) && ticket.has_scope(scopes::OFFLINE_ACCESS) {
        let Some(refresh_token) =
            serializer::create_refresh_token(options, &ticket, max_expiry).await
        else {
            return json_error(&ErrorResponse::new(
                "server_error",
                "an error occurred while issuing the refresh token",
            ));
        };
        payload.refresh_token = Some(refresh_token);
    }

    json_ok(&payload)
}

/// Shared prelude of the `authorization_code` and `refresh_token` grants:
/// materialize the ticket, enforce the recorded bindings, then let the
/// provider validate and grant.
async fn process_code_or_refresh(
    options: &ServerOptions,
    message: &ProtocolMessage,
    client_authenticated: bool,
    is_refresh: bool,
) -> Result<GrantOutput, ErrorResponse> {
    let mut ticket = if is_refresh {
        let token = message
            .refresh_token()
            .ok_or_else(|| ErrorResponse::new("invalid_request", "refresh_token parameter missing"))?;
        serializer::receive_refresh_token(options, token)
            .await
            .ok_or_else(|| ErrorResponse::new("invalid_grant", "invalid refresh token"))?
    } else {
        let code = message
            .code()
            .ok_or_else(|| ErrorResponse::new("invalid_request", "code parameter missing"))?;
        serializer::receive_authorization_code(options, code)
            .await
            .ok_or_else(|| ErrorResponse::new("invalid_grant", "invalid authorization code"))?
    };

    if ticket
        .properties
        .expires_at
        .is_some_and(|expires_at| expires_at <= Utc::now())
    {
        let what = if is_refresh {
            "the refresh token has expired"
        } else {
            "the authorization code has expired"
        };
        return Err(ErrorResponse::new("invalid_grant", what));
    }

    if is_refresh {
        // A refresh token handed to an authenticated client stays bound to
        // client authentication for its whole lifetime.
        if ticket.properties.client_authenticated() && !client_authenticated {
            return Err(ErrorResponse::new("invalid_grant", "client authentication required"));
        }
    } else {
        // The redirect_uri that began the flow must come back unchanged.
        if let Some(recorded) = ticket.properties.remove(properties::REDIRECT_URI)
            && message.redirect_uri() != Some(recorded.as_str())
        {
            return Err(ErrorResponse::new("invalid_grant", "redirect_uri mismatch"));
        }
    }

    if let Some(bound_client) = ticket.properties.client_id()
        && message.client_id() != Some(bound_client)
    {
        return Err(ErrorResponse::new(
            "invalid_grant",
            "the grant was issued to another client",
        ));
    }

    for (requested, granted, name) in [
        (message.resource(), ticket.properties.resource(), "resource"),
        (message.scope(), ticket.properties.scope(), "scope"),
    ] {
        if let Some(requested) = requested {
            match granted {
                None => {
                    return Err(ErrorResponse::new(
                        "invalid_grant",
                        format!("no {name} was granted for this ticket"),
                    ));
                }
                Some(granted) if !set_is_subset(requested, granted) => {
                    return Err(ErrorResponse::new(
                        "invalid_grant",
                        format!("the requested {name} exceeds the granted {name}"),
                    ));
                }
                Some(_) => {}
            }
        }
    }

    let mut validate_ctx = ValidateRequestContext::new(message.clone(), Some(ticket.clone()));
    options.provider.validate_token_request(&mut validate_ctx).await;
    if validate_ctx.decision().is_rejected() {
        return Err(validate_ctx.decision().rejection_error("invalid_request"));
    }

    // The grant hook may replace the ticket; the expiry ceiling and the
    // identity-token gate stay bound to the original one.
    let incoming_expiry = ticket.properties.expires_at;
    let openid_granted = ticket.has_scope(scopes::OPENID);

    let mut grant_ctx = GrantContext::new(message.clone(), Some(ticket));
    if is_refresh {
        options.provider.grant_refresh_token(&mut grant_ctx).await;
    } else {
        options.provider.grant_authorization_code(&mut grant_ctx).await;
    }
    let ticket = finish_grant(grant_ctx, "invalid_grant", "the grant was rejected")?;

    let max_expiry = if is_refresh && !options.use_sliding_expiration {
        incoming_expiry
    } else {
        None
    };

    Ok(GrantOutput {
        ticket,
        openid_granted,
        max_expiry,
    })
}

async fn process_password(
    options: &ServerOptions,
    message: &ProtocolMessage,
) -> Result<GrantOutput, ErrorResponse> {
    if message.username().is_none() {
        return Err(ErrorResponse::new("invalid_request", "username parameter missing"));
    }
    if message.password().is_none() {
        return Err(ErrorResponse::new("invalid_request", "password parameter missing"));
    }

    let mut ctx = GrantContext::new(message.clone(), None);
    options
        .provider
        .grant_resource_owner_credentials(&mut ctx)
        .await;
    let ticket = finish_grant(ctx, "invalid_grant", "resource owner credentials were not accepted")?;
    let openid_granted = ticket.has_scope(scopes::OPENID);
    Ok(GrantOutput {
        ticket,
        openid_granted,
        max_expiry: None,
    })
}

async fn process_client_credentials(
    options: &ServerOptions,
    message: &ProtocolMessage,
    client_authenticated: bool,
) -> Result<GrantOutput, ErrorResponse> {
    // Unlike every other grant, an unauthenticated client is fatal here.
    if !client_authenticated {
        return Err(ErrorResponse::new(
            "invalid_client",
            "client authentication is required for the client_credentials grant",
        ));
    }

    let mut ctx = GrantContext::new(message.clone(), None);
    options.provider.grant_client_credentials(&mut ctx).await;
    let ticket = finish_grant(ctx, "unauthorized_client", "the client_credentials grant was not accepted")?;
    let openid_granted = ticket.has_scope(scopes::OPENID);
    Ok(GrantOutput {
        ticket,
        openid_granted,
        max_expiry: None,
    })
}

async fn process_custom(
    options: &ServerOptions,
    message: &ProtocolMessage,
) -> Result<GrantOutput, ErrorResponse> {
    let mut ctx = GrantContext::new(message.clone(), None);
    options.provider.grant_custom_extension(&mut ctx).await;
    let ticket = finish_grant(
        ctx,
        "unsupported_grant_type",
        "the specified grant_type is not supported",
    )?;
    let openid_granted = ticket.has_scope(scopes::OPENID);
    Ok(GrantOutput {
        ticket,
        openid_granted,
        max_expiry: None,
    })
}

/// Folds a grant context into its ticket, applying the per-grant default
/// error to rejections and non-validation.
fn finish_grant(
    ctx: GrantContext,
    default_error: &str,
    default_description: &str,
) -> Result<AuthenticationTicket, ErrorResponse> {
    if ctx.decision().is_rejected() {
        return Err(ctx.decision().rejection_error(default_error));
    }
    if !ctx.decision().is_validated() {
        return Err(ErrorResponse::new(default_error, default_description));
    }
    ctx.into_ticket()
        .ok_or_else(|| ErrorResponse::new("server_error", "the grant produced no ticket"))
}
