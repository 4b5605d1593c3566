//! Authorization endpoint.
//!
//! Implements the request half (parse, validate, cache, yield to the host
//! for sign-in) and the response half (`complete`: mint the requested
//! artifacts and materialize the redirect or form-post).
//!
//! Validation order is significant: the error a client observes identifies
//! the first rule its request broke, and errors switch from native pages to
//! client redirects exactly when the redirect URI has been validated.

use axum::http::Method;
use chrono::Duration;
use tracing::warn;
use url::Url;

use palisade_cache::ExpirationPolicy;
use palisade_crypto::random::request_key;
use palisade_model::message::{params, response_types, scopes};
use palisade_model::ticket::properties;
use palisade_model::{
    AuthenticationTicket, MessageKind, ProtocolMessage, decode_message, encode_message,
};

use crate::error::ErrorResponse;
use crate::handler::{HandleOutcome, ServerRequest};
use crate::options::ServerOptions;
use crate::provider::{
    EndpointContext, EndpointOutcome, ValidateClientRedirectUriContext, ValidateRequestContext,
};
use crate::response::{self, ResponseMode};
use crate::serializer::{self, request_cache_key};

/// Sliding lifetime of a cached in-flight authorization request.
const REQUEST_CACHE_WINDOW_HOURS: i64 = 1;

pub(crate) async fn handle(options: &ServerOptions, request: &ServerRequest) -> HandleOutcome {
    let pairs = match request.method {
        Method::GET => request.query_pairs(),
        Method::POST => {
            if !request.has_form_content_type() {
                return surface_error(
                    options,
                    ErrorResponse::new(
                        "invalid_request",
                        "the request must carry an application/x-www-form-urlencoded body",
                    ),
                );
            }
            request.form_pairs()
        }
        _ => {
            return surface_error(
                options,
                ErrorResponse::new("invalid_request", "method not supported"),
            );
        }
    };
    let mut message = ProtocolMessage::from_pairs(MessageKind::AuthenticationRequest, pairs);

    // Rehydrate the original request when the message points at a cached one.
    if let Some(unique_id) = message.unique_id().map(str::to_owned) {
        let cached = match options.cache.get(&request_cache_key(&unique_id)).await {
            Ok(Some(frame)) => decode_message(MessageKind::AuthenticationRequest, &frame).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "cached request lookup failed");
                None
            }
        };
        let Some(cached) = cached else {
            return surface_error(options, ErrorResponse::new("invalid_request", "timeout expired"));
        };
        message = message.overlaid_on(cached);
    }

    let Some(client_id) = message.client_id().map(str::to_owned) else {
        return surface_error(
            options,
            ErrorResponse::new("invalid_request", "client_id parameter missing"),
        );
    };

    if let Some(redirect_uri) = message.redirect_uri() {
        let parsed = match Url::parse(redirect_uri) {
            Ok(parsed) => parsed,
            Err(_) => {
                return surface_error(
                    options,
                    ErrorResponse::new("invalid_request", "redirect_uri must be an absolute URI"),
                );
            }
        };
        if parsed.fragment().is_some() {
            return surface_error(
                options,
                ErrorResponse::new("invalid_request", "redirect_uri must not contain a fragment"),
            );
        }
        if !options.allow_insecure_http && parsed.scheme() != "https" {
            return surface_error(
                options,
                ErrorResponse::new("invalid_request", "redirect_uri must use TLS"),
            );
        }
    } else if message.has_scope(scopes::OPENID) {
        return surface_error(
            options,
            ErrorResponse::new("invalid_request", "redirect_uri parameter missing"),
        );
    }

    // The client must be recognized before anything is sent back to its
    // redirect URI.
    let mut ctx = ValidateClientRedirectUriContext::new(
        message.clone(),
        client_id,
        message.redirect_uri().map(str::to_owned),
    );
    options.provider.validate_client_redirect_uri(&mut ctx).await;
    if ctx.decision().is_rejected() {
        return surface_error(options, ctx.decision().rejection_error("invalid_client"));
    }
    if !ctx.decision().is_validated() {
        return surface_error(
            options,
            ErrorResponse::new("invalid_client", "client validation failed"),
        );
    }
    let redirect_uri = ctx.into_redirect_uri();
    if let Some(uri) = &redirect_uri {
        message.set(params::REDIRECT_URI, uri.clone());
    }

    // Everything below redirects errors back to the client.
    let state = message.state().map(str::to_owned);

    let Some(response_type) = message.response_type().map(str::to_owned) else {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            response_mode_for(&message),
            state.as_deref(),
            ErrorResponse::new("invalid_request", "response_type parameter missing"),
        );
    };

    let tokens: Vec<&str> = response_type.split(' ').filter(|t| !t.is_empty()).collect();
    let supported = !tokens.is_empty()
        && tokens.iter().all(|token| {
            matches!(
                *token,
                response_types::CODE | response_types::TOKEN | response_types::ID_TOKEN
            )
        });
    if !supported {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            response_mode_for(&message),
            state.as_deref(),
            ErrorResponse::new("unsupported_response_type", "response_type is not supported"),
        );
    }

    if let Some(mode) = message.response_mode() {
        let known = matches!(mode, "query" | "fragment" | "form_post");
        if !known {
            return redirect_error(
                options,
                redirect_uri.as_deref(),
                default_response_mode(&message),
                state.as_deref(),
                ErrorResponse::new("invalid_request", "response_mode is not supported"),
            );
        }
    }
    let mode = response_mode_for(&message);

    let implicit_or_hybrid = message.has_response_type(response_types::TOKEN)
        || message.has_response_type(response_types::ID_TOKEN);

    // Tokens travelling in a query string can leak through logs and
    // referrers; the combination is refused outright.
    if message.response_mode() == Some("query") && implicit_or_hybrid {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            mode,
            state.as_deref(),
            ErrorResponse::new(
                "invalid_request",
                "response_mode=query cannot be used with a response_type containing token or id_token",
            ),
        );
    }

    if implicit_or_hybrid && message.has_scope(scopes::OPENID) && message.nonce().is_none() {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            mode,
            state.as_deref(),
            ErrorResponse::new("invalid_request", "nonce parameter missing"),
        );
    }

    if message.has_response_type(response_types::ID_TOKEN) && !message.has_scope(scopes::OPENID) {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            mode,
            state.as_deref(),
            ErrorResponse::new("invalid_request", "openid scope missing"),
        );
    }

    if message.has_response_type(response_types::CODE) && !options.token_endpoint_enabled() {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            mode,
            state.as_deref(),
            ErrorResponse::new(
                "unsupported_response_type",
                "the authorization code flow requires the token endpoint",
            ),
        );
    }

    if message.has_response_type(response_types::ID_TOKEN) && options.signing_credential().is_none()
    {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            mode,
            state.as_deref(),
            ErrorResponse::new(
                "unsupported_response_type",
                "no signing credential is configured",
            ),
        );
    }

    let mut ctx = ValidateRequestContext::new(message.clone(), None);
    options.provider.validate_authorization_request(&mut ctx).await;
    if ctx.decision().is_rejected() {
        return redirect_error(
            options,
            redirect_uri.as_deref(),
            mode,
            state.as_deref(),
            ctx.decision().rejection_error("invalid_request"),
        );
    }

    // Park the validated request so the sign-in round trip can find it.
    if message.unique_id().is_none() {
        message.set_unique_id(request_key());
    }
    let unique_id = message.unique_id().unwrap_or_default().to_owned();
    if let Err(e) = options
        .cache
        .put(
            &request_cache_key(&unique_id),
            encode_message(&message),
            ExpirationPolicy::Sliding(Duration::hours(REQUEST_CACHE_WINDOW_HOURS)),
        )
        .await
    {
        warn!(error = %e, "authorization request could not be cached");
        return surface_error(
            options,
            ErrorResponse::new("server_error", "the authorization request could not be processed"),
        );
    }

    let mut ctx = EndpointContext::new(Some(message.clone()));
    options.provider.authorization_endpoint(&mut ctx).await;
    if let EndpointOutcome::Handled(handled) = std::mem::take(&mut ctx.outcome) {
        return HandleOutcome::Response(handled);
    }

    HandleOutcome::AwaitSignIn(message)
}

/// Materializes the authorization response once the host has signed the
/// user in.
///
/// Tokens are minted code first, then access token, then identity token, so
/// `c_hash` and `at_hash` can reference the freshly minted values. Any
/// minting failure is fatal and never redirected.
pub(crate) async fn complete(
    options: &ServerOptions,
    message: &ProtocolMessage,
    mut ticket: AuthenticationTicket,
) -> HandleOutcome {
    let Some(redirect_uri) = message.redirect_uri().map(str::to_owned) else {
        return surface_error(
            options,
            ErrorResponse::new("server_error", "no redirect_uri is associated with this request"),
        );
    };
    let mode = response_mode_for(message);

    // Capture the request state the token lifecycle depends on. The client
    // binding is write-once; granted scope set by the host wins.
    if let Some(client_id) = message.client_id() {
        ticket.properties.set_client_id(client_id.to_owned());
    }
    for (param, property) in [
        (params::SCOPE, properties::SCOPE),
        (params::RESOURCE, properties::RESOURCE),
        (params::NONCE, properties::NONCE),
    ] {
        if ticket.properties.get(property).is_none()
            && let Some(value) = message.get(param)
        {
            ticket.properties.set(property, value.to_owned());
        }
    }
    ticket.properties.set(properties::REDIRECT_URI, redirect_uri.clone());

    let mut response_params: Vec<(String, String)> = Vec::new();

    let mut code = None;
    if message.has_response_type(response_types::CODE) {
        match serializer::create_authorization_code(options, &ticket).await {
            Some(value) => {
                response_params.push((params::CODE.to_owned(), value.clone()));
                code = Some(value);
            }
            None => {
                return surface_error(
                    options,
                    ErrorResponse::new(
                        "server_error",
                        "an error occurred while issuing the authorization code",
                    ),
                );
            }
        }
    }

    let mut access_token = None;
    if message.has_response_type(response_types::TOKEN) {
        match serializer::create_access_token(options, &ticket, None).await {
            Some(issued) => {
                let now = chrono::Utc::now();
                response_params.push((params::ACCESS_TOKEN.to_owned(), issued.value.clone()));
                response_params.push((params::TOKEN_TYPE.to_owned(), "Bearer".to_owned()));
                response_params.push((
                    params::EXPIRES_IN.to_owned(),
                    serializer::expires_in_seconds(now, issued.expires_at).to_string(),
                ));
                access_token = Some(issued.value);
            }
            None => {
                return surface_error(
                    options,
                    ErrorResponse::new(
                        "server_error",
                        "an error occurred while issuing the access token",
                    ),
                );
            }
        }
    }

    if message.has_response_type(response_types::ID_TOKEN) {
        let nonce = message.nonce().or_else(|| ticket.properties.nonce());
        match serializer::create_identity_token(
            options,
            &ticket,
            nonce,
            code.as_deref(),
            access_token.as_deref(),
            None,
        )
        .await
        {
            Some(value) => response_params.push((params::ID_TOKEN.to_owned(), value)),
            None => {
                return surface_error(
                    options,
                    ErrorResponse::new(
                        "server_error",
                        "an error occurred while issuing the identity token",
                    ),
                );
            }
        }
    }

    if let Some(state) = message.state() {
        response_params.push((params::STATE.to_owned(), state.to_owned()));
    }

    // The round trip is over; drop the parked request.
    if let Some(unique_id) = message.unique_id() {
        let _ = options.cache.take(&request_cache_key(unique_id)).await;
    }

    HandleOutcome::Response(response::authorization_response(
        &redirect_uri,
        &response_params,
        mode,
    ))
}

/// The effective response mode: the explicit parameter when valid, else the
/// flow default.
fn response_mode_for(message: &ProtocolMessage) -> ResponseMode {
    match message.response_mode() {
        Some("query") => ResponseMode::Query,
        Some("fragment") => ResponseMode::Fragment,
        Some("form_post") => ResponseMode::FormPost,
        _ => default_response_mode(message),
    }
}

/// Query for the code flow, fragment as soon as tokens travel in the
/// response.
fn default_response_mode(message: &ProtocolMessage) -> ResponseMode {
    if message.has_response_type(response_types::TOKEN)
        || message.has_response_type(response_types::ID_TOKEN)
    {
        ResponseMode::Fragment
    } else {
        ResponseMode::Query
    }
}

/// Renders an error that cannot be redirected: a native plain-text page, or
/// the host application when it opted in to displaying errors.
fn surface_error(options: &ServerOptions, error: ErrorResponse) -> HandleOutcome {
    if options.application_can_display_errors {
        HandleOutcome::ApplicationError(error)
    } else {
        HandleOutcome::Response(response::native_error_page(&error))
    }
}

/// Sends an error back to the client's redirect URI, falling back to
/// [`surface_error`] when no URI survived validation.
fn redirect_error(
    options: &ServerOptions,
    redirect_uri: Option<&str>,
    mode: ResponseMode,
    state: Option<&str>,
    error: ErrorResponse,
) -> HandleOutcome {
    let Some(redirect_uri) = redirect_uri else {
        return surface_error(options, error);
    };

    let mut redirect_params = vec![(params::ERROR.to_owned(), error.error)];
    if let Some(description) = error.error_description {
        redirect_params.push((params::ERROR_DESCRIPTION.to_owned(), description));
    }
    if let Some(uri) = error.error_uri {
        redirect_params.push((params::ERROR_URI.to_owned(), uri));
    }
    if let Some(state) = state {
        redirect_params.push((params::STATE.to_owned(), state.to_owned()));
    }

    HandleOutcome::Response(response::authorization_response(
        redirect_uri,
        &redirect_params,
        mode,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with(pairs: &[(&str, &str)]) -> ProtocolMessage {
        ProtocolMessage::from_pairs(
            MessageKind::AuthenticationRequest,
            pairs.iter().map(|(k, v)| (*k, *v)),
        )
    }

    #[test]
    fn code_flow_defaults_to_query_mode() {
        let message = message_with(&[("response_type", "code")]);
        assert_eq!(response_mode_for(&message), ResponseMode::Query);
    }

    #[test]
    fn implicit_and_hybrid_default_to_fragment_mode() {
        let message = message_with(&[("response_type", "id_token token")]);
        assert_eq!(response_mode_for(&message), ResponseMode::Fragment);

        let message = message_with(&[("response_type", "code id_token")]);
        assert_eq!(response_mode_for(&message), ResponseMode::Fragment);
    }

    #[test]
    fn explicit_mode_overrides_the_default() {
        let message = message_with(&[("response_type", "code"), ("response_mode", "form_post")]);
        assert_eq!(response_mode_for(&message), ResponseMode::FormPost);
    }

    #[test]
    fn missing_response_type_defaults_to_query_mode() {
        let message = message_with(&[("client_id", "app1")]);
        assert_eq!(response_mode_for(&message), ResponseMode::Query);
    }
}
