//! Logout endpoint.
//!
//! Two-phase like authorization: validate the request and yield so the host
//! can sign the user out, then redirect to the validated post-logout URI.

use axum::http::Method;
use axum::response::Response;

use palisade_model::{MessageKind, ProtocolMessage};

use crate::error::ErrorResponse;
use crate::handler::{HandleOutcome, ServerRequest};
use crate::options::ServerOptions;
use crate::provider::{EndpointContext, EndpointOutcome, ValidateLogoutRedirectUriContext};
use crate::response;

pub(crate) async fn handle(options: &ServerOptions, request: &ServerRequest) -> HandleOutcome {
    let pairs = match request.method {
        Method::GET => request.query_pairs(),
        Method::POST => {
            if !request.has_form_content_type() {
                return error_outcome(
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
            return error_outcome(
                options,
                ErrorResponse::new("invalid_request", "method not supported"),
            );
        }
    };
    let message = ProtocolMessage::from_pairs(MessageKind::LogoutRequest, pairs);

    if let Some(uri) = message.post_logout_redirect_uri()
        && !redirect_uri_validated(options, &message, uri).await
    {
        return error_outcome(
            options,
            ErrorResponse::new(
                "invalid_request",
                "post_logout_redirect_uri is not valid for this client",
            ),
        );
    }

    let mut ctx = EndpointContext::new(Some(message.clone()));
    options.provider.logout_endpoint(&mut ctx).await;
    if let EndpointOutcome::Handled(handled) = std::mem::take(&mut ctx.outcome) {
        return HandleOutcome::Response(handled);
    }

    HandleOutcome::AwaitSignOut(message)
}

/// Builds the post-sign-out response.
///
/// The redirect URI must (re-)validate here: completion is a separate call
/// and nothing prevents a host from passing a message the request phase
/// never saw.
pub(crate) async fn complete(options: &ServerOptions, message: &ProtocolMessage) -> Response {
    let Some(uri) = message.post_logout_redirect_uri() else {
        return response::empty_ok();
    };
    if !redirect_uri_validated(options, message, uri).await {
        return response::empty_ok();
    }

    let mut params = Vec::new();
    if let Some(state) = message.state() {
        params.push(("state".to_owned(), state.to_owned()));
    }
    response::authorization_response(uri, &params, response::ResponseMode::Query)
}

async fn redirect_uri_validated(
    options: &ServerOptions,
    message: &ProtocolMessage,
    uri: &str,
) -> bool {
    let mut ctx = ValidateLogoutRedirectUriContext::new(message.clone(), uri.to_owned());
    options
        .provider
        .validate_client_logout_redirect_uri(&mut ctx)
        .await;
    ctx.decision().is_validated()
}

fn error_outcome(options: &ServerOptions, error: ErrorResponse) -> HandleOutcome {
    if options.application_can_display_errors {
        HandleOutcome::ApplicationError(error)
    } else {
        HandleOutcome::Response(response::native_error_page(&error))
    }
}
