//! Protocol error types.
//!
//! Implements the OAuth 2.0 error responses defined in RFC 6749 and the
//! `OpenID` Connect Core 1.0 errata, narrowed to the codes this server emits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-visible protocol errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Invalid request parameters.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Client validation or authentication failed.
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Invalid or expired authorization grant.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// Client is not authorized for this grant type.
    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),

    /// Unsupported grant type.
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    /// Unsupported response type.
    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// Server-side failure.
    #[error("server_error: {0}")]
    ServerError(String),
}

impl ProtocolError {
    /// Returns the OAuth 2.0 error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest(d)
            | Self::InvalidClient(d)
            | Self::InvalidGrant(d)
            | Self::UnauthorizedClient(d)
            | Self::UnsupportedGrantType(d)
            | Self::UnsupportedResponseType(d)
            | Self::ServerError(d) => d,
        }
    }

    /// Converts into a wire error response.
    #[must_use]
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_owned(),
            error_description: Some(self.description().to_owned()).filter(|d| !d.is_empty()),
            error_uri: None,
        }
    }
}

/// OAuth 2.0 error response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// URI with more information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl ErrorResponse {
    /// Creates an error response with a description and no URI.
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: Some(description.into()),
            error_uri: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_wire_strings() {
        assert_eq!(
            ProtocolError::InvalidRequest(String::new()).error_code(),
            "invalid_request"
        );
        assert_eq!(
            ProtocolError::UnsupportedResponseType(String::new()).error_code(),
            "unsupported_response_type"
        );
        assert_eq!(ProtocolError::ServerError(String::new()).error_code(), "server_error");
    }

    #[test]
    fn empty_description_is_omitted() {
        let response = ProtocolError::InvalidGrant(String::new()).to_error_response();
        assert_eq!(response.error_description, None);

        let response = ProtocolError::InvalidGrant("expired".to_owned()).to_error_response();
        assert_eq!(response.error_description.as_deref(), Some("expired"));
    }

    #[test]
    fn serialization_skips_absent_fields() {
        let json = serde_json::to_string(&ErrorResponse {
            error: "invalid_request".to_owned(),
            error_description: None,
            error_uri: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"error":"invalid_request"}"#);
    }
}
