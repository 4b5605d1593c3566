//! Discovery document and JWKS endpoints.
//!
//! Metadata is assembled conditionally: a combination is advertised only
//! when every endpoint it needs is enabled, and `id_token`-bearing response
//! types only when a signing credential exists to back them.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use tracing::warn;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::ErrorResponse;
use crate::handler::{HandleOutcome, ServerRequest};
use crate::options::ServerOptions;
use crate::provider::{EndpointContext, EndpointOutcome};
use crate::response::{json_error, json_ok};

/// Discovery document payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationMetadata {
    /// Issuer identifier.
    pub issuer: String,

    /// Authorization endpoint URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Logout endpoint URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// JWKS URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Supported grant types.
    pub grant_types_supported: Vec<String>,

    /// Supported response modes.
    pub response_modes_supported: Vec<String>,

    /// Supported response types.
    pub response_types_supported: Vec<String>,

    /// Supported subject identifier types.
    pub subject_types_supported: Vec<String>,

    /// Supported scopes.
    pub scopes_supported: Vec<String>,

    /// Supported identity-token signing algorithms.
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// JSON Web Key Set payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// The advertised keys.
    pub keys: Vec<JsonWebKey>,
}

/// One JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (`RSA`).
    pub kty: String,

    /// Key use (`sig`).
    #[serde(rename = "use")]
    pub key_use: String,

    /// Key identifier.
    pub kid: String,

    /// Algorithm (`RS256`).
    pub alg: String,

    /// X.509 certificate SHA-1 thumbprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,

    /// X.509 certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    /// RSA modulus (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

pub(crate) async fn handle_configuration(
    options: &ServerOptions,
    request: &ServerRequest,
) -> HandleOutcome {
    if request.method != Method::GET {
        return HandleOutcome::Response(json_error(&ErrorResponse::new(
            "invalid_request",
            "method not supported",
        )));
    }

    let mut ctx = EndpointContext::new(None);
    options.provider.configuration_endpoint(&mut ctx).await;
    if let EndpointOutcome::Handled(handled) = std::mem::take(&mut ctx.outcome) {
        return HandleOutcome::Response(handled);
    }

    HandleOutcome::Response(json_ok(&build_metadata(options)))
}

pub(crate) async fn handle_jwks(options: &ServerOptions, request: &ServerRequest) -> HandleOutcome {
    if request.method != Method::GET {
        return HandleOutcome::Response(json_error(&ErrorResponse::new(
            "invalid_request",
            "method not supported",
        )));
    }

    let mut ctx = EndpointContext::new(None);
    options.provider.cryptography_endpoint(&mut ctx).await;
    if let EndpointOutcome::Handled(handled) = std::mem::take(&mut ctx.outcome) {
        return HandleOutcome::Response(handled);
    }

    HandleOutcome::Response(json_ok(&build_jwks(options)))
}

fn build_metadata(options: &ServerOptions) -> ConfigurationMetadata {
    let authorization = !options.authorization_endpoint_path.is_empty();
    let token = options.token_endpoint_enabled();
    let logout = !options.logout_endpoint_path.is_empty();
    let jwks = !options.jwks_endpoint_path.is_empty();
    let signing = options.signing_credential().is_some();

    let mut grant_types = Vec::new();
    if authorization && token {
        grant_types.push("authorization_code".to_owned());
    }
    if token {
        grant_types.push("refresh_token".to_owned());
        grant_types.push("password".to_owned());
        grant_types.push("client_credentials".to_owned());
    }
    if authorization {
        grant_types.push("implicit".to_owned());
    }

    let mut response_types = Vec::new();
    if authorization {
        if token {
            response_types.push("code".to_owned());
        }
        response_types.push("token".to_owned());
        if signing {
            response_types.push("id_token".to_owned());
            response_types.push("id_token token".to_owned());
            if token {
                response_types.push("code id_token".to_owned());
                response_types.push("code token".to_owned());
                response_types.push("code id_token token".to_owned());
            }
        }
    }

    ConfigurationMetadata {
        issuer: options.issuer.to_string(),
        authorization_endpoint: authorization
            .then(|| options.absolute_endpoint(&options.authorization_endpoint_path)),
        token_endpoint: token.then(|| options.absolute_endpoint(&options.token_endpoint_path)),
        end_session_endpoint: logout
            .then(|| options.absolute_endpoint(&options.logout_endpoint_path)),
        jwks_uri: jwks.then(|| options.absolute_endpoint(&options.jwks_endpoint_path)),
        grant_types_supported: grant_types,
        response_modes_supported: if authorization {
            vec!["form_post".to_owned(), "fragment".to_owned(), "query".to_owned()]
        } else {
            Vec::new()
        },
        response_types_supported: response_types,
        subject_types_supported: vec!["public".to_owned()],
        scopes_supported: vec!["openid".to_owned()],
        id_token_signing_alg_values_supported: if signing {
            vec!["RS256".to_owned()]
        } else {
            Vec::new()
        },
    }
}

fn build_jwks(options: &ServerOptions) -> JsonWebKeySet {
    let mut keys = Vec::new();
    for credential in &options.signing_credentials {
        if !credential.supports_rs256() {
            warn!(
                kid = credential.key_id(),
                algorithm = credential.algorithm(),
                "skipping signing key without RS256 support"
            );
            continue;
        }

        let mut key = JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: credential.key_id().to_owned(),
            alg: "RS256".to_owned(),
            x5t: None,
            x5c: None,
            n: None,
            e: None,
        };

        if credential.certificate().is_some() {
            key.x5t = credential.x5t();
            key.x5c = credential.x5c_entry().map(|entry| vec![entry]);
        } else {
            key.n = Some(URL_SAFE_NO_PAD.encode(credential.modulus()));
            key.e = Some(URL_SAFE_NO_PAD.encode(credential.exponent()));
        }

        keys.push(key);
    }
    JsonWebKeySet { keys }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const TEST_RSA_PEM: &str = include_str!("../../tests/keys/test_rsa.pem");

    fn options() -> ServerOptions {
        ServerOptions::new(Url::parse("https://id.example.com").unwrap()).unwrap()
    }

    fn with_signing(mut options: ServerOptions) -> ServerOptions {
        options.signing_credentials = vec![
            palisade_crypto::SigningCredential::from_rsa_pem(TEST_RSA_PEM).unwrap(),
        ];
        options
    }

    #[test]
    fn hybrid_response_types_need_token_endpoint_and_credential() {
        let metadata = build_metadata(&with_signing(options()));
        assert!(
            metadata
                .response_types_supported
                .contains(&"code id_token token".to_owned())
        );

        // No signing credential: nothing id_token-flavored.
        let metadata = build_metadata(&options());
        assert!(
            metadata
                .response_types_supported
                .iter()
                .all(|rt| !rt.contains("id_token"))
        );

        // Token endpoint disabled: nothing code-flavored, and no
        // token_endpoint key at all.
        let mut disabled = with_signing(options());
        disabled.token_endpoint_path = String::new();
        let metadata = build_metadata(&disabled);
        assert_eq!(metadata.token_endpoint, None);
        assert!(
            metadata
                .response_types_supported
                .iter()
                .all(|rt| !rt.contains("code"))
        );
        assert!(
            !metadata
                .grant_types_supported
                .contains(&"authorization_code".to_owned())
        );
    }

    #[test]
    fn metadata_advertises_absolute_endpoints() {
        let metadata = build_metadata(&options());
        assert_eq!(
            metadata.authorization_endpoint.as_deref(),
            Some("https://id.example.com/connect/authorize")
        );
        assert_eq!(
            metadata.end_session_endpoint.as_deref(),
            Some("https://id.example.com/connect/logout")
        );
        assert_eq!(
            metadata.jwks_uri.as_deref(),
            Some("https://id.example.com/.well-known/jwks")
        );
        assert_eq!(
            metadata.response_modes_supported,
            vec!["form_post", "fragment", "query"]
        );
        assert_eq!(metadata.subject_types_supported, vec!["public"]);
        assert_eq!(metadata.scopes_supported, vec!["openid"]);
    }

    #[test]
    fn jwks_exposes_rsa_components_without_certificate() {
        let jwks = build_jwks(&with_signing(options()));
        assert_eq!(jwks.keys.len(), 1);
        let key = &jwks.keys[0];
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.alg, "RS256");
        assert!(key.n.is_some());
        assert!(key.e.is_some());
        assert!(key.x5t.is_none());
        assert!(key.x5c.is_none());
    }

    #[test]
    fn jwks_prefers_certificate_material() {
        let mut options = options();
        options.signing_credentials = vec![
            palisade_crypto::SigningCredential::from_rsa_pem(TEST_RSA_PEM)
                .unwrap()
                .with_certificate(vec![0x30, 0x03, 0x02, 0x01, 0x01]),
        ];
        let jwks = build_jwks(&options);
        let key = &jwks.keys[0];
        assert!(key.x5t.is_some());
        assert_eq!(key.x5c.as_ref().map(Vec::len), Some(1));
        assert!(key.n.is_none());
        assert!(key.e.is_none());
    }

    #[test]
    fn jwks_skips_non_rs256_keys() {
        let mut options = options();
        options.signing_credentials = vec![
            palisade_crypto::SigningCredential::from_rsa_pem(TEST_RSA_PEM)
                .unwrap()
                .with_algorithm("PS384"),
        ];
        assert!(build_jwks(&options).keys.is_empty());
    }
}
