//! Protocol message model.
//!
//! Implements the request representation shared by every endpoint: a
//! case-insensitive ordered mapping from parameter name to string value,
//! tagged with the kind of request it was read from, with typed accessors
//! for the parameters defined by RFC 6749 and `OpenID` Connect Core 1.0.

use serde::{Deserialize, Serialize};

/// Well-known protocol parameter names.
pub mod params {
    /// Client identifier.
    pub const CLIENT_ID: &str = "client_id";
    /// Client secret (token endpoint only).
    pub const CLIENT_SECRET: &str = "client_secret";
    /// Redirection URI.
    pub const REDIRECT_URI: &str = "redirect_uri";
    /// Space-separated response type tokens.
    pub const RESPONSE_TYPE: &str = "response_type";
    /// Response mode (`query`, `fragment`, `form_post`).
    pub const RESPONSE_MODE: &str = "response_mode";
    /// Space-separated scope tokens.
    pub const SCOPE: &str = "scope";
    /// Opaque client state echoed back on responses.
    pub const STATE: &str = "state";
    /// Replay-protection nonce.
    pub const NONCE: &str = "nonce";
    /// Authorization code.
    pub const CODE: &str = "code";
    /// Grant type (token endpoint).
    pub const GRANT_TYPE: &str = "grant_type";
    /// Resource owner username (password grant).
    pub const USERNAME: &str = "username";
    /// Resource owner password (password grant).
    pub const PASSWORD: &str = "password";
    /// Refresh token.
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Access token (introspection).
    pub const ACCESS_TOKEN: &str = "access_token";
    /// Identity token (introspection).
    pub const ID_TOKEN: &str = "id_token";
    /// ID token hint (logout).
    pub const ID_TOKEN_HINT: &str = "id_token_hint";
    /// Target resource.
    pub const RESOURCE: &str = "resource";
    /// Target audience.
    pub const AUDIENCE: &str = "audience";
    /// Post-logout redirection URI.
    pub const POST_LOGOUT_REDIRECT_URI: &str = "post_logout_redirect_uri";
    /// Error code.
    pub const ERROR: &str = "error";
    /// Human-readable error description.
    pub const ERROR_DESCRIPTION: &str = "error_description";
    /// URI with more information about the error.
    pub const ERROR_URI: &str = "error_uri";
    /// Key of the cached in-flight authorization request.
    pub const UNIQUE_ID: &str = "unique_id";
    /// Token type (`Bearer`).
    pub const TOKEN_TYPE: &str = "token_type";
    /// Access token lifetime in seconds.
    pub const EXPIRES_IN: &str = "expires_in";
}

/// Well-known `response_type` tokens.
pub mod response_types {
    /// Authorization code.
    pub const CODE: &str = "code";
    /// Access token (implicit).
    pub const TOKEN: &str = "token";
    /// Identity token.
    pub const ID_TOKEN: &str = "id_token";
    /// Refresh token (token-endpoint filtering only).
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

/// Well-known `response_mode` values.
pub mod response_modes {
    /// Parameters in the redirect query string.
    pub const QUERY: &str = "query";
    /// Parameters in the redirect fragment.
    pub const FRAGMENT: &str = "fragment";
    /// Parameters in an auto-submitting HTML form.
    pub const FORM_POST: &str = "form_post";
}

/// Well-known `grant_type` values.
pub mod grant_types {
    /// Authorization code grant (RFC 6749 Section 4.1).
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// Client credentials grant (RFC 6749 Section 4.4).
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    /// Resource owner password credentials grant (RFC 6749 Section 4.3).
    pub const PASSWORD: &str = "password";
    /// Refresh token grant (RFC 6749 Section 6).
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Implicit flow, advertised on discovery only.
    pub const IMPLICIT: &str = "implicit";
}

/// Well-known scope tokens.
pub mod scopes {
    /// `OpenID` Connect scope.
    pub const OPENID: &str = "openid";
    /// Offline access scope (refresh tokens).
    pub const OFFLINE_ACCESS: &str = "offline_access";
}

/// The kind of protocol request a message was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// An authorization-endpoint request.
    AuthenticationRequest,
    /// A token-endpoint request.
    TokenRequest,
    /// A logout-endpoint request.
    LogoutRequest,
}

/// A protocol message: ordered parameters with case-insensitive names.
///
/// Parameter order is preserved so that cached requests rehydrate exactly as
/// they were received. Name lookups ignore ASCII case; values are compared
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    kind: MessageKind,
    params: Vec<(String, String)>,
}

impl ProtocolMessage {
    /// Creates an empty message of the given kind.
    #[must_use]
    pub const fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    /// Creates a message from an ordered sequence of parameter pairs.
    ///
    /// Later duplicates overwrite earlier ones, keeping the first position.
    pub fn from_pairs<I, K, V>(kind: MessageKind, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut message = Self::new(kind);
        for (name, value) in pairs {
            message.set(&name.into(), value.into());
        }
        message
    }

    /// Returns the request kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Looks up a parameter by case-insensitive name.
    ///
    /// Empty values read as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Sets a parameter, replacing an existing case-insensitive match in
    /// place or appending at the end.
    pub fn set(&mut self, name: &str, value: String) {
        if let Some(slot) = self
            .params
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.params.push((name.to_owned(), value));
        }
    }

    /// Removes a parameter, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .params
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.params.remove(index).1)
    }

    /// Returns the ordered parameter pairs.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Overlays this message on a cached one: cached parameters are kept
    /// unless the fresh request carries the same name.
    #[must_use]
    pub fn overlaid_on(&self, mut cached: Self) -> Self {
        cached.kind = self.kind;
        for (name, value) in &self.params {
            cached.set(name, value.clone());
        }
        cached
    }

    /// Client identifier.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.get(params::CLIENT_ID)
    }

    /// Client secret.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.get(params::CLIENT_SECRET)
    }

    /// Redirection URI.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.get(params::REDIRECT_URI)
    }

    /// Raw space-separated response type.
    #[must_use]
    pub fn response_type(&self) -> Option<&str> {
        self.get(params::RESPONSE_TYPE)
    }

    /// Response mode.
    #[must_use]
    pub fn response_mode(&self) -> Option<&str> {
        self.get(params::RESPONSE_MODE)
    }

    /// Raw space-separated scope.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.get(params::SCOPE)
    }

    /// Client state.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.get(params::STATE)
    }

    /// Nonce.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.get(params::NONCE)
    }

    /// Authorization code.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.get(params::CODE)
    }

    /// Grant type.
    #[must_use]
    pub fn grant_type(&self) -> Option<&str> {
        self.get(params::GRANT_TYPE)
    }

    /// Resource owner username.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.get(params::USERNAME)
    }

    /// Resource owner password.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.get(params::PASSWORD)
    }

    /// Refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.get(params::REFRESH_TOKEN)
    }

    /// Access token (introspection requests).
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.get(params::ACCESS_TOKEN)
    }

    /// Identity token (introspection requests).
    #[must_use]
    pub fn identity_token(&self) -> Option<&str> {
        self.get(params::ID_TOKEN)
    }

    /// ID token hint.
    #[must_use]
    pub fn id_token_hint(&self) -> Option<&str> {
        self.get(params::ID_TOKEN_HINT)
    }

    /// Target resource.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.get(params::RESOURCE)
    }

    /// Target audience.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.get(params::AUDIENCE)
    }

    /// Post-logout redirection URI.
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> Option<&str> {
        self.get(params::POST_LOGOUT_REDIRECT_URI)
    }

    /// Error code (response messages).
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.get(params::ERROR)
    }

    /// Error description (response messages).
    #[must_use]
    pub fn error_description(&self) -> Option<&str> {
        self.get(params::ERROR_DESCRIPTION)
    }

    /// Error URI (response messages).
    #[must_use]
    pub fn error_uri(&self) -> Option<&str> {
        self.get(params::ERROR_URI)
    }

    /// Key of the cached in-flight authorization request.
    #[must_use]
    pub fn unique_id(&self) -> Option<&str> {
        self.get(params::UNIQUE_ID)
    }

    /// Sets the cached-request key.
    pub fn set_unique_id(&mut self, unique_id: String) {
        self.set(params::UNIQUE_ID, unique_id);
    }

    /// Checks whether the `response_type` set contains the given token.
    #[must_use]
    pub fn has_response_type(&self, token: &str) -> bool {
        self.response_type()
            .is_some_and(|value| set_contains(value, token))
    }

    /// Checks whether the `scope` set contains the given token.
    #[must_use]
    pub fn has_scope(&self, token: &str) -> bool {
        self.scope().is_some_and(|value| set_contains(value, token))
    }
}

/// Checks whether a space-separated token set contains `token`.
///
/// Membership is exact string equality on each token.
#[must_use]
pub fn set_contains(value: &str, token: &str) -> bool {
    value.split(' ').any(|candidate| candidate == token)
}

/// Checks whether every token of `subset` appears in `superset`.
#[must_use]
pub fn set_is_subset(subset: &str, superset: &str) -> bool {
    subset
        .split(' ')
        .filter(|token| !token.is_empty())
        .all(|token| set_contains(superset, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProtocolMessage {
        ProtocolMessage::from_pairs(
            MessageKind::AuthenticationRequest,
            [
                ("client_id", "app1"),
                ("redirect_uri", "https://client.example.com/cb"),
                ("response_type", "code id_token"),
                ("scope", "openid profile"),
                ("state", "xyz"),
            ],
        )
    }

    #[test]
    fn lookup_ignores_name_case() {
        let message = request();
        assert_eq!(message.get("CLIENT_ID"), Some("app1"));
        assert_eq!(message.get("Client_Id"), Some("app1"));
        assert_eq!(message.client_id(), Some("app1"));
    }

    #[test]
    fn empty_values_read_as_absent() {
        let mut message = request();
        message.set("state", String::new());
        assert_eq!(message.state(), None);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut message = request();
        message.set("Scope", "openid".to_owned());
        assert_eq!(message.scope(), Some("openid"));
        // Position of the replaced parameter is unchanged.
        assert_eq!(message.params()[3].0, "scope");
    }

    #[test]
    fn token_set_membership_is_exact() {
        let message = request();
        assert!(message.has_response_type("code"));
        assert!(message.has_response_type("id_token"));
        assert!(!message.has_response_type("id"));
        assert!(!message.has_response_type("token"));
        assert!(message.has_scope("openid"));
        assert!(!message.has_scope("open"));
    }

    #[test]
    fn subset_check() {
        assert!(set_is_subset("openid", "openid profile"));
        assert!(set_is_subset("", "openid"));
        assert!(!set_is_subset("openid email", "openid profile"));
    }

    #[test]
    fn overlay_prefers_fresh_parameters() {
        let cached = request();
        let mut fresh = ProtocolMessage::new(MessageKind::AuthenticationRequest);
        fresh.set("scope", "openid".to_owned());
        fresh.set("prompt", "login".to_owned());

        let merged = fresh.overlaid_on(cached);
        assert_eq!(merged.scope(), Some("openid"));
        assert_eq!(merged.client_id(), Some("app1"));
        assert_eq!(merged.get("prompt"), Some("login"));
    }
}
