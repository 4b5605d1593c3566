//! Authentication ticket.
//!
//! The ticket is the currency passed from sign-in through token issuance and,
//! on later requests, from token deserialization back to validation. It pairs
//! a subject identity (claims with per-claim token destinations) with an
//! ordered property bag carrying the reserved flow state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved ticket property names.
pub mod properties {
    /// Client the ticket was issued to; immutable once set.
    pub const CLIENT_ID: &str = "client_id";
    /// Redirection URI recorded at authorization time.
    pub const REDIRECT_URI: &str = "redirect_uri";
    /// Space-separated granted resources.
    pub const RESOURCE: &str = "resource";
    /// Space-separated granted scopes.
    pub const SCOPE: &str = "scope";
    /// Nonce captured from the authorization request.
    pub const NONCE: &str = "nonce";
    /// Space-separated token audiences.
    pub const AUDIENCES: &str = "audiences";
    /// Whether the issuing request authenticated the client.
    pub const CLIENT_AUTHENTICATED: &str = "client_authenticated";
}

/// Well-known claim kinds.
pub mod claims {
    /// Subject identifier.
    pub const SUBJECT: &str = "sub";
    /// Name identifier, the fallback source for `sub`.
    pub const NAME_IDENTIFIER: &str = "name_id";
    /// Display name.
    pub const NAME: &str = "name";
    /// Delegation: a nested serialized ticket.
    pub const ACTOR: &str = "actor";
    /// Access-token hash (identity tokens).
    pub const AT_HASH: &str = "at_hash";
    /// Authorization-code hash (identity tokens).
    pub const C_HASH: &str = "c_hash";
    /// Nonce (identity tokens).
    pub const NONCE: &str = "nonce";
}

/// A token kind a claim may flow into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Destination {
    /// The claim is serialized into access tokens.
    #[serde(rename = "token")]
    AccessToken,
    /// The claim is serialized into identity tokens.
    #[serde(rename = "id_token")]
    IdToken,
}

/// A named claim with the set of token kinds it may flow into.
///
/// A claim with an empty destination set is confidential: it survives ticket
/// round-trips but is never serialized into a token (the subject and
/// name-identifier claims are the one exception, applied by the serializer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim kind.
    pub kind: String,
    /// Claim value.
    pub value: String,
    /// Token kinds this claim may flow into.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub destinations: BTreeSet<Destination>,
}

impl Claim {
    /// Creates a claim with no destinations.
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            destinations: BTreeSet::new(),
        }
    }

    /// Adds a destination.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destinations.insert(destination);
        self
    }

    /// Checks whether this claim may flow into the given token kind.
    #[must_use]
    pub fn flows_into(&self, destination: Destination) -> bool {
        self.destinations.contains(&destination)
    }
}

/// The authenticated subject: an identifier plus its claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectIdentity {
    /// Subject identifier, when established directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Claims attached to the subject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<Claim>,
}

impl SubjectIdentity {
    /// Creates an identity with the given subject identifier.
    pub fn with_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            claims: Vec::new(),
        }
    }

    /// Appends a claim.
    #[must_use]
    pub fn add_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Returns the first claim of the given kind.
    #[must_use]
    pub fn find_claim(&self, kind: &str) -> Option<&Claim> {
        self.claims.iter().find(|claim| claim.kind == kind)
    }
}

/// Ordered ticket properties: lifetime bounds plus the reserved flow state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketProperties {
    /// When the ticket was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    /// When the ticket expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    entries: Vec<(String, String)>,
}

impl TicketProperties {
    /// Creates an empty property bag.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issued_at: None,
            expires_at: None,
            entries: Vec::new(),
        }
    }

    /// Looks up a property; empty values read as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Sets a property, replacing an existing entry in place.
    pub fn set(&mut self, name: &str, value: String) {
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| key == name) {
            slot.1 = value;
        } else {
            self.entries.push((name.to_owned(), value));
        }
    }

    /// Removes a property, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    /// The client the ticket was issued to.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.get(properties::CLIENT_ID)
    }

    /// Records the issuing client.
    ///
    /// The binding is write-once: a second call with a different value is
    /// ignored so a grant hook cannot re-point an issued ticket at another
    /// client.
    pub fn set_client_id(&mut self, client_id: String) {
        if self.client_id().is_none() {
            self.set(properties::CLIENT_ID, client_id);
        }
    }

    /// Redirection URI recorded at authorization time.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.get(properties::REDIRECT_URI)
    }

    /// Space-separated granted resources.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.get(properties::RESOURCE)
    }

    /// Space-separated granted scopes.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.get(properties::SCOPE)
    }

    /// Nonce captured from the authorization request.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.get(properties::NONCE)
    }

    /// Space-separated token audiences.
    #[must_use]
    pub fn audiences(&self) -> Option<&str> {
        self.get(properties::AUDIENCES)
    }

    /// Whether the issuing request authenticated the client.
    #[must_use]
    pub fn client_authenticated(&self) -> bool {
        self.get(properties::CLIENT_AUTHENTICATED) == Some("true")
    }

    /// Records whether the issuing request authenticated the client.
    pub fn set_client_authenticated(&mut self, authenticated: bool) {
        self.set(
            properties::CLIENT_AUTHENTICATED,
            if authenticated { "true" } else { "false" }.to_owned(),
        );
    }
}

/// Identity plus properties: the record passed between endpoints.
///
/// Tickets are value types. Token minting never mutates the ticket it was
/// handed; each serialization path works on its own copy so state written for
/// one token kind cannot leak into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationTicket {
    /// The authenticated subject.
    pub identity: SubjectIdentity,
    /// Flow state attached to the ticket.
    pub properties: TicketProperties,
}

impl AuthenticationTicket {
    /// Creates a ticket for the given identity with empty properties.
    #[must_use]
    pub fn new(identity: SubjectIdentity) -> Self {
        Self {
            identity,
            properties: TicketProperties::new(),
        }
    }

    /// Checks whether the granted scope set contains the given token.
    #[must_use]
    pub fn has_scope(&self, token: &str) -> bool {
        self.properties
            .scope()
            .is_some_and(|scope| crate::message::set_contains(scope, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_write_once() {
        let mut properties = TicketProperties::new();
        properties.set_client_id("app1".to_owned());
        properties.set_client_id("evil".to_owned());
        assert_eq!(properties.client_id(), Some("app1"));
    }

    #[test]
    fn claim_destinations() {
        let claim = Claim::new("email", "user@example.com").with_destination(Destination::IdToken);
        assert!(claim.flows_into(Destination::IdToken));
        assert!(!claim.flows_into(Destination::AccessToken));

        let confidential = Claim::new("secret", "s");
        assert!(!confidential.flows_into(Destination::AccessToken));
    }

    #[test]
    fn properties_preserve_insertion_order() {
        let mut properties = TicketProperties::new();
        properties.set("b", "2".to_owned());
        properties.set("a", "1".to_owned());
        properties.set("b", "3".to_owned());
        assert_eq!(properties.entries[0], ("b".to_owned(), "3".to_owned()));
        assert_eq!(properties.entries[1], ("a".to_owned(), "1".to_owned()));
    }

    #[test]
    fn scope_membership() {
        let mut ticket = AuthenticationTicket::new(SubjectIdentity::with_subject("alice"));
        ticket
            .properties
            .set(properties::SCOPE, "openid offline_access".to_owned());
        assert!(ticket.has_scope("openid"));
        assert!(ticket.has_scope("offline_access"));
        assert!(!ticket.has_scope("offline"));
    }

    #[test]
    fn ticket_round_trips_through_serde() {
        let mut ticket = AuthenticationTicket::new(
            SubjectIdentity::with_subject("alice").add_claim(
                Claim::new("email", "alice@example.com").with_destination(Destination::IdToken),
            ),
        );
        ticket.properties.issued_at = Some(Utc::now());
        ticket.properties.set_client_id("app1".to_owned());
        ticket.properties.set(properties::NONCE, "n1".to_owned());

        let json = serde_json::to_string(&ticket).unwrap();
        let restored: AuthenticationTicket = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ticket);
    }
}
