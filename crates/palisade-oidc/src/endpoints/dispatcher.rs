//! Endpoint path matching.

use crate::options::ServerOptions;
use crate::provider::Endpoint;

/// Matches a request path against the six configured endpoint paths.
///
/// An empty configured path means the endpoint is disabled and never
/// matches. The `match_endpoint` provider hook runs after this and may
/// reclassify the result.
pub(crate) fn match_path(options: &ServerOptions, path: &str) -> Option<Endpoint> {
    let candidates = [
        (&options.authorization_endpoint_path, Endpoint::Authorization),
        (&options.token_endpoint_path, Endpoint::Token),
        (&options.introspection_endpoint_path, Endpoint::Introspection),
        (&options.logout_endpoint_path, Endpoint::Logout),
        (&options.configuration_endpoint_path, Endpoint::Configuration),
        (&options.jwks_endpoint_path, Endpoint::Cryptography),
    ];

    candidates
        .into_iter()
        .find(|(configured, _)| !configured.is_empty() && *configured == path)
        .map(|(_, endpoint)| endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn options() -> ServerOptions {
        ServerOptions::new(Url::parse("https://id.example.com").unwrap()).unwrap()
    }

    #[test]
    fn default_paths_match() {
        let options = options();
        assert_eq!(
            match_path(&options, "/connect/authorize"),
            Some(Endpoint::Authorization)
        );
        assert_eq!(match_path(&options, "/connect/token"), Some(Endpoint::Token));
        assert_eq!(
            match_path(&options, "/connect/token_validation"),
            Some(Endpoint::Introspection)
        );
        assert_eq!(match_path(&options, "/connect/logout"), Some(Endpoint::Logout));
        assert_eq!(
            match_path(&options, "/.well-known/openid-configuration"),
            Some(Endpoint::Configuration)
        );
        assert_eq!(
            match_path(&options, "/.well-known/jwks"),
            Some(Endpoint::Cryptography)
        );
        assert_eq!(match_path(&options, "/somewhere/else"), None);
    }

    #[test]
    fn empty_path_disables_the_endpoint() {
        let mut options = options();
        options.token_endpoint_path = String::new();
        assert_eq!(match_path(&options, "/connect/token"), None);
        assert_eq!(match_path(&options, ""), None);
    }
}
