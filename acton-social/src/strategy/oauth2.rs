//! OAuth2 authorization-code redirect strategy
//!
//! Only the first leg of the handshake lives here: building the provider's
//! authorization URL with CSRF state and a PKCE challenge. The token
//! exchange and the signed response belong to the transport.

use super::{InitiateRequest, RedirectTarget, Strategy, StrategyError};
use crate::config::StrategyConfig;
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, Scope,
};

// BasicClient with only the authorization endpoint set
type AuthorizeClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet>;

/// Redirects to a provider's OAuth2 authorization endpoint
#[derive(Debug, Clone)]
pub struct OAuth2Strategy {
    key: String,
    display_name: String,
    client: AuthorizeClient,
    redirect_uri: Option<RedirectUrl>,
    scopes: Vec<String>,
}

impl OAuth2Strategy {
    /// Build a strategy from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the authorization URL or redirect URI is invalid
    pub fn from_config(key: &str, config: &StrategyConfig) -> Result<Self, StrategyError> {
        let invalid = |reason: String| StrategyError::InvalidConfig {
            strategy: key.to_string(),
            reason,
        };

        let mut client = BasicClient::new(ClientId::new(config.client_id.clone())).set_auth_uri(
            AuthUrl::new(config.auth_url.clone())
                .map_err(|e| invalid(format!("Invalid auth URL: {e}")))?,
        );
        if !config.client_secret.is_empty() {
            client = client.set_client_secret(ClientSecret::new(config.client_secret.clone()));
        }

        let redirect_uri = config
            .redirect_uri
            .clone()
            .map(RedirectUrl::new)
            .transpose()
            .map_err(|e| invalid(format!("Invalid redirect URI: {e}")))?;

        Ok(Self {
            key: key.to_string(),
            display_name: config.display_name.clone().unwrap_or_else(|| title_case(key)),
            client,
            redirect_uri,
            scopes: config.scopes.clone(),
        })
    }
}

impl Strategy for OAuth2Strategy {
    fn key(&self) -> &str {
        &self.key
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn initiate(&self, request: &InitiateRequest) -> Result<RedirectTarget, StrategyError> {
        let redirect_uri = match &self.redirect_uri {
            Some(uri) => uri.clone(),
            None => RedirectUrl::new(request.callback_url.clone()).map_err(|e| {
                StrategyError::InvalidConfig {
                    strategy: self.key.clone(),
                    reason: format!("Invalid callback URL: {e}"),
                }
            })?,
        };

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = self.client.clone().set_redirect_uri(redirect_uri);
        let mut builder = client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            builder = builder.add_scope(Scope::new(scope.clone()));
        }
        let (url, state) = builder.set_pkce_challenge(pkce_challenge).url();

        tracing::debug!(strategy = %self.key, "Built authorization redirect");

        Ok(RedirectTarget {
            url: url.to_string(),
            state: Some(state.secret().clone()),
            pkce_verifier: Some(pkce_verifier.secret().clone()),
        })
    }
}

fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
