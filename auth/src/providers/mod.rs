pub mod auth0;
pub mod github;

pub use auth0::Auth0Provider;
pub use github::GitHubProvider;

use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};

use crate::error::AuthError;
use crate::session::{unix_now, OAuthTempState, ProviderKind};

/// Identity returned by a provider after a successful login
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalProfile {
    pub provider: ProviderKind,

    /// Provider-side account id (e.g. "auth0|5f1c..." or a GitHub numeric id)
    pub id: String,

    pub display_name: String,
    pub email: Option<String>,
    pub picture: Option<String>,
}

impl ExternalProfile {
    /// Email address, if the provider returned a non-blank one
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// Username for a newly created account
    pub fn username(&self) -> &str {
        let name = self.display_name.trim();
        if name.is_empty() {
            &self.id
        } else {
            name
        }
    }
}

/// A login strategy backed by an OAuth2 authorization code flow
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn scopes(&self) -> &'static [&'static str];

    /// Build the provider authorization URL and the state to keep until the callback
    fn start_auth(&self, link_uid: Option<u64>) -> Result<(String, OAuthTempState), AuthError>;

    /// Exchange the authorization code and fetch the user's profile
    async fn complete_auth(
        &self,
        code: &str,
        temp_state: &OAuthTempState,
    ) -> Result<ExternalProfile, AuthError>;
}

pub(crate) struct OAuthEndpoints<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: &'a str,
}

impl OAuthEndpoints<'_> {
    fn client(&self) -> Result<BasicClient, AuthError> {
        let auth_url = AuthUrl::new(self.auth_url.clone())?;
        let token_url = TokenUrl::new(self.token_url.clone())?;
        let redirect_url = RedirectUrl::new(self.redirect_url.to_string())?;

        Ok(BasicClient::new(
            ClientId::new(self.client_id.to_string()),
            Some(ClientSecret::new(self.client_secret.to_string())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url))
    }

    /// Authorization URL with PKCE and a random CSRF state
    pub fn start(
        &self,
        provider: ProviderKind,
        scopes: &[&str],
        link_uid: Option<u64>,
    ) -> Result<(String, OAuthTempState), AuthError> {
        let client = self.client()?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client.authorize_url(CsrfToken::new_random);
        for scope in scopes {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (auth_url, csrf_state) = request.set_pkce_challenge(pkce_challenge).url();

        let temp_state = OAuthTempState {
            provider,
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            link_uid,
            created_at: unix_now(),
        };

        Ok((auth_url.to_string(), temp_state))
    }

    /// Trade the authorization code for an access token
    pub async fn exchange(&self, code: &str, temp_state: &OAuthTempState) -> Result<String, AuthError> {
        let client = self.client()?;

        let token_result = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(temp_state.pkce_verifier.clone()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| {
                AuthError::OAuthError(format!("{} token exchange failed: {}", temp_state.provider, e))
            })?;

        Ok(token_result.access_token().secret().clone())
    }
}

/// Callback URL registered with the provider, e.g. `https://forum/auth/auth0/callback`
pub fn callback_url(base_url: &str, provider: ProviderKind) -> String {
    format!("{}/auth/{}/callback", base_url.trim_end_matches('/'), provider.slug())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(display_name: &str, email: Option<&str>) -> ExternalProfile {
        ExternalProfile {
            provider: ProviderKind::GitHub,
            id: "1234".to_string(),
            display_name: display_name.to_string(),
            email: email.map(str::to_string),
            picture: None,
        }
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let p = profile("  ", Some(" "));
        assert_eq!(p.email(), None);
        assert_eq!(p.username(), "1234");
    }

    #[test]
    fn test_username_prefers_display_name() {
        let p = profile("octocat", Some("octo@example.org"));
        assert_eq!(p.username(), "octocat");
        assert_eq!(p.email(), Some("octo@example.org"));
    }

    #[test]
    fn test_callback_url() {
        assert_eq!(
            callback_url("https://forum.example.org/", ProviderKind::Auth0),
            "https://forum.example.org/auth/auth0/callback"
        );
    }
}
