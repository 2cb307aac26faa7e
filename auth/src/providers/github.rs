use async_trait::async_trait;
use serde::Deserialize;

use super::{callback_url, ExternalProfile, OAuthEndpoints, OAuthProvider};
use crate::config::GitHubConfig;
use crate::error::AuthError;
use crate::session::{OAuthTempState, ProviderKind};

const SCOPES: &[&str] = &["read:user", "user:email"];
const USER_AGENT: &str = "forum-sso";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GitHubUser {
    fn into_profile(self, email: Option<String>) -> ExternalProfile {
        ExternalProfile {
            provider: ProviderKind::GitHub,
            id: self.id.to_string(),
            display_name: self.login,
            email: self.email.filter(|e| !e.is_empty()).or(email),
            picture: self.avatar_url,
        }
    }
}

/// The primary address, if GitHub has verified it
fn primary_verified(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

pub struct GitHubProvider {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    http: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(config: &GitHubConfig, base_url: &str) -> Result<Self, AuthError> {
        let client_id = config
            .id
            .clone()
            .ok_or_else(|| AuthError::ConfigError("GitHub client id not configured".to_string()))?;
        let client_secret = config
            .secret
            .clone()
            .ok_or_else(|| AuthError::ConfigError("GitHub client secret not configured".to_string()))?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_url: callback_url(base_url, ProviderKind::GitHub),
            http: reqwest::Client::new(),
        })
    }

    fn endpoints(&self) -> OAuthEndpoints<'_> {
        OAuthEndpoints {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            auth_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            redirect_url: &self.redirect_url,
        }
    }

    async fn fetch_primary_email(&self, access_token: &str) -> Result<Option<String>, AuthError> {
        let emails = self
            .http
            .get("https://api.github.com/user/emails")
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<GitHubEmail>>()
            .await?;

        Ok(primary_verified(emails))
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn scopes(&self) -> &'static [&'static str] {
        SCOPES
    }

    fn start_auth(&self, link_uid: Option<u64>) -> Result<(String, OAuthTempState), AuthError> {
        self.endpoints().start(ProviderKind::GitHub, SCOPES, link_uid)
    }

    async fn complete_auth(
        &self,
        code: &str,
        temp_state: &OAuthTempState,
    ) -> Result<ExternalProfile, AuthError> {
        let access_token = self.endpoints().exchange(code, temp_state).await?;

        let user = self
            .http
            .get("https://api.github.com/user")
            .bearer_auth(&access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json::<GitHubUser>()
            .await?;

        // Users with a private email only expose it through /user/emails
        let email = if user.email.as_deref().is_some_and(|e| !e.is_empty()) {
            None
        } else {
            match self.fetch_primary_email(&access_token).await {
                Ok(email) => email,
                Err(e) => {
                    tracing::warn!("Unable to read GitHub email addresses: {}", e);
                    None
                }
            }
        };

        Ok(user.into_profile(email))
    }
}
