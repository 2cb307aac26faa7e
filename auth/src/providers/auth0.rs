use async_trait::async_trait;
use serde::Deserialize;

use super::{callback_url, ExternalProfile, OAuthEndpoints, OAuthProvider};
use crate::config::Auth0Config;
use crate::error::AuthError;
use crate::session::{OAuthTempState, ProviderKind};

const SCOPES: &[&str] = &["openid", "email", "profile"];

/// OpenID Connect userinfo response
#[derive(Debug, Deserialize)]
struct Auth0UserInfo {
    sub: String,
    nickname: Option<String>,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

impl From<Auth0UserInfo> for ExternalProfile {
    fn from(info: Auth0UserInfo) -> Self {
        let display_name = info
            .nickname
            .filter(|n| !n.is_empty())
            .or(info.name)
            .unwrap_or_default();

        ExternalProfile {
            provider: ProviderKind::Auth0,
            id: info.sub,
            display_name,
            email: info.email,
            picture: info.picture,
        }
    }
}

pub struct Auth0Provider {
    domain: String,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    http: reqwest::Client,
}

impl Auth0Provider {
    pub fn new(config: &Auth0Config, base_url: &str) -> Result<Self, AuthError> {
        let client_id = config
            .id
            .clone()
            .ok_or_else(|| AuthError::ConfigError("Auth0 client id not configured".to_string()))?;
        let client_secret = config
            .secret
            .clone()
            .ok_or_else(|| AuthError::ConfigError("Auth0 client secret not configured".to_string()))?;
        let domain = config.domain_host().to_string();
        if domain.is_empty() {
            return Err(AuthError::ConfigError("Auth0 domain not configured".to_string()));
        }

        Ok(Self {
            domain,
            client_id,
            client_secret,
            redirect_url: callback_url(base_url, ProviderKind::Auth0),
            http: reqwest::Client::new(),
        })
    }

    fn endpoints(&self) -> OAuthEndpoints<'_> {
        OAuthEndpoints {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            auth_url: format!("https://{}/authorize", self.domain),
            token_url: format!("https://{}/oauth/token", self.domain),
            redirect_url: &self.redirect_url,
        }
    }
}

#[async_trait]
impl OAuthProvider for Auth0Provider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Auth0
    }

    fn scopes(&self) -> &'static [&'static str] {
        SCOPES
    }

    fn start_auth(&self, link_uid: Option<u64>) -> Result<(String, OAuthTempState), AuthError> {
        self.endpoints().start(ProviderKind::Auth0, SCOPES, link_uid)
    }

    async fn complete_auth(
        &self,
        code: &str,
        temp_state: &OAuthTempState,
    ) -> Result<ExternalProfile, AuthError> {
        let access_token = self.endpoints().exchange(code, temp_state).await?;

        let user_info = self
            .http
            .get(format!("https://{}/userinfo", self.domain))
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<Auth0UserInfo>()
            .await?;

        Ok(user_info.into())
    }
}
