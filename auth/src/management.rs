//! Auth0 management API access: a cached client-credentials bearer token
//! and the user role listing used for group synchronization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use url::Url;

use crate::config::Auth0Config;
use crate::error::AuthError;

/// Source of provider-side role assignments
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Role ids held by a remote user, or `None` when the directory cannot be queried
    async fn user_roles(&self, remote_id: &str) -> Result<Option<Vec<String>>, AuthError>;
}

#[derive(Clone, Debug)]
pub struct ManagementToken {
    pub token: String,
    pub expires_at: Instant,
}

/// Process-wide management token.
///
/// The lock only guards the slot itself and is never held while a refresh is
/// in flight, so concurrent callers may each fetch a token. The last one
/// stored wins.
#[derive(Default)]
pub struct ManagementTokenCache {
    slot: RwLock<Option<ManagementToken>>,
}

impl ManagementTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, unless it has expired
    pub fn current(&self) -> Option<String> {
        let slot = self.slot.read().ok()?;
        slot.as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.token.clone())
    }

    /// Cache a token for `expires_in`; a lifetime past the clock's range is not cached
    pub fn store(&self, token: String, expires_in: Duration) {
        let Some(expires_at) = Instant::now().checked_add(expires_in) else {
            tracing::warn!("Management token lifetime out of range, not caching it");
            return;
        };
        self.store_token(ManagementToken { token, expires_at });
    }

    pub fn store_token(&self, token: ManagementToken) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(token);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize, Default)]
struct ApiError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct Auth0Role {
    id: String,
}

pub struct Auth0Management {
    domain: String,
    /// Scheme and host requests are sent to, `https://{domain}` outside tests
    api_base: String,
    mgmt_id: Option<String>,
    mgmt_secret: Option<String>,
    cache: Arc<ManagementTokenCache>,
    http: reqwest::Client,
}

impl Auth0Management {
    pub fn new(config: &Auth0Config, cache: Arc<ManagementTokenCache>) -> Self {
        let api_base = format!("https://{}", config.domain_host());
        Self::with_base_url(config, cache, &api_base)
    }

    /// Send requests to `api_base` instead of the tenant domain
    pub fn with_base_url(
        config: &Auth0Config,
        cache: Arc<ManagementTokenCache>,
        api_base: &str,
    ) -> Self {
        let (mgmt_id, mgmt_secret) = if config.has_management_credentials() {
            (config.mgmt_id.clone(), config.mgmt_secret.clone())
        } else {
            (None, None)
        };

        Self {
            domain: config.domain_host().to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            mgmt_id,
            mgmt_secret,
            cache,
            http: reqwest::Client::new(),
        }
    }

    /// A valid bearer token, fetching a new one when the cached token has expired.
    /// Returns `None` when management credentials are missing or Auth0 refuses them.
    pub async fn token(&self) -> Result<Option<String>, AuthError> {
        if let Some(token) = self.cache.current() {
            return Ok(Some(token));
        }

        let (Some(client_id), Some(client_secret)) = (&self.mgmt_id, &self.mgmt_secret) else {
            return Ok(None);
        };

        let request = TokenRequest {
            grant_type: "client_credentials",
            client_id,
            client_secret,
            audience: format!("https://{}/api/v2/", self.domain),
        };

        let response = self
            .http
            .post(format!("{}/oauth/token", self.api_base))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let body: ApiError = response.json().await.unwrap_or_default();
            tracing::warn!(
                "Unable to retrieve management token: {}",
                body.error.as_deref().unwrap_or("unknown error")
            );
            return Ok(None);
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!("Retrieved new management bearer token");
        self.cache
            .store(token.access_token.clone(), Duration::from_secs(token.expires_in));
        Ok(Some(token.access_token))
    }

    /// `https://{domain}/api/v2/users/{id}/roles`, the id kept as a single path segment
    pub fn roles_url(&self, remote_id: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&format!("{}/api/v2/users", self.api_base))?;
        url.path_segments_mut()
            .map_err(|_| AuthError::ConfigError(format!("invalid Auth0 domain: {}", self.domain)))?
            .push(remote_id)
            .push("roles");
        Ok(url)
    }
}

#[async_trait]
impl RoleDirectory for Auth0Management {
    async fn user_roles(&self, remote_id: &str) -> Result<Option<Vec<String>>, AuthError> {
        let Some(token) = self.token().await? else {
            return Ok(None);
        };

        let response = self
            .http
            .get(self.roles_url(remote_id)?)
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Revoked before its expiry; fetch a fresh one next time
            self.cache.clear();
        }

        if !response.status().is_success() {
            let body: ApiError = response.json().await.unwrap_or_default();
            tracing::warn!("Unable to retrieve user roles; error follows.");
            tracing::error!("{}", body.message.as_deref().unwrap_or("unknown error"));
            return Ok(None);
        }

        let roles: Vec<Auth0Role> = response.json().await?;
        tracing::debug!(remote_id, "Found {} roles", roles.len());
        Ok(Some(roles.into_iter().map(|r| r.id).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> Auth0Config {
        Auth0Config {
            domain: "tenant.auth0.com".to_string(),
            ..Auth0Config::default()
        }
    }

    #[test]
    fn test_cache_returns_fresh_token() {
        let cache = ManagementTokenCache::new();
        assert_eq!(cache.current(), None);

        cache.store("tok".to_string(), Duration::from_secs(60));
        assert_eq!(cache.current().as_deref(), Some("tok"));

        cache.clear();
        assert_eq!(cache.current(), None);
    }

    #[test]
    fn test_cache_ignores_expired_token() {
        let cache = ManagementTokenCache::new();
        cache.store_token(ManagementToken {
            token: "stale".to_string(),
            expires_at: Instant::now(),
        });
        assert_eq!(cache.current(), None);
    }

    #[tokio::test]
    async fn test_token_uses_cache_before_credentials() {
        let cache = Arc::new(ManagementTokenCache::new());
        cache.store("cached".to_string(), Duration::from_secs(60));
        let management = Auth0Management::new(&config(), cache);

        assert_eq!(management.token().await.unwrap().as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_missing_credentials_yield_no_token() {
        let management = Auth0Management::new(&config(), Arc::new(ManagementTokenCache::new()));

        assert_eq!(management.token().await.unwrap(), None);
        assert_eq!(management.user_roles("auth0|1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_management_secret_sends_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = Auth0Config {
            mgmt_secret: Some("   ".to_string()),
            ..credentialed_config()
        };
        let management =
            Auth0Management::with_base_url(&config, Arc::new(ManagementTokenCache::new()), &server.uri());

        assert_eq!(management.token().await.unwrap(), None);
    }

    #[test]
    fn test_roles_url_keeps_remote_id_in_one_segment() {
        let management = Auth0Management::new(&config(), Arc::new(ManagementTokenCache::new()));

        let url = management.roles_url("auth0|5f1c").unwrap();
        assert_eq!(url.as_str(), "https://tenant.auth0.com/api/v2/users/auth0|5f1c/roles");

        let url = management.roles_url("odd/id").unwrap();
        assert_eq!(url.as_str(), "https://tenant.auth0.com/api/v2/users/odd%2Fid/roles");
    }

    #[test]
    fn test_cache_skips_out_of_range_lifetime() {
        let cache = ManagementTokenCache::new();
        cache.store("forever".to_string(), Duration::from_secs(u64::MAX));
        assert_eq!(cache.current(), None);
    }

    fn credentialed_config() -> Auth0Config {
        Auth0Config {
            domain: "tenant.auth0.com".to_string(),
            mgmt_id: Some("m2m-client".to_string()),
            mgmt_secret: Some("m2m-secret".to_string()),
            ..Auth0Config::default()
        }
    }

    #[tokio::test]
    async fn test_token_uses_client_credentials_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_json(serde_json::json!({
                "grant_type": "client_credentials",
                "client_id": "m2m-client",
                "client_secret": "m2m-secret",
                "audience": "https://tenant.auth0.com/api/v2/",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mgmt-token",
                "expires_in": 86400,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(ManagementTokenCache::new());
        let management =
            Auth0Management::with_base_url(&credentialed_config(), cache.clone(), &server.uri());

        assert_eq!(management.token().await.unwrap().as_deref(), Some("mgmt-token"));
        // Served from the cache the second time
        assert_eq!(management.token().await.unwrap().as_deref(), Some("mgmt-token"));
        assert_eq!(cache.current().as_deref(), Some("mgmt-token"));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "short-lived",
                "expires_in": 0,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let management = Auth0Management::with_base_url(
            &credentialed_config(),
            Arc::new(ManagementTokenCache::new()),
            &server.uri(),
        );

        assert_eq!(management.token().await.unwrap().as_deref(), Some("short-lived"));
        assert_eq!(management.token().await.unwrap().as_deref(), Some("short-lived"));
    }

    #[tokio::test]
    async fn test_refused_token_request_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "access_denied",
                "error_description": "Unauthorized",
            })))
            .mount(&server)
            .await;

        let cache = Arc::new(ManagementTokenCache::new());
        let management =
            Auth0Management::with_base_url(&credentialed_config(), cache.clone(), &server.uri());

        assert_eq!(management.token().await.unwrap(), None);
        assert_eq!(management.user_roles("auth0-1").await.unwrap(), None);
        assert_eq!(cache.current(), None);
    }

    #[tokio::test]
    async fn test_user_roles_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/auth0-1/roles"))
            .and(header("authorization", "Bearer cached"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "rol_admin", "name": "Admin", "description": "" },
                { "id": "rol_staff", "name": "Staff", "description": "" },
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(ManagementTokenCache::new());
        cache.store("cached".to_string(), Duration::from_secs(60));
        let management =
            Auth0Management::with_base_url(&credentialed_config(), cache, &server.uri());

        let roles = management.user_roles("auth0-1").await.unwrap();
        assert_eq!(roles, Some(vec!["rol_admin".to_string(), "rol_staff".to_string()]));
    }

    #[tokio::test]
    async fn test_rejected_roles_request_yields_none_and_drops_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/auth0-1/roles"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "statusCode": 401,
                "error": "Unauthorized",
                "message": "Invalid token",
            })))
            .mount(&server)
            .await;

        let cache = Arc::new(ManagementTokenCache::new());
        cache.store("revoked".to_string(), Duration::from_secs(60));
        let management =
            Auth0Management::with_base_url(&credentialed_config(), cache.clone(), &server.uri());

        assert_eq!(management.user_roles("auth0-1").await.unwrap(), None);
        assert_eq!(cache.current(), None);
    }
}
