use axum_extra::extract::cookie::Key;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{RoleGroupMapping, SsoConfig};
use crate::error::AuthError;
use crate::groups::GroupSynchronizer;
use crate::host::{is_system_group, GroupDirectory, ObjectStore, UserDirectory};
use crate::identity::IdentityLinks;
use crate::management::{Auth0Management, ManagementTokenCache, RoleDirectory};
use crate::providers::{callback_url, ExternalProfile};
use crate::resolver::AccountResolver;
use crate::session::{OAuthTempState, ProviderKind, SessionData};
use crate::strategy::{Association, StrategyRegistry};

/// Data shown on a provider's admin settings page
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminView {
    pub title: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    /// Login application client id; the secret is never shown
    pub client_id: Option<String>,
    /// Groups that may be targeted by a role mapping
    pub group_names: Vec<String>,
    pub role2group: Vec<RoleGroupMapping>,
    pub registration_disabled: bool,
}

/// Main single sign-on service
pub struct SsoService {
    pub config: SsoConfig,
    strategies: StrategyRegistry,
    resolvers: HashMap<ProviderKind, AccountResolver>,
    group_sync: Option<GroupSynchronizer>,
    groups: Arc<dyn GroupDirectory>,
    oauth_states: Arc<RwLock<HashMap<String, OAuthTempState>>>,
    cookie_key: Key,
}

impl SsoService {
    pub fn new<H>(config: SsoConfig, host: Arc<H>) -> Result<Self, AuthError>
    where
        H: UserDirectory + ObjectStore + GroupDirectory + 'static,
    {
        let strategies = StrategyRegistry::register(&config)?;
        let roles: Arc<dyn RoleDirectory> = Arc::new(Auth0Management::new(
            &config.auth0,
            Arc::new(ManagementTokenCache::new()),
        ));
        Self::from_parts(config, strategies, host.clone(), host.clone(), host, Some(roles))
    }

    /// Assemble a service from explicit collaborators
    pub fn from_parts(
        config: SsoConfig,
        strategies: StrategyRegistry,
        users: Arc<dyn UserDirectory>,
        objects: Arc<dyn ObjectStore>,
        groups: Arc<dyn GroupDirectory>,
        roles: Option<Arc<dyn RoleDirectory>>,
    ) -> Result<Self, AuthError> {
        let cookie_key = match &config.session.secret {
            Some(secret) => Key::try_from(secret.as_bytes()).map_err(|e| {
                AuthError::ConfigError(format!("Invalid session secret: {}", e))
            })?,
            None => {
                tracing::warn!("No session secret configured, generating a random cookie key");
                Key::generate()
            }
        };

        let resolvers = strategies
            .kinds()
            .map(|kind| {
                let links = IdentityLinks::new(kind, users.clone(), objects.clone());
                let disabled = match kind {
                    ProviderKind::Auth0 => config.auth0.disable_registration,
                    ProviderKind::GitHub => config.github.disable_registration,
                };
                (kind, AccountResolver::new(links, users.clone(), disabled))
            })
            .collect();

        let group_sync = match roles {
            Some(roles) if strategies.get(ProviderKind::Auth0).is_some() => Some(
                GroupSynchronizer::new(config.auth0.role2group.clone(), roles, groups.clone()),
            ),
            _ => None,
        };

        Ok(Self {
            config,
            strategies,
            resolvers,
            group_sync,
            groups,
            oauth_states: Arc::new(RwLock::new(HashMap::new())),
            cookie_key,
        })
    }

    pub fn cookie_key(&self) -> Key {
        self.cookie_key.clone()
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn has_enabled_providers(&self) -> bool {
        !self.strategies.is_empty()
    }

    fn resolver(&self, kind: ProviderKind) -> Result<&AccountResolver, AuthError> {
        self.resolvers
            .get(&kind)
            .ok_or_else(|| AuthError::ProviderNotConfigured(kind.slug().to_string()))
    }

    /// Begin a login; returns the provider URL and the id of the stored temp state
    pub async fn start_auth(
        &self,
        kind: ProviderKind,
        link_uid: Option<u64>,
    ) -> Result<(String, String), AuthError> {
        let provider = self
            .strategies
            .get(kind)
            .ok_or_else(|| AuthError::ProviderNotConfigured(kind.slug().to_string()))?;
        let (auth_url, temp_state) = provider.start_auth(link_uid)?;

        let state_id = Uuid::new_v4().to_string();
        self.store_oauth_temp_state(state_id.clone(), temp_state).await;
        Ok((auth_url, state_id))
    }

    pub async fn store_oauth_temp_state(&self, state_id: String, temp_state: OAuthTempState) {
        let mut states = self.oauth_states.write().await;
        states.retain(|_, state| !state.is_expired());
        states.insert(state_id, temp_state);
    }

    /// Remove and return a pending OAuth state
    pub async fn take_oauth_temp_state(&self, state_id: &str) -> Option<OAuthTempState> {
        let mut states = self.oauth_states.write().await;
        states.remove(state_id).filter(|state| !state.is_expired())
    }

    /// Finish the provider callback and produce the session for the local user
    pub async fn complete_auth(
        &self,
        kind: ProviderKind,
        code: &str,
        returned_state: Option<&str>,
        temp_state: &OAuthTempState,
    ) -> Result<SessionData, AuthError> {
        if temp_state.provider != kind || returned_state != Some(temp_state.csrf_state.as_str()) {
            return Err(AuthError::StateMismatch);
        }

        let provider = self
            .strategies
            .get(kind)
            .ok_or_else(|| AuthError::ProviderNotConfigured(kind.slug().to_string()))?;
        let profile = provider.complete_auth(code, temp_state).await?;

        let uid = self.finish_login(&profile, temp_state.link_uid).await?;
        Ok(SessionData::new(uid, kind))
    }

    /// Resolve (or link) the local account for a verified profile and start group sync
    pub async fn finish_login(
        &self,
        profile: &ExternalProfile,
        link_uid: Option<u64>,
    ) -> Result<u64, AuthError> {
        let resolver = self.resolver(profile.provider)?;

        let uid = match link_uid {
            Some(uid) if uid > 0 => {
                resolver.link_existing(uid, profile).await?;
                uid
            }
            _ => resolver.login(profile).await?,
        };

        if profile.provider == ProviderKind::Auth0 {
            if let Some(group_sync) = &self.group_sync {
                group_sync.sync_in_background(profile.id.clone(), uid);
            }
        }

        Ok(uid)
    }

    /// Remove the user's link to a provider
    pub async fn deauthorize(&self, kind: ProviderKind, uid: u64) -> Result<Option<String>, AuthError> {
        let resolver = self.resolver(kind)?;
        resolver.links().unlink(uid).await.map_err(|e| {
            tracing::error!("Could not remove {} id data for uid {}. Error: {}", kind, uid, e);
            e
        })
    }

    /// Link state of every registered provider for a user
    pub async fn associations(&self, uid: u64) -> Result<Vec<Association>, AuthError> {
        let mut associations = Vec::new();
        for kind in self.strategies.kinds() {
            let linked = self.resolver(kind)?.links().external_id_for(uid).await?;
            associations.push(self.strategies.association(kind, linked.is_some()));
        }
        Ok(associations)
    }

    pub async fn admin_view(&self, kind: ProviderKind) -> Result<AdminView, AuthError> {
        let group_names = self
            .groups
            .list_groups()
            .await?
            .into_iter()
            .filter(|name| !is_system_group(name))
            .collect();

        let (client_id, role2group, registration_disabled) = match kind {
            ProviderKind::Auth0 => (
                self.config.auth0.id.clone(),
                self.config.auth0.role2group.clone(),
                self.config.auth0.disable_registration,
            ),
            ProviderKind::GitHub => (
                self.config.github.id.clone(),
                vec![],
                self.config.github.disable_registration,
            ),
        };

        Ok(AdminView {
            title: format!("SSO {}", kind.display_name()),
            callback_url: callback_url(self.config.base_url(), kind),
            client_id,
            group_names,
            role2group,
            registration_disabled,
        })
    }

    /// Check a session read from the cookie
    pub fn validate_session(&self, session: &SessionData) -> Result<(), AuthError> {
        if session.is_expired(self.config.session.timeout_seconds) {
            return Err(AuthError::SessionExpired);
        }
        Ok(())
    }

    pub fn is_admin(&self, uid: u64) -> bool {
        self.config.is_admin(uid)
    }

    /// Drop OAuth states that were never completed
    pub async fn cleanup_expired_states(&self) {
        let mut states = self.oauth_states.write().await;
        states.retain(|_, state| !state.is_expired());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedRoles(Vec<String>);

    #[async_trait]
    impl RoleDirectory for FixedRoles {
        async fn user_roles(&self, _remote_id: &str) -> Result<Option<Vec<String>>, AuthError> {
            Ok(Some(self.0.clone()))
        }
    }

    struct UnreachableRoles;

    #[async_trait]
    impl RoleDirectory for UnreachableRoles {
        async fn user_roles(&self, _remote_id: &str) -> Result<Option<Vec<String>>, AuthError> {
            Err(AuthError::HostError("management API unreachable".to_string()))
        }
    }

    fn profile(kind: ProviderKind, id: &str) -> ExternalProfile {
        ExternalProfile {
            provider: kind,
            id: id.to_string(),
            display_name: "jo".to_string(),
            email: Some("jo@example.org".to_string()),
            picture: None,
        }
    }

    fn github_config() -> SsoConfig {
        let mut config = SsoConfig::default();
        config.github.id = Some("gh".to_string());
        config.github.secret = Some("gh-secret".to_string());
        config
    }

    fn auth0_config() -> SsoConfig {
        let mut config = SsoConfig::default();
        config.auth0.domain = "tenant.auth0.com".to_string();
        config.auth0.id = Some("client".to_string());
        config.auth0.secret = Some("client-secret".to_string());
        config.auth0.role2group = vec![
            RoleGroupMapping {
                role_id: "rol_1".to_string(),
                group_name: "Staff".to_string(),
            },
            RoleGroupMapping {
                role_id: "rol_2".to_string(),
                group_name: "Editors".to_string(),
            },
        ];
        config
    }

    fn auth0_service(host: Arc<MemoryHost>, roles: Arc<dyn RoleDirectory>) -> SsoService {
        let config = auth0_config();
        let strategies = StrategyRegistry::register(&config).unwrap();
        SsoService::from_parts(config, strategies, host.clone(), host.clone(), host, Some(roles))
            .unwrap()
    }

    #[tokio::test]
    async fn test_auth0_login_syncs_groups_in_background() {
        let host = Arc::new(MemoryHost::new());
        let service = auth0_service(host.clone(), Arc::new(FixedRoles(vec!["rol_1".to_string()])));

        let uid = service
            .finish_login(&profile(ProviderKind::Auth0, "auth0|sync"), None)
            .await
            .unwrap();
        host.join(&["Editors".to_string()], uid).await.unwrap();

        // Editors is not among the roles, so the next sync takes the user out again
        service
            .finish_login(&profile(ProviderKind::Auth0, "auth0|sync"), None)
            .await
            .unwrap();

        let mut synced = false;
        for _ in 0..100 {
            let staff = host.members("Staff").await.unwrap();
            let editors = host.members("Editors").await.unwrap();
            if staff.contains(&uid) && !editors.contains(&uid) {
                synced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(synced, "uid {} was not moved into Staff and out of Editors", uid);
    }

    #[tokio::test]
    async fn test_auth0_login_survives_role_directory_failure() {
        let host = Arc::new(MemoryHost::new());
        let service = auth0_service(host.clone(), Arc::new(UnreachableRoles));

        let uid = service
            .finish_login(&profile(ProviderKind::Auth0, "auth0|down"), None)
            .await
            .unwrap();
        assert!(uid > 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(host.members("Staff").await.unwrap().is_empty());
        assert_eq!(
            host.get_user_field(uid, "auth0id").await.unwrap().as_deref(),
            Some("auth0|down")
        );
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_rejected() {
        let service = SsoService::new(github_config(), Arc::new(MemoryHost::new())).unwrap();

        let err = service.finish_login(&profile(ProviderKind::Auth0, "auth0|1"), None).await;
        assert!(matches!(err, Err(AuthError::ProviderNotConfigured(_))));
        assert!(matches!(
            service.start_auth(ProviderKind::Auth0, None).await,
            Err(AuthError::ProviderNotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_temp_state_is_single_use() {
        let service = SsoService::new(github_config(), Arc::new(MemoryHost::new())).unwrap();
        let (_, state_id) = service.start_auth(ProviderKind::GitHub, None).await.unwrap();

        assert!(service.take_oauth_temp_state(&state_id).await.is_some());
        assert!(service.take_oauth_temp_state(&state_id).await.is_none());
    }

    #[tokio::test]
    async fn test_csrf_mismatch_is_rejected() {
        let service = SsoService::new(github_config(), Arc::new(MemoryHost::new())).unwrap();
        let (_, state_id) = service.start_auth(ProviderKind::GitHub, None).await.unwrap();
        let temp_state = service.take_oauth_temp_state(&state_id).await.unwrap();

        let result = service
            .complete_auth(ProviderKind::GitHub, "code", Some("forged"), &temp_state)
            .await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));

        let result = service
            .complete_auth(ProviderKind::GitHub, "code", None, &temp_state)
            .await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_link_then_deauthorize() {
        let host = Arc::new(MemoryHost::new());
        let uid = host.create_user("jo").await.unwrap();
        let service = SsoService::new(github_config(), host.clone()).unwrap();

        let linked = service
            .finish_login(&profile(ProviderKind::GitHub, "77"), Some(uid))
            .await
            .unwrap();
        assert_eq!(linked, uid);
        assert!(service.associations(uid).await.unwrap()[0].associated);

        assert_eq!(service.deauthorize(ProviderKind::GitHub, uid).await.unwrap().as_deref(), Some("77"));
        assert!(!service.associations(uid).await.unwrap()[0].associated);
    }

    #[tokio::test]
    async fn test_admin_view_hides_system_groups() {
        let host = Arc::new(MemoryHost::new());
        host.create_group("registered-users").await;
        host.create_group("administrators").await;
        host.create_group("cid:1:privileges:find").await;
        host.create_group("Moderators").await;
        let service = SsoService::new(github_config(), host).unwrap();

        let view = service.admin_view(ProviderKind::GitHub).await.unwrap();
        assert_eq!(view.group_names, vec!["administrators", "Moderators"]);
        assert_eq!(view.callback_url, "http://localhost:4567/auth/github/callback");
        assert_eq!(view.title, "SSO GitHub");
    }

    #[test]
    fn test_short_session_secret_is_rejected() {
        let mut config = github_config();
        config.session.secret = Some("too short".to_string());

        let result = SsoService::new(config, Arc::new(MemoryHost::new()));
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }
}
