use serde::Serialize;
use std::sync::Arc;

use crate::config::SsoConfig;
use crate::error::AuthError;
use crate::providers::{Auth0Provider, GitHubProvider, OAuthProvider};
use crate::session::ProviderKind;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StrategyLabels {
    pub login: String,
    pub register: String,
}

/// Login method as listed on the login page and the strategies API
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDescriptor {
    pub name: &'static str,
    pub url: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    pub icon: &'static str,
    pub color: &'static str,
    pub scope: String,
    pub labels: StrategyLabels,
}

/// Whether a user has linked a provider, with the URL to change that
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub associated: bool,
    pub name: &'static str,
    pub icon: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deauth_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AdminMenuItem {
    pub route: String,
    pub icon: &'static str,
    pub name: &'static str,
}

fn icon(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Auth0 => "fa-star",
        ProviderKind::GitHub => "fa-github",
    }
}

fn color(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Auth0 => "#eb5424",
        ProviderKind::GitHub => "#24292e",
    }
}

/// The strategies registered at startup
pub struct StrategyRegistry {
    base_url: String,
    providers: Vec<Arc<dyn OAuthProvider>>,
}

impl StrategyRegistry {
    /// Register every provider that has a client id and secret.
    /// Providers without credentials are skipped.
    pub fn register(config: &SsoConfig) -> Result<Self, AuthError> {
        let base_url = config.base_url();
        let mut providers: Vec<Arc<dyn OAuthProvider>> = Vec::new();

        if config.auth0.has_login_credentials() {
            providers.push(Arc::new(Auth0Provider::new(&config.auth0, base_url)?));
        } else {
            tracing::info!("Auth0 credentials not configured, strategy not registered");
        }

        if config.github.has_login_credentials() {
            providers.push(Arc::new(GitHubProvider::new(&config.github, base_url)?));
        } else {
            tracing::info!("GitHub credentials not configured, strategy not registered");
        }

        Ok(Self::from_providers(base_url, providers))
    }

    pub fn from_providers(base_url: &str, providers: Vec<Arc<dyn OAuthProvider>>) -> Self {
        for provider in &providers {
            tracing::info!("Registered {} login strategy", provider.kind());
        }
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            providers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn OAuthProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.providers.iter().map(|p| p.kind())
    }

    pub fn descriptors(&self) -> Vec<StrategyDescriptor> {
        self.providers
            .iter()
            .map(|provider| {
                let kind = provider.kind();
                StrategyDescriptor {
                    name: kind.slug(),
                    url: format!("/auth/{}", kind.slug()),
                    callback_url: format!("/auth/{}/callback", kind.slug()),
                    icon: icon(kind),
                    color: color(kind),
                    scope: provider.scopes().join(" "),
                    labels: StrategyLabels {
                        login: format!("Sign in with {}", kind.display_name()),
                        register: format!("Sign up with {}", kind.display_name()),
                    },
                }
            })
            .collect()
    }

    pub fn association(&self, kind: ProviderKind, associated: bool) -> Association {
        if associated {
            Association {
                associated: true,
                name: kind.display_name(),
                icon: icon(kind),
                url: None,
                deauth_url: Some(format!("{}/deauth/{}", self.base_url, kind.slug())),
            }
        } else {
            Association {
                associated: false,
                name: kind.display_name(),
                icon: icon(kind),
                url: Some(format!("{}/auth/{}", self.base_url, kind.slug())),
                deauth_url: None,
            }
        }
    }

    /// User fields that may be exposed on public user objects
    pub fn user_hash_whitelist(&self) -> Vec<String> {
        self.kinds().map(|kind| kind.user_field()).collect()
    }

    pub fn admin_menu(&self) -> Vec<AdminMenuItem> {
        self.kinds()
            .map(|kind| AdminMenuItem {
                route: format!("/plugins/sso-{}", kind.slug()),
                icon: icon(kind),
                name: kind.display_name(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Auth0Config, GitHubConfig};

    fn config_with_github_only() -> SsoConfig {
        SsoConfig {
            url: "https://forum.example.org".to_string(),
            auth0: Auth0Config {
                domain: "tenant.auth0.com".to_string(),
                id: Some("client".to_string()),
                secret: None,
                ..Auth0Config::default()
            },
            github: GitHubConfig {
                id: Some("gh".to_string()),
                secret: Some("gh-secret".to_string()),
                disable_registration: false,
            },
            ..SsoConfig::default()
        }
    }

    #[test]
    fn test_providers_without_credentials_are_skipped() {
        let registry = StrategyRegistry::register(&config_with_github_only()).unwrap();

        assert!(registry.get(ProviderKind::Auth0).is_none());
        assert!(registry.get(ProviderKind::GitHub).is_some());
        assert_eq!(registry.user_hash_whitelist(), vec!["githubid"]);
    }

    #[test]
    fn test_no_credentials_registers_nothing() {
        let registry = StrategyRegistry::register(&SsoConfig::default()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.descriptors().is_empty());
    }

    #[test]
    fn test_descriptor_fields() {
        let registry = StrategyRegistry::register(&config_with_github_only()).unwrap();
        let descriptors = registry.descriptors();

        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].url, "/auth/github");
        assert_eq!(descriptors[0].callback_url, "/auth/github/callback");
        assert_eq!(descriptors[0].scope, "read:user user:email");
        assert_eq!(descriptors[0].labels.login, "Sign in with GitHub");

        let json = serde_json::to_value(&descriptors[0]).unwrap();
        assert_eq!(json["callbackURL"], "/auth/github/callback");
    }

    #[test]
    fn test_association_urls() {
        let registry = StrategyRegistry::register(&config_with_github_only()).unwrap();

        let linked = registry.association(ProviderKind::GitHub, true);
        assert_eq!(linked.deauth_url.as_deref(), Some("https://forum.example.org/deauth/github"));
        assert_eq!(linked.url, None);

        let unlinked = registry.association(ProviderKind::GitHub, false);
        assert_eq!(unlinked.url.as_deref(), Some("https://forum.example.org/auth/github"));
    }

    #[test]
    fn test_admin_menu() {
        let registry = StrategyRegistry::register(&config_with_github_only()).unwrap();
        assert_eq!(
            registry.admin_menu(),
            vec![AdminMenuItem {
                route: "/plugins/sso-github".to_string(),
                icon: "fa-github",
                name: "GitHub",
            }]
        );
    }
}
