use serde::{Deserialize, Serialize};

/// Single sign-on configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Public base URL of the forum, used to build callback and deauth URLs
    #[serde(default = "default_url")]
    pub url: String,

    /// Path prefix the forum is mounted under (e.g. "/forum"), may be empty
    #[serde(default)]
    pub relative_path: String,

    /// Auth0 strategy settings
    #[serde(default)]
    pub auth0: Auth0Config,

    /// GitHub strategy settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Local user ids allowed to open the admin settings pages
    #[serde(default)]
    pub admin_uids: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth0Config {
    /// Auth0 tenant domain, e.g. "example.eu.auth0.com"
    #[serde(default)]
    pub domain: String,

    /// Login application credentials
    pub id: Option<String>,
    pub secret: Option<String>,

    /// Machine-to-machine credentials for the management API
    pub mgmt_id: Option<String>,
    pub mgmt_secret: Option<String>,

    /// Refuse to create new local accounts through this provider
    #[serde(default)]
    pub disable_registration: bool,

    /// Ordered role to group mappings applied on every login
    #[serde(default)]
    pub role2group: Vec<RoleGroupMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub id: Option<String>,
    pub secret: Option<String>,

    #[serde(default)]
    pub disable_registration: bool,
}

/// A provider role id and the local group its holders belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGroupMapping {
    // Lowercase aliases for config sources that fold key case
    #[serde(alias = "roleid")]
    pub role_id: String,
    #[serde(alias = "groupname")]
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session cookie name
    #[serde(default = "default_session_cookie_name")]
    pub cookie_name: String,

    /// Session timeout in seconds (default: 24 hours)
    #[serde(default = "default_session_timeout")]
    pub timeout_seconds: u64,

    /// Secure cookie (HTTPS only)
    #[serde(default)]
    pub secure: bool,

    /// Cookie encryption secret, at least 64 bytes. A random key is
    /// generated when absent, which logs everyone out on restart.
    pub secret: Option<String>,
}

fn default_url() -> String {
    "http://localhost:4567".to_string()
}

fn default_session_cookie_name() -> String {
    "forum_sso_session".to_string()
}

fn default_session_timeout() -> u64 {
    86400 // 24 hours
}

impl SsoConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn is_admin(&self, uid: u64) -> bool {
        self.admin_uids.contains(&uid)
    }

    /// Site-relative link to `path` when the forum is served below `relative_path`
    pub fn relative_url(&self, path: &str) -> String {
        format!("{}{}", self.relative_path.trim_end_matches('/'), path)
    }
}

impl Auth0Config {
    /// Tenant host name with any scheme or trailing slash removed
    pub fn domain_host(&self) -> &str {
        let domain = self.domain.trim();
        let domain = domain
            .strip_prefix("https://")
            .or_else(|| domain.strip_prefix("http://"))
            .unwrap_or(domain);
        domain.trim_end_matches('/')
    }

    pub fn has_login_credentials(&self) -> bool {
        non_empty(&self.id) && non_empty(&self.secret)
    }

    pub fn has_management_credentials(&self) -> bool {
        non_empty(&self.mgmt_id) && non_empty(&self.mgmt_secret)
    }
}

impl GitHubConfig {
    pub fn has_login_credentials(&self) -> bool {
        non_empty(&self.id) && non_empty(&self.secret)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            relative_path: String::new(),
            auth0: Auth0Config::default(),
            github: GitHubConfig::default(),
            session: SessionConfig::default(),
            admin_uids: vec![],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_session_cookie_name(),
            timeout_seconds: default_session_timeout(),
            secure: false,
            secret: None,
        }
    }
}
