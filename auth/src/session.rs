use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity providers a strategy can be registered for
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Auth0,
    GitHub,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Auth0, ProviderKind::GitHub];

    /// Lowercase name used in routes, storage keys and user fields
    pub fn slug(&self) -> &'static str {
        match self {
            ProviderKind::Auth0 => "auth0",
            ProviderKind::GitHub => "github",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Auth0 => "Auth0",
            ProviderKind::GitHub => "GitHub",
        }
    }

    /// User field holding the linked external id, e.g. "auth0id"
    pub fn user_field(&self) -> String {
        format!("{}id", self.slug())
    }

    /// Key-value object mapping external ids to local uids, e.g. "auth0id:uid"
    pub fn link_object_key(&self) -> String {
        format!("{}id:uid", self.slug())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auth0" => Ok(ProviderKind::Auth0),
            "github" => Ok(ProviderKind::GitHub),
            other => Err(other.to_string()),
        }
    }
}

/// Session data stored in the private cookie for logged-in users
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionData {
    /// Local user id
    pub uid: u64,

    /// Provider the user last signed in with
    pub provider: ProviderKind,

    /// Session creation timestamp (Unix timestamp)
    pub created_at: u64,
}

/// State held between the redirect to a provider and its callback
#[derive(Clone, Debug)]
pub struct OAuthTempState {
    pub provider: ProviderKind,

    /// CSRF token sent as the `state` parameter
    pub csrf_state: String,

    /// PKCE verifier, consumed by the token exchange
    pub pkce_verifier: String,

    /// Set when an already logged-in user is linking this provider
    pub link_uid: Option<u64>,

    pub created_at: u64,
}

/// Lifetime of an `OAuthTempState` in seconds
pub const OAUTH_STATE_TTL_SECONDS: u64 = 600;

impl SessionData {
    pub fn new(uid: u64, provider: ProviderKind) -> Self {
        Self {
            uid,
            provider,
            created_at: unix_now(),
        }
    }

    pub fn is_expired(&self, timeout_seconds: u64) -> bool {
        unix_now().saturating_sub(self.created_at) > timeout_seconds
    }
}

impl OAuthTempState {
    pub fn is_expired(&self) -> bool {
        unix_now().saturating_sub(self.created_at) > OAUTH_STATE_TTL_SECONDS
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_keys() {
        assert_eq!(ProviderKind::Auth0.user_field(), "auth0id");
        assert_eq!(ProviderKind::GitHub.link_object_key(), "githubid:uid");
        assert_eq!("GitHub".parse::<ProviderKind>(), Ok(ProviderKind::GitHub));
        assert!("gitlab".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_session_expiry() {
        let mut session = SessionData::new(7, ProviderKind::Auth0);
        assert!(!session.is_expired(60));

        session.created_at -= 120;
        assert!(session.is_expired(60));
    }
}
