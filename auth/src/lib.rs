//! Forum single sign-on
//!
//! Lets forum users sign in through third-party OAuth identity providers
//! (Auth0, GitHub) and maps each external identity to a local account.
//!
//! # Features
//!
//! - OAuth2 authorization code flow with PKCE for every configured provider
//! - Account resolution: existing link, then email match, then a new account
//!   (unless registration through the provider is disabled)
//! - Auth0 role to forum group synchronization through the management API
//! - Deauthorization, account association listing and admin settings pages
//! - Host services (users, groups, key-value objects) behind async traits
//!
//! # Example
//!
//! ```no_run
//! use forum_sso_auth::{sso_routes, MemoryHost, SsoConfig, SsoService, SsoState};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let host = Arc::new(MemoryHost::new());
//!     let service = Arc::new(SsoService::new(SsoConfig::default(), host).unwrap());
//!     let app: axum::Router = sso_routes(SsoState::new(service));
//!     // Serve `app` with axum
//! }
//! ```

pub mod config;
pub mod error;
pub mod groups;
pub mod host;
pub mod identity;
pub mod management;
pub mod middleware;
pub mod providers;
pub mod resolver;
pub mod routes;
pub mod service;
pub mod session;
pub mod strategy;
pub mod views;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use std::ops::Deref;
use std::sync::Arc;

// Re-export commonly used types
pub use config::{RoleGroupMapping, SsoConfig};
pub use error::AuthError;
pub use host::{GroupDirectory, MemoryHost, ObjectStore, UserDirectory};
pub use middleware::{optional_user, require_admin, require_user};
pub use providers::ExternalProfile;
pub use routes::sso_routes;
pub use service::SsoService;
pub use session::{ProviderKind, SessionData};

/// State wrapper for SsoService that implements FromRef for Key
/// This allows PrivateCookieJar to extract the cookie key from state
#[derive(Clone)]
pub struct SsoState {
    inner: Arc<SsoService>,
}

impl SsoState {
    pub fn new(service: Arc<SsoService>) -> Self {
        Self { inner: service }
    }
}

impl Deref for SsoState {
    type Target = SsoService;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<Arc<SsoService>> for SsoState {
    fn from(service: Arc<SsoService>) -> Self {
        Self::new(service)
    }
}

/// Implement FromRef to allow PrivateCookieJar to extract Key from SsoState
impl FromRef<SsoState> for Key {
    fn from_ref(state: &SsoState) -> Self {
        state.cookie_key()
    }
}
