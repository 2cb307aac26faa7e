//! Forum services the single sign-on layer depends on.
//!
//! The forum owns users, groups and its key-value database. These traits
//! describe the slice of those services this crate calls into, so the
//! account resolver and group synchronizer can run against the real forum
//! storage or against [`MemoryHost`] in tests.

mod memory;

pub use memory::MemoryHost;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::AuthError;

/// Groups every forum has that are never offered for role mapping
pub const SYSTEM_GROUPS: [&str; 4] = [
    "registered-users",
    "verified-users",
    "unverified-users",
    "banned-users",
];

/// Returns true for built-in membership groups and category privilege groups
pub fn is_system_group(name: &str) -> bool {
    SYSTEM_GROUPS.contains(&name) || (name.starts_with("cid:") && name.contains(":privileges:"))
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create a local account and return its uid
    async fn create_user(&self, username: &str) -> Result<u64, AuthError>;

    async fn get_user_field(&self, uid: u64, field: &str) -> Result<Option<String>, AuthError>;

    async fn set_user_field(&self, uid: u64, field: &str, value: &str) -> Result<(), AuthError>;

    async fn set_user_fields(
        &self,
        uid: u64,
        fields: &HashMap<String, String>,
    ) -> Result<(), AuthError>;

    async fn delete_user_field(&self, uid: u64, field: &str) -> Result<(), AuthError>;

    async fn get_uid_by_email(&self, email: &str) -> Result<Option<u64>, AuthError>;

    /// Mark the user's current email address as confirmed
    async fn confirm_email(&self, uid: u64) -> Result<(), AuthError>;
}

/// Hash-style objects in the forum's key-value database
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object_field(&self, key: &str, field: &str) -> Result<Option<String>, AuthError>;

    async fn set_object_field(&self, key: &str, field: &str, value: &str)
        -> Result<(), AuthError>;

    async fn delete_object_field(&self, key: &str, field: &str) -> Result<(), AuthError>;
}

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn join(&self, groups: &[String], uid: u64) -> Result<(), AuthError>;

    async fn leave(&self, groups: &[String], uid: u64) -> Result<(), AuthError>;

    /// All group names, oldest first
    async fn list_groups(&self) -> Result<Vec<String>, AuthError>;

    async fn members(&self, group: &str) -> Result<Vec<u64>, AuthError>;
}
