//! External identity links: `(provider, external id) -> local uid`.
//!
//! A link lives in two places, the `<provider>id:uid` object (external id to
//! uid) and the `<provider>id` field on the user record (uid to external id).
//! Both are written together and removed together.

use std::sync::Arc;

use crate::error::AuthError;
use crate::host::{ObjectStore, UserDirectory};
use crate::session::ProviderKind;

#[derive(Clone)]
pub struct IdentityLinks {
    provider: ProviderKind,
    users: Arc<dyn UserDirectory>,
    objects: Arc<dyn ObjectStore>,
}

impl IdentityLinks {
    pub fn new(
        provider: ProviderKind,
        users: Arc<dyn UserDirectory>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            provider,
            users,
            objects,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Local uid linked to an external id
    pub async fn uid_for(&self, external_id: &str) -> Result<Option<u64>, AuthError> {
        let value = self
            .objects
            .get_object_field(&self.provider.link_object_key(), external_id)
            .await?;

        match value {
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|_| AuthError::HostError(format!("corrupt uid link value: {}", raw))),
            None => Ok(None),
        }
    }

    /// External id linked to a local uid
    pub async fn external_id_for(&self, uid: u64) -> Result<Option<String>, AuthError> {
        let value = self.users.get_user_field(uid, &self.provider.user_field()).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    pub async fn link(&self, uid: u64, external_id: &str) -> Result<(), AuthError> {
        if let Some(previous) = self.external_id_for(uid).await? {
            if previous != external_id {
                self.objects
                    .delete_object_field(&self.provider.link_object_key(), &previous)
                    .await?;
            }
        }

        self.users
            .set_user_field(uid, &self.provider.user_field(), external_id)
            .await?;
        self.objects
            .set_object_field(&self.provider.link_object_key(), external_id, &uid.to_string())
            .await?;
        tracing::debug!(provider = %self.provider, uid, external_id, "Linked external identity");
        Ok(())
    }

    /// Remove the user's link, returning the external id it pointed to
    pub async fn unlink(&self, uid: u64) -> Result<Option<String>, AuthError> {
        let Some(external_id) = self.external_id_for(uid).await? else {
            return Ok(None);
        };

        self.objects
            .delete_object_field(&self.provider.link_object_key(), &external_id)
            .await?;
        self.users
            .delete_user_field(uid, &self.provider.user_field())
            .await?;
        tracing::info!(provider = %self.provider, uid, "Removed external identity link");
        Ok(Some(external_id))
    }
}
