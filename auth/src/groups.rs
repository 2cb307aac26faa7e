//! Reconciles local group membership with provider-side roles.
//!
//! Every configured mapping is either joined (the user holds the role) or
//! left (the user does not). Sync is best-effort: failures are logged and
//! never surface to the login flow.

use std::sync::Arc;

use crate::config::RoleGroupMapping;
use crate::error::AuthError;
use crate::host::GroupDirectory;
use crate::management::RoleDirectory;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct GroupChanges {
    pub to_join: Vec<String>,
    pub to_leave: Vec<String>,
}

/// Split mapped groups by whether the user holds the mapping's role
pub fn partition(mappings: &[RoleGroupMapping], roles: &[String]) -> GroupChanges {
    mappings
        .iter()
        .fold(GroupChanges::default(), |mut changes, mapping| {
            if roles.contains(&mapping.role_id) {
                changes.to_join.push(mapping.group_name.clone());
            } else {
                changes.to_leave.push(mapping.group_name.clone());
            }
            changes
        })
}

#[derive(Clone)]
pub struct GroupSynchronizer {
    mappings: Arc<Vec<RoleGroupMapping>>,
    roles: Arc<dyn RoleDirectory>,
    groups: Arc<dyn GroupDirectory>,
}

impl GroupSynchronizer {
    pub fn new(
        mappings: Vec<RoleGroupMapping>,
        roles: Arc<dyn RoleDirectory>,
        groups: Arc<dyn GroupDirectory>,
    ) -> Self {
        Self {
            mappings: Arc::new(mappings),
            roles,
            groups,
        }
    }

    /// Apply role mappings for a user; returns the changes made, if any
    pub async fn sync(&self, remote_id: &str, uid: u64) -> Option<GroupChanges> {
        match self.try_sync(remote_id, uid).await {
            Ok(changes) => changes,
            Err(e) => {
                tracing::warn!(uid, remote_id, "Group synchronization failed: {}", e);
                None
            }
        }
    }

    /// Run `sync` on the runtime without waiting for it
    pub fn sync_in_background(&self, remote_id: String, uid: u64) {
        let synchronizer = self.clone();
        tokio::spawn(async move {
            synchronizer.sync(&remote_id, uid).await;
        });
    }

    async fn try_sync(&self, remote_id: &str, uid: u64) -> Result<Option<GroupChanges>, AuthError> {
        if self.mappings.is_empty() {
            return Ok(None);
        }

        let Some(roles) = self.roles.user_roles(remote_id).await? else {
            tracing::debug!(uid, "Role directory unavailable, skipping group sync");
            return Ok(None);
        };

        let changes = partition(&self.mappings, &roles);
        if !changes.to_leave.is_empty() {
            tracing::debug!(uid, count = changes.to_leave.len(), "Leaving mapped user groups");
        }
        self.groups.leave(&changes.to_leave, uid).await?;
        self.groups.join(&changes.to_join, uid).await?;
        tracing::debug!(uid, count = changes.to_join.len(), "Joining mapped user groups");

        Ok(Some(changes))
    }
}
