//! Maps a verified external profile to a local account.
//!
//! Order of preference: an existing link for the external id, then a local
//! account with the same email address, then a freshly created account.
//! Account creation is refused when registration through the provider is
//! disabled.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AuthError;
use crate::host::UserDirectory;
use crate::identity::IdentityLinks;
use crate::providers::ExternalProfile;

#[derive(Clone)]
pub struct AccountResolver {
    links: IdentityLinks,
    users: Arc<dyn UserDirectory>,
    registration_disabled: bool,
}

impl AccountResolver {
    pub fn new(
        links: IdentityLinks,
        users: Arc<dyn UserDirectory>,
        registration_disabled: bool,
    ) -> Self {
        Self {
            links,
            users,
            registration_disabled,
        }
    }

    pub fn links(&self) -> &IdentityLinks {
        &self.links
    }

    /// Resolve the local uid for a profile, linking or creating as needed
    pub async fn login(&self, profile: &ExternalProfile) -> Result<u64, AuthError> {
        if let Some(uid) = self.links.uid_for(&profile.id).await? {
            tracing::debug!(provider = %profile.provider, uid, "Existing linked account");
            return Ok(uid);
        }

        let email = profile.email().map(str::to_string);

        let matched = match &email {
            Some(email) => self.users.get_uid_by_email(email).await?,
            None => None,
        };

        let uid = match matched {
            Some(uid) => {
                tracing::info!(provider = %profile.provider, uid, "Merging into account with matching email");
                uid
            }
            None => {
                if self.registration_disabled {
                    tracing::warn!(
                        provider = %profile.provider,
                        external_id = %profile.id,
                        "Refusing to create account, registration via SSO is disabled"
                    );
                    return Err(AuthError::RegistrationDisabled(profile.provider));
                }
                let uid = self.users.create_user(profile.username()).await?;
                tracing::info!(provider = %profile.provider, uid, "Created account for new SSO user");
                uid
            }
        };

        if let Some(email) = &email {
            self.users.set_user_field(uid, "email", email).await?;
            self.users.confirm_email(uid).await?;
        }

        if let Some(picture) = profile.picture.as_deref().filter(|p| !p.is_empty()) {
            let fields = HashMap::from([
                ("picture".to_string(), picture.to_string()),
                ("uploadedpicture".to_string(), picture.to_string()),
            ]);
            self.users.set_user_fields(uid, &fields).await?;
        }

        self.links.link(uid, &profile.id).await?;
        Ok(uid)
    }

    /// Attach the profile to an already signed-in user
    ///
    /// An external id already linked to a different account is left alone.
    pub async fn link_existing(&self, uid: u64, profile: &ExternalProfile) -> Result<(), AuthError> {
        match self.links.uid_for(&profile.id).await? {
            Some(owner) if owner == uid => Ok(()),
            Some(owner) => {
                tracing::warn!(
                    provider = %profile.provider,
                    uid,
                    owner,
                    "External identity is already linked to another account"
                );
                Err(AuthError::AccessDenied)
            }
            None => self.links.link(uid, &profile.id).await,
        }
    }
}
