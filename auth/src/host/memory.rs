use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{GroupDirectory, ObjectStore, UserDirectory};
use crate::error::AuthError;
use crate::session::unix_now;

#[derive(Default)]
struct MemoryState {
    next_uid: u64,
    users: HashMap<u64, HashMap<String, String>>,
    objects: HashMap<String, HashMap<String, String>>,
    /// Insertion order is creation order
    groups: Vec<(String, Vec<u64>)>,
}

/// In-process forum storage for tests and embedders without a database
#[derive(Default)]
pub struct MemoryHost {
    state: RwLock<MemoryState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_group(&self, name: &str) {
        let mut state = self.state.write().await;
        if !state.groups.iter().any(|(existing, _)| existing == name) {
            state.groups.push((name.to_string(), Vec::new()));
        }
    }

    pub async fn user_count(&self) -> usize {
        self.state.read().await.users.len()
    }
}

fn unique_username(users: &HashMap<u64, HashMap<String, String>>, wanted: &str) -> String {
    let taken = |candidate: &str| {
        users
            .values()
            .any(|fields| fields.get("username").is_some_and(|u| u.eq_ignore_ascii_case(candidate)))
    };

    if !taken(wanted) {
        return wanted.to_string();
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{} {}", wanted, suffix);
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[async_trait]
impl UserDirectory for MemoryHost {
    async fn create_user(&self, username: &str) -> Result<u64, AuthError> {
        let mut state = self.state.write().await;
        let username = unique_username(&state.users, username);
        state.next_uid += 1;
        let uid = state.next_uid;

        let mut fields = HashMap::new();
        fields.insert("uid".to_string(), uid.to_string());
        fields.insert("username".to_string(), username);
        fields.insert("joindate".to_string(), unix_now().to_string());
        state.users.insert(uid, fields);
        Ok(uid)
    }

    async fn get_user_field(&self, uid: u64, field: &str) -> Result<Option<String>, AuthError> {
        let state = self.state.read().await;
        Ok(state.users.get(&uid).and_then(|fields| fields.get(field).cloned()))
    }

    async fn set_user_field(&self, uid: u64, field: &str, value: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        let fields = state
            .users
            .get_mut(&uid)
            .ok_or_else(|| AuthError::HostError(format!("no such user: {}", uid)))?;
        fields.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn set_user_fields(
        &self,
        uid: u64,
        values: &HashMap<String, String>,
    ) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        let fields = state
            .users
            .get_mut(&uid)
            .ok_or_else(|| AuthError::HostError(format!("no such user: {}", uid)))?;
        fields.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn delete_user_field(&self, uid: u64, field: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if let Some(fields) = state.users.get_mut(&uid) {
            fields.remove(field);
        }
        Ok(())
    }

    async fn get_uid_by_email(&self, email: &str) -> Result<Option<u64>, AuthError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|(_, fields)| {
                fields.get("email").is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|(uid, _)| *uid))
    }

    async fn confirm_email(&self, uid: u64) -> Result<(), AuthError> {
        self.set_user_field(uid, "email:confirmed", "1").await
    }
}

#[async_trait]
impl ObjectStore for MemoryHost {
    async fn get_object_field(&self, key: &str, field: &str) -> Result<Option<String>, AuthError> {
        let state = self.state.read().await;
        Ok(state.objects.get(key).and_then(|object| object.get(field).cloned()))
    }

    async fn set_object_field(&self, key: &str, field: &str, value: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        state
            .objects
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_object_field(&self, key: &str, field: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if let Some(object) = state.objects.get_mut(key) {
            object.remove(field);
        }
        Ok(())
    }
}

#[async_trait]
impl GroupDirectory for MemoryHost {
    async fn join(&self, groups: &[String], uid: u64) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        for name in groups {
            match state.groups.iter_mut().find(|(existing, _)| existing == name) {
                Some((_, members)) => {
                    if !members.contains(&uid) {
                        members.push(uid);
                    }
                }
                None => state.groups.push((name.clone(), vec![uid])),
            }
        }
        Ok(())
    }

    async fn leave(&self, groups: &[String], uid: u64) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        for (name, members) in state.groups.iter_mut() {
            if groups.contains(name) {
                members.retain(|member| *member != uid);
            }
        }
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<String>, AuthError> {
        let state = self.state.read().await;
        Ok(state.groups.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn members(&self, group: &str) -> Result<Vec<u64>, AuthError> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, members)| members.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_usernames_get_suffix() {
        let host = MemoryHost::new();
        let first = host.create_user("alice").await.unwrap();
        let second = host.create_user("Alice").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(
            host.get_user_field(second, "username").await.unwrap().as_deref(),
            Some("Alice 1")
        );
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let host = MemoryHost::new();
        let uid = host.create_user("bob").await.unwrap();
        host.set_user_field(uid, "email", "Bob@Example.org").await.unwrap();

        assert_eq!(host.get_uid_by_email("bob@example.org").await.unwrap(), Some(uid));
        assert_eq!(host.get_uid_by_email("carol@example.org").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_join_creates_missing_groups_and_leave_is_idempotent() {
        let host = MemoryHost::new();
        host.create_group("Staff").await;

        host.join(&["Staff".to_string(), "Helpers".to_string()], 3).await.unwrap();
        host.join(&["Staff".to_string()], 3).await.unwrap();
        assert_eq!(host.members("Staff").await.unwrap(), vec![3]);
        assert_eq!(host.list_groups().await.unwrap(), vec!["Staff", "Helpers"]);

        host.leave(&["Staff".to_string()], 3).await.unwrap();
        host.leave(&["Staff".to_string()], 3).await.unwrap();
        assert!(host.members("Staff").await.unwrap().is_empty());
    }
}
