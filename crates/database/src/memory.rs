use crate::error::{DatabaseError, Result};
use crate::store::CredentialStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flux_models::{Credential, NewCredential, NewResetToken, ResetToken};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, Credential>,
    resets: HashMap<Uuid, ResetToken>,
}

/// In-process `CredentialStore` for tests and `memory://` development runs.
/// Every operation runs under one lock, so multi-write operations are atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reset tokens owned by `user_id`, oldest first.
    pub async fn reset_tokens_for(&self, user_id: Uuid) -> Vec<ResetToken> {
        let state = self.state.lock().await;
        let mut tokens: Vec<ResetToken> = state
            .resets
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        tokens
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_credential(
        &self,
        new_user: &NewCredential,
        password_hash: &str,
    ) -> Result<Credential> {
        let mut state = self.state.lock().await;

        if state.users.values().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::duplicate("User", "email"));
        }

        let now = Utc::now();
        let user = Credential {
            id: Uuid::new_v4(),
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_credential_by_email(&self, email: &str) -> Result<Option<Credential>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_credential_by_id(&self, id: Uuid) -> Result<Option<Credential>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("User", &id.to_string()))?;

        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_reset_token(&self, new_token: &NewResetToken) -> Result<ResetToken> {
        let mut state = self.state.lock().await;

        if !state.users.contains_key(&new_token.user_id) {
            return Err(DatabaseError::not_found("User", &new_token.user_id.to_string()));
        }
        if state.resets.values().any(|t| t.token_hash == new_token.token_hash) {
            return Err(DatabaseError::duplicate("Password reset", "token"));
        }

        state
            .resets
            .retain(|_, t| t.user_id != new_token.user_id || t.used);

        let token = ResetToken {
            id: Uuid::new_v4(),
            user_id: new_token.user_id,
            token_hash: new_token.token_hash.clone(),
            expires_at: new_token.expires_at,
            used: false,
            created_at: new_token.created_at,
        };
        state.resets.insert(token.id, token.clone());

        Ok(token)
    }

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<ResetToken>> {
        let state = self.state.lock().await;
        Ok(state
            .resets
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        // Check both rows before touching either one.
        match state.resets.get(&token_id) {
            Some(t) if t.user_id == user_id && !t.used && !t.is_expired(now) => {}
            _ => {
                return Err(DatabaseError::Conflict(format!(
                    "Password reset {} is no longer redeemable",
                    token_id
                )))
            }
        }
        if !state.users.contains_key(&user_id) {
            return Err(DatabaseError::not_found("User", &user_id.to_string()));
        }

        if let Some(token) = state.resets.get_mut(&token_id) {
            token.used = true;
        }
        if let Some(user) = state.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_user(email: &str) -> NewCredential {
        NewCredential {
            name: "Test User".to_string(),
            email: email.to_string(),
        }
    }

    fn new_token(user_id: Uuid, hash: &str) -> NewResetToken {
        let now = Utc::now();
        NewResetToken {
            user_id,
            token_hash: hash.to_string(),
            expires_at: now + Duration::hours(1),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.create_credential(&new_user("a@example.com"), "hash").await.unwrap();

        let err = store
            .create_credential(&new_user("a@example.com"), "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateEntry(_)));
    }

    #[tokio::test]
    async fn test_replace_keeps_only_newest_unused_token() {
        let store = MemoryStore::new();
        let user = store.create_credential(&new_user("a@example.com"), "hash").await.unwrap();

        let first = store.replace_reset_token(&new_token(user.id, "first")).await.unwrap();
        store.consume_reset_token(first.id, user.id, "new-hash", Utc::now()).await.unwrap();

        store.replace_reset_token(&new_token(user.id, "second")).await.unwrap();
        store.replace_reset_token(&new_token(user.id, "third")).await.unwrap();

        let tokens = store.reset_tokens_for(user.id).await;
        let hashes: Vec<&str> = tokens.iter().map(|t| t.token_hash.as_str()).collect();
        assert_eq!(tokens.len(), 2);
        assert!(hashes.contains(&"first"));
        assert!(hashes.contains(&"third"));
        assert!(store.find_reset_token("second").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_requires_existing_user() {
        let store = MemoryStore::new();
        let err = store
            .replace_reset_token(&new_token(Uuid::new_v4(), "orphan"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_consume_commits_once() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_credential(&new_user("a@example.com"), "old").await.unwrap();
        let token = store.replace_reset_token(&new_token(user.id, "tok")).await.unwrap();
        let (token_id, user_id) = (token.id, user.id);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .consume_reset_token(token_id, user_id, &format!("hash-{}", i), Utc::now())
                    .await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => committed += 1,
                Err(DatabaseError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(committed, 1);
        let stored = store.find_credential_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("hash-"));
    }

    #[tokio::test]
    async fn test_consume_with_wrong_owner_changes_nothing() {
        let store = MemoryStore::new();
        let alice = store.create_credential(&new_user("a@example.com"), "alice").await.unwrap();
        let bob = store.create_credential(&new_user("b@example.com"), "bob").await.unwrap();
        let token = store.replace_reset_token(&new_token(alice.id, "tok")).await.unwrap();

        assert!(store.consume_reset_token(token.id, bob.id, "evil", Utc::now()).await.is_err());

        let stored_token = store.find_reset_token("tok").await.unwrap().unwrap();
        let stored_bob = store.find_credential_by_id(bob.id).await.unwrap().unwrap();
        assert!(!stored_token.used);
        assert_eq!(stored_bob.password_hash, "bob");
    }

    #[tokio::test]
    async fn test_consume_rejects_expired_token() {
        let store = MemoryStore::new();
        let user = store.create_credential(&new_user("a@example.com"), "old").await.unwrap();
        let token = store.replace_reset_token(&new_token(user.id, "tok")).await.unwrap();

        let late = token.expires_at + Duration::seconds(1);
        let err = store
            .consume_reset_token(token.id, user.id, "new", late)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));

        let stored = store.find_credential_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "old");
        assert!(!store.find_reset_token("tok").await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_concurrent_replace_leaves_one_live_token() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_credential(&new_user("a@example.com"), "old").await.unwrap();
        let user_id = user.id;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .replace_reset_token(&new_token(user_id, &format!("tok-{}", i)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let live: Vec<ResetToken> = store
            .reset_tokens_for(user_id)
            .await
            .into_iter()
            .filter(|t| !t.used)
            .collect();
        assert_eq!(live.len(), 1);
    }
}
