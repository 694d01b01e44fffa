use crate::connection::Database;
use crate::error::Result;
use crate::repositories::{password_resets::PasswordResetRepository, users::UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flux_models::{Credential, NewCredential, NewResetToken, ResetToken};
use uuid::Uuid;

/// Persistence seen by the auth services. `Database` backs it with Postgres,
/// `MemoryStore` keeps everything in process.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `DuplicateEntry` when the email is already registered.
    async fn create_credential(&self, new_user: &NewCredential, password_hash: &str)
        -> Result<Credential>;

    async fn find_credential_by_email(&self, email: &str) -> Result<Option<Credential>>;

    async fn find_credential_by_id(&self, id: Uuid) -> Result<Option<Credential>>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    /// Atomically delete the owner's unused tokens and persist `new_token`.
    async fn replace_reset_token(&self, new_token: &NewResetToken) -> Result<ResetToken>;

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<ResetToken>>;

    /// Atomically mark the token used and store the new hash. Fails with
    /// `Conflict`, leaving nothing changed, when the token is gone, already
    /// used, or expired as of `now`.
    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
impl CredentialStore for Database {
    async fn create_credential(
        &self,
        new_user: &NewCredential,
        password_hash: &str,
    ) -> Result<Credential> {
        UserRepository::new(self.pool().clone())
            .create(new_user, password_hash)
            .await
    }

    async fn find_credential_by_email(&self, email: &str) -> Result<Option<Credential>> {
        UserRepository::new(self.pool().clone()).find_by_email(email).await
    }

    async fn find_credential_by_id(&self, id: Uuid) -> Result<Option<Credential>> {
        UserRepository::new(self.pool().clone()).find_by_id(id).await
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        UserRepository::new(self.pool().clone())
            .update_password(id, password_hash)
            .await
    }

    async fn replace_reset_token(&self, new_token: &NewResetToken) -> Result<ResetToken> {
        PasswordResetRepository::new(self.pool().clone())
            .replace(new_token)
            .await
    }

    async fn find_reset_token(&self, token_hash: &str) -> Result<Option<ResetToken>> {
        PasswordResetRepository::new(self.pool().clone())
            .find_by_hash(token_hash)
            .await
    }

    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        PasswordResetRepository::new(self.pool().clone())
            .consume(token_id, user_id, password_hash, now)
            .await
    }
}
