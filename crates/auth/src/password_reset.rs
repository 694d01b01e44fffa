use crate::clock::{Clock, SystemClock};
use crate::email::Notifier;
use crate::error::{Error, ResetError, Result};
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::service::normalize_email;
use chrono::Duration;
use flux_database::{CredentialStore, DatabaseError};
use flux_models::{Credential, NewResetToken, ResetToken};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const RESET_TOKEN_LENGTH: usize = 32;

const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub struct PasswordResetService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    policy: PasswordPolicy,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        policy: PasswordPolicy,
    ) -> Self {
        Self::with_clock(store, notifier, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        policy: PasswordPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
            clock,
            ttl: Duration::hours(1),
        }
    }

    /// Generate a secure random alphanumeric token. Bytes that would bias the
    /// charset mapping are discarded.
    fn generate_token() -> Result<String> {
        let limit = (256 / TOKEN_CHARSET.len() * TOKEN_CHARSET.len()) as u8;
        let mut token = String::with_capacity(RESET_TOKEN_LENGTH);
        let mut buf = [0u8; RESET_TOKEN_LENGTH * 2];

        while token.len() < RESET_TOKEN_LENGTH {
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| Error::RandomSource(e.to_string()))?;

            for byte in buf.iter().copied().filter(|b| *b < limit) {
                if token.len() == RESET_TOKEN_LENGTH {
                    break;
                }
                token.push(TOKEN_CHARSET[byte as usize % TOKEN_CHARSET.len()] as char);
            }
        }

        Ok(token)
    }

    /// Hash a token for storage and lookup
    fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Mint a reset token for `credential`, superseding any unused one it
    /// already has. Returns the raw token for delivery.
    pub async fn issue_token(&self, credential: &Credential) -> Result<String> {
        let token = Self::generate_token()?;
        let now = self.clock.now();

        self.store
            .replace_reset_token(&NewResetToken {
                user_id: credential.id,
                token_hash: Self::hash_token(&token),
                expires_at: now + self.ttl,
                created_at: now,
            })
            .await?;

        Ok(token)
    }

    /// Start a reset for `email`. Unknown addresses get the same `Ok(())` as
    /// real ones and no token is created.
    pub async fn request_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);

        let Some(credential) = self.store.find_credential_by_email(&email).await? else {
            tracing::warn!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = self.issue_token(&credential).await?;

        // The token stays valid if delivery fails; a retry replaces it.
        self.notifier
            .send_password_reset(&credential.email, &credential.name, &token)
            .await
            .map_err(|e| match e {
                Error::Delivery(msg) => Error::Delivery(msg),
                other => Error::Delivery(other.to_string()),
            })?;

        tracing::info!(user_id = %credential.id, "Password reset token issued");
        Ok(())
    }

    /// Look up a token and check it is still usable, without consuming it.
    pub async fn inspect(&self, token: &str) -> Result<ResetToken> {
        let record = self
            .store
            .find_reset_token(&Self::hash_token(token))
            .await?
            .ok_or(ResetError::NotFound)?;

        if record.is_expired(self.clock.now()) {
            return Err(ResetError::Expired.into());
        }
        if record.used {
            return Err(ResetError::AlreadyUsed.into());
        }

        Ok(record)
    }

    /// Redeem a token: validate the new password against the owner's email,
    /// then mark the token used and store the new hash in one transaction.
    pub async fn consume(&self, token: &str, new_password: &str) -> Result<()> {
        let record = self.inspect(token).await?;

        let credential = self
            .store
            .find_credential_by_id(record.user_id)
            .await?
            .ok_or(ResetError::NotFound)?;

        self.policy.validate(new_password, &credential.email)?;

        let password = new_password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || PasswordHasher::hash(&password)).await??;

        let result = self
            .store
            .consume_reset_token(record.id, credential.id, &password_hash, self.clock.now())
            .await;

        match result {
            Ok(()) => {}
            // The token changed since it was inspected: superseded, spent by a
            // concurrent request, or expired in between. Report which.
            Err(DatabaseError::Conflict(_)) => {
                return Err(match self.inspect(token).await {
                    Err(Error::Reset(kind)) => kind.into(),
                    Err(other) => other,
                    Ok(_) => ResetError::AlreadyUsed.into(),
                });
            }
            Err(other) => return Err(other.into()),
        }

        tracing::info!(user_id = %credential.id, "Password reset successfully");
        Ok(())
    }
}
