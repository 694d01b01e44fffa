use crate::error::{Error, Result};
use crate::jwt::TokenService;
use crate::password::{PasswordHasher, PasswordPolicy};
use flux_database::{CredentialStore, DatabaseError};
use flux_models::{Credential, CredentialProfile, NewCredential};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Emails are compared and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: CredentialProfile,
}

async fn hash_blocking(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || PasswordHasher::hash(&password)).await?
}

async fn verify_blocking(hash: &str, password: &str) -> Result<bool> {
    let hash = hash.to_string();
    let password = password.to_string();
    Ok(tokio::task::spawn_blocking(move || PasswordHasher::verify(&hash, &password)).await?)
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    pub jwt: Arc<TokenService>,
    policy: PasswordPolicy,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: Arc<TokenService>, policy: PasswordPolicy) -> Self {
        Self { store, jwt, policy }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Create a credential from plaintext. The password is checked against the
    /// policy and hashed before anything is persisted.
    pub async fn create_credential(&self, name: &str, email: &str, password: &str) -> Result<Credential> {
        let new_user = NewCredential {
            name: name.trim().to_string(),
            email: normalize_email(email),
        };
        new_user.validate()?;

        self.policy.validate(password, &new_user.email)?;
        let password_hash = hash_blocking(password).await?;

        self.store
            .create_credential(&new_user, &password_hash)
            .await
            .map_err(|e| match e {
                DatabaseError::DuplicateEntry(_) => Error::EmailTaken,
                other => Error::Database(other),
            })
    }

    /// Register a new user and sign them in.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthSession> {
        let user = self.create_credential(name, email, password).await?;
        let token = self.jwt.issue(user.id, &user.email)?;

        tracing::info!(user_id = %user.id, "User registered");

        Ok(AuthSession {
            token,
            user: user.into(),
        })
    }

    /// Unknown emails and wrong passwords fail identically, and both pay for
    /// one Argon2 run.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = normalize_email(email);

        let Some(user) = self.store.find_credential_by_email(&email).await? else {
            let _ = hash_blocking(password).await;
            tracing::debug!("Login attempt for unknown email");
            return Err(Error::InvalidCredentials);
        };

        if !verify_blocking(&user.password_hash, password).await? {
            tracing::debug!(user_id = %user.id, "Login attempt with wrong password");
            return Err(Error::InvalidCredentials);
        }

        if PasswordHasher::needs_rehash(&user.password_hash) {
            match hash_blocking(password).await {
                Ok(upgraded) => {
                    if let Err(e) = self.store.update_password(user.id, &upgraded).await {
                        tracing::warn!(user_id = %user.id, "Failed to upgrade password hash: {}", e);
                    }
                }
                Err(e) => tracing::warn!(user_id = %user.id, "Failed to rehash password: {}", e),
            }
        }

        let token = self.jwt.issue(user.id, &user.email)?;

        Ok(AuthSession {
            token,
            user: user.into(),
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<CredentialProfile> {
        self.store
            .find_credential_by_id(user_id)
            .await?
            .map(CredentialProfile::from)
            .ok_or_else(|| Error::Database(DatabaseError::not_found("User", &user_id.to_string())))
    }

    /// Change a password for a signed-in user, who must prove the current one.
    pub async fn change_password(&self, user_id: Uuid, current_password: &str, new_password: &str) -> Result<()> {
        let user = self
            .store
            .find_credential_by_id(user_id)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if !verify_blocking(&user.password_hash, current_password).await? {
            return Err(Error::InvalidCredentials);
        }

        self.policy.validate(new_password, &user.email)?;
        let password_hash = hash_blocking(new_password).await?;
        self.store.update_password(user.id, &password_hash).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }
}
