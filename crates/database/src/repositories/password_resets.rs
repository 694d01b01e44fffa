use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use flux_models::{NewResetToken, ResetToken};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PasswordResetRepository {
    pool: PgPool,
}

impl PasswordResetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop every unused token of the owner and insert the new one, in one
    /// transaction. Consumed tokens are kept for auditing.
    ///
    /// The owner row is locked first so concurrent requests for one user run
    /// one after another and each sees the previous insert.
    pub async fn replace(&self, new_token: &NewResetToken) -> Result<ResetToken> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new_token.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        if owner.is_none() {
            return Err(DatabaseError::not_found("User", &new_token.user_id.to_string()));
        }

        let superseded = sqlx::query(
            r#"
            DELETE FROM password_resets
            WHERE user_id = $1 AND used = FALSE
            "#,
        )
        .bind(new_token.user_id)
        .execute(&mut *tx)
        .await?;

        let token = sqlx::query_as::<_, ResetToken>(
            r#"
            INSERT INTO password_resets (id, user_id, token_hash, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_token.user_id)
        .bind(&new_token.token_hash)
        .bind(new_token.expires_at)
        .bind(new_token.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_insert(e, "Password reset", "token"))?;

        tx.commit().await?;

        tracing::debug!(
            user_id = %new_token.user_id,
            superseded = superseded.rows_affected(),
            "Stored password reset token"
        );

        Ok(token)
    }

    pub async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ResetToken>> {
        let token = sqlx::query_as::<_, ResetToken>(
            "SELECT * FROM password_resets WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Mark the token used and replace the owner's password hash. Either both
    /// writes commit or the transaction is dropped and rolled back.
    pub async fn consume(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(
            r#"
            UPDATE password_resets
            SET used = TRUE
            WHERE id = $1 AND user_id = $2 AND used = FALSE AND expires_at >= $3
            "#,
        )
        .bind(token_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() != 1 {
            return Err(DatabaseError::Conflict(format!(
                "Password reset {} is no longer redeemable",
                token_id
            )));
        }

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            return Err(DatabaseError::not_found("User", &user_id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Database, DatabaseConfig};
    use crate::repositories::users::UserRepository;
    use chrono::Duration;
    use flux_models::NewCredential;

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_concurrent_replace_leaves_one_live_token() {
        let db = Database::new(DatabaseConfig::from_env())
            .await
            .expect("Failed to connect to database");
        db.migrate().await.expect("Failed to run migrations");

        let user = UserRepository::new(db.pool().clone())
            .create(
                &NewCredential {
                    name: "Race".to_string(),
                    email: format!("race-{}@example.com", Uuid::new_v4()),
                },
                "hash",
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = PasswordResetRepository::new(db.pool().clone());
            let user_id = user.id;
            handles.push(tokio::spawn(async move {
                let now = Utc::now();
                repo.replace(&NewResetToken {
                    user_id,
                    token_hash: format!("{:0>64}", format!("{}{}", i, Uuid::new_v4().simple())),
                    expires_at: now + Duration::hours(1),
                    created_at: now,
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM password_resets WHERE user_id = $1 AND used = FALSE",
        )
        .bind(user.id)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(live, 1);
    }
}
