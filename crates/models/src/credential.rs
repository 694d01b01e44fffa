use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Stored identity record. `password_hash` is always the output of the
/// password hasher and never leaves the service layer.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCredential {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(email, length(max = 255))]
    pub email: String,
}

/// Public view of a credential, safe to serialize into responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Credential> for CredentialProfile {
    fn from(credential: Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name,
            email: credential.email,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

impl From<&Credential> for CredentialProfile {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name.clone(),
            email: credential.email.clone(),
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_never_serializes_hash() {
        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(CredentialProfile::from(&credential)).unwrap();

        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("password_hash").is_none());
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn test_new_credential_validation() {
        let valid = NewCredential {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_email = NewCredential {
            name: "Alice".to_string(),
            email: "not-an-email".to_string(),
        };
        assert!(bad_email.validate().is_err());

        let empty_name = NewCredential {
            name: String::new(),
            email: "alice@example.com".to_string(),
        };
        assert!(empty_name.validate().is_err());
    }
}
