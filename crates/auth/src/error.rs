use flux_database::DatabaseError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Password policy violations, reported in the order the checks run.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Password is too short")]
    TooShort,

    #[error("Password is too common")]
    TooCommon,

    #[error("Password must not contain the email address")]
    ContainsEmail,

    #[error("Password does not mix enough character classes")]
    InsufficientComplexity,
}

/// Session token failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token is not valid yet")]
    NotYetValid,

    #[error("Authentication required")]
    Unauthenticated,
}

/// Password-reset token failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResetError {
    #[error("Reset token not found")]
    NotFound,

    #[error("Reset token expired")]
    Expired,

    #[error("Reset token already used")]
    AlreadyUsed,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Reset(#[from] ResetError),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to deliver notification: {0}")]
    Delivery(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Secure random source failed: {0}")]
    RandomSource(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<argon2::password_hash::Error> for Error {
    fn from(err: argon2::password_hash::Error) -> Self {
        Error::PasswordHash(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::Jwt(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Validation(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(err.to_string())
    }
}
