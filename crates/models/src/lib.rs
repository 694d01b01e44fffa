pub mod credential;
pub mod reset_token;

// Re-export commonly used types
pub use credential::{Credential, CredentialProfile, NewCredential};
pub use reset_token::{NewResetToken, ResetToken};
