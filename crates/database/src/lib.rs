pub mod connection;
pub mod error;
pub mod memory;
pub mod repositories;
pub mod store;

pub use connection::{Database, DatabaseConfig};
pub use error::{DatabaseError, Result};
pub use memory::MemoryStore;
pub use repositories::{password_resets::PasswordResetRepository, users::UserRepository};
pub use store::CredentialStore;
