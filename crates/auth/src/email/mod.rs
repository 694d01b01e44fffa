pub mod service;
pub mod templates;

pub use service::{LogNotifier, SmtpConfig, SmtpNotifier, SmtpTls};

use crate::error::Result;
use async_trait::async_trait;

/// Out-of-band delivery of password-reset tokens. The raw token is handed
/// over here and nowhere else.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(&self, email: &str, display_name: &str, token: &str) -> Result<()>;
}
