pub mod clock;
pub mod email;
pub mod error;
pub mod jwt;
pub mod password;
pub mod password_reset;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use email::{LogNotifier, Notifier, SmtpConfig, SmtpNotifier, SmtpTls};
pub use error::{AuthError, Error, PolicyError, ResetError, Result};
pub use jwt::{SessionClaims, TokenService, DEV_FALLBACK_SECRET, TOKEN_ISSUER};
pub use password::{PasswordHasher, PasswordPolicy};
pub use password_reset::PasswordResetService;
pub use service::{AuthService, AuthSession};
