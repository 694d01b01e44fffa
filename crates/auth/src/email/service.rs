use super::{templates, Notifier};
use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    Address,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const RESET_LINK_MINUTES: i64 = 60;

fn frontend_url_from_env() -> String {
    std::env::var("FRONTEND_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
}

/// Development notifier: writes the reset link to the log instead of mailing it.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    frontend_url: String,
}

impl LogNotifier {
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            frontend_url: frontend_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(frontend_url_from_env())
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset(&self, email: &str, display_name: &str, token: &str) -> Result<()> {
        let link = templates::reset_link(&self.frontend_url, token);
        tracing::info!(
            recipient = %email,
            name = %display_name,
            "[DEV] Password reset link: {}",
            link
        );
        Ok(())
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// TLS from the first byte, the usual mode on port 465.
    Implicit,
    /// Plain connect upgraded with STARTTLS, the usual mode on 587 and 25.
    StartTls,
}

impl SmtpTls {
    /// `SMTP_TLS` (`implicit`/`tls`/`ssl` or `starttls`) wins; otherwise the
    /// mode follows the port.
    pub fn resolve(setting: Option<&str>, port: u16) -> Self {
        match setting.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("implicit") | Some("tls") | Some("ssl") => SmtpTls::Implicit,
            Some("starttls") => SmtpTls::StartTls,
            _ if port == 465 => SmtpTls::Implicit,
            _ => SmtpTls::StartTls,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub from_name: String,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);
        let tls = SmtpTls::resolve(std::env::var("SMTP_TLS").ok().as_deref(), port);

        Ok(Self {
            host: std::env::var("SMTP_HOST")
                .map_err(|_| Error::Internal("SMTP_HOST not configured".to_string()))?,
            port,
            tls,
            username: std::env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
            password: std::env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
            from_email: std::env::var("SMTP_FROM")
                .map_err(|_| Error::Internal("SMTP_FROM not configured".to_string()))?,
            from_name: std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Flux".to_string()),
        })
    }
}

/// Production notifier: multipart mail over authenticated SMTP with TLS
/// (implicit or STARTTLS, see [`SmtpTls`]).
#[derive(Clone)]
pub struct SmtpNotifier {
    config: SmtpConfig,
    frontend_url: String,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig, frontend_url: impl Into<String>) -> Self {
        Self {
            config,
            frontend_url: frontend_url.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SmtpConfig::from_env()?, frontend_url_from_env()))
    }

    fn build_message(&self, email: &str, display_name: &str, token: &str) -> Result<Message> {
        let from_address = self
            .config
            .from_email
            .parse::<Address>()
            .map_err(|e| Error::Delivery(format!("Invalid from address: {}", e)))?;
        let from = Mailbox::new(Some(self.config.from_name.clone()), from_address);

        let to_address = email
            .parse::<Address>()
            .map_err(|e| Error::Delivery(format!("Invalid to address: {}", e)))?;
        let to_name = Some(display_name.to_string()).filter(|n| !n.trim().is_empty());
        let to = Mailbox::new(to_name, to_address);

        let link = templates::reset_link(&self.frontend_url, token);
        let (subject, text, html) =
            templates::password_reset(display_name, &link, RESET_LINK_MINUTES)?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )
            .map_err(|e| Error::Delivery(format!("Failed to build email: {}", e)))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let relay = match self.config.tls {
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host),
            SmtpTls::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            }
        };
        let mut builder = relay
            .map_err(|e| Error::Delivery(format!("Failed to create SMTP transport: {}", e)))?
            .port(self.config.port);

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_password_reset(&self, email: &str, display_name: &str, token: &str) -> Result<()> {
        let message = self.build_message(email, display_name, token)?;

        self.transport()?
            .send(message)
            .await
            .map_err(|e| Error::Delivery(format!("Failed to send email: {}", e)))?;

        tracing::info!("Password reset email sent to {}", email);
        Ok(())
    }
}
