//! SMTP transporter using lettre.
//!
//! Amazon SES and Gmail are both reached through their SMTP submission
//! endpoints, so a single implementation serves both providers.
//!
//! # Example
//!
//! ```rust,ignore
//! use mailpace::providers::SmtpMailer;
//!
//! let mailer = SmtpMailer::new("email-smtp.us-east-1.amazonaws.com", 587)
//!     .credentials("AKIA...", "smtp-password")
//!     .provider("ses")
//!     .build();
//! ```

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::address::Address;
use crate::email::Email;
use crate::error::{MailError, TransportFailure};
use crate::mailer::{DeliveryResult, Mailer};

/// SMTP email transporter.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    provider: &'static str,
}

impl SmtpMailer {
    /// Create a new SMTP mailer builder with TLS (STARTTLS on port 587).
    pub fn new(host: &str, port: u16) -> SmtpBuilder {
        SmtpBuilder {
            host: host.to_string(),
            port,
            credentials: None,
            tls: TlsMode::StartTls,
            provider: "smtp",
        }
    }

    /// Build a lettre Message from our Email struct.
    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let from = email
            .from
            .as_ref()
            .ok_or(MailError::MissingField("from"))?;

        if email.to.is_empty() {
            return Err(MailError::MissingField("to"));
        }

        let mut builder = Message::builder()
            .from(address_to_mailbox(from)?)
            .subject(&email.subject);

        for to in &email.to {
            builder = builder.to(address_to_mailbox(to)?);
        }

        let message = builder
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone().unwrap_or_default())?;

        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        let message = self.build_message(email)?;

        let response = self.transport.send(message).await?;

        // Extract message ID from SMTP response, or generate one
        let message_id = response
            .message()
            .next()
            .and_then(|m| m.lines().next())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(DeliveryResult::new(message_id))
    }

    async fn verify(&self) -> Result<(), MailError> {
        if self.transport.test_connection().await? {
            Ok(())
        } else {
            Err(MailError::transport(
                TransportFailure::Connection,
                "SMTP server did not accept the connection test",
            ))
        }
    }

    fn provider_name(&self) -> &'static str {
        self.provider
    }
}

/// TLS mode for SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// STARTTLS - upgrade to TLS after connecting (port 587)
    StartTls,
    /// Implicit TLS - connect with TLS from start (port 465)
    Tls,
}

impl TlsMode {
    /// Implicit TLS on 465, STARTTLS everywhere else.
    pub fn for_port(port: u16) -> Self {
        if port == 465 {
            Self::Tls
        } else {
            Self::StartTls
        }
    }
}

/// Builder for SmtpMailer.
pub struct SmtpBuilder {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    tls: TlsMode,
    provider: &'static str,
}

impl SmtpBuilder {
    /// Set SMTP credentials.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username.to_string(), password.to_string()));
        self
    }

    /// Set TLS mode.
    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    /// Name reported by `provider_name()` (e.g. "ses", "gmail").
    pub fn provider(mut self, name: &'static str) -> Self {
        self.provider = name;
        self
    }

    /// Build the SmtpMailer.
    ///
    /// Never fails: an unusable host produces a transporter whose sends fail.
    pub fn build(self) -> SmtpMailer {
        let builder = match self.tls {
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .unwrap_or_else(|_| {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
                }),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .unwrap_or_else(|_| {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
                }),
        };

        let mut builder = builder.port(self.port);
        if let Some(creds) = self.credentials {
            builder = builder.credentials(creds);
        }

        SmtpMailer {
            transport: builder.build(),
            provider: self.provider,
        }
    }
}

/// Convert our Address to lettre's Mailbox.
fn address_to_mailbox(addr: &Address) -> Result<Mailbox, MailError> {
    let email = addr.email.parse::<lettre::Address>()?;
    Ok(Mailbox::new(addr.name.clone(), email))
}
