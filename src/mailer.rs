//! Transporter capability trait and delivery result type.
//!
//! The trait uses `async_trait` so it can be held as `Arc<dyn Mailer>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::Email;
use crate::error::MailError;

/// Result of a successful email delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Message ID assigned by the provider
    pub message_id: String,
}

impl DeliveryResult {
    /// Create a new delivery result.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }
}

/// A provider-bound connection handle capable of sending messages.
///
/// Both SES and Gmail are reached over SMTP via [`SmtpMailer`](crate::providers::SmtpMailer);
/// [`LocalMailer`](crate::providers::LocalMailer) records messages in memory.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single email.
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError>;

    /// Confirm the provider is reachable and accepts our credentials.
    async fn verify(&self) -> Result<(), MailError> {
        Ok(())
    }

    /// Get the provider name (for logging/debugging).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }
}
