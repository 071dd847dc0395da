//! Sends exactly one message and classifies the outcome.
//!
//! [`DeliveryExecutor::send_email`] never returns an error. Validation
//! failures are reported only through the outcome; transport failures are
//! logged and, unless they look like throttling, written to the recipient
//! status store as `failed`. Successful sends are written as `sent`.

use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

use crate::config::MailSettings;
use crate::email::Email;
use crate::error::MailError;
use crate::profile::ProviderKind;
use crate::status::{StatusStore, StatusUpdate};
use crate::transporter::TransporterManager;

/// Why a delivery did not succeed.
#[derive(Debug, Clone)]
pub enum DeliveryFailure {
    /// Empty recipient or sender; nothing was sent.
    Invalid(MailError),
    /// Throttling or a transient network condition.
    RateLimited(MailError),
    /// Any other failure.
    Permanent(MailError),
}

/// Result of one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,
    /// Provider message ID, present only on success.
    pub message_id: Option<String>,
    pub failure: Option<DeliveryFailure>,
}

impl DeliveryOutcome {
    fn sent(message_id: String) -> Self {
        Self {
            success: true,
            message_id: Some(message_id),
            failure: None,
        }
    }

    fn failed(failure: DeliveryFailure) -> Self {
        Self {
            success: false,
            message_id: None,
            failure: Some(failure),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.failure, Some(DeliveryFailure::RateLimited(_)))
    }
}

/// Sends through the active transporter and reports to the status store.
#[derive(Clone)]
pub struct DeliveryExecutor {
    transporters: Arc<TransporterManager>,
    status_store: Arc<dyn StatusStore>,
}

impl DeliveryExecutor {
    pub fn new(transporters: Arc<TransporterManager>, status_store: Arc<dyn StatusStore>) -> Self {
        Self {
            transporters,
            status_store,
        }
    }

    pub fn transporters(&self) -> &Arc<TransporterManager> {
        &self.transporters
    }

    /// Send one HTML email. Never fails; inspect the returned outcome.
    pub async fn send_email(
        &self,
        settings: &MailSettings,
        to: &str,
        subject: &str,
        html: &str,
        recipient_id: Option<&str>,
    ) -> DeliveryOutcome {
        let provider = ProviderKind::select(settings);
        let span = tracing::info_span!(
            "mailpace.deliver",
            provider = provider.as_str(),
            to = %to,
            subject = %subject,
            recipient_id = recipient_id.unwrap_or(""),
        );

        self.deliver(settings, provider, to, subject, html, recipient_id)
            .instrument(span)
            .await
    }

    async fn deliver(
        &self,
        settings: &MailSettings,
        provider: ProviderKind,
        to: &str,
        subject: &str,
        html: &str,
        recipient_id: Option<&str>,
    ) -> DeliveryOutcome {
        let sender = provider.sender(settings);

        // Validation failures are not reported to the status store.
        if to.trim().is_empty() {
            tracing::error!("Cannot send email without a recipient");
            record(provider, "invalid");
            return DeliveryOutcome::failed(DeliveryFailure::Invalid(MailError::MissingField("to")));
        }
        if sender.is_empty() {
            tracing::error!("Cannot send email without a sender address");
            record(provider, "invalid");
            return DeliveryOutcome::failed(DeliveryFailure::Invalid(MailError::MissingField(
                "from",
            )));
        }

        let email = Email::new()
            .from(sender)
            .to(to.trim())
            .subject(subject)
            .html_body(html);

        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = match self.transporters.get(settings) {
            Ok(mailer) => mailer.deliver(&email).await,
            Err(e) => Err(e),
        };

        #[cfg(feature = "metrics")]
        metrics::histogram!("mailpace_delivery_duration_seconds", "provider" => provider.as_str())
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(delivery) => {
                tracing::info!(message_id = %delivery.message_id, "Email delivered");
                record(provider, "sent");
                if let Some(id) = recipient_id {
                    self.report(id, StatusUpdate::sent(&delivery.message_id, Utc::now()));
                }
                DeliveryOutcome::sent(delivery.message_id)
            }
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(
                    error = %e,
                    response_code = ?e.response_code(),
                    "Email provider rate limit or transient failure"
                );
                record(provider, "rate_limited");
                DeliveryOutcome::failed(DeliveryFailure::RateLimited(e))
            }
            Err(e) => {
                tracing::error!(error = %e, "Email delivery failed");
                record(provider, "failed");
                if let Some(id) = recipient_id {
                    self.report(id, StatusUpdate::failed(e.to_string()));
                }
                DeliveryOutcome::failed(DeliveryFailure::Permanent(e))
            }
        }
    }

    /// Write to the status store in the background; failures are only logged.
    fn report(&self, recipient_id: &str, update: StatusUpdate) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    recipient_id,
                    status = ?update.status,
                    "No tokio runtime; recipient status not recorded"
                );
                return;
            }
        };

        let store = Arc::clone(&self.status_store);
        let recipient_id = recipient_id.to_string();
        handle.spawn(async move {
            if let Err(e) = store.update(&recipient_id, update).await {
                tracing::warn!(recipient_id = %recipient_id, error = %e, "Failed to update recipient status");
            }
        });
    }
}

#[cfg(feature = "metrics")]
fn record(provider: ProviderKind, status: &'static str) {
    metrics::counter!("mailpace_emails_total", "provider" => provider.as_str(), "status" => status)
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record(_provider: ProviderKind, _status: &'static str) {}
