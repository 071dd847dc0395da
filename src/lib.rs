//! # Mailpace
//!
//! Quota-aware, paced outbound email for Amazon SES and Gmail SMTP.
//!
//! Requests are appended to an in-memory FIFO queue and drained in batches
//! that respect the active provider's daily limit, batch size and pacing
//! delays. Nothing in the send path returns an error: outcomes come back as
//! data, and tracked recipients get a best-effort status update.
//!
//! ## Quick Start
//!
//! Set environment variables:
//! ```bash
//! EMAIL_PROVIDER=gmail
//! GMAIL_USER=academy@gmail.com
//! GMAIL_APP_PASSWORD=xxxx-xxxx-xxxx-xxxx
//! GMAIL_FROM_NAME=Academy
//! ```
//!
//! Queue emails from anywhere:
//! ```rust,ignore
//! use mailpace::{add_to_queue, SendRequest};
//!
//! add_to_queue(
//!     SendRequest::new("learner@example.com", "Welcome", "<p>Hello</p>").recipient_id("rec-42"),
//! )?;
//! ```
//!
//! ## Owned Service
//!
//! The global functions wrap a process-wide [`Dispatcher`]. Build your own to
//! inject a status store, a clock or a transport factory:
//!
//! ```rust,ignore
//! use mailpace::{Dispatcher, MailSettings, MemoryStatusStore};
//!
//! let dispatcher = Dispatcher::builder()
//!     .settings(MailSettings::from_env())
//!     .status_store(MemoryStatusStore::shared())
//!     .build()?;
//! mailpace::configure(dispatcher);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `EMAIL_PROVIDER` | `ses` or `gmail` |
//! | `EMAIL_FROM` | Shared sender email fallback |
//! | `EMAIL_FROM_NAME` | Shared sender name fallback |
//! | `SES_SMTP_HOST` | SES SMTP host; setting it selects SES |
//! | `SES_REGION` | Region for the default SES host (default: us-east-1) |
//! | `SES_SMTP_PORT` | SES SMTP port (default: 587) |
//! | `SES_SMTP_USER` | SES SMTP username |
//! | `SES_SMTP_PASSWORD` | SES SMTP password |
//! | `SES_FROM_EMAIL` | SES sender email |
//! | `SES_FROM_NAME` | SES sender name |
//! | `SES_PRODUCTION` | `true` lifts the sandbox daily limit |
//! | `SES_RATE_LIMIT` | Production sends per second (default: 14) |
//! | `SES_BATCH_SIZE` | Production batch size (default: 100) |
//! | `SES_DELAY_BETWEEN_EMAILS_MS` | Production delay between emails (default: 50) |
//! | `SES_DELAY_BETWEEN_BATCHES_MS` | Production delay between batches (default: 1000) |
//! | `GMAIL_USER` | Gmail account, also the sender address |
//! | `GMAIL_APP_PASSWORD` | Gmail app password |
//! | `GMAIL_FROM_NAME` | Gmail sender name |
//!
//! ## Feature Flags
//!
//! - `smtp` (default) - SMTP transporter via lettre
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit Prometheus-style metrics:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `mailpace_emails_total` | Counter | provider, status | Delivery attempts by outcome |
//! | `mailpace_delivery_duration_seconds` | Histogram | provider | Delivery duration |
//! | `mailpace_batch_total` | Counter | provider | Batches drained |
//! | `mailpace_batch_size` | Histogram | provider | Emails per batch |
//! | `mailpace_quota_exhausted_total` | Counter | provider | Drains paused by the daily limit |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the mailpace crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod clock;
mod config;
mod dispatcher;
mod email;
mod error;
mod executor;
mod mailer;
mod profile;
mod queue;
mod quota;
mod status;
mod transporter;

pub mod providers;

use parking_lot::RwLock;

// Re-exports
pub use address::Address;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GmailSettings, MailSettings, SesSettings};
pub use dispatcher::{
    Dispatcher, DispatcherBuilder, DispatcherStatus, DrainReport, StopReason, TransientPolicy,
};
pub use email::Email;
pub use error::{MailError, TransportFailure, THROTTLE_RESPONSE_CODES};
pub use executor::{DeliveryExecutor, DeliveryFailure, DeliveryOutcome};
pub use mailer::{DeliveryResult, Mailer};
pub use profile::{resolve_profile, DailyLimit, ProviderKind, ProviderProfile, SmtpEndpoint};
pub use queue::{QueueStore, SendRequest};
pub use quota::QuotaTracker;
pub use status::{MemoryStatusStore, NoopStatusStore, RecipientStatus, StatusStore, StatusUpdate};
pub use transporter::{TransportFactory, TransporterManager};

#[cfg(feature = "smtp")]
pub use transporter::SmtpTransportFactory;

// ============================================================================
// Global Dispatcher
// ============================================================================

/// Process-wide dispatcher - swappable for testing
static DISPATCHER: RwLock<Option<Dispatcher>> = RwLock::new(None);

/// Get or lazily build the global dispatcher from environment variables.
fn get_dispatcher() -> Result<Dispatcher, MailError> {
    // Fast path: already configured
    {
        let guard = DISPATCHER.read();
        if let Some(ref dispatcher) = *guard {
            return Ok(dispatcher.clone());
        }
    }

    // Slow path: build from env
    let mut guard = DISPATCHER.write();

    // Double-check after acquiring write lock
    if let Some(ref dispatcher) = *guard {
        return Ok(dispatcher.clone());
    }

    let dispatcher = Dispatcher::from_env()?;
    tracing::debug!(
        provider = dispatcher.status().provider.as_str(),
        "Email dispatcher initialized from environment"
    );
    *guard = Some(dispatcher.clone());
    Ok(dispatcher)
}

/// Initialize the global dispatcher from environment variables.
///
/// Optional: every global function initializes on first use. Call it at
/// startup to surface configuration problems early.
///
/// ```rust,ignore
/// // In main.rs
/// mailpace::init()?;
/// if !mailpace::verify_transporter().await {
///     tracing::warn!("Email transport is not reachable");
/// }
/// ```
pub fn init() -> Result<(), MailError> {
    get_dispatcher().map(|_| ())
}

/// Append a request to the global queue and return the new queue length.
///
/// Draining starts in the background if it is not already running. Fails only
/// when the global dispatcher cannot be built.
pub fn add_to_queue(request: SendRequest) -> Result<usize, MailError> {
    Ok(get_dispatcher()?.enqueue(request))
}

/// Send one email right away, bypassing the queue.
///
/// Delivery problems are reported in the returned outcome, never as `Err`.
///
/// ```rust,ignore
/// let outcome = mailpace::send_email("user@example.com", "Hello!", "<p>Hi</p>", None).await?;
/// if !outcome.success {
///     tracing::warn!("Password reset email not sent");
/// }
/// ```
pub async fn send_email(
    to: &str,
    subject: &str,
    html: &str,
    recipient_id: Option<&str>,
) -> Result<DeliveryOutcome, MailError> {
    let dispatcher = get_dispatcher()?;
    Ok(dispatcher.send_email(to, subject, html, recipient_id).await)
}

/// Snapshot of the global queue.
pub fn queue_status() -> Result<DispatcherStatus, MailError> {
    Ok(get_dispatcher()?.status())
}

/// Check that the active provider accepts connections. Never fails.
pub async fn verify_transporter() -> bool {
    match get_dispatcher() {
        Ok(dispatcher) => dispatcher.verify_transporter().await,
        Err(e) => {
            tracing::error!(error = %e, "Email dispatcher could not be initialized");
            false
        }
    }
}

// ============================================================================
// Manual Configuration (for testing or custom setups)
// ============================================================================

/// Replace the global dispatcher.
///
/// Items queued on the previous dispatcher stay with it.
///
/// ```rust,ignore
/// use mailpace::{configure, Dispatcher};
///
/// configure(Dispatcher::builder().transport_factory(factory).build()?);
/// ```
pub fn configure(dispatcher: Dispatcher) {
    let mut guard = DISPATCHER.write();
    *guard = Some(dispatcher);
}

/// Reset the global dispatcher (useful for tests).
///
/// The next global call re-initializes from env vars.
pub fn reset() {
    let mut guard = DISPATCHER.write();
    *guard = None;
}

/// The global dispatcher, if initialized.
pub fn dispatcher() -> Option<Dispatcher> {
    let guard = DISPATCHER.read();
    guard.as_ref().cloned()
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::Dispatcher;
    pub use crate::DispatcherStatus;
    pub use crate::MailError;
    pub use crate::Mailer;
    pub use crate::SendRequest;
    pub use crate::{add_to_queue, queue_status, send_email, verify_transporter};
    pub use crate::{DeliveryOutcome, DeliveryResult};
}
