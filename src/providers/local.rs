//! Local transporter for development and testing.
//!
//! Records every delivered email in memory, in delivery order, and can be
//! told to fail or panic so error paths can be exercised.
//!
//! ```rust,ignore
//! use mailpace::providers::LocalMailer;
//! use mailpace::{Email, Mailer};
//!
//! let mailer = LocalMailer::new();
//! mailer.deliver(&Email::new().from("a@b.test").to("c@d.test")).await?;
//! assert!(mailer.sent_to("c@d.test"));
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};

/// An email captured by [`LocalMailer`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Message ID handed back to the caller.
    pub id: String,
    pub email: Email,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LocalState {
    sent: Mutex<Vec<SentEmail>>,
    /// Failure returned by every delivery until cleared.
    fail_with: Mutex<Option<MailError>>,
    /// Failures returned by the next deliveries, one each.
    fail_next: Mutex<VecDeque<MailError>>,
    /// Recipient whose delivery panics.
    panic_for: Mutex<Option<String>>,
    verify_error: Mutex<Option<MailError>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// In-memory transporter. Clones share the same record.
#[derive(Debug, Clone)]
pub struct LocalMailer {
    state: Arc<LocalState>,
    provider: &'static str,
}

impl LocalMailer {
    /// Create a new local mailer reporting itself as "local".
    pub fn new() -> Self {
        Self::named("local")
    }

    /// Create a local mailer reporting a specific provider name.
    pub fn named(provider: &'static str) -> Self {
        Self {
            state: Arc::default(),
            provider,
        }
    }

    // =========================================================================
    // Failure Simulation (for testing)
    // =========================================================================

    /// Fail every delivery with `error` until [`clear_failure`](Self::clear_failure).
    pub fn set_failure(&self, error: MailError) {
        *self.state.fail_with.lock() = Some(error);
    }

    /// Clear the failure state.
    pub fn clear_failure(&self) {
        *self.state.fail_with.lock() = None;
        self.state.fail_next.lock().clear();
    }

    /// Fail only the next delivery with `error`. Calls queue up.
    pub fn fail_next(&self, error: MailError) {
        self.state.fail_next.lock().push_back(error);
    }

    /// Panic when delivering to `recipient`.
    pub fn panic_for(&self, recipient: impl Into<String>) {
        *self.state.panic_for.lock() = Some(recipient.into());
    }

    /// Make `verify()` fail with `error`.
    pub fn set_verify_failure(&self, error: MailError) {
        *self.state.verify_error.lock() = Some(error);
    }

    // =========================================================================
    // Email Access (for testing assertions)
    // =========================================================================

    /// All delivered emails, oldest first.
    pub fn emails(&self) -> Vec<SentEmail> {
        self.state.sent.lock().clone()
    }

    /// Recipient of each delivered email, oldest first.
    pub fn recipients(&self) -> Vec<String> {
        self.state
            .sent
            .lock()
            .iter()
            .filter_map(|sent| sent.email.to.first().map(|a| a.email.clone()))
            .collect()
    }

    pub fn email_count(&self) -> usize {
        self.state.sent.lock().len()
    }

    /// Deliveries attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of deliveries observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Check if an email was sent to a specific address.
    pub fn sent_to(&self, email: &str) -> bool {
        self.state.sent.lock().iter().any(|sent| {
            sent.email
                .to
                .iter()
                .any(|addr| addr.email.eq_ignore_ascii_case(email))
        })
    }

    fn planned_failure(&self) -> Option<MailError> {
        if let Some(error) = self.state.fail_next.lock().pop_front() {
            return Some(error);
        }
        self.state.fail_with.lock().clone()
    }
}

impl Default for LocalMailer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when a delivery ends, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.state.in_flight);
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Give concurrent callers a chance to overlap.
        tokio::task::yield_now().await;

        let panic_target = self.state.panic_for.lock().clone();
        if let Some(target) = panic_target {
            if email.to.iter().any(|a| a.email == target) {
                panic!("LocalMailer told to panic for {}", target);
            }
        }

        if let Some(error) = self.planned_failure() {
            return Err(error);
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.state.sent.lock().push(SentEmail {
            id: id.clone(),
            email: email.clone(),
            sent_at: Utc::now(),
        });
        Ok(DeliveryResult::new(id))
    }

    async fn verify(&self) -> Result<(), MailError> {
        match self.state.verify_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn provider_name(&self) -> &'static str {
        self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportFailure;

    fn email(to: &str) -> Email {
        Email::new()
            .from("noreply@academy.test")
            .to(to)
            .subject("Welcome")
    }

    #[tokio::test]
    async fn test_records_in_order() {
        let mailer = LocalMailer::new();
        mailer.deliver(&email("a@example.com")).await.unwrap();
        mailer.deliver(&email("b@example.com")).await.unwrap();

        assert_eq!(mailer.recipients(), vec!["a@example.com", "b@example.com"]);
        assert!(mailer.sent_to("B@example.com"));
        assert_eq!(mailer.attempts(), 2);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let mailer = LocalMailer::new();
        mailer.fail_next(MailError::transport(TransportFailure::Timeout, "slow"));

        assert!(mailer.deliver(&email("a@example.com")).await.is_err());
        assert!(mailer.deliver(&email("a@example.com")).await.is_ok());
        assert_eq!(mailer.email_count(), 1);
        assert_eq!(mailer.attempts(), 2);
    }

    #[tokio::test]
    async fn test_set_failure_until_cleared() {
        let mailer = LocalMailer::new();
        mailer.set_failure(MailError::SendError("down".into()));
        assert!(mailer.deliver(&email("a@example.com")).await.is_err());
        assert!(mailer.deliver(&email("a@example.com")).await.is_err());

        mailer.clear_failure();
        assert!(mailer.deliver(&email("a@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_clone_shares_record() {
        let mailer = LocalMailer::named("gmail");
        let cloned = mailer.clone();
        cloned.deliver(&email("a@example.com")).await.unwrap();

        assert_eq!(mailer.email_count(), 1);
        assert_eq!(cloned.provider_name(), "gmail");
    }

    #[tokio::test]
    async fn test_verify_failure() {
        let mailer = LocalMailer::new();
        assert!(mailer.verify().await.is_ok());
        mailer.set_verify_failure(MailError::transport(TransportFailure::Connection, "refused"));
        assert!(mailer.verify().await.is_err());
    }
}
