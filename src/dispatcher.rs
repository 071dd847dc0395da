//! Queue-draining service.
//!
//! A [`Dispatcher`] owns the pending queue, the daily counter and the cached
//! transporter. [`Dispatcher::enqueue`] appends and, when no drain is running,
//! starts one in the background. A drain takes quota-bounded batches off the
//! head of the queue, paces deliveries inside a batch and sleeps between
//! batches until the queue is empty or today's safe limit is reached. At most
//! one drain runs at a time.
//!
//! # Example
//!
//! ```rust,ignore
//! use mailpace::{Dispatcher, SendRequest};
//!
//! let dispatcher = Dispatcher::from_env()?;
//! dispatcher.enqueue(
//!     SendRequest::new("learner@example.com", "Welcome", "<p>Hello</p>").recipient_id("rec-42"),
//! );
//! ```

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::clock::{Clock, SystemClock};
use crate::config::MailSettings;
use crate::error::MailError;
use crate::executor::{DeliveryExecutor, DeliveryOutcome};
use crate::profile::{resolve_profile, ProviderKind, ProviderProfile};
use crate::queue::{QueueStore, SendRequest};
use crate::quota::QuotaTracker;
use crate::status::{NoopStatusStore, StatusStore};
use crate::transporter::{TransportFactory, TransporterManager};

/// What to do with an item whose delivery failed with a throttling-like error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransientPolicy {
    /// Log and drop it. The caller sees nothing unless it tracks status.
    #[default]
    Drop,
    /// Append it to the queue tail until it has been tried `max_attempts` times.
    Requeue { max_attempts: u32 },
}

/// Why a drain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QueueEmpty,
    QuotaExhausted,
    /// Another drain was already running; nothing was done.
    AlreadyDraining,
}

/// Summary of one drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
    pub requeued: usize,
    pub batches: usize,
    /// Items still queued when the drain stopped.
    pub remaining: usize,
    pub stop: StopReason,
}

impl DrainReport {
    fn new(stop: StopReason) -> Self {
        Self {
            sent: 0,
            failed: 0,
            requeued: 0,
            batches: 0,
            remaining: 0,
            stop,
        }
    }
}

/// Read-only snapshot for introspection endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub queue_length: usize,
    pub is_draining: bool,
    pub daily_count: u32,
    pub provider: ProviderKind,
}

struct State {
    queue: QueueStore,
    quota: QuotaTracker,
}

struct Inner {
    state: Mutex<State>,
    draining: AtomicBool,
    idle: Notify,
    settings: RwLock<Arc<MailSettings>>,
    executor: DeliveryExecutor,
    clock: Arc<dyn Clock>,
    transient_policy: TransientPolicy,
    auto_drain: bool,
}

/// Holds the drain flag; clears it when released or dropped.
struct DrainGuard {
    inner: Arc<Inner>,
    released: bool,
}

impl DrainGuard {
    fn try_acquire(inner: &Arc<Inner>) -> Option<Self> {
        inner
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                inner: Arc::clone(inner),
                released: false,
            })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.draining.store(false, Ordering::SeqCst);
            self.inner.idle.notify_waiters();
        }
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// The dispatch service. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Build with settings from the environment and the SMTP transporter.
    pub fn from_env() -> Result<Self, MailError> {
        Self::builder().settings(MailSettings::from_env()).build()
    }

    /// Append a request and start a drain if none is running.
    ///
    /// Returns the new queue length. Never waits for delivery.
    pub fn enqueue(&self, request: SendRequest) -> usize {
        let (len, guard) = {
            let mut state = self.inner.state.lock();
            let len = state.queue.push(request);
            let guard = if self.inner.auto_drain {
                DrainGuard::try_acquire(&self.inner)
            } else {
                None
            };
            (len, guard)
        };
        tracing::debug!(queue_length = len, "Email queued");

        if let Some(guard) = guard {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let inner = Arc::clone(&self.inner);
                    handle.spawn(async move {
                        let report = inner.run(guard).await;
                        tracing::debug!(?report, "Drain finished");
                    });
                }
                Err(_) => {
                    tracing::warn!("No tokio runtime; queued email waits for the next drain");
                }
            }
        }
        len
    }

    /// Run one drain to completion on the current task.
    ///
    /// Returns immediately with [`StopReason::AlreadyDraining`] if a drain is
    /// in progress.
    pub async fn drain_once(&self) -> DrainReport {
        match DrainGuard::try_acquire(&self.inner) {
            Some(guard) => Arc::clone(&self.inner).run(guard).await,
            None => {
                let mut report = DrainReport::new(StopReason::AlreadyDraining);
                report.remaining = self.inner.state.lock().queue.len();
                report
            }
        }
    }

    /// Resolves once no drain is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            if !self.inner.draining.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    pub fn status(&self) -> DispatcherStatus {
        let provider = ProviderKind::select(&self.settings());
        let state = self.inner.state.lock();
        DispatcherStatus {
            queue_length: state.queue.len(),
            is_draining: self.inner.draining.load(Ordering::SeqCst),
            daily_count: state.quota.daily_count(),
            provider,
        }
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Pending requests, head first.
    pub fn pending(&self) -> Vec<SendRequest> {
        self.inner.state.lock().queue.pending()
    }

    /// Snapshot of the daily counter, e.g. for persisting across restarts.
    pub fn quota(&self) -> QuotaTracker {
        self.inner.state.lock().quota.clone()
    }

    /// Throughput policy for the current settings.
    pub fn profile(&self) -> ProviderProfile {
        resolve_profile(&self.settings())
    }

    pub fn settings(&self) -> Arc<MailSettings> {
        Arc::clone(&self.inner.settings.read())
    }

    /// Swap the configuration. A provider change is picked up by the next send.
    pub fn update_settings(&self, settings: MailSettings) {
        *self.inner.settings.write() = Arc::new(settings);
    }

    /// Re-read configuration from the environment.
    pub fn reload_from_env(&self) {
        self.update_settings(MailSettings::from_env());
    }

    /// Send immediately, bypassing the queue and the daily counter.
    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        recipient_id: Option<&str>,
    ) -> DeliveryOutcome {
        let settings = self.settings();
        self.inner
            .executor
            .send_email(&settings, to, subject, html, recipient_id)
            .await
    }

    /// Check that the active provider accepts connections. Never fails.
    pub async fn verify_transporter(&self) -> bool {
        let settings = self.settings();
        self.inner.executor.transporters().verify(&settings).await
    }

    /// Dispose the cached transporter; the next send builds a fresh one.
    pub fn reset_transporter(&self) {
        self.inner.executor.transporters().reset();
    }
}

impl Inner {
    async fn run(self: Arc<Self>, mut guard: DrainGuard) -> DrainReport {
        let settings = Arc::clone(&self.settings.read());
        let profile = resolve_profile(&settings);
        let mut report = DrainReport::new(StopReason::QueueEmpty);

        {
            let mut state = self.state.lock();
            state.quota.reset_if_new_day(self.clock.today());
        }

        loop {
            let batch = {
                let mut state = self.state.lock();
                state.quota.reset_if_new_day(self.clock.today());

                // Release while holding the lock so a concurrent enqueue either
                // lands in this drain or starts the next one.
                if state.queue.is_empty() {
                    report.stop = StopReason::QueueEmpty;
                    guard.release();
                    break;
                }
                let size = profile.effective_batch_size(state.quota.daily_count());
                if size == 0 {
                    tracing::warn!(
                        provider = profile.provider.as_str(),
                        daily_count = state.quota.daily_count(),
                        queued = state.queue.len(),
                        "Daily email limit reached; pausing queue"
                    );
                    #[cfg(feature = "metrics")]
                    metrics::counter!("mailpace_quota_exhausted_total", "provider" => profile.provider.as_str())
                        .increment(1);
                    report.stop = StopReason::QuotaExhausted;
                    guard.release();
                    break;
                }
                state.queue.take_batch(size)
            };

            report.batches += 1;
            tracing::info!(
                provider = profile.provider.as_str(),
                batch_size = batch.len(),
                "Processing email batch"
            );
            #[cfg(feature = "metrics")]
            {
                metrics::counter!("mailpace_batch_total", "provider" => profile.provider.as_str())
                    .increment(1);
                metrics::histogram!("mailpace_batch_size", "provider" => profile.provider.as_str())
                    .record(batch.len() as f64);
            }

            let last = batch.len() - 1;
            for (i, mut request) in batch.into_iter().enumerate() {
                request.attempts += 1;
                match self.deliver_isolated(&settings, &request).await {
                    Some(outcome) if outcome.success => {
                        report.sent += 1;
                        self.state.lock().quota.record_sent();
                    }
                    Some(outcome) if outcome.is_rate_limited() => {
                        if self.requeue(request) {
                            report.requeued += 1;
                        } else {
                            report.failed += 1;
                        }
                    }
                    _ => report.failed += 1,
                }

                if i < last {
                    self.clock.sleep(profile.delay_between_emails()).await;
                }
            }

            let more = {
                let state = self.state.lock();
                !state.queue.is_empty() && profile.remaining(state.quota.daily_count()) != Some(0)
            };
            if more {
                tracing::debug!(
                    delay_ms = profile.delay_between_batches_ms,
                    "Waiting before next batch"
                );
                self.clock.sleep(profile.delay_between_batches()).await;
            }
        }

        report.remaining = self.state.lock().queue.len();
        tracing::info!(
            sent = report.sent,
            failed = report.failed,
            requeued = report.requeued,
            remaining = report.remaining,
            stop = ?report.stop,
            "Email queue drain stopped"
        );
        report
    }

    /// Deliver on its own task so a panic costs one item, not the drain.
    async fn deliver_isolated(
        &self,
        settings: &Arc<MailSettings>,
        request: &SendRequest,
    ) -> Option<DeliveryOutcome> {
        let executor = self.executor.clone();
        let settings = Arc::clone(settings);
        let item = request.clone();

        let handle = tokio::spawn(async move {
            executor
                .send_email(
                    &settings,
                    &item.to,
                    &item.subject,
                    &item.html,
                    item.recipient_id.as_deref(),
                )
                .await
        });

        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(to = %request.to, error = %e, "Email delivery task failed");
                None
            }
        }
    }

    /// Apply the transient policy. Returns true if the item went back on the queue.
    fn requeue(&self, request: SendRequest) -> bool {
        match self.transient_policy {
            TransientPolicy::Requeue { max_attempts } if request.attempts < max_attempts => {
                tracing::info!(
                    to = %request.to,
                    attempts = request.attempts,
                    "Requeueing rate-limited email"
                );
                self.state.lock().queue.push(request);
                true
            }
            _ => {
                tracing::warn!(
                    to = %request.to,
                    attempts = request.attempts,
                    "Dropping rate-limited email"
                );
                false
            }
        }
    }
}

/// Builder for [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    settings: Option<MailSettings>,
    factory: Option<Arc<dyn TransportFactory>>,
    status_store: Option<Arc<dyn StatusStore>>,
    clock: Option<Arc<dyn Clock>>,
    quota: Option<QuotaTracker>,
    transient_policy: TransientPolicy,
    manual_drain: bool,
}

impl DispatcherBuilder {
    /// Configuration snapshot. Defaults to [`MailSettings::from_env`].
    pub fn settings(mut self, settings: MailSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// How transporters are built. Defaults to SMTP.
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Where per-recipient outcomes go. Defaults to [`NoopStatusStore`].
    pub fn status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.status_store = Some(store);
        self
    }

    /// Date source and pacing sleeps. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed the daily counter, e.g. from a value saved before a restart.
    pub fn quota(mut self, quota: QuotaTracker) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn transient_policy(mut self, policy: TransientPolicy) -> Self {
        self.transient_policy = policy;
        self
    }

    /// Don't start a drain on enqueue; the owner calls
    /// [`Dispatcher::drain_once`] itself, e.g. from a scheduled job.
    pub fn manual_drain(mut self) -> Self {
        self.manual_drain = true;
        self
    }

    pub fn build(self) -> Result<Dispatcher, MailError> {
        let factory = match self.factory {
            Some(factory) => factory,
            None => default_factory()?,
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let today: NaiveDate = clock.today();
        let settings = self.settings.unwrap_or_else(MailSettings::from_env);
        let status_store = self
            .status_store
            .unwrap_or_else(|| Arc::new(NoopStatusStore));

        let executor = DeliveryExecutor::new(Arc::new(TransporterManager::new(factory)), status_store);

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: QueueStore::new(),
                    quota: self.quota.unwrap_or_else(|| QuotaTracker::new(today)),
                }),
                draining: AtomicBool::new(false),
                idle: Notify::new(),
                settings: RwLock::new(Arc::new(settings)),
                executor,
                clock,
                transient_policy: self.transient_policy,
                auto_drain: !self.manual_drain,
            }),
        })
    }
}

#[cfg(feature = "smtp")]
fn default_factory() -> Result<Arc<dyn TransportFactory>, MailError> {
    Ok(Arc::new(crate::transporter::SmtpTransportFactory))
}

#[cfg(not(feature = "smtp"))]
fn default_factory() -> Result<Arc<dyn TransportFactory>, MailError> {
    Err(MailError::Configuration(
        "No transport factory set and the 'smtp' feature is not enabled. \
        Add `features = [\"smtp\"]` to Cargo.toml or call transport_factory()"
            .into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mailer::Mailer;
    use crate::providers::LocalMailer;

    fn dispatcher(local: &LocalMailer) -> Dispatcher {
        let shared = local.clone();
        let factory: Arc<dyn TransportFactory> = Arc::new(
            move |_: ProviderKind, _: &MailSettings| -> Result<Arc<dyn Mailer>, MailError> {
                Ok(Arc::new(shared.clone()))
            },
        );
        let mut settings = MailSettings::default();
        settings.gmail.user = "academy@gmail.com".into();

        Dispatcher::builder()
            .settings(settings)
            .transport_factory(factory)
            .clock(Arc::new(ManualClock::new(
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            )))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_drain_on_empty_queue() {
        let dispatcher = dispatcher(&LocalMailer::new());
        let report = dispatcher.drain_once().await;
        assert_eq!(report.stop, StopReason::QueueEmpty);
        assert_eq!(report.batches, 0);
        assert!(!dispatcher.is_draining());
    }

    #[tokio::test]
    async fn test_drain_once_reports_already_draining() {
        let local = LocalMailer::new();
        let dispatcher = dispatcher(&local);
        let _guard = DrainGuard::try_acquire(&dispatcher.inner).unwrap();

        let report = dispatcher.drain_once().await;
        assert_eq!(report.stop, StopReason::AlreadyDraining);
        assert_eq!(local.attempts(), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let dispatcher = dispatcher(&LocalMailer::new());
        {
            let _guard = DrainGuard::try_acquire(&dispatcher.inner).unwrap();
            assert!(dispatcher.is_draining());
            assert!(DrainGuard::try_acquire(&dispatcher.inner).is_none());
        }
        assert!(!dispatcher.is_draining());
    }

    #[test]
    fn test_enqueue_without_runtime_keeps_item() {
        let dispatcher = dispatcher(&LocalMailer::new());
        let len = dispatcher.enqueue(SendRequest::new("a@example.com", "s", "h"));
        assert_eq!(len, 1);
        assert!(!dispatcher.is_draining());
        assert_eq!(dispatcher.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let dispatcher = dispatcher(&LocalMailer::new());
        let status = dispatcher.status();
        assert_eq!(
            status,
            DispatcherStatus {
                queue_length: 0,
                is_draining: false,
                daily_count: 0,
                provider: ProviderKind::Gmail,
            }
        );
        assert_eq!(
            serde_json::to_value(&status).unwrap()["provider"],
            serde_json::json!("gmail")
        );
    }
}
