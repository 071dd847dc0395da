//! Cached, provider-bound transporter handle.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::MailSettings;
use crate::error::MailError;
use crate::mailer::Mailer;
use crate::profile::ProviderKind;

/// Builds a transporter for a provider.
///
/// Construction should not validate credentials: a transporter built from
/// missing credentials is expected to fail when it sends.
///
/// Closures work too:
///
/// ```rust,ignore
/// let factory = |kind: ProviderKind, _: &MailSettings| -> Result<Arc<dyn Mailer>, MailError> {
///     Ok(Arc::new(LocalMailer::named(kind.as_str())))
/// };
/// ```
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        provider: ProviderKind,
        settings: &MailSettings,
    ) -> Result<Arc<dyn Mailer>, MailError>;
}

impl<F> TransportFactory for F
where
    F: Fn(ProviderKind, &MailSettings) -> Result<Arc<dyn Mailer>, MailError> + Send + Sync,
{
    fn build(
        &self,
        provider: ProviderKind,
        settings: &MailSettings,
    ) -> Result<Arc<dyn Mailer>, MailError> {
        (self)(provider, settings)
    }
}

/// Builds [`SmtpMailer`](crate::providers::SmtpMailer)s for SES and Gmail.
#[cfg(feature = "smtp")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransportFactory;

#[cfg(feature = "smtp")]
impl TransportFactory for SmtpTransportFactory {
    fn build(
        &self,
        provider: ProviderKind,
        settings: &MailSettings,
    ) -> Result<Arc<dyn Mailer>, MailError> {
        let endpoint = provider.endpoint(settings);
        if endpoint.username.is_empty() || endpoint.password.is_empty() {
            tracing::warn!(
                provider = provider.as_str(),
                host = %endpoint.host,
                "SMTP credentials missing; sends will fail until they are configured"
            );
        }

        let mut builder = crate::providers::SmtpMailer::new(&endpoint.host, endpoint.port)
            .tls(crate::providers::TlsMode::for_port(endpoint.port))
            .provider(provider.as_str());
        if !endpoint.username.is_empty() {
            builder = builder.credentials(&endpoint.username, &endpoint.password);
        }
        Ok(Arc::new(builder.build()))
    }
}

struct CachedTransporter {
    provider: ProviderKind,
    mailer: Arc<dyn Mailer>,
}

/// Owns the single cached transporter.
///
/// The handle is reused only while the resolved provider matches the one it
/// was built for; any mismatch disposes it and builds a new one.
pub struct TransporterManager {
    factory: Arc<dyn TransportFactory>,
    cached: Mutex<Option<CachedTransporter>>,
}

impl TransporterManager {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached transporter, rebuilding it if the provider changed.
    pub fn get(&self, settings: &MailSettings) -> Result<Arc<dyn Mailer>, MailError> {
        let provider = ProviderKind::select(settings);
        let mut cached = self.cached.lock();

        if let Some(ref current) = *cached {
            if current.provider == provider {
                return Ok(Arc::clone(&current.mailer));
            }
            tracing::info!(
                from = current.provider.as_str(),
                to = provider.as_str(),
                "Email provider changed; disposing transporter"
            );
        }
        // Drop the old handle before building its replacement.
        *cached = None;

        tracing::debug!(provider = provider.as_str(), "Creating transporter");
        let mailer = self.factory.build(provider, settings)?;
        *cached = Some(CachedTransporter {
            provider,
            mailer: Arc::clone(&mailer),
        });
        Ok(mailer)
    }

    /// Dispose the cached transporter unconditionally.
    pub fn reset(&self) {
        if let Some(old) = self.cached.lock().take() {
            tracing::debug!(provider = old.provider.as_str(), "Transporter reset");
        }
    }

    /// Provider the cached handle was built for, if any.
    pub fn cached_provider(&self) -> Option<ProviderKind> {
        self.cached.lock().as_ref().map(|c| c.provider)
    }

    /// Ask the current transporter to confirm connectivity. Never fails.
    pub async fn verify(&self, settings: &MailSettings) -> bool {
        let provider = ProviderKind::select(settings);
        let mailer = match self.get(settings) {
            Ok(mailer) => mailer,
            Err(e) => {
                tracing::error!(provider = provider.as_str(), error = %e, "Transporter could not be created");
                return false;
            }
        };

        match mailer.verify().await {
            Ok(()) => {
                tracing::info!(provider = provider.as_str(), "Transporter verified");
                true
            }
            Err(e) => {
                tracing::error!(provider = provider.as_str(), error = %e, "Transporter verification failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LocalMailer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(count: Arc<AtomicUsize>) -> Arc<dyn TransportFactory> {
        Arc::new(
            move |kind: ProviderKind, _: &MailSettings| -> Result<Arc<dyn Mailer>, MailError> {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(LocalMailer::named(kind.as_str())))
            },
        )
    }

    fn ses_settings() -> MailSettings {
        MailSettings {
            provider: Some("ses".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_reuses_handle_for_same_provider() {
        let count = Arc::new(AtomicUsize::new(0));
        let manager = TransporterManager::new(counting_factory(Arc::clone(&count)));

        let first = manager.get(&MailSettings::default()).unwrap();
        let second = manager.get(&MailSettings::default()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(manager.cached_provider(), Some(ProviderKind::Gmail));
    }

    #[test]
    fn test_rebuilds_on_provider_change() {
        let count = Arc::new(AtomicUsize::new(0));
        let manager = TransporterManager::new(counting_factory(Arc::clone(&count)));

        let gmail = manager.get(&MailSettings::default()).unwrap();
        let ses = manager.get(&ses_settings()).unwrap();

        assert!(!Arc::ptr_eq(&gmail, &ses));
        assert_eq!(ses.provider_name(), "ses");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(manager.cached_provider(), Some(ProviderKind::Ses));
    }

    #[test]
    fn test_reset_forces_rebuild() {
        let count = Arc::new(AtomicUsize::new(0));
        let manager = TransporterManager::new(counting_factory(Arc::clone(&count)));

        manager.get(&MailSettings::default()).unwrap();
        manager.reset();
        assert_eq!(manager.cached_provider(), None);

        manager.get(&MailSettings::default()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_factory_error_leaves_cache_empty() {
        let factory: Arc<dyn TransportFactory> = Arc::new(
            |_: ProviderKind, _: &MailSettings| -> Result<Arc<dyn Mailer>, MailError> {
                Err(MailError::Configuration("no host".into()))
            },
        );
        let manager = TransporterManager::new(factory);
        assert!(manager.get(&MailSettings::default()).is_err());
        assert_eq!(manager.cached_provider(), None);
    }

    #[tokio::test]
    async fn test_verify_never_fails() {
        let local = LocalMailer::new();
        local.set_verify_failure(MailError::SendError("auth rejected".into()));
        let shared = local.clone();
        let factory: Arc<dyn TransportFactory> = Arc::new(
            move |_: ProviderKind, _: &MailSettings| -> Result<Arc<dyn Mailer>, MailError> {
                Ok(Arc::new(shared.clone()))
            },
        );
        let manager = TransporterManager::new(factory);

        assert!(!manager.verify(&MailSettings::default()).await);
    }

    #[cfg(feature = "smtp")]
    #[tokio::test]
    async fn test_smtp_factory_builds_without_credentials() {
        let mailer = SmtpTransportFactory
            .build(ProviderKind::Gmail, &MailSettings::default())
            .unwrap();
        assert_eq!(mailer.provider_name(), "gmail");
    }

    #[cfg(feature = "smtp")]
    #[tokio::test]
    async fn test_smtp_factory_builds_implicit_tls_for_port_465() {
        let mut settings = ses_settings();
        settings.ses.port = 465;
        settings.ses.username = "AKIAEXAMPLE".into();
        settings.ses.password = "secret".into();

        let mailer = SmtpTransportFactory
            .build(ProviderKind::Ses, &settings)
            .unwrap();
        assert_eq!(mailer.provider_name(), "ses");
    }
}
