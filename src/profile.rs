//! Provider selection and throughput policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::address::Address;
use crate::config::{MailSettings, GMAIL_SMTP_HOST, DEFAULT_SMTP_PORT};

/// The outbound mail provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ses,
    Gmail,
}

impl ProviderKind {
    /// Stable lowercase name, used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ses => "ses",
            Self::Gmail => "gmail",
        }
    }

    /// Pick the provider: SES when selected explicitly or when an SES host is set.
    pub fn select(settings: &MailSettings) -> Self {
        if settings.provider.as_deref() == Some("ses") || settings.ses.host.is_some() {
            Self::Ses
        } else {
            Self::Gmail
        }
    }

    /// Sender identity configured for this provider.
    pub fn sender(&self, settings: &MailSettings) -> Address {
        match self {
            Self::Ses => Address::with_name(&settings.ses.from_name, &settings.ses.from_email),
            Self::Gmail => Address::with_name(&settings.gmail.from_name, &settings.gmail.user),
        }
    }

    /// SMTP endpoint and credentials for this provider.
    pub fn endpoint(&self, settings: &MailSettings) -> SmtpEndpoint {
        match self {
            Self::Ses => SmtpEndpoint {
                host: settings.ses.smtp_host(),
                port: settings.ses.port,
                username: settings.ses.username.clone(),
                password: settings.ses.password.clone(),
            },
            Self::Gmail => SmtpEndpoint {
                host: GMAIL_SMTP_HOST.to_string(),
                port: DEFAULT_SMTP_PORT,
                username: settings.gmail.user.clone(),
                password: settings.gmail.app_password.clone(),
            },
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to connect for a provider.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SmtpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Daily volume cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DailyLimit {
    Unbounded,
    Limited(u32),
}

impl DailyLimit {
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited(_))
    }
}

/// Throughput policy for the active provider.
///
/// Derived from configuration on every use; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderProfile {
    pub provider: ProviderKind,
    /// Hard cap imposed by the provider.
    pub daily_limit: DailyLimit,
    /// Cap the dispatcher actually stops at; always at or below `daily_limit`.
    pub safe_daily_limit: DailyLimit,
    pub rate_limit_per_second: u32,
    pub batch_size: usize,
    pub delay_between_emails_ms: u64,
    pub delay_between_batches_ms: u64,
}

impl ProviderProfile {
    /// SES outside the sandbox.
    fn ses_production(settings: &MailSettings) -> Self {
        Self {
            provider: ProviderKind::Ses,
            daily_limit: DailyLimit::Unbounded,
            safe_daily_limit: DailyLimit::Unbounded,
            rate_limit_per_second: settings.ses.rate_limit_per_second.max(1),
            batch_size: settings.ses.batch_size.max(1),
            delay_between_emails_ms: settings.ses.delay_between_emails_ms,
            delay_between_batches_ms: settings.ses.delay_between_batches_ms,
        }
    }

    /// SES sandbox: 200/day, 1/s.
    fn ses_sandbox() -> Self {
        Self {
            provider: ProviderKind::Ses,
            daily_limit: DailyLimit::Limited(200),
            safe_daily_limit: DailyLimit::Limited(190),
            rate_limit_per_second: 1,
            batch_size: 10,
            delay_between_emails_ms: 1000,
            delay_between_batches_ms: 10_000,
        }
    }

    /// Gmail: 500/day for regular accounts.
    fn gmail() -> Self {
        Self {
            provider: ProviderKind::Gmail,
            daily_limit: DailyLimit::Limited(500),
            safe_daily_limit: DailyLimit::Limited(450),
            rate_limit_per_second: 1,
            batch_size: 20,
            delay_between_emails_ms: 2000,
            delay_between_batches_ms: 60_000,
        }
    }

    pub fn has_daily_limit(&self) -> bool {
        self.safe_daily_limit.is_limited()
    }

    /// Sends left today, or `None` when unbounded.
    pub fn remaining(&self, daily_count: u32) -> Option<u32> {
        match self.safe_daily_limit {
            DailyLimit::Unbounded => None,
            DailyLimit::Limited(limit) => Some(limit.saturating_sub(daily_count)),
        }
    }

    /// Batch size capped by remaining quota.
    pub fn effective_batch_size(&self, daily_count: u32) -> usize {
        match self.remaining(daily_count) {
            Some(remaining) => self.batch_size.min(remaining as usize),
            None => self.batch_size,
        }
    }

    pub fn delay_between_emails(&self) -> Duration {
        Duration::from_millis(self.delay_between_emails_ms)
    }

    pub fn delay_between_batches(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }
}

/// Resolve the active provider and its throughput policy. Pure.
pub fn resolve_profile(settings: &MailSettings) -> ProviderProfile {
    match ProviderKind::select(settings) {
        ProviderKind::Ses if settings.ses.production => ProviderProfile::ses_production(settings),
        ProviderKind::Ses => ProviderProfile::ses_sandbox(),
        ProviderKind::Gmail => ProviderProfile::gmail(),
    }
}
