//! Configuration snapshot read from environment-style key/value pairs.
//!
//! Reading never fails. Missing credentials stay empty so the transporter is
//! still constructed and the failure surfaces at send time; numeric values
//! that are missing or unparsable fall back to their defaults.

use std::env;

/// Default SES region used to derive the SMTP endpoint.
pub const DEFAULT_SES_REGION: &str = "us-east-1";
/// Default SMTP submission port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;
/// Gmail SMTP relay host.
pub const GMAIL_SMTP_HOST: &str = "smtp.gmail.com";

/// SES production throughput defaults.
pub const DEFAULT_SES_RATE_LIMIT: u32 = 14;
pub const DEFAULT_SES_BATCH_SIZE: usize = 100;
pub const DEFAULT_SES_DELAY_BETWEEN_EMAILS_MS: u64 = 50;
pub const DEFAULT_SES_DELAY_BETWEEN_BATCHES_MS: u64 = 1000;

/// Amazon SES settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SesSettings {
    /// Explicit SMTP host; its presence alone selects SES.
    pub host: Option<String>,
    pub region: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    /// Out of the SES sandbox.
    pub production: bool,
    pub rate_limit_per_second: u32,
    pub batch_size: usize,
    pub delay_between_emails_ms: u64,
    pub delay_between_batches_ms: u64,
}

impl SesSettings {
    /// SMTP host, explicit or derived from the region.
    pub fn smtp_host(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => format!("email-smtp.{}.amazonaws.com", self.region),
        }
    }
}

impl Default for SesSettings {
    fn default() -> Self {
        Self {
            host: None,
            region: DEFAULT_SES_REGION.to_string(),
            port: DEFAULT_SMTP_PORT,
            username: String::new(),
            password: String::new(),
            from_email: String::new(),
            from_name: String::new(),
            production: false,
            rate_limit_per_second: DEFAULT_SES_RATE_LIMIT,
            batch_size: DEFAULT_SES_BATCH_SIZE,
            delay_between_emails_ms: DEFAULT_SES_DELAY_BETWEEN_EMAILS_MS,
            delay_between_batches_ms: DEFAULT_SES_DELAY_BETWEEN_BATCHES_MS,
        }
    }
}

/// Gmail SMTP settings. The account address doubles as the sender address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GmailSettings {
    pub user: String,
    pub app_password: String,
    pub from_name: String,
}

/// Everything the dispatcher reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailSettings {
    /// Value of `EMAIL_PROVIDER`, lowercased.
    pub provider: Option<String>,
    pub ses: SesSettings,
    pub gmail: GmailSettings,
}

impl MailSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    ///
    /// ```
    /// use mailpace::MailSettings;
    ///
    /// let settings = MailSettings::from_lookup(|key| match key {
    ///     "EMAIL_PROVIDER" => Some("ses".into()),
    ///     "SES_PRODUCTION" => Some("true".into()),
    ///     _ => None,
    /// });
    /// assert!(settings.ses.production);
    /// assert_eq!(settings.ses.batch_size, 100);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let text = |key: &str| get(key).unwrap_or_default();
        let fallback = |key: &str, shared: &str| get(key).or_else(|| get(shared)).unwrap_or_default();

        let ses = SesSettings {
            host: get("SES_SMTP_HOST"),
            region: get("SES_REGION").unwrap_or_else(|| DEFAULT_SES_REGION.to_string()),
            port: parse_or(get("SES_SMTP_PORT"), DEFAULT_SMTP_PORT),
            username: text("SES_SMTP_USER"),
            password: text("SES_SMTP_PASSWORD"),
            from_email: fallback("SES_FROM_EMAIL", "EMAIL_FROM"),
            from_name: fallback("SES_FROM_NAME", "EMAIL_FROM_NAME"),
            production: get("SES_PRODUCTION").is_some_and(|v| is_truthy(&v)),
            rate_limit_per_second: parse_or(get("SES_RATE_LIMIT"), DEFAULT_SES_RATE_LIMIT),
            batch_size: parse_or(get("SES_BATCH_SIZE"), DEFAULT_SES_BATCH_SIZE),
            delay_between_emails_ms: parse_or(
                get("SES_DELAY_BETWEEN_EMAILS_MS"),
                DEFAULT_SES_DELAY_BETWEEN_EMAILS_MS,
            ),
            delay_between_batches_ms: parse_or(
                get("SES_DELAY_BETWEEN_BATCHES_MS"),
                DEFAULT_SES_DELAY_BETWEEN_BATCHES_MS,
            ),
        };

        let gmail = GmailSettings {
            user: text("GMAIL_USER"),
            app_password: text("GMAIL_APP_PASSWORD"),
            from_name: fallback("GMAIL_FROM_NAME", "EMAIL_FROM_NAME"),
        };

        Self {
            provider: get("EMAIL_PROVIDER").map(|p| p.to_lowercase()),
            ses,
            gmail,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "Ignoring unparsable numeric setting");
            default
        }),
        None => default,
    }
}
