//! Configuration and provider profile tests.

use mailpace::{resolve_profile, DailyLimit, MailSettings, ProviderKind};
use std::collections::HashMap;

fn settings(vars: &[(&str, &str)]) -> MailSettings {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    MailSettings::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn gmail_is_the_fallback_provider() {
    let profile = resolve_profile(&settings(&[("GMAIL_USER", "academy@gmail.com")]));

    assert_eq!(profile.provider, ProviderKind::Gmail);
    assert_eq!(profile.daily_limit, DailyLimit::Limited(500));
    assert_eq!(profile.safe_daily_limit, DailyLimit::Limited(450));
    assert_eq!(profile.batch_size, 20);
    assert_eq!(profile.delay_between_emails_ms, 2000);
    assert_eq!(profile.delay_between_batches_ms, 60_000);
}

#[test]
fn ses_host_alone_selects_sandbox_ses() {
    let profile = resolve_profile(&settings(&[(
        "SES_SMTP_HOST",
        "email-smtp.eu-west-1.amazonaws.com",
    )]));

    assert_eq!(profile.provider, ProviderKind::Ses);
    assert!(profile.has_daily_limit());
    assert_eq!(profile.safe_daily_limit, DailyLimit::Limited(190));
    assert_eq!(profile.batch_size, 10);
    assert_eq!(profile.delay_between_emails_ms, 1000);
    assert_eq!(profile.delay_between_batches_ms, 10_000);
}

#[test]
fn sandbox_ignores_throughput_overrides() {
    let profile = resolve_profile(&settings(&[
        ("EMAIL_PROVIDER", "ses"),
        ("SES_BATCH_SIZE", "500"),
        ("SES_DELAY_BETWEEN_EMAILS_MS", "1"),
    ]));

    assert_eq!(profile.batch_size, 10);
    assert_eq!(profile.delay_between_emails_ms, 1000);
}

#[test]
fn production_ses_uses_overrides() {
    let profile = resolve_profile(&settings(&[
        ("EMAIL_PROVIDER", "SES"),
        ("SES_PRODUCTION", "true"),
        ("SES_RATE_LIMIT", "40"),
        ("SES_BATCH_SIZE", "250"),
        ("SES_DELAY_BETWEEN_EMAILS_MS", "25"),
        ("SES_DELAY_BETWEEN_BATCHES_MS", "500"),
    ]));

    assert_eq!(profile.provider, ProviderKind::Ses);
    assert!(!profile.has_daily_limit());
    assert_eq!(profile.remaining(1_000_000), None);
    assert_eq!(profile.rate_limit_per_second, 40);
    assert_eq!(profile.batch_size, 250);
    assert_eq!(profile.delay_between_emails_ms, 25);
    assert_eq!(profile.delay_between_batches_ms, 500);
}

#[test]
fn production_ses_defaults() {
    let profile = resolve_profile(&settings(&[
        ("EMAIL_PROVIDER", "ses"),
        ("SES_PRODUCTION", "1"),
        ("SES_BATCH_SIZE", "lots"),
    ]));

    assert_eq!(profile.rate_limit_per_second, 14);
    assert_eq!(profile.batch_size, 100);
    assert_eq!(profile.delay_between_emails_ms, 50);
    assert_eq!(profile.delay_between_batches_ms, 1000);
}

#[test]
fn sender_identity_per_provider() {
    let config = settings(&[
        ("EMAIL_FROM", "noreply@academy.test"),
        ("EMAIL_FROM_NAME", "Academy"),
        ("GMAIL_USER", "academy@gmail.com"),
        ("GMAIL_FROM_NAME", "Academy Gmail"),
    ]);

    let ses = ProviderKind::Ses.sender(&config);
    assert_eq!(ses.email, "noreply@academy.test");
    assert_eq!(ses.name.as_deref(), Some("Academy"));

    let gmail = ProviderKind::Gmail.sender(&config);
    assert_eq!(gmail.formatted(), "\"Academy Gmail\" <academy@gmail.com>");
}

#[test]
fn endpoint_debug_hides_password() {
    let config = settings(&[
        ("EMAIL_PROVIDER", "ses"),
        ("SES_REGION", "eu-central-1"),
        ("SES_SMTP_USER", "AKIAEXAMPLE"),
        ("SES_SMTP_PASSWORD", "super-secret"),
    ]);

    let endpoint = ProviderKind::Ses.endpoint(&config);
    assert_eq!(endpoint.host, "email-smtp.eu-central-1.amazonaws.com");
    assert_eq!(endpoint.port, 587);

    let debug = format!("{:?}", endpoint);
    assert!(debug.contains("AKIAEXAMPLE"));
    assert!(!debug.contains("super-secret"));
}
