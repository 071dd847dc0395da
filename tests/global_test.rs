//! Process-wide API tests.
//!
//! Everything lives in one test because the global dispatcher is shared by
//! all tests in this binary.

use chrono::NaiveDate;
use mailpace::providers::LocalMailer;
use mailpace::{
    Dispatcher, MailError, MailSettings, Mailer, ManualClock, ProviderKind, SendRequest,
    TransportFactory,
};
use std::sync::Arc;

#[tokio::test]
async fn global_api_uses_configured_dispatcher() {
    let local = LocalMailer::new();
    let shared = local.clone();
    let factory: Arc<dyn TransportFactory> = Arc::new(
        move |_: ProviderKind, _: &MailSettings| -> Result<Arc<dyn Mailer>, MailError> {
            Ok(Arc::new(shared.clone()))
        },
    );
    let mut settings = MailSettings::default();
    settings.gmail.user = "academy@gmail.com".into();

    mailpace::configure(
        Dispatcher::builder()
            .settings(settings)
            .transport_factory(factory)
            .clock(Arc::new(ManualClock::new(
                NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            )))
            .build()
            .unwrap(),
    );
    mailpace::init().unwrap();

    let len = mailpace::add_to_queue(SendRequest::new("a@example.com", "Queued", "<p>1</p>"))
        .unwrap();
    assert_eq!(len, 1);

    mailpace::dispatcher().unwrap().wait_idle().await;

    let status = mailpace::queue_status().unwrap();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.daily_count, 1);
    assert_eq!(status.provider, ProviderKind::Gmail);

    let outcome = mailpace::send_email("b@example.com", "Direct", "<p>2</p>", None)
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(mailpace::verify_transporter().await);

    assert_eq!(local.recipients(), vec!["a@example.com", "b@example.com"]);

    mailpace::reset();
    assert!(mailpace::dispatcher().is_none());
}
