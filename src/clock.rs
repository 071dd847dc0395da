//! Calendar date and pacing delays, injectable for tests.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Source of "today" and of the dispatcher's pacing sleeps.
#[async_trait]
pub trait Clock: Send + Sync {
    /// The current local calendar day.
    fn today(&self) -> NaiveDate;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the local timezone and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test clock: the date is set by hand and sleeps return immediately.
///
/// Every requested sleep is recorded so tests can assert on pacing.
///
/// ```
/// use chrono::NaiveDate;
/// use mailpace::ManualClock;
///
/// let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
/// clock.advance_days(1);
/// assert_eq!(clock.today_date().to_string(), "2024-03-02");
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    today: NaiveDate,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                today,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn today_date(&self) -> NaiveDate {
        self.state.lock().today
    }

    pub fn set_today(&self, today: NaiveDate) {
        self.state.lock().today = today;
    }

    pub fn advance_days(&self, days: u64) {
        let mut state = self.state.lock();
        state.today = state.today + chrono::Days::new(days);
    }

    /// All sleeps requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    /// Sum of all requested sleeps.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        self.today_date()
    }

    async fn sleep(&self, duration: Duration) {
        self.state.lock().sleeps.push(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        clock.sleep(Duration::from_millis(5)).await;
        clock.sleep(Duration::from_millis(10)).await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(5), Duration::from_millis(10)]
        );
        assert_eq!(clock.elapsed(), Duration::from_millis(15));
    }

    #[test]
    fn test_advance_crosses_month() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_sleeps() {
        let start = tokio::time::Instant::now();
        SystemClock.sleep(Duration::from_secs(60)).await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
