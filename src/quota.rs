//! Daily send counter with lazy per-day reset.

use chrono::NaiveDate;

/// Counts successful sends for one calendar day.
///
/// The reset is lazy: it happens the first time the tracker is consulted on
/// a new day, so a midnight crossed while idle is only noticed on the next
/// dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTracker {
    daily_count: u32,
    last_reset_day: NaiveDate,
}

impl QuotaTracker {
    /// Start counting from zero on `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self::resume(today, 0)
    }

    /// Restore a counter saved earlier (e.g. before a restart).
    pub fn resume(day: NaiveDate, daily_count: u32) -> Self {
        Self {
            daily_count,
            last_reset_day: day,
        }
    }

    /// Zero the counter if `today` differs from the last reset day.
    ///
    /// Returns true when a reset happened.
    pub fn reset_if_new_day(&mut self, today: NaiveDate) -> bool {
        if today == self.last_reset_day {
            return false;
        }
        tracing::info!(
            previous_day = %self.last_reset_day,
            previous_count = self.daily_count,
            %today,
            "Resetting daily email counter"
        );
        self.daily_count = 0;
        self.last_reset_day = today;
        true
    }

    pub fn record_sent(&mut self) {
        self.daily_count = self.daily_count.saturating_add(1);
    }

    pub fn daily_count(&self) -> u32 {
        self.daily_count
    }

    pub fn last_reset_day(&self) -> NaiveDate {
        self.last_reset_day
    }
}
