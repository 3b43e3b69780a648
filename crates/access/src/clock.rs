//! Clock and quota-day calendar
//!
//! The quota day is the 24-hour accounting window for daily AI-call limits,
//! bounded by local midnight in a fixed timezone. The reference deployment
//! runs on East Africa Time (UTC+3), which has no daylight saving, so the
//! boundary math is a pure function of the configured offset.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Utc};

/// Source of the current instant. Injected so tests can cross day
/// boundaries without sleeping.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Quota-day boundary math for a fixed local timezone.
#[derive(Debug, Clone, Copy)]
pub struct QuotaCalendar {
    offset: FixedOffset,
}

impl QuotaCalendar {
    pub const DEFAULT_OFFSET_HOURS: i32 = 3;

    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Calendar for a whole-hour UTC offset. Returns `None` for offsets
    /// outside the valid range (±24h).
    pub fn from_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours * 3600).map(Self::new)
    }

    /// Stable identifier for the quota day containing `now`, e.g.
    /// `2026-08-05`. Used as the counter key component.
    pub fn quota_day_key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string()
    }

    /// The most recent local-midnight boundary at or before `now`.
    pub fn quota_day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_midnight = now
            .with_timezone(&self.offset)
            .date_naive()
            .and_time(NaiveTime::MIN);
        // Fixed offsets have no gaps or folds, so the mapping is single.
        local_midnight
            .and_local_timezone(self.offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
    }

    /// The next local-midnight boundary strictly after `now`.
    pub fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.quota_day_start(now) + Duration::days(1)
    }

    /// Time remaining until the next local-midnight boundary.
    pub fn until_next_reset(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next_reset(now) - now).to_std().unwrap_or_default()
    }
}

impl Default for QuotaCalendar {
    fn default() -> Self {
        // East Africa Time; east_opt only fails outside ±24h.
        Self::from_offset_hours(Self::DEFAULT_OFFSET_HOURS).unwrap_or_else(|| Self::new(Utc.fix()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn day_key_follows_local_midnight_not_utc() {
        let calendar = QuotaCalendar::default();
        // 20:59:59Z is 23:59:59 EAT; 21:00:01Z is 00:00:01 EAT the next day.
        assert_eq!(
            calendar.quota_day_key(utc("2026-03-01T20:59:59Z")),
            "2026-03-01"
        );
        assert_eq!(
            calendar.quota_day_key(utc("2026-03-01T21:00:01Z")),
            "2026-03-02"
        );
    }

    #[test]
    fn day_start_is_local_midnight_in_utc() {
        let calendar = QuotaCalendar::default();
        let start = calendar.quota_day_start(utc("2026-03-01T10:00:00Z"));
        assert_eq!(start, utc("2026-02-28T21:00:00Z"));
    }

    #[test]
    fn until_next_reset_counts_down_to_the_boundary() {
        let calendar = QuotaCalendar::default();
        let wait = calendar.until_next_reset(utc("2026-03-01T20:59:30Z"));
        assert_eq!(wait.as_secs(), 30);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(utc("2026-03-01T10:00:00Z"));
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now_utc(), utc("2026-03-01T12:00:00Z"));
    }
}
