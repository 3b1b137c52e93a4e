use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

/// Source of "now" in the organization's local zone.
///
/// Every component that reads the current time takes a `Clock`; nothing reads
/// the system time directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Wall-clock time in the organization's zone, without offset.
    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_local()
    }
}

/// Build a zone from minutes east of UTC. Out-of-range values fall back to UTC.
pub fn zone_from_minutes(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| {
            tracing::warn!(minutes, "utc offset out of range, using UTC");
            Utc.fix()
        })
}

/// Real time, projected into a fixed zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: FixedOffset,
}

impl SystemClock {
    pub fn new(zone: FixedOffset) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.zone)
    }
}

/// Real time shifted by a constant offset. Used to rehearse a day in staging.
#[derive(Debug, Clone, Copy)]
pub struct OffsetClock {
    inner: SystemClock,
    offset: Duration,
}

impl OffsetClock {
    pub fn new(zone: FixedOffset, offset: Duration) -> Self {
        Self {
            inner: SystemClock::new(zone),
            offset,
        }
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.inner.now() + self.offset
    }
}

/// Manually driven clock for deterministic tests. Stores unix ms.
#[derive(Debug)]
pub struct FixedClock {
    zone: FixedOffset,
    ms: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self {
            zone: *at.offset(),
            ms: AtomicI64::new(at.timestamp_millis()),
        }
    }

    /// Clock pinned to a local wall-clock time in `zone`.
    pub fn at_local(zone: FixedOffset, local: NaiveDateTime) -> Self {
        let at = zone
            .from_local_datetime(&local)
            .single()
            .unwrap_or_else(|| zone.from_utc_datetime(&local));
        Self::new(at)
    }

    pub fn set(&self, at: DateTime<FixedOffset>) {
        self.ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn set_local(&self, local: NaiveDateTime) {
        if let Some(at) = self.zone.from_local_datetime(&local).single() {
            self.set(at);
        }
    }

    pub fn advance(&self, by: Duration) {
        self.ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let ms = self.ms.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(ms)
            .unwrap_or_default()
            .with_timezone(&self.zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn local(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn fixed_clock_reports_local_wall_time() {
        let zone = zone_from_minutes(-300);
        let clock = FixedClock::at_local(zone, local(13, 59));
        assert_eq!(clock.local_now(), local(13, 59));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(clock.now().offset().local_minus_utc(), -300 * 60);
    }

    #[test]
    fn fixed_clock_advance_and_set() {
        let zone = zone_from_minutes(60);
        let clock = FixedClock::at_local(zone, local(9, 0));
        clock.advance(Duration::minutes(75));
        assert_eq!(clock.local_now(), local(10, 15));
        clock.set_local(local(23, 30));
        assert_eq!(clock.local_now(), local(23, 30));
        clock.advance(Duration::hours(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());
    }

    #[test]
    fn offset_clock_shifts_real_time() {
        let zone = zone_from_minutes(0);
        let real = SystemClock::new(zone);
        let shifted = OffsetClock::new(zone, Duration::hours(3));
        let before = real.now();
        let delta = shifted.now() - before;
        assert!(delta >= Duration::hours(3));
        assert!(delta < Duration::hours(3) + Duration::seconds(5));
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(zone_from_minutes(100_000).local_minus_utc(), 0);
        assert_eq!(zone_from_minutes(i32::MAX).local_minus_utc(), 0);
        assert_eq!(zone_from_minutes(i32::MIN).local_minus_utc(), 0);
    }
}
