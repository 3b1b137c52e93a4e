use chrono::NaiveTime;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Seats left in `slot_id` on the day. A missing day means nobody booked yet.
pub(crate) fn available(day: Option<&CafeteriaDay>, slot_id: u32, capacity: u32) -> u32 {
    let held = day.map_or(0, |d| d.holding(slot_id));
    capacity.saturating_sub(u32::try_from(held).unwrap_or(u32::MAX))
}

/// Reject before the daily cutoff, reporting whole minutes left (rounded up).
pub(crate) fn check_cutoff(now: NaiveTime, cutoff: NaiveTime) -> Result<(), EngineError> {
    if now >= cutoff {
        return Ok(());
    }
    let secs = (cutoff - now).num_seconds();
    Err(EngineError::BeforeCutoff {
        minutes_remaining: (secs + 59) / 60,
    })
}

pub(crate) fn check_slot_open(slot: &TimeSlot, now: NaiveTime) -> Result<(), EngineError> {
    if !slot.active {
        return Err(EngineError::SlotInactive(slot.id));
    }
    if slot.span.end <= now {
        return Err(EngineError::SlotEnded(slot.id));
    }
    Ok(())
}

/// One-per-day rule, then the capacity gate. Caller holds the day's write lock.
pub(crate) fn check_admission(
    day: &CafeteriaDay,
    user_id: Ulid,
    slot_id: u32,
    capacity: u32,
) -> Result<(), EngineError> {
    if day.user_blocked(user_id) {
        return Err(EngineError::AlreadyReservedToday);
    }
    if available(Some(day), slot_id, capacity) == 0 {
        return Err(EngineError::CapacityExceeded(capacity));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day_with(entries: &[(Ulid, u32, ReservationStatus)]) -> CafeteriaDay {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let created_at = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 10, 10, 0, 0)
            .unwrap();
        let mut day = CafeteriaDay::new(date);
        for &(user_id, slot_id, status) in entries {
            day.reservations.push(Reservation {
                id: Ulid::new(),
                user_id,
                slot_id,
                date,
                status,
                created_at,
                check_in_at: None,
                check_out_at: None,
            });
        }
        day
    }

    #[test]
    fn available_ignores_cancelled_and_expired() {
        let day = day_with(&[
            (Ulid::new(), 1, ReservationStatus::Active),
            (Ulid::new(), 1, ReservationStatus::InProgress),
            (Ulid::new(), 1, ReservationStatus::Cancelled),
            (Ulid::new(), 1, ReservationStatus::Expired),
            (Ulid::new(), 2, ReservationStatus::Active),
        ]);
        assert_eq!(available(Some(&day), 1, 5), 3);
        assert_eq!(available(Some(&day), 2, 5), 4);
        assert_eq!(available(None, 1, 5), 5);
    }

    #[test]
    fn available_never_underflows() {
        let day = day_with(&[
            (Ulid::new(), 1, ReservationStatus::Active),
            (Ulid::new(), 1, ReservationStatus::Active),
        ]);
        assert_eq!(available(Some(&day), 1, 1), 0);
    }

    #[test]
    fn cutoff_rounds_minutes_up() {
        match check_cutoff(NaiveTime::from_hms_opt(9, 15, 30).unwrap(), t(10, 0)) {
            Err(EngineError::BeforeCutoff { minutes_remaining }) => assert_eq!(minutes_remaining, 45),
            other => panic!("expected BeforeCutoff, got {other:?}"),
        }
        assert!(check_cutoff(t(10, 0), t(10, 0)).is_ok());
    }

    #[test]
    fn slot_open_checks() {
        let span = Span::new(t(12, 0), t(13, 0));
        let inactive = TimeSlot { id: 3, span, active: false };
        assert!(matches!(check_slot_open(&inactive, t(11, 0)), Err(EngineError::SlotInactive(3))));
        let slot = TimeSlot { id: 4, span, active: true };
        assert!(check_slot_open(&slot, t(12, 59)).is_ok());
        assert!(matches!(check_slot_open(&slot, t(13, 0)), Err(EngineError::SlotEnded(4))));
    }

    #[test]
    fn one_per_day_checked_before_capacity() {
        let user = Ulid::new();
        let mut entries = vec![(user, 2, ReservationStatus::Expired)];
        for _ in 0..5 {
            entries.push((Ulid::new(), 1, ReservationStatus::Active));
        }
        let day = day_with(&entries);
        assert!(matches!(
            check_admission(&day, user, 1, 5),
            Err(EngineError::AlreadyReservedToday)
        ));
        assert!(matches!(
            check_admission(&day, Ulid::new(), 1, 5),
            Err(EngineError::CapacityExceeded(5))
        ));
        assert!(check_admission(&day, Ulid::new(), 2, 5).is_ok());
    }

    #[test]
    fn cancelled_reservation_does_not_block_rebooking() {
        let user = Ulid::new();
        let day = day_with(&[(user, 1, ReservationStatus::Cancelled)]);
        assert!(check_admission(&day, user, 1, 5).is_ok());
    }
}
