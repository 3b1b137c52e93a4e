//! Time-driven status rules shared by cafeteria and room reservations.
//!
//! `Active → {Cancelled, InProgress, Expired}`, `InProgress → Expired`;
//! Cancelled, Expired and Completed are terminal. Everything here is pure so
//! the sweep, the correction routine and the request paths agree exactly.

use chrono::{NaiveDateTime, TimeDelta};
use ulid::Ulid;

use crate::limits::CHECK_IN_EARLY_MINUTES;
use crate::model::*;

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Expire,
}

/// What the sweep should do to one reservation at `now`.
///
/// Checked-out and settled reservations are never touched.
pub fn next_transition(
    phase: Phase,
    window: Window,
    checked_in: bool,
    checked_out: bool,
    now: NaiveDateTime,
    grace: TimeDelta,
) -> Option<Transition> {
    if checked_out || !matches!(phase, Phase::Active | Phase::InProgress) {
        return None;
    }
    if past_deadline(window, now, grace) {
        return Some(Transition::Expire);
    }
    if window.start <= now && now <= window.end && checked_in && phase != Phase::InProgress {
        return Some(Transition::Start);
    }
    None
}

/// An Expired reservation whose window (plus grace) has not actually passed.
pub fn wrongly_expired(
    phase: Phase,
    window: Window,
    checked_out: bool,
    now: NaiveDateTime,
    grace: TimeDelta,
) -> bool {
    phase == Phase::Expired && !checked_out && !past_deadline(window, now, grace)
}

/// `now > end + grace`. A deadline past the representable range never arrives.
fn past_deadline(window: Window, now: NaiveDateTime, grace: TimeDelta) -> bool {
    window
        .end
        .checked_add_signed(grace)
        .is_some_and(|deadline| now > deadline)
}

/// Cafeteria: only Active, and only until the slot starts.
pub fn cafeteria_cancel(
    r: &Reservation,
    window: Window,
    now: NaiveDateTime,
) -> Result<(), EngineError> {
    if r.status != ReservationStatus::Active {
        return Err(invalid_state(r.id, r.status, "cancel"));
    }
    if now > window.start {
        return Err(EngineError::AlreadyStarted(r.id));
    }
    Ok(())
}

/// Room: Active or InProgress, at any time.
pub fn room_cancel(b: &RoomReservation) -> Result<(), EngineError> {
    match b.status {
        RoomReservationStatus::Active | RoomReservationStatus::InProgress => Ok(()),
        other => Err(invalid_state(b.id, other, "cancel")),
    }
}

/// Check-in opens a little before the window and closes at its end.
pub fn check_in_open(window: Window, now: NaiveDateTime) -> bool {
    window.start - TimeDelta::minutes(CHECK_IN_EARLY_MINUTES) <= now && now <= window.end
}

pub(crate) fn invalid_state(id: Ulid, status: impl std::fmt::Debug, action: &'static str) -> EngineError {
    EngineError::InvalidState {
        id,
        status: format!("{status:?}"),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn lunch() -> Window {
        Window {
            start: at(13, 0),
            end: at(14, 0),
        }
    }

    fn grace() -> TimeDelta {
        TimeDelta::minutes(1)
    }

    #[test]
    fn expires_only_after_grace() {
        assert_eq!(
            next_transition(Phase::Active, lunch(), false, false, at(14, 2), grace()),
            Some(Transition::Expire)
        );
        assert_eq!(
            next_transition(Phase::Active, lunch(), false, false, at(14, 1), grace()),
            None
        );
        assert_eq!(
            next_transition(Phase::InProgress, lunch(), true, false, at(14, 2), grace()),
            Some(Transition::Expire)
        );
    }

    #[test]
    fn starts_only_when_checked_in_inside_window() {
        assert_eq!(
            next_transition(Phase::Active, lunch(), true, false, at(13, 59), grace()),
            Some(Transition::Start)
        );
        assert_eq!(
            next_transition(Phase::Active, lunch(), false, false, at(13, 59), grace()),
            None
        );
        assert_eq!(
            next_transition(Phase::Active, lunch(), true, false, at(12, 59), grace()),
            None
        );
        assert_eq!(
            next_transition(Phase::InProgress, lunch(), true, false, at(13, 30), grace()),
            None
        );
    }

    #[test]
    fn settled_and_checked_out_are_left_alone() {
        for phase in [Phase::Expired, Phase::Settled] {
            assert_eq!(next_transition(phase, lunch(), true, false, at(20, 0), grace()), None);
        }
        assert_eq!(
            next_transition(Phase::InProgress, lunch(), true, true, at(20, 0), grace()),
            None
        );
    }

    #[test]
    fn wrongly_expired_respects_window_end() {
        assert!(wrongly_expired(Phase::Expired, lunch(), false, at(13, 50), grace()));
        assert!(!wrongly_expired(Phase::Expired, lunch(), false, at(14, 2), grace()));
        assert!(!wrongly_expired(Phase::Expired, lunch(), true, at(13, 50), grace()));
        assert!(!wrongly_expired(Phase::Active, lunch(), false, at(13, 50), grace()));
    }

    #[test]
    fn unrepresentable_grace_never_expires() {
        let huge = TimeDelta::days(1_000_000_000);
        assert_eq!(
            next_transition(Phase::Active, lunch(), false, false, at(23, 59), huge),
            None
        );
        assert!(wrongly_expired(Phase::Expired, lunch(), false, at(23, 59), huge));
    }

    #[test]
    fn cafeteria_cancel_rules() {
        let mut r = Reservation {
            id: Ulid::new(),
            user_id: Ulid::new(),
            slot_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            status: ReservationStatus::Active,
            created_at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 10, 10, 0, 0)
                .unwrap(),
            check_in_at: None,
            check_out_at: None,
        };
        assert!(cafeteria_cancel(&r, lunch(), at(13, 0)).is_ok());
        assert!(matches!(
            cafeteria_cancel(&r, lunch(), at(13, 1)),
            Err(EngineError::AlreadyStarted(_))
        ));
        r.status = ReservationStatus::InProgress;
        assert!(matches!(
            cafeteria_cancel(&r, lunch(), at(12, 0)),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn check_in_window() {
        assert!(check_in_open(lunch(), at(12, 45)));
        assert!(!check_in_open(lunch(), at(12, 44)));
        assert!(check_in_open(lunch(), at(14, 0)));
        assert!(!check_in_open(lunch(), at(14, 1)));
    }
}
