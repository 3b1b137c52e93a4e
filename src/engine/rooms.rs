use chrono::NaiveDate;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::info;
use ulid::Ulid;

use crate::auth::Principal;
use crate::limits::MAX_MEETING_NAME_LEN;
use crate::model::*;
use crate::observability;

use super::lifecycle::{self, invalid_state};
use super::{Engine, EngineError, RoomWindow, conflict, move_booking};

fn normalize_meeting_name(name: Option<String>) -> Result<Option<String>, EngineError> {
    let Some(name) = name else { return Ok(None) };
    let trimmed = name.trim();
    if trimmed.len() > MAX_MEETING_NAME_LEN {
        return Err(EngineError::LimitExceeded("meeting name too long"));
    }
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

impl Engine {
    /// Hourly candidates on `date` not overlapped by an occupying booking.
    pub async fn available_room_slots(&self, date: NaiveDate) -> Vec<CandidateSlot> {
        match self.existing_room_day(date) {
            Some(day) => {
                let guard = day.read().await;
                conflict::free_candidates(Some(&*guard))
            }
            None => conflict::free_candidates(None),
        }
    }

    /// Advisory check; `exclude` skips the booking being edited.
    pub async fn check_room_availability(
        &self,
        window: RoomWindow,
        exclude: Option<Ulid>,
    ) -> AvailabilityCheck {
        if let Some(day) = self.existing_room_day(window.date) {
            let guard = day.read().await;
            if let Some(hit) = conflict::find_conflict(&guard, &window.span, exclude) {
                return AvailabilityCheck {
                    is_available: false,
                    message: format!(
                        "The room is already booked from {} to {}",
                        hit.span.start.format("%H:%M"),
                        hit.span.end.format("%H:%M")
                    ),
                };
            }
        }
        AvailabilityCheck {
            is_available: true,
            message: "The room is available".into(),
        }
    }

    pub async fn create_room_reservation(
        &self,
        actor: &Principal,
        window: RoomWindow,
        meeting_name: Option<String>,
    ) -> Result<Ulid, EngineError> {
        let result = self.admit_room_reservation(actor, window, meeting_name).await;
        match &result {
            Ok(_) => metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL, "kind" => "room")
                .increment(1),
            Err(e) => metrics::counter!(
                observability::ADMISSION_REJECTIONS_TOTAL,
                "kind" => "room",
                "reason" => e.code()
            )
            .increment(1),
        }
        result
    }

    async fn admit_room_reservation(
        &self,
        actor: &Principal,
        window: RoomWindow,
        meeting_name: Option<String>,
    ) -> Result<Ulid, EngineError> {
        let meeting_name = normalize_meeting_name(meeting_name)?;
        let user = self.require_user(actor.user_id)?;
        if !user.active {
            return Err(EngineError::UserInactive(user.id));
        }

        let _gate = self.commit_gate.read().await;
        let shared = self.room_day(window.date);
        let mut day = shared.write().await;
        if let Some(hit) = conflict::find_conflict(&day, &window.span, None) {
            return Err(EngineError::ScheduleConflict(hit.id));
        }

        let id = Ulid::new();
        let event = Event::RoomReservationCreated {
            id,
            user_id: actor.user_id,
            date: window.date,
            span: window.span,
            meeting_name,
            created_at: self.clock.now(),
        };
        self.commit_room(&mut day, &event).await?;
        info!(
            reservation_id = %id,
            user_id = %actor.user_id,
            date = %window.date,
            span = %window.span.label(),
            "room reservation created"
        );
        Ok(id)
    }

    /// Move an Active booking. Both dates are locked in date order so a
    /// concurrent move the other way cannot deadlock.
    pub async fn reschedule_room_reservation(
        &self,
        actor: &Principal,
        id: Ulid,
        window: RoomWindow,
    ) -> Result<(), EngineError> {
        if !actor.is_hr() {
            return Err(EngineError::Forbidden("only HR may reschedule room reservations"));
        }
        let _gate = self.commit_gate.read().await;

        for _ in 0..3 {
            let from = self
                .room_dates
                .get(&id)
                .map(|e| *e.value())
                .ok_or(EngineError::ReservationNotFound(id))?;
            let (mut src, mut dst) = self.lock_room_pair(from, window.date).await;
            let Some(b) = src.get(id) else {
                // Moved while we waited; look it up again.
                continue;
            };
            if b.status != RoomReservationStatus::Active {
                return Err(invalid_state(id, b.status, "reschedule"));
            }
            let target = dst.as_deref().unwrap_or(&*src);
            if let Some(hit) = conflict::find_conflict(target, &window.span, Some(id)) {
                return Err(EngineError::ScheduleConflict(hit.id));
            }

            let event = Event::RoomReservationRescheduled {
                id,
                from,
                date: window.date,
                span: window.span,
            };
            match dst.as_deref_mut() {
                None => self.commit_room(&mut src, &event).await?,
                Some(dst) => {
                    self.wal_append(&event).await?;
                    move_booking(&mut src, dst, id, window.span);
                    self.room_dates.insert(id, window.date);
                }
            }
            info!(
                reservation_id = %id,
                %from,
                to = %window.date,
                span = %window.span.label(),
                "room reservation rescheduled"
            );
            return Ok(());
        }
        Err(EngineError::ReservationNotFound(id))
    }

    async fn lock_room_pair(
        &self,
        a: NaiveDate,
        b: NaiveDate,
    ) -> (OwnedRwLockWriteGuard<RoomDay>, Option<OwnedRwLockWriteGuard<RoomDay>>) {
        if a == b {
            return (self.room_day(a).write_owned().await, None);
        }
        if a < b {
            let ga = self.room_day(a).write_owned().await;
            let gb = self.room_day(b).write_owned().await;
            (ga, Some(gb))
        } else {
            let gb = self.room_day(b).write_owned().await;
            let ga = self.room_day(a).write_owned().await;
            (ga, Some(gb))
        }
    }

    pub async fn cancel_room_reservation(&self, actor: &Principal, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut day = self.resolve_room_write(id).await?;
        let b = day.get(id).ok_or(EngineError::ReservationNotFound(id))?;
        if !actor.may_manage(b.user_id) {
            return Err(EngineError::Forbidden("only the owner or HR may cancel a room reservation"));
        }
        lifecycle::room_cancel(b)?;

        let event = Event::RoomReservationStatusChanged {
            id,
            date: b.date,
            status: RoomReservationStatus::Cancelled,
        };
        self.commit_room(&mut day, &event).await?;
        info!(reservation_id = %id, by = %actor.user_id, "room reservation cancelled");
        Ok(())
    }

    pub async fn check_in_room(
        &self,
        actor: &Principal,
        id: Ulid,
    ) -> Result<RoomReservationStatus, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut day = self.resolve_room_write(id).await?;
        let b = day.get(id).ok_or(EngineError::ReservationNotFound(id))?;
        if b.user_id != actor.user_id {
            return Err(EngineError::Forbidden("only the owner may check in"));
        }
        if b.status != RoomReservationStatus::Active || b.check_in_at.is_some() {
            return Err(invalid_state(id, b.status, "check in"));
        }
        let now = self.clock.local_now();
        let window = b.span.on(b.date);
        if !lifecycle::check_in_open(window, now) {
            return Err(EngineError::CheckInClosed(id));
        }

        let status = if now >= window.start {
            RoomReservationStatus::InProgress
        } else {
            RoomReservationStatus::Active
        };
        let event = Event::RoomReservationCheckedIn {
            id,
            date: b.date,
            at: self.clock.now(),
            status,
        };
        self.commit_room(&mut day, &event).await?;
        info!(reservation_id = %id, ?status, "room check-in");
        Ok(status)
    }

    /// Close out a meeting that is underway.
    pub async fn complete_room_reservation(&self, actor: &Principal, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut day = self.resolve_room_write(id).await?;
        let b = day.get(id).ok_or(EngineError::ReservationNotFound(id))?;
        if !actor.may_manage(b.user_id) {
            return Err(EngineError::Forbidden("only the owner or HR may complete a room reservation"));
        }
        if b.status != RoomReservationStatus::InProgress {
            return Err(invalid_state(id, b.status, "complete"));
        }

        let event = Event::RoomReservationStatusChanged {
            id,
            date: b.date,
            status: RoomReservationStatus::Completed,
        };
        self.commit_room(&mut day, &event).await?;
        info!(reservation_id = %id, "room reservation completed");
        Ok(())
    }

    /// Remove a booking outright, whatever its status.
    pub async fn delete_room_reservation(&self, actor: &Principal, id: Ulid) -> Result<(), EngineError> {
        if !actor.is_hr() {
            return Err(EngineError::Forbidden("only HR may delete room reservations"));
        }
        let _gate = self.commit_gate.read().await;
        let mut day = self.resolve_room_write(id).await?;
        let date = day.date;
        let event = Event::RoomReservationDeleted { id, date };
        self.commit_room(&mut day, &event).await?;
        info!(reservation_id = %id, %date, "room reservation deleted");
        Ok(())
    }

    // ── Listings ─────────────────────────────────────────────

    pub async fn get_room_reservation(&self, id: Ulid) -> Option<RoomReservation> {
        let date = self.room_dates.get(&id).map(|e| *e.value())?;
        let day = self.existing_room_day(date)?;
        let guard = day.read().await;
        guard.get(id).cloned()
    }

    /// All bookings on a date, by start time.
    pub async fn room_reservations_on(&self, date: NaiveDate) -> Vec<RoomReservationInfo> {
        let Some(day) = self.existing_room_day(date) else {
            return Vec::new();
        };
        let guard = day.read().await;
        guard.bookings.iter().map(RoomReservationInfo::from).collect()
    }

    pub async fn my_room_reservations(&self, actor: &Principal) -> Vec<RoomReservationInfo> {
        self.collect_room_reservations(|b| b.user_id == actor.user_id).await
    }

    pub async fn all_room_reservations(
        &self,
        actor: &Principal,
    ) -> Result<Vec<RoomReservationInfo>, EngineError> {
        if !actor.is_hr() {
            return Err(EngineError::Forbidden("only HR may list all room reservations"));
        }
        Ok(self.collect_room_reservations(|_| true).await)
    }

    async fn collect_room_reservations(
        &self,
        keep: impl Fn(&RoomReservation) -> bool,
    ) -> Vec<RoomReservationInfo> {
        let mut out = Vec::new();
        for day in self.room_days().into_iter().rev() {
            let guard = day.read().await;
            out.extend(guard.bookings.iter().filter(|b| keep(b)).map(RoomReservationInfo::from));
        }
        out
    }
}
