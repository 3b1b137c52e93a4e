use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::auth::Principal;
use crate::model::*;
use crate::observability;

use super::lifecycle::{self, invalid_state};
use super::{Engine, EngineError, capacity};

impl Engine {
    /// Active slots for today with the seats still free in each.
    pub async fn list_time_slots(&self) -> Vec<SlotAvailability> {
        let today = self.clock.today();
        let day = self.existing_cafeteria_day(today);
        let guard = match &day {
            Some(d) => Some(d.read().await),
            None => None,
        };
        self.slots
            .iter()
            .filter(|s| s.active)
            .map(|s| SlotAvailability {
                id: s.id,
                time_range: s.span.label(),
                available: capacity::available(guard.as_deref(), s.id, self.settings.capacity),
            })
            .collect()
    }

    /// Seats left in one slot on one date.
    pub async fn slot_availability(&self, date: NaiveDate, slot_id: u32) -> Result<u32, EngineError> {
        self.slot(slot_id)?;
        let Some(day) = self.existing_cafeteria_day(date) else {
            return Ok(self.settings.capacity);
        };
        let guard = day.read().await;
        Ok(capacity::available(Some(&*guard), slot_id, self.settings.capacity))
    }

    /// Book a seat in `slot_id` for today.
    pub async fn create_reservation(
        &self,
        actor: &Principal,
        slot_id: u32,
    ) -> Result<Ulid, EngineError> {
        let result = self.admit_reservation(actor, slot_id).await;
        match &result {
            Ok(_) => metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL, "kind" => "cafeteria")
                .increment(1),
            Err(e) => metrics::counter!(
                observability::ADMISSION_REJECTIONS_TOTAL,
                "kind" => "cafeteria",
                "reason" => e.code()
            )
            .increment(1),
        }
        result
    }

    async fn admit_reservation(&self, actor: &Principal, slot_id: u32) -> Result<Ulid, EngineError> {
        let now = self.clock.local_now();
        capacity::check_cutoff(now.time(), self.settings.cutoff)?;
        let slot = *self.slot(slot_id)?;
        capacity::check_slot_open(&slot, now.time())?;
        self.require_user(actor.user_id)?;

        let _gate = self.commit_gate.read().await;
        let shared = self.cafeteria_day(now.date());
        let mut day = shared.write().await;
        capacity::check_admission(&day, actor.user_id, slot_id, self.settings.capacity)?;

        let id = Ulid::new();
        let event = Event::ReservationCreated {
            id,
            user_id: actor.user_id,
            slot_id,
            date: now.date(),
            created_at: self.clock.now(),
        };
        self.commit_cafeteria(&mut day, &event).await?;
        info!(
            reservation_id = %id,
            user_id = %actor.user_id,
            slot_id,
            date = %now.date(),
            "cafeteria reservation created"
        );
        Ok(id)
    }

    pub async fn cancel_reservation(&self, actor: &Principal, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut day = self.resolve_reservation_write(id).await?;
        let r = day.get(id).ok_or(EngineError::ReservationNotFound(id))?;
        if !actor.may_manage(r.user_id) {
            return Err(EngineError::Forbidden("only the owner or HR may cancel a reservation"));
        }
        let window = self.slot(r.slot_id)?.span.on(r.date);
        lifecycle::cafeteria_cancel(r, window, self.clock.local_now())?;

        let event = Event::ReservationStatusChanged {
            id,
            date: r.date,
            status: ReservationStatus::Cancelled,
        };
        self.commit_cafeteria(&mut day, &event).await?;
        info!(reservation_id = %id, by = %actor.user_id, "cafeteria reservation cancelled");
        Ok(())
    }

    /// Record arrival. Moves straight to InProgress once the slot has begun.
    pub async fn check_in(&self, actor: &Principal, id: Ulid) -> Result<ReservationStatus, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut day = self.resolve_reservation_write(id).await?;
        let r = day.get(id).ok_or(EngineError::ReservationNotFound(id))?;
        if r.user_id != actor.user_id {
            return Err(EngineError::Forbidden("only the owner may check in"));
        }
        if r.status != ReservationStatus::Active || r.check_in_at.is_some() {
            return Err(invalid_state(id, r.status, "check in"));
        }
        let now = self.clock.local_now();
        let window = self.slot(r.slot_id)?.span.on(r.date);
        if !lifecycle::check_in_open(window, now) {
            return Err(EngineError::CheckInClosed(id));
        }

        let status = if now >= window.start {
            ReservationStatus::InProgress
        } else {
            ReservationStatus::Active
        };
        let event = Event::ReservationCheckedIn {
            id,
            date: r.date,
            at: self.clock.now(),
            status,
        };
        self.commit_cafeteria(&mut day, &event).await?;
        info!(reservation_id = %id, ?status, "cafeteria check-in");
        Ok(status)
    }

    /// Record departure. The status is left for the sweep to settle.
    pub async fn check_out(&self, actor: &Principal, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut day = self.resolve_reservation_write(id).await?;
        let r = day.get(id).ok_or(EngineError::ReservationNotFound(id))?;
        if r.user_id != actor.user_id {
            return Err(EngineError::Forbidden("only the owner may check out"));
        }
        if r.check_in_at.is_none() {
            return Err(EngineError::NotCheckedIn(id));
        }
        if r.check_out_at.is_some() || r.status.is_terminal() {
            return Err(invalid_state(id, r.status, "check out"));
        }

        let event = Event::ReservationCheckedOut {
            id,
            date: r.date,
            at: self.clock.now(),
        };
        self.commit_cafeteria(&mut day, &event).await?;
        info!(reservation_id = %id, "cafeteria check-out");
        Ok(())
    }

    // ── Listings ─────────────────────────────────────────────

    pub async fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        let date = self.reservation_dates.get(&id).map(|e| *e.value())?;
        let day = self.existing_cafeteria_day(date)?;
        let guard = day.read().await;
        guard.get(id).cloned()
    }

    /// The caller's reservations for today.
    pub async fn reservations_today(&self, actor: &Principal) -> Vec<ReservationInfo> {
        let today = self.clock.today();
        let Some(day) = self.existing_cafeteria_day(today) else {
            return Vec::new();
        };
        let guard = day.read().await;
        guard
            .reservations
            .iter()
            .filter(|r| r.user_id == actor.user_id)
            .map(|r| self.reservation_info(r))
            .collect()
    }

    /// Every reservation the caller ever made, newest date first.
    pub async fn my_reservations(&self, actor: &Principal) -> Vec<ReservationInfo> {
        self.collect_reservations(|r| r.user_id == actor.user_id).await
    }

    pub async fn all_reservations(&self, actor: &Principal) -> Result<Vec<ReservationInfo>, EngineError> {
        if !actor.is_hr() {
            return Err(EngineError::Forbidden("only HR may list all reservations"));
        }
        Ok(self.collect_reservations(|_| true).await)
    }

    async fn collect_reservations(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<ReservationInfo> {
        let mut out = Vec::new();
        for day in self.cafeteria_days().into_iter().rev() {
            let guard = day.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| keep(r))
                    .map(|r| self.reservation_info(r)),
            );
        }
        debug!(count = out.len(), "collected cafeteria reservations");
        out
    }

    fn reservation_info(&self, r: &Reservation) -> ReservationInfo {
        ReservationInfo {
            id: r.id,
            user_id: r.user_id,
            time_slot_id: r.slot_id,
            time_range: self
                .slot(r.slot_id)
                .map(|s| s.span.label())
                .unwrap_or_default(),
            date: r.date,
            status: r.status,
            created_at: r.created_at,
            check_in_at: r.check_in_at,
            check_out_at: r.check_out_at,
        }
    }
}
