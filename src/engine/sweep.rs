use chrono::NaiveDateTime;
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::lifecycle::{self, Transition};
use super::{Engine, EngineError, capacity};

/// Transitions applied by one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub started: usize,
    pub expired: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.started + self.expired
    }

    fn count(&mut self, t: Transition, kind: &'static str) {
        let label = match t {
            Transition::Start => {
                self.started += 1;
                "start"
            }
            Transition::Expire => {
                self.expired += 1;
                "expire"
            }
        };
        metrics::counter!(observability::SWEEP_TRANSITIONS_TOTAL, "kind" => kind, "transition" => label)
            .increment(1);
    }
}

impl Engine {
    /// Advance every time-driven status across both subsystems.
    ///
    /// Evaluated against one reading of the clock. Idempotent: a second pass at
    /// the same instant finds nothing to do. Days are inspected under a read
    /// lock and only write-locked when something is due, so settled history
    /// costs a shared lock and no contention with writers.
    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let _gate = self.commit_gate.read().await;
        let now = self.clock.local_now();
        let mut report = SweepReport::default();

        for shared in self.cafeteria_days() {
            let idle = {
                let day = shared.read().await;
                self.cafeteria_due(&day, now).is_empty()
            };
            if idle {
                continue;
            }
            let mut day = shared.write().await;
            for (id, t) in self.cafeteria_due(&day, now) {
                let status = match t {
                    Transition::Start => ReservationStatus::InProgress,
                    Transition::Expire => ReservationStatus::Expired,
                };
                let event = Event::ReservationStatusChanged {
                    id,
                    date: day.date,
                    status,
                };
                self.commit_cafeteria(&mut day, &event).await?;
                report.count(t, "cafeteria");
            }
        }

        for shared in self.room_days() {
            let idle = {
                let day = shared.read().await;
                self.room_due(&day, now).is_empty()
            };
            if idle {
                continue;
            }
            let mut day = shared.write().await;
            for (id, t) in self.room_due(&day, now) {
                let status = match t {
                    Transition::Start => RoomReservationStatus::InProgress,
                    Transition::Expire => RoomReservationStatus::Expired,
                };
                let event = Event::RoomReservationStatusChanged {
                    id,
                    date: day.date,
                    status,
                };
                self.commit_room(&mut day, &event).await?;
                report.count(t, "room");
            }
        }

        Ok(report)
    }

    fn cafeteria_due(&self, day: &CafeteriaDay, now: NaiveDateTime) -> Vec<(Ulid, Transition)> {
        day.reservations
            .iter()
            .filter_map(|r| {
                let window = self.slot(r.slot_id).ok()?.span.on(r.date);
                let t = lifecycle::next_transition(
                    r.status.into(),
                    window,
                    r.check_in_at.is_some(),
                    r.check_out_at.is_some(),
                    now,
                    self.settings.grace,
                )?;
                Some((r.id, t))
            })
            .collect()
    }

    fn room_due(&self, day: &RoomDay, now: NaiveDateTime) -> Vec<(Ulid, Transition)> {
        day.bookings
            .iter()
            .filter_map(|b| {
                let t = lifecycle::next_transition(
                    b.status.into(),
                    b.span.on(b.date),
                    b.check_in_at.is_some(),
                    false,
                    now,
                    self.settings.grace,
                )?;
                Some((b.id, t))
            })
            .collect()
    }

    /// Reactivate today's cafeteria reservations that were expired before
    /// their window (plus grace) actually ended. Reactivations that would
    /// overfill a slot are skipped. Returns how many were reactivated.
    pub async fn correct_expired(&self) -> Result<usize, EngineError> {
        let _gate = self.commit_gate.read().await;
        let now = self.clock.local_now();
        let Some(shared) = self.existing_cafeteria_day(now.date()) else {
            return Ok(0);
        };
        let mut day = shared.write().await;

        let candidates: Vec<(Ulid, u32)> = day
            .reservations
            .iter()
            .filter(|r| {
                self.slot(r.slot_id).is_ok_and(|s| {
                    lifecycle::wrongly_expired(
                        r.status.into(),
                        s.span.on(r.date),
                        r.check_out_at.is_some(),
                        now,
                        self.settings.grace,
                    )
                })
            })
            .map(|r| (r.id, r.slot_id))
            .collect();

        let mut corrected = 0;
        for (id, slot_id) in candidates {
            if capacity::available(Some(&*day), slot_id, self.settings.capacity) == 0 {
                warn!(reservation_id = %id, slot_id, "not reactivating: slot is full");
                continue;
            }
            let event = Event::ReservationStatusChanged {
                id,
                date: day.date,
                status: ReservationStatus::Active,
            };
            self.commit_cafeteria(&mut day, &event).await?;
            corrected += 1;
        }

        if corrected > 0 {
            metrics::counter!(observability::CORRECTIONS_TOTAL).increment(corrected as u64);
            info!(corrected, date = %day.date, "reactivated wrongly expired reservations");
        }
        Ok(corrected)
    }
}
