mod cafeteria;
mod capacity;
mod conflict;
mod error;
mod lifecycle;
mod rooms;
mod sweep;
mod validate;

pub use error::{EngineError, ErrorCategory};
pub use lifecycle::Transition;
pub use sweep::SweepReport;
pub use validate::{RoomWindow, parse_date, parse_time};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::clock::Clock;
use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

pub type SharedCafeteriaDay = Arc<RwLock<CafeteriaDay>>;
pub type SharedRoomDay = Arc<RwLock<RoomDay>>;

/// Admission and lifecycle parameters.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub capacity: u32,
    pub cutoff: NaiveTime,
    pub grace: TimeDelta,
    /// Seeded into the WAL on first start only.
    pub time_slots: Vec<TimeSlot>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let (h, m) = DEFAULT_CUTOFF;
        Self {
            capacity: DEFAULT_CAPACITY,
            cutoff: NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN),
            grace: TimeDelta::minutes(DEFAULT_GRACE_MINUTES),
            time_slots: Vec::new(),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Blocks for one append, drains whatever else is queued,
/// then commits the whole batch with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!(error = %e, events = batch.len(), "WAL flush failed");
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so the half-written batch is not
    // attributed to the next one.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Reservation state for both subsystems, partitioned by date.
///
/// Each date has its own `RwLock`; every read-check-write sequence holds the
/// date's write lock from the admission check until the event is applied, so
/// concurrent requests for the same date are serialized and requests for
/// different dates run in parallel.
pub struct Engine {
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    slots: Vec<TimeSlot>,
    users: DashMap<Ulid, User>,
    cafeteria: DashMap<NaiveDate, SharedCafeteriaDay>,
    rooms: DashMap<NaiveDate, SharedRoomDay>,
    /// Reverse lookups: reservation id → date.
    reservation_dates: DashMap<Ulid, NaiveDate>,
    room_dates: DashMap<Ulid, NaiveDate>,
    /// Held shared by every writer, exclusively by compaction.
    commit_gate: RwLock<()>,
    user_writes: Mutex<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

pub(super) fn apply_to_cafeteria(day: &mut CafeteriaDay, event: &Event) {
    match event {
        Event::ReservationCreated {
            id,
            user_id,
            slot_id,
            date,
            created_at,
        } => day.reservations.push(Reservation {
            id: *id,
            user_id: *user_id,
            slot_id: *slot_id,
            date: *date,
            status: ReservationStatus::Active,
            created_at: *created_at,
            check_in_at: None,
            check_out_at: None,
        }),
        Event::ReservationStatusChanged { id, status, .. } => {
            if let Some(r) = day.get_mut(*id) {
                r.status = *status;
            }
        }
        Event::ReservationCheckedIn { id, at, status, .. } => {
            if let Some(r) = day.get_mut(*id) {
                r.check_in_at = Some(*at);
                r.status = *status;
            }
        }
        Event::ReservationCheckedOut { id, at, .. } => {
            if let Some(r) = day.get_mut(*id) {
                r.check_out_at = Some(*at);
            }
        }
        _ => {}
    }
}

/// Single-day room events. Cross-day reschedules go through `move_booking`.
pub(super) fn apply_to_rooms(day: &mut RoomDay, event: &Event) {
    match event {
        Event::RoomReservationCreated {
            id,
            user_id,
            date,
            span,
            meeting_name,
            created_at,
        } => day.insert(RoomReservation {
            id: *id,
            user_id: *user_id,
            date: *date,
            span: *span,
            meeting_name: meeting_name.clone(),
            status: RoomReservationStatus::Active,
            created_at: *created_at,
            check_in_at: None,
        }),
        Event::RoomReservationRescheduled { id, span, .. } => {
            if let Some(mut b) = day.remove(*id) {
                b.span = *span;
                day.insert(b);
            }
        }
        Event::RoomReservationStatusChanged { id, status, .. } => {
            if let Some(b) = day.get_mut(*id) {
                b.status = *status;
            }
        }
        Event::RoomReservationCheckedIn { id, at, status, .. } => {
            if let Some(b) = day.get_mut(*id) {
                b.check_in_at = Some(*at);
                b.status = *status;
            }
        }
        Event::RoomReservationDeleted { id, .. } => {
            day.remove(*id);
        }
        _ => {}
    }
}

pub(super) fn move_booking(from: &mut RoomDay, to: &mut RoomDay, id: Ulid, span: Span) {
    if let Some(mut b) = from.remove(id) {
        b.date = to.date;
        b.span = span;
        to.insert(b);
    }
}

/// Events that rebuild the given state from scratch.
fn snapshot_events(
    slots: &[TimeSlot],
    users: &[User],
    cafeteria: &[CafeteriaDay],
    rooms: &[RoomDay],
) -> Vec<Event> {
    let mut events = Vec::new();
    events.extend(slots.iter().map(|s| Event::TimeSlotSeeded {
        id: s.id,
        span: s.span,
        active: s.active,
    }));
    events.extend(users.iter().map(|u| Event::UserUpserted {
        id: u.id,
        name: u.name.clone(),
        role: u.role,
        active: u.active,
    }));
    for r in cafeteria.iter().flat_map(|d| &d.reservations) {
        events.push(Event::ReservationCreated {
            id: r.id,
            user_id: r.user_id,
            slot_id: r.slot_id,
            date: r.date,
            created_at: r.created_at,
        });
        if let Some(at) = r.check_in_at {
            events.push(Event::ReservationCheckedIn {
                id: r.id,
                date: r.date,
                at,
                status: r.status,
            });
        }
        if let Some(at) = r.check_out_at {
            events.push(Event::ReservationCheckedOut { id: r.id, date: r.date, at });
        }
        if r.status != ReservationStatus::Active {
            events.push(Event::ReservationStatusChanged {
                id: r.id,
                date: r.date,
                status: r.status,
            });
        }
    }
    for b in rooms.iter().flat_map(|d| &d.bookings) {
        events.push(Event::RoomReservationCreated {
            id: b.id,
            user_id: b.user_id,
            date: b.date,
            span: b.span,
            meeting_name: b.meeting_name.clone(),
            created_at: b.created_at,
        });
        if let Some(at) = b.check_in_at {
            events.push(Event::RoomReservationCheckedIn {
                id: b.id,
                date: b.date,
                at,
                status: b.status,
            });
        }
        if b.status != RoomReservationStatus::Active {
            events.push(Event::RoomReservationStatusChanged {
                id: b.id,
                date: b.date,
                status: b.status,
            });
        }
    }
    events
}

/// Plain state rebuilt from the log before it is shared.
#[derive(Default)]
struct Replayed {
    slots: Vec<TimeSlot>,
    users: HashMap<Ulid, User>,
    cafeteria: HashMap<NaiveDate, CafeteriaDay>,
    rooms: HashMap<NaiveDate, RoomDay>,
    reservation_dates: HashMap<Ulid, NaiveDate>,
    room_dates: HashMap<Ulid, NaiveDate>,
}

impl Replayed {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::UserUpserted {
                id,
                name,
                role,
                active,
            } => {
                self.users.insert(
                    *id,
                    User {
                        id: *id,
                        name: name.clone(),
                        role: *role,
                        active: *active,
                    },
                );
            }
            Event::TimeSlotSeeded { id, span, active } => {
                self.slots.retain(|s| s.id != *id);
                self.slots.push(TimeSlot {
                    id: *id,
                    span: *span,
                    active: *active,
                });
            }
            Event::ReservationCreated { id, date, .. } => {
                self.reservation_dates.insert(*id, *date);
                self.cafeteria_day(*date).reservations.retain(|r| r.id != *id);
                apply_to_cafeteria(self.cafeteria_day(*date), event);
            }
            Event::ReservationStatusChanged { date, .. }
            | Event::ReservationCheckedIn { date, .. }
            | Event::ReservationCheckedOut { date, .. } => {
                apply_to_cafeteria(self.cafeteria_day(*date), event);
            }
            Event::RoomReservationCreated { id, date, .. } => {
                self.room_dates.insert(*id, *date);
                self.room_day(*date).remove(*id);
                apply_to_rooms(self.room_day(*date), event);
            }
            Event::RoomReservationRescheduled { id, from, date, span } => {
                if from == date {
                    apply_to_rooms(self.room_day(*date), event);
                } else if let Some(mut b) = self.room_day(*from).remove(*id) {
                    b.date = *date;
                    b.span = *span;
                    self.room_day(*date).insert(b);
                    self.room_dates.insert(*id, *date);
                }
            }
            Event::RoomReservationStatusChanged { date, .. }
            | Event::RoomReservationCheckedIn { date, .. } => {
                apply_to_rooms(self.room_day(*date), event);
            }
            Event::RoomReservationDeleted { id, date } => {
                apply_to_rooms(self.room_day(*date), event);
                self.room_dates.remove(id);
            }
        }
    }

    fn cafeteria_day(&mut self, date: NaiveDate) -> &mut CafeteriaDay {
        self.cafeteria
            .entry(date)
            .or_insert_with(|| CafeteriaDay::new(date))
    }

    fn room_day(&mut self, date: NaiveDate) -> &mut RoomDay {
        self.rooms.entry(date).or_insert_with(|| RoomDay::new(date))
    }
}

fn validate_seed(slots: &[TimeSlot]) -> io::Result<()> {
    if slots.len() > MAX_TIME_SLOTS {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "too many time slots"));
    }
    for (i, s) in slots.iter().enumerate() {
        if s.span.start >= s.span.end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("time slot {} ends before it starts", s.id),
            ));
        }
        if slots[..i].iter().any(|o| o.id == s.id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("duplicate time slot id {}", s.id),
            ));
        }
    }
    Ok(())
}

impl Engine {
    /// Replay the WAL at `wal_path`, seed time slots on first start, and spawn
    /// the group-commit writer. Must be called inside a Tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let (mut wal, events) = Wal::open(&wal_path)?;
        let mut replayed = Replayed::default();
        for event in &events {
            replayed.apply(event);
        }

        if replayed.slots.is_empty() {
            validate_seed(&settings.time_slots)?;
            for slot in &settings.time_slots {
                let event = Event::TimeSlotSeeded {
                    id: slot.id,
                    span: slot.span,
                    active: slot.active,
                };
                wal.append_buffered(&event)?;
                replayed.apply(&event);
            }
            wal.flush_sync()?;
            info!(slots = replayed.slots.len(), "seeded cafeteria time slots");
        } else if replayed.slots != settings.time_slots && !settings.time_slots.is_empty() {
            info!("time slots already seeded; ignoring configured slots");
        }
        replayed.slots.sort_by_key(|s| (s.span.start, s.id));

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        info!(
            events = events.len(),
            users = replayed.users.len(),
            reservations = replayed.reservation_dates.len(),
            room_reservations = replayed.room_dates.len(),
            "engine state restored"
        );

        Ok(Self {
            settings,
            clock,
            slots: replayed.slots,
            users: replayed.users.into_iter().collect(),
            cafeteria: replayed
                .cafeteria
                .into_iter()
                .map(|(d, day)| (d, Arc::new(RwLock::new(day))))
                .collect(),
            rooms: replayed
                .rooms
                .into_iter()
                .map(|(d, day)| (d, Arc::new(RwLock::new(day))))
                .collect(),
            reservation_dates: replayed.reservation_dates.into_iter().collect(),
            room_dates: replayed.room_dates.into_iter().collect(),
            commit_gate: RwLock::new(()),
            user_writes: Mutex::new(()),
            wal_tx,
        })
    }

    /// The seeded slot set, ordered by start time.
    pub fn time_slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub(super) fn slot(&self, id: u32) -> Result<&TimeSlot, EngineError> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .ok_or(EngineError::SlotNotFound(id))
    }

    // ── Users ────────────────────────────────────────────────

    pub fn get_user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub(super) fn require_user(&self, id: Ulid) -> Result<User, EngineError> {
        self.get_user(&id).ok_or(EngineError::UserNotFound(id))
    }

    /// Insert or replace a user record mirrored from the identity provider.
    pub async fn upsert_user(&self, user: User) -> Result<(), EngineError> {
        if user.name.len() > MAX_USER_NAME_LEN {
            return Err(EngineError::LimitExceeded("user name too long"));
        }
        let _gate = self.commit_gate.read().await;
        let _serial = self.user_writes.lock().await;
        let event = Event::UserUpserted {
            id: user.id,
            name: user.name.clone(),
            role: user.role,
            active: user.active,
        };
        self.wal_append(&event).await?;
        info!(user_id = %user.id, role = ?user.role, active = user.active, "user upserted");
        self.users.insert(user.id, user);
        Ok(())
    }

    pub async fn set_user_active(&self, id: Ulid, active: bool) -> Result<User, EngineError> {
        let mut user = self.require_user(id)?;
        user.active = active;
        self.upsert_user(user.clone()).await?;
        Ok(user)
    }

    // ── Day state ────────────────────────────────────────────

    pub(super) fn cafeteria_day(&self, date: NaiveDate) -> SharedCafeteriaDay {
        self.cafeteria
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(CafeteriaDay::new(date))))
            .value()
            .clone()
    }

    pub(super) fn existing_cafeteria_day(&self, date: NaiveDate) -> Option<SharedCafeteriaDay> {
        self.cafeteria.get(&date).map(|e| e.value().clone())
    }

    pub(super) fn room_day(&self, date: NaiveDate) -> SharedRoomDay {
        self.rooms
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(RoomDay::new(date))))
            .value()
            .clone()
    }

    pub(super) fn existing_room_day(&self, date: NaiveDate) -> Option<SharedRoomDay> {
        self.rooms.get(&date).map(|e| e.value().clone())
    }

    /// Every cafeteria day, oldest first.
    pub(super) fn cafeteria_days(&self) -> Vec<SharedCafeteriaDay> {
        let mut days: Vec<_> = self
            .cafeteria
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        days.sort_by_key(|(d, _)| *d);
        days.into_iter().map(|(_, day)| day).collect()
    }

    /// Every room day, oldest first.
    pub(super) fn room_days(&self) -> Vec<SharedRoomDay> {
        let mut days: Vec<_> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        days.sort_by_key(|(d, _)| *d);
        days.into_iter().map(|(_, day)| day).collect()
    }

    /// Lookup reservation → date, then take that day's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<CafeteriaDay>, EngineError> {
        let date = self
            .reservation_dates
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::ReservationNotFound(id))?;
        let guard = self.cafeteria_day(date).write_owned().await;
        if guard.get(id).is_none() {
            return Err(EngineError::ReservationNotFound(id));
        }
        Ok(guard)
    }

    /// Like `resolve_reservation_write` for rooms; retries if the booking was
    /// moved to another date while we waited for the lock.
    pub(super) async fn resolve_room_write(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomDay>, EngineError> {
        for _ in 0..3 {
            let date = self
                .room_dates
                .get(&id)
                .map(|e| *e.value())
                .ok_or(EngineError::ReservationNotFound(id))?;
            let guard = self.room_day(date).write_owned().await;
            if guard.get(id).is_some() {
                return Ok(guard);
            }
        }
        Err(EngineError::ReservationNotFound(id))
    }

    // ── Persistence ──────────────────────────────────────────

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply. Memory is untouched if the append fails.
    pub(super) async fn commit_cafeteria(
        &self,
        day: &mut CafeteriaDay,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_cafeteria(day, event);
        if let Event::ReservationCreated { id, date, .. } = event {
            self.reservation_dates.insert(*id, *date);
        }
        Ok(())
    }

    pub(super) async fn commit_room(
        &self,
        day: &mut RoomDay,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_rooms(day, event);
        match event {
            Event::RoomReservationCreated { id, date, .. } => {
                self.room_dates.insert(*id, *date);
            }
            Event::RoomReservationDeleted { id, .. } => {
                self.room_dates.remove(id);
            }
            _ => {}
        }
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        let mut cafeteria = Vec::new();
        for day in self.cafeteria_days() {
            cafeteria.push(day.read().await.clone());
        }
        let mut rooms = Vec::new();
        for day in self.room_days() {
            rooms.push(day.read().await.clone());
        }
        let events = snapshot_events(&self.slots, &users, &cafeteria, &rooms);
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
