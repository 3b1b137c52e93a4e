use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Local time in the organization's zone.
pub type Timestamp = DateTime<FixedOffset>;

/// Half-open time-of-day interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Span {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The span anchored to a calendar date.
    pub fn on(&self, date: NaiveDate) -> Window {
        Window {
            start: date.and_time(self.start),
            end: date.and_time(self.end),
        }
    }

    /// `HH:mm - HH:mm`
    pub fn label(&self) -> String {
        format!("{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// A span placed on a specific date, in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Employee,
    #[serde(rename = "HR")]
    Hr,
}

impl Role {
    pub fn is_hr(self) -> bool {
        matches!(self, Role::Hr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub role: Role,
    pub active: bool,
}

/// A recurring cafeteria window shared by all users. Not per-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: u32,
    pub span: Span,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    Cancelled,
    Expired,
    InProgress,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired)
    }

    /// Counts against the slot capacity.
    pub fn holds_capacity(self) -> bool {
        matches!(self, Self::Active | Self::InProgress)
    }

    /// Blocks the user from booking again the same day. Expired included.
    pub fn blocks_same_day(self) -> bool {
        matches!(self, Self::Active | Self::InProgress | Self::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomReservationStatus {
    Active,
    Cancelled,
    Expired,
    InProgress,
    Completed,
}

impl RoomReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired | Self::Completed)
    }
}

/// The states the time-driven sweep reasons about, shared by both reservation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    InProgress,
    Expired,
    Settled,
}

impl From<ReservationStatus> for Phase {
    fn from(s: ReservationStatus) -> Self {
        match s {
            ReservationStatus::Active => Phase::Active,
            ReservationStatus::InProgress => Phase::InProgress,
            ReservationStatus::Expired => Phase::Expired,
            ReservationStatus::Cancelled => Phase::Settled,
        }
    }
}

impl From<RoomReservationStatus> for Phase {
    fn from(s: RoomReservationStatus) -> Self {
        match s {
            RoomReservationStatus::Active => Phase::Active,
            RoomReservationStatus::InProgress => Phase::InProgress,
            RoomReservationStatus::Expired => Phase::Expired,
            RoomReservationStatus::Cancelled | RoomReservationStatus::Completed => Phase::Settled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub user_id: Ulid,
    pub slot_id: u32,
    pub date: NaiveDate,
    pub status: ReservationStatus,
    pub created_at: Timestamp,
    pub check_in_at: Option<Timestamp>,
    pub check_out_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomReservation {
    pub id: Ulid,
    pub user_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
    pub meeting_name: Option<String>,
    pub status: RoomReservationStatus,
    pub created_at: Timestamp,
    pub check_in_at: Option<Timestamp>,
}

/// All cafeteria reservations for one date. The unit of write locking.
#[derive(Debug, Clone)]
pub struct CafeteriaDay {
    pub date: NaiveDate,
    pub reservations: Vec<Reservation>,
}

impl CafeteriaDay {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            reservations: Vec::new(),
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations currently holding a seat in `slot_id`.
    pub fn holding(&self, slot_id: u32) -> usize {
        self.reservations
            .iter()
            .filter(|r| r.slot_id == slot_id && r.status.holds_capacity())
            .count()
    }

    pub fn user_blocked(&self, user_id: Ulid) -> bool {
        self.reservations
            .iter()
            .any(|r| r.user_id == user_id && r.status.blocks_same_day())
    }
}

/// All room bookings for one date, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct RoomDay {
    pub date: NaiveDate,
    pub bookings: Vec<RoomReservation>,
}

impl RoomDay {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, booking: RoomReservation) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<RoomReservation> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&RoomReservation> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut RoomReservation> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query, regardless of status.
    /// Binary search skips bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &RoomReservation> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserUpserted {
        id: Ulid,
        name: String,
        role: Role,
        active: bool,
    },
    TimeSlotSeeded {
        id: u32,
        span: Span,
        active: bool,
    },
    ReservationCreated {
        id: Ulid,
        user_id: Ulid,
        slot_id: u32,
        date: NaiveDate,
        created_at: Timestamp,
    },
    ReservationStatusChanged {
        id: Ulid,
        date: NaiveDate,
        status: ReservationStatus,
    },
    ReservationCheckedIn {
        id: Ulid,
        date: NaiveDate,
        at: Timestamp,
        status: ReservationStatus,
    },
    ReservationCheckedOut {
        id: Ulid,
        date: NaiveDate,
        at: Timestamp,
    },
    RoomReservationCreated {
        id: Ulid,
        user_id: Ulid,
        date: NaiveDate,
        span: Span,
        meeting_name: Option<String>,
        created_at: Timestamp,
    },
    RoomReservationRescheduled {
        id: Ulid,
        from: NaiveDate,
        date: NaiveDate,
        span: Span,
    },
    RoomReservationStatusChanged {
        id: Ulid,
        date: NaiveDate,
        status: RoomReservationStatus,
    },
    RoomReservationCheckedIn {
        id: Ulid,
        date: NaiveDate,
        at: Timestamp,
        status: RoomReservationStatus,
    },
    RoomReservationDeleted {
        id: Ulid,
        date: NaiveDate,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
    pub id: u32,
    pub time_range: String,
    pub available: u32,
}

/// One entry of the fixed room candidate menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSlot {
    pub id: u32,
    pub time_range: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityCheck {
    pub is_available: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationInfo {
    pub id: Ulid,
    pub user_id: Ulid,
    pub time_slot_id: u32,
    pub time_range: String,
    pub date: NaiveDate,
    pub status: ReservationStatus,
    pub created_at: Timestamp,
    pub check_in_at: Option<Timestamp>,
    pub check_out_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomReservationInfo {
    pub id: Ulid,
    pub user_id: Ulid,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub meeting_name: Option<String>,
    pub status: RoomReservationStatus,
    pub created_at: Timestamp,
    pub check_in_at: Option<Timestamp>,
}

impl From<&RoomReservation> for RoomReservationInfo {
    fn from(b: &RoomReservation) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            date: b.date,
            start_time: b.span.start.format("%H:%M").to_string(),
            end_time: b.span.end.format("%H:%M").to_string(),
            meeting_name: b.meeting_name.clone(),
            status: b.status,
            created_at: b.created_at,
            check_in_at: b.check_in_at,
        }
    }
}
