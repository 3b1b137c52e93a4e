use ulid::Ulid;

/// How a rejection should be surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Policy,
    Capacity,
    Conflict,
    NotFound,
    Forbidden,
    Infrastructure,
}

#[derive(Debug)]
pub enum EngineError {
    InvalidDateFormat(String),
    InvalidTimeFormat(String),
    InvalidTimeRange,
    BeforeCutoff { minutes_remaining: i64 },
    SlotInactive(u32),
    SlotEnded(u32),
    AlreadyReservedToday,
    AlreadyStarted(Ulid),
    InvalidState { id: Ulid, status: String, action: &'static str },
    CheckInClosed(Ulid),
    NotCheckedIn(Ulid),
    UserInactive(Ulid),
    CapacityExceeded(u32),
    ScheduleConflict(Ulid),
    UserNotFound(Ulid),
    ReservationNotFound(Ulid),
    SlotNotFound(u32),
    Forbidden(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        use EngineError::*;
        match self {
            InvalidDateFormat(_) | InvalidTimeFormat(_) | InvalidTimeRange | LimitExceeded(_) => {
                ErrorCategory::Validation
            }
            BeforeCutoff { .. }
            | SlotInactive(_)
            | SlotEnded(_)
            | AlreadyReservedToday
            | AlreadyStarted(_)
            | InvalidState { .. }
            | CheckInClosed(_)
            | NotCheckedIn(_)
            | UserInactive(_) => ErrorCategory::Policy,
            CapacityExceeded(_) => ErrorCategory::Capacity,
            ScheduleConflict(_) => ErrorCategory::Conflict,
            UserNotFound(_) | ReservationNotFound(_) | SlotNotFound(_) => ErrorCategory::NotFound,
            Forbidden(_) => ErrorCategory::Forbidden,
            WalError(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Short machine-readable reason, used as a metric label and API error code.
    pub fn code(&self) -> &'static str {
        use EngineError::*;
        match self {
            InvalidDateFormat(_) => "invalid_date_format",
            InvalidTimeFormat(_) => "invalid_time_format",
            InvalidTimeRange => "invalid_time_range",
            BeforeCutoff { .. } => "before_cutoff",
            SlotInactive(_) => "slot_inactive",
            SlotEnded(_) => "slot_ended",
            AlreadyReservedToday => "already_reserved_today",
            AlreadyStarted(_) => "already_started",
            InvalidState { .. } => "invalid_state",
            CheckInClosed(_) => "check_in_closed",
            NotCheckedIn(_) => "not_checked_in",
            UserInactive(_) => "user_inactive",
            CapacityExceeded(_) => "capacity_exceeded",
            ScheduleConflict(_) => "schedule_conflict",
            UserNotFound(_) | ReservationNotFound(_) | SlotNotFound(_) => "not_found",
            Forbidden(_) => "forbidden",
            LimitExceeded(_) => "limit_exceeded",
            WalError(_) => "storage_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidDateFormat(s) => {
                write!(f, "invalid date format: {s:?} (expected yyyy-MM-dd)")
            }
            EngineError::InvalidTimeFormat(s) => {
                write!(f, "invalid time format: {s:?} (expected HH:mm)")
            }
            EngineError::InvalidTimeRange => write!(f, "end time must be after start time"),
            EngineError::BeforeCutoff { minutes_remaining } => write!(
                f,
                "reservations open later today; {minutes_remaining} minutes remaining"
            ),
            EngineError::SlotInactive(id) => write!(f, "time slot {id} is not active"),
            EngineError::SlotEnded(id) => write!(f, "time slot {id} has already ended today"),
            EngineError::AlreadyReservedToday => {
                write!(f, "user already has a reservation for today")
            }
            EngineError::AlreadyStarted(id) => {
                write!(f, "reservation {id} has already started and can no longer be cancelled")
            }
            EngineError::InvalidState { id, status, action } => {
                write!(f, "cannot {action} reservation {id} in status {status}")
            }
            EngineError::CheckInClosed(id) => {
                write!(f, "check-in is not open for reservation {id}")
            }
            EngineError::NotCheckedIn(id) => write!(f, "reservation {id} was never checked in"),
            EngineError::UserInactive(id) => write!(f, "user {id} is inactive"),
            EngineError::CapacityExceeded(cap) => {
                write!(f, "capacity {cap} exceeded: time slot is full")
            }
            EngineError::ScheduleConflict(id) => {
                write!(f, "schedule conflict with room reservation {id}")
            }
            EngineError::UserNotFound(id) => write!(f, "user not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::SlotNotFound(id) => write!(f, "time slot not found: {id}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
