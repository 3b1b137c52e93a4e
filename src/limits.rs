/// Default max concurrent Active/InProgress reservations per (date, slot).
pub const DEFAULT_CAPACITY: u32 = 5;

/// Default local time-of-day (hour, minute) before which cafeteria reservations are refused.
pub const DEFAULT_CUTOFF: (u32, u32) = (10, 0);

/// Default minutes after a window ends before the sweep marks it Expired.
pub const DEFAULT_GRACE_MINUTES: i64 = 1;

/// How early before the window start a check-in is accepted.
pub const CHECK_IN_EARLY_MINUTES: i64 = 15;

/// Default organization offset from UTC, in minutes (UTC-5).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -300;

/// First hour of the room candidate menu and number of one-hour candidates.
pub const ROOM_MENU_FIRST_HOUR: u32 = 8;
pub const ROOM_MENU_SLOTS: u32 = 10;

pub const MAX_MEETING_NAME_LEN: usize = 200;
pub const MAX_USER_NAME_LEN: usize = 200;
pub const MAX_TIME_SLOTS: usize = 96;


/// Upper bound on the configured grace period (one day).
pub const MAX_GRACE_MINUTES: i64 = 1440;
/// Largest accepted distance from UTC, either direction (18 hours).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 1080;
